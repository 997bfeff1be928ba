//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use biosample_mapper::{
    Driver, KeywordOverrides, MapperConfig, OntologySet, Resources, Sample, SampleOutput,
};

pub const ONTOLOGY_FIXTURE: &str = include_str!("../fixtures/ontology.yaml");

pub fn fixture_ontologies() -> Arc<OntologySet> {
    Arc::new(OntologySet::from_bundle_yaml(ONTOLOGY_FIXTURE).expect("fixture ontology parses"))
}

pub fn builtin_driver(workers: usize) -> Driver {
    driver_with(workers, None)
}

pub fn driver_with(workers: usize, overrides: Option<&KeywordOverrides>) -> Driver {
    let config = MapperConfig {
        workers,
        ..MapperConfig::builtin().expect("builtin config")
    };
    Driver::from_config(
        &config,
        fixture_ontologies(),
        Resources::builtin().expect("builtin resources"),
        overrides,
    )
    .expect("driver builds")
}

pub fn sample(accession: &str, pairs: &[(&str, &str)]) -> Sample {
    Sample::new(Some(accession), pairs.iter().copied())
}

/// Map a single sample with the built-in configuration
pub fn map_one(pairs: &[(&str, &str)]) -> SampleOutput {
    let driver = builtin_driver(1);
    let mut batch = driver.run(&[sample("SAMN00000001", pairs)]);
    batch.outputs.remove(0)
}

pub fn mapped_ids(output: &SampleOutput) -> BTreeSet<String> {
    output.mapped_terms.iter().map(|t| t.term_id.clone()).collect()
}

/// Vocabulary of attribute values used by the property tests
pub const VALUES: &[&str] = &[
    "CD4+ T cell",
    "T cell",
    "B lymphocytes",
    "HeLa",
    "HeLa cells",
    "MCF7",
    "liver",
    "Liver biopsy",
    "whole blood",
    "PBMC",
    "fibroblasts",
    "hepatocytes",
    "21 years",
    "3 months",
    "M",
    "female",
    "LN",
    "HCC",
    "",
    "unknown",
    "tumour tissue",
];

pub const KEYS: &[&str] = &[
    "cell type",
    "cell line",
    "tissue",
    "age",
    "sex",
    "disease",
    "passage",
    "source",
];
