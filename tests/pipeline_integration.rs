//! End-to-end mapping scenarios against the fixture ontology bundle
//!
//! Tests verify:
//! 1. Specific terms win over the generic terms inside them
//! 2. Real-value extraction and the consequent terms it implies
//! 3. Cell-line rules (blocking, implied disease, cultured cell)
//! 4. Table-driven mappings and keyword overrides
//! 5. Cross-sample cache reuse

mod helpers;

use std::sync::Arc;

use biosample_mapper::ontology::{OntologyGraph, Term};
use biosample_mapper::pipeline::QueryCache;
use biosample_mapper::{
    KeywordOverrides, MatchMethod, OntologySet, Pipeline, PipelineConfig, Resources, Sample,
};
use helpers::{builtin_driver, driver_with, map_one, mapped_ids, sample};

// ============================================================================
// Cell types
// ============================================================================

#[test]
fn test_cd4_t_cell_maps_specific_term() {
    let output = map_one(&[("cell type", "CD4+ T cell")]);

    let ids = mapped_ids(&output);
    assert!(ids.contains("CL:0000624"), "mapped: {:?}", ids);
    assert!(!ids.contains("CL:0000084"));
    assert!(!ids.contains("CL:0000000"));

    let term = &output.mapped_terms[0];
    assert_eq!(term.term_name, "CD4-positive, alpha-beta T cell");
    assert_eq!(term.match_method, MatchMethod::Synonym);
    assert_eq!((term.matched_span.start, term.matched_span.end), (0, 11));
    assert!(term
        .path_to_mapping
        .iter()
        .any(|step| step.starts_with("ManuallyAnnotatedSynonyms")));

    for ancestor in ["CL:0000624", "CL:0000789", "CL:0000084", "CL:0000000"] {
        assert!(
            output.supertype_closure.iter().any(|t| t == ancestor),
            "{} missing from closure",
            ancestor
        );
    }
}

#[test]
fn test_plural_resolves_through_inflection() {
    let output = map_one(&[("cell type", "B lymphocytes")]);
    let ids = mapped_ids(&output);
    assert!(ids.contains("CL:0000236"), "mapped: {:?}", ids);
    assert!(!ids.contains("CL:0000542"));
}

#[test]
fn test_table_consequent_added() {
    let output = map_one(&[("cell type", "PBMC")]);
    let ids = mapped_ids(&output);
    assert!(ids.contains("CL:2000001"));

    let blood = output
        .mapped_terms
        .iter()
        .find(|t| t.term_id == "UBERON:0000178")
        .expect("blood implied by PBMC");
    assert!(blood.is_consequent);
    assert_eq!(blood.match_method, MatchMethod::Consequent);
}

// ============================================================================
// Real values
// ============================================================================

#[test]
fn test_age_yields_real_value_and_adult_stage() {
    let output = map_one(&[("age", "21 years")]);

    assert_eq!(output.real_value_properties.len(), 1);
    let age = &output.real_value_properties[0];
    assert_eq!(age.property_id, "EFO:0000246");
    assert_eq!(age.unit_id.as_deref(), Some("UO:0000036"));
    assert_eq!(age.value, 21.0);
    assert_eq!(age.original_key, "age");
    assert!(!age.consequent);

    let adult = output
        .mapped_terms
        .iter()
        .find(|t| t.term_id == "EFO:0001272")
        .expect("adult stage implied by age");
    assert!(adult.is_consequent);
    assert_eq!(adult.term_name, "adult");
}

#[test]
fn test_young_age_in_months_is_juvenile() {
    let output = map_one(&[("age", "3 months")]);
    assert_eq!(output.real_value_properties[0].unit_id.as_deref(), Some("UO:0000035"));
    let ids = mapped_ids(&output);
    assert!(ids.contains("UBERON:0034919"));
    assert!(!ids.contains("EFO:0001272"));
}

#[test]
fn test_passage_number_marks_cultured_cell_type() {
    let output = map_one(&[("cell type", "fibroblasts"), ("passage", "4")]);

    let passage = output
        .real_value_properties
        .iter()
        .find(|rv| rv.original_key == "passage")
        .expect("passage number extracted");
    assert_eq!(passage.property_id, "EFO:0007061");
    assert_eq!(passage.value, 4.0);
    assert_eq!(passage.unit_id, None);

    let ids = mapped_ids(&output);
    assert!(ids.contains("CL:0000057"));
    assert!(ids.contains("CL:0000010"));
}

#[test]
fn test_case_folding_width_changes_do_not_fail_sample() {
    // U+0130 and U+212A change byte length when lowercased
    let batch = builtin_driver(1).run(&[sample(
        "SAMN1",
        &[("cell type", "T cell"), ("tissue", "\u{130}+\u{212A}\u{130}")],
    )]);
    let output = &batch.outputs[0];

    assert_eq!(batch.report.failed, 0);
    assert!(output.diagnostic.is_none());
    assert!(mapped_ids(output).contains("CL:0000084"));
}

#[test]
fn test_empty_value_produces_nothing() {
    let output = map_one(&[("tissue", ""), ("cell type", "   "), ("disease", "N/A")]);
    assert!(output.mapped_terms.is_empty());
    assert!(output.real_value_properties.is_empty());
    assert!(output.diagnostic.is_none());
}

// ============================================================================
// Cell lines
// ============================================================================

#[test]
fn test_cell_line_implies_disease_and_culture() {
    let output = map_one(&[("cell line", "HeLa")]);
    let ids = mapped_ids(&output);

    assert!(ids.contains("CVCL_0030"));
    assert!(ids.contains("DOID:4362"));
    assert!(ids.contains("CL:0000066"));
    assert!(ids.contains("CL:0000010"));

    let disease_entries = output
        .mapped_terms
        .iter()
        .filter(|t| t.term_id == "DOID:4362")
        .count();
    assert_eq!(disease_entries, 1);
}

#[test]
fn test_cell_line_blocked_under_tissue_key() {
    let output = map_one(&[("tissue", "HeLa")]);
    assert!(!mapped_ids(&output).contains("CVCL_0030"));
    assert!(!mapped_ids(&output).contains("DOID:4362"));
}

#[test]
fn test_exception_terms_never_reported() {
    let driver = builtin_driver(1);
    let batch = driver.run(&[sample("SAMN1", &[("sample type", "cell line")])]);
    let output = &batch.outputs[0];
    assert!(!mapped_ids(output).contains("EFO:0000322"));
    assert_eq!(batch.report.zero_match, 1);
}

// ============================================================================
// Tables and overrides
// ============================================================================

#[test]
fn test_value_meaning_depends_on_key() {
    let output = map_one(&[("sex", "M")]);
    assert!(mapped_ids(&output).contains("UBERON:0003101"));

    let output = map_one(&[("strain", "M")]);
    assert!(mapped_ids(&output).is_empty());
}

#[test]
fn test_two_char_value_mapped() {
    let output = map_one(&[("tissue", "LN")]);
    assert_eq!(
        mapped_ids(&output).into_iter().collect::<Vec<_>>(),
        vec!["UBERON:0000029".to_string()]
    );
}

#[test]
fn test_acronym_expanded_only_when_uppercase() {
    let output = map_one(&[("disease", "HCC")]);
    assert!(mapped_ids(&output).contains("DOID:684"));

    let output = map_one(&[("disease", "hcc")]);
    assert!(!mapped_ids(&output).contains("DOID:684"));
}

#[test]
fn test_keyword_override_replaces_mapping() {
    let baseline = map_one(&[("tissue", "Liver biopsy")]);
    let liver = &baseline.mapped_terms[0];
    assert_eq!(liver.term_id, "UBERON:0002107");
    assert_eq!((liver.matched_span.start, liver.matched_span.end), (0, 5));

    let overrides = KeywordOverrides::from_json(r#"{"liver biopsy": ["UBERON:0002107"]}"#).unwrap();
    let driver = driver_with(1, Some(&overrides));
    assert_ne!(driver.pipeline().fingerprint(), builtin_driver(1).pipeline().fingerprint());

    let batch = driver.run(&[sample("SAMN1", &[("tissue", "Liver biopsy")])]);
    let terms = &batch.outputs[0].mapped_terms;
    assert_eq!(terms.len(), 1);
    assert_eq!(terms[0].match_method, MatchMethod::Custom);
    assert_eq!((terms[0].matched_span.start, terms[0].matched_span.end), (0, 12));
}

#[test]
fn test_keyword_override_corrects_exact_match() {
    let overrides = KeywordOverrides::from_json(r#"{"hela": ["CL:0000066"]}"#).unwrap();
    let batch = driver_with(1, Some(&overrides)).run(&[sample("SAMN1", &[("cell line", "HeLa")])]);
    let output = &batch.outputs[0];
    let ids = mapped_ids(output);

    assert!(!ids.contains("CVCL_0030"), "mapped: {:?}", ids);
    assert!(!ids.contains("DOID:4362"));
    let epithelial = output
        .mapped_terms
        .iter()
        .find(|t| t.term_id == "CL:0000066")
        .expect("override target mapped");
    assert_eq!(epithelial.match_method, MatchMethod::Custom);
    assert!(!epithelial.is_consequent);
    assert_eq!((epithelial.matched_span.start, epithelial.matched_span.end), (0, 4));
}

#[test]
fn test_exact_hit_wins_over_fuzzy_hit() {
    let cl = OntologyGraph::new(
        "CL",
        vec![
            Term::new("CL:0000000", "cell"),
            Term::new("CL:0000056", "myoblast").is_a("CL:0000000"),
            Term::new("CL:0000835", "myeloblast").is_a("CL:0000000"),
        ],
    )
    .unwrap();
    let config = PipelineConfig {
        exact_ontology_ids: vec!["CL".to_string()],
        fuzzy_distance_threshold: 0.25,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::standard(
        &config,
        Arc::new(OntologySet::new(vec![cl])),
        Arc::new(Resources::default()),
    )
    .unwrap();
    let mut cache = QueryCache::new();

    let exact = pipeline
        .run(&Sample::new(None, [("cell type", "myoblast")]), &mut cache)
        .unwrap();
    let ids: Vec<&str> = exact.matches.iter().map(|m| m.term_id.as_str()).collect();
    assert_eq!(ids, vec!["CL:0000056"]);
    assert_eq!(exact.matches[0].method, MatchMethod::Exact);

    let typo = pipeline
        .run(&Sample::new(None, [("cell type", "myeloblst")]), &mut cache)
        .unwrap();
    assert_eq!(typo.matches.len(), 1);
    assert_eq!(typo.matches[0].term_id, "CL:0000835");
    assert_eq!(typo.matches[0].method, MatchMethod::Fuzzy);
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_identical_pair_served_from_cache() {
    let driver = builtin_driver(1);
    let pipeline = driver.pipeline();
    let mut cache = QueryCache::new();

    let first = pipeline
        .run(&sample("SAMN1", &[("cell type", "CD4+ T cell")]), &mut cache)
        .unwrap();
    let misses = cache.stats().misses;
    let second = pipeline
        .run(&sample("SAMN1", &[("cell type", "CD4+ T cell")]), &mut cache)
        .unwrap();

    assert_eq!(cache.stats().hits, 1);
    assert_eq!(cache.stats().misses, misses);
    assert_eq!(first, second);
}

#[test]
fn test_cache_from_other_configuration_is_cleared() {
    let mut cache = QueryCache::new();
    builtin_driver(1)
        .pipeline()
        .run(&sample("SAMN1", &[("tissue", "liver")]), &mut cache)
        .unwrap();
    assert_eq!(cache.len(), 1);

    let overrides = KeywordOverrides::from_json(r#"{"liver": ["UBERON:0002048"]}"#).unwrap();
    let other = driver_with(1, Some(&overrides));
    other
        .pipeline()
        .run(&sample("SAMN1", &[("tissue", "liver")]), &mut cache)
        .unwrap();

    assert_eq!(cache.fingerprint(), Some(other.pipeline().fingerprint()));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().hits, 0);
    assert_eq!(cache.stats().misses, 2);
}
