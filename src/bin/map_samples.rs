//! Map a BioSample JSON file onto ontology terms
//!
//! Usage:
//!   cargo run --features cli --bin map_samples -- \
//!     -f biosamples.json \
//!     -O ontologies/cl.yaml -O ontologies/uberon.yaml -O ontologies/efo.yaml \
//!     -k keywords.json \
//!     -n 4 \
//!     -o mapped.json

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use biosample_mapper::input::load_biosamples;
use biosample_mapper::{Driver, KeywordOverrides, MapperConfig, OntologyGraph, OntologySet, Resources};

/// Map biological sample attributes onto ontology terms
#[derive(Parser, Debug)]
#[command(name = "map_samples")]
#[command(about = "Map BioSample key/value attributes to ontology terms and real-value properties")]
struct Args {
    /// BioSample JSON input file
    #[arg(long = "input", short = 'f')]
    input: PathBuf,

    /// Output file (stdout when absent)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Ontology file (YAML or JSON); repeat in priority order
    #[arg(long = "ontology", short = 'O', required = true)]
    ontologies: Vec<PathBuf>,

    /// Pipeline configuration YAML (default: built-in)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Lexical resources YAML (default: built-in)
    #[arg(long, short = 'r')]
    resources: Option<PathBuf>,

    /// Keyword override JSON
    #[arg(long = "keywords", short = 'k')]
    keywords: Option<PathBuf>,

    /// Number of worker shards (overrides the configuration)
    #[arg(long = "processes", short = 'n')]
    processes: Option<usize>,

    /// Debug logging
    #[arg(long, short = 'd')]
    debug: bool,

    /// Info logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.debug {
        tracing::Level::DEBUG
    } else if args.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => MapperConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => MapperConfig::builtin().context("Built-in configuration is invalid")?,
    };
    if let Some(processes) = args.processes {
        if processes == 0 {
            bail!("--processes must be at least 1");
        }
        config.workers = processes;
    }

    let resources = match &args.resources {
        Some(path) => Resources::load(path)
            .with_context(|| format!("Failed to load resources {}", path.display()))?,
        None => Resources::builtin().context("Built-in resources are invalid")?,
    };

    let overrides = args
        .keywords
        .as_ref()
        .map(|path| {
            KeywordOverrides::load(path)
                .with_context(|| format!("Failed to load keyword overrides {}", path.display()))
        })
        .transpose()?;

    let mut ontologies = OntologySet::default();
    for path in &args.ontologies {
        let graph = OntologyGraph::load(path)
            .with_context(|| format!("Failed to load ontology {}", path.display()))?;
        ontologies.push(graph);
    }
    tracing::info!(ontologies = ontologies.len(), "ontologies loaded");

    let driver = Driver::from_config(&config, Arc::new(ontologies), resources, overrides.as_ref())
        .context("Failed to build pipeline")?;

    let samples = load_biosamples(&args.input)
        .with_context(|| format!("Failed to read samples from {}", args.input.display()))?;
    let batch = driver.run(&samples);

    let json = serde_json::to_string_pretty(&batch.outputs).context("Failed to serialize output")?;
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", json),
    }

    if batch.report.zero_match > 0 {
        tracing::warn!(
            zero_match = batch.report.zero_match,
            samples = batch.report.samples,
            "samples mapped to no ontology term"
        );
    }
    Ok(())
}
