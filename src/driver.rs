//! Sharded batch driver.
//!
//! The batch is cut into `workers` contiguous shards. Each shard runs on its
//! own rayon worker with its own [`QueryCache`]; shard results are
//! concatenated back in input order. A failing sample never aborts the
//! batch: it is reported as an empty record carrying a diagnostic.

use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;

use crate::config::{KeywordOverrides, MapperConfig};
use crate::error::{ConfigError, PipelineError};
use crate::input::Sample;
use crate::ontology::OntologySet;
use crate::output::{PostProcessor, SampleOutput};
use crate::pipeline::{CacheStats, Pipeline, PipelineResult, QueryCache};
use crate::resources::Resources;

/// Aggregate counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub samples: usize,
    /// Samples whose pipeline run failed
    pub failed: usize,
    /// Samples that mapped to no ontology term
    pub zero_match: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    /// One record per input sample, in input order
    pub outputs: Vec<SampleOutput>,
    pub report: BatchReport,
}

pub struct Driver {
    pipeline: Pipeline,
    post: PostProcessor,
    workers: usize,
}

impl Driver {
    pub fn new(pipeline: Pipeline, post: PostProcessor, workers: usize) -> Self {
        Self {
            pipeline,
            post,
            workers: workers.max(1),
        }
    }

    /// Build the standard pipeline from configuration. Keyword overrides are
    /// merged into the resources first, so they take part in the pipeline
    /// fingerprint.
    pub fn from_config(
        config: &MapperConfig,
        ontologies: Arc<OntologySet>,
        mut resources: Resources,
        overrides: Option<&KeywordOverrides>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if let Some(overrides) = overrides {
            resources.apply_keyword_overrides(overrides);
            tracing::info!(keywords = overrides.len(), "applied keyword overrides");
        }
        let pipeline = Pipeline::standard(&config.pipeline, ontologies, Arc::new(resources))?;
        Ok(Self::new(
            pipeline,
            PostProcessor::from_config(config),
            config.workers,
        ))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Map a batch of samples
    pub fn run(&self, samples: &[Sample]) -> BatchOutput {
        tracing::info!(
            samples = samples.len(),
            workers = self.workers,
            fingerprint = %self.pipeline.fingerprint(),
            "mapping batch"
        );

        let (results, stats) = if self.workers == 1 || samples.len() <= 1 {
            self.run_shard(samples)
        } else {
            self.run_sharded(samples)
        };

        let mut report = BatchReport {
            samples: samples.len(),
            cache_hits: stats.hits,
            cache_misses: stats.misses,
            ..BatchReport::default()
        };
        let outputs: Vec<SampleOutput> = samples
            .iter()
            .zip(results)
            .map(|(sample, result)| match result {
                Ok(result) => self.post.process(result, self.pipeline.ontologies()),
                Err(err) => {
                    tracing::warn!(accession = ?sample.accession, error = %err, "sample mapping failed");
                    SampleOutput::failed(sample.accession.clone(), err.to_string())
                }
            })
            .collect();

        for output in &outputs {
            if output.is_failed() {
                report.failed += 1;
            } else if output.mapped_terms.is_empty() {
                report.zero_match += 1;
            }
        }

        tracing::info!(
            samples = report.samples,
            failed = report.failed,
            zero_match = report.zero_match,
            cache_hits = report.cache_hits,
            cache_misses = report.cache_misses,
            "batch finished"
        );
        BatchOutput { outputs, report }
    }

    fn run_shard(&self, shard: &[Sample]) -> (Vec<Result<PipelineResult, PipelineError>>, CacheStats) {
        let mut cache = QueryCache::new();
        let results = self.pipeline.run_multiple(shard, &mut cache);
        (results, cache.stats())
    }

    fn run_sharded(&self, samples: &[Sample]) -> (Vec<Result<PipelineResult, PipelineError>>, CacheStats) {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                tracing::warn!(error = %err, "failed to build worker pool, mapping sequentially");
                return self.run_shard(samples);
            }
        };

        let shard_size = samples.len().div_ceil(self.workers).max(1);
        let shards: Vec<_> = pool.install(|| {
            samples
                .par_chunks(shard_size)
                .map(|shard| self.run_shard(shard))
                .collect()
        });

        let mut results = Vec::with_capacity(samples.len());
        let mut stats = CacheStats::default();
        for (shard_results, shard_stats) in shards {
            results.extend(shard_results);
            stats = stats.merge(shard_stats);
        }
        (results, stats)
    }
}
