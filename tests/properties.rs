//! Property tests over randomly composed samples

mod helpers;

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use biosample_mapper::ontology::{OntologyGraph, Relation, Term};
use biosample_mapper::pipeline::QueryCache;
use biosample_mapper::{MatchMethod, OntologySet, Pipeline, PipelineConfig, Resources, Sample};
use helpers::{builtin_driver, fixture_ontologies, KEYS, VALUES};

fn arb_sample() -> impl Strategy<Value = Sample> {
    prop::collection::vec((0..KEYS.len(), 0..VALUES.len()), 0..5).prop_map(|picks| {
        Sample::new(
            Some("SAMN00000001"),
            picks.into_iter().map(|(k, v)| (KEYS[k], VALUES[v])),
        )
    })
}

fn arb_short_value() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-d]{1,4}", 1..4).prop_map(|words| words.join(" "))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn mapping_is_idempotent(sample in arb_sample()) {
        let driver = builtin_driver(1);
        let pipeline = driver.pipeline();

        let fresh = pipeline.run(&sample, &mut QueryCache::new()).unwrap();
        let mut cache = QueryCache::new();
        let first = pipeline.run(&sample, &mut cache).unwrap();
        let cached = pipeline.run(&sample, &mut cache).unwrap();

        prop_assert_eq!(&fresh, &first);
        prop_assert_eq!(&first, &cached);
    }

    #[test]
    fn closure_is_monotonic_and_reachable(sample in arb_sample()) {
        let driver = builtin_driver(1);
        let ontologies = fixture_ontologies();
        let output = driver.run(std::slice::from_ref(&sample)).outputs.remove(0);

        let raw: BTreeSet<&str> = output.term_ids();
        let closure: BTreeSet<&str> = output.supertype_closure.iter().map(|t| t.as_str()).collect();
        prop_assert!(raw.is_subset(&closure));

        let hierarchical = Relation::hierarchical();
        for term in &closure {
            let reachable = raw.iter().any(|r| {
                ontologies.recursive_relationship(r, &hierarchical).contains(*term)
            });
            prop_assert!(reachable, "{} not reachable from {:?}", term, raw);
        }
    }

    #[test]
    fn contained_match_is_never_ancestor_of_container(sample in arb_sample()) {
        let driver = builtin_driver(1);
        let ontologies = driver.pipeline().ontologies();
        let result = driver.pipeline().run(&sample, &mut QueryCache::new()).unwrap();

        let text: Vec<_> = result.matches.iter().filter(|m| !m.is_consequent).collect();
        for outer in &text {
            for inner in &text {
                if outer.strictly_contains(inner) {
                    prop_assert!(!ontologies.is_strict_ancestor(&inner.term_id, &outer.term_id));
                }
            }
        }
    }

    #[test]
    fn short_spans_never_match(value in arb_short_value()) {
        let cl = OntologyGraph::new(
            "CL",
            vec![
                Term::new("CL:1", "a"),
                Term::new("CL:2", "ab"),
                Term::new("CL:3", "abc"),
                Term::new("CL:4", "abcd"),
                Term::new("CL:5", "abcd a"),
            ],
        )
        .unwrap();
        let config = PipelineConfig {
            exact_ontology_ids: vec!["CL".to_string()],
            exact_query_len_thresh: 7,
            fuzzy_query_len_thresh: 7,
            fuzzy_distance_threshold: 0.5,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::standard(
            &config,
            Arc::new(OntologySet::new(vec![cl])),
            Arc::new(Resources::default()),
        )
        .unwrap();

        let sample = Sample::new(None, [("cell type", value.as_str())]);
        let result = pipeline.run(&sample, &mut QueryCache::new()).unwrap();
        for m in &result.matches {
            prop_assert!(
                !matches!(m.method, MatchMethod::Exact | MatchMethod::Synonym | MatchMethod::Fuzzy)
                    || m.matched_text.chars().count() >= 7,
                "{:?} matched below threshold",
                m
            );
        }
    }

    #[test]
    fn worker_count_does_not_change_results(
        samples in prop::collection::vec(arb_sample(), 0..12),
        workers in 1usize..6,
    ) {
        let sequential = builtin_driver(1).run(&samples);
        let sharded = builtin_driver(workers).run(&samples);
        prop_assert_eq!(sequential.outputs, sharded.outputs);
    }
}
