//! Property-based tests for the research pipeline using proptest.

use proptest::prelude::*;

use glean_core::research::source::{ArticleRecord, WebRecord};
use glean_core::research::strategist::{EvidenceQuality, Reflection};
use glean_core::research::{
    RelevanceRanker, RoundResult, SelectionOptions, Source, SourceDeduplicator, SourceSelector,
    StoppingEvaluator,
};

fn source_strategy() -> impl Strategy<Value = Source> {
    let doi = prop::option::of((0u32..20).prop_map(|n| format!("10.1000/x{n}")));
    (
        "[a-z ]{0,40}",
        "[a-z ]{0,200}",
        doi,
        0u32..20,
        any::<bool>(),
    )
        .prop_map(|(title, text, doi, page, is_web)| {
            if is_web {
                Source::Web(WebRecord {
                    title,
                    snippet: text,
                    url: format!("https://example.org/page/{page}"),
                    doi,
                    ..Default::default()
                })
            } else {
                Source::PeerReviewed(ArticleRecord {
                    title,
                    abstract_text: text,
                    doi,
                    ..Default::default()
                })
            }
        })
}

fn quality_strategy() -> impl Strategy<Value = EvidenceQuality> {
    prop_oneof![
        Just(EvidenceQuality::Low),
        Just(EvidenceQuality::Medium),
        Just(EvidenceQuality::High),
    ]
}

// --- Deduplication properties ---

proptest! {
    #[test]
    fn dedup_second_pass_admits_nothing_identified(
        sources in prop::collection::vec(source_strategy(), 0..40)
    ) {
        let mut dedup = SourceDeduplicator::new();
        let first = dedup.filter(sources.clone());
        prop_assert_eq!(first.unique.len() + first.duplicate_count, sources.len());

        // Only identifier-less sources survive a replay of the same batch.
        let second = dedup.filter(sources.clone());
        let unidentified = sources.iter().filter(|s| s.identifier().is_none()).count();
        prop_assert_eq!(second.unique.len(), unidentified);
    }

    #[test]
    fn dedup_doi_matches_across_source_types(n in 0u32..10_000, upper in any::<bool>()) {
        let doi = format!("10.2000/Study.{n}");
        let written = if upper { doi.to_uppercase() } else { doi.clone() };
        let article = Source::PeerReviewed(ArticleRecord {
            title: "article".into(),
            doi: Some(doi),
            ..Default::default()
        });
        let page = Source::Web(WebRecord {
            title: "page".into(),
            url: format!("https://doi.org/{written}"),
            ..Default::default()
        });

        let mut dedup = SourceDeduplicator::new();
        let outcome = dedup.filter(vec![article, page]);
        prop_assert_eq!(outcome.unique.len(), 1);
        prop_assert_eq!(outcome.duplicate_count, 1);
    }
}

// --- Ranking properties ---

proptest! {
    #[test]
    fn ranker_scores_are_bounded(
        query in "[a-z ]{0,60}",
        sources in prop::collection::vec(source_strategy(), 0..30)
    ) {
        let ranker = RelevanceRanker::with_reference_year(2025);
        let result = ranker.rank(&query, &sources);
        prop_assert_eq!(result.len(), sources.len());
        for ranked in &result.ranked {
            prop_assert!(ranked.relevance_score <= 100);
        }
        for pair in result.ranked.windows(2) {
            prop_assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    #[test]
    fn ranker_is_deterministic(
        query in "[a-z ]{0,60}",
        sources in prop::collection::vec(source_strategy(), 0..30)
    ) {
        let ranker = RelevanceRanker::with_reference_year(2025);
        prop_assert_eq!(ranker.rank(&query, &sources), ranker.rank(&query, &sources));
    }
}

// --- Selection properties ---

proptest! {
    #[test]
    fn selector_respects_budget_and_floor(
        query in "[a-z ]{1,40}",
        sources in prop::collection::vec(source_strategy(), 0..60),
        token_budget in 1usize..2000,
        floor in 0u32..80,
    ) {
        let ranking = RelevanceRanker::with_reference_year(2025).rank(&query, &sources);
        let options = SelectionOptions {
            token_budget,
            min_relevance_score: floor,
            ..Default::default()
        };
        let result = SourceSelector::new(options.clone()).select(&ranking.ranked);

        prop_assert!(result.total_token_estimate <= token_budget);
        prop_assert!(result.selected_count <= options.extended_limit);
        prop_assert_eq!(result.selected_count, result.selected_sources.len());
        for selected in &result.selected_sources {
            prop_assert!(selected.ranked.relevance_score >= floor);
        }
        let summed: usize = result.selected_sources.iter().map(|s| s.estimated_tokens).sum();
        prop_assert_eq!(summed, result.total_token_estimate);
    }
}

// --- Stopping properties ---

proptest! {
    #[test]
    fn final_round_always_stops(
        max_rounds in 1u32..=4,
        unique in 0usize..40,
        quality in quality_strategy(),
        hint in any::<bool>(),
    ) {
        let sources: Vec<Source> = (0..unique)
            .map(|i| Source::PeerReviewed(ArticleRecord {
                title: format!("s{i}"),
                ..Default::default()
            }))
            .collect();
        let current = RoundResult::new(max_rounds, "q", &sources);
        let reflection = Reflection {
            evidence_quality: quality,
            gaps: Vec::new(),
            should_continue_hint: hint,
            reasoning: String::new(),
        };
        let decision =
            StoppingEvaluator::default().evaluate(max_rounds, max_rounds, &current, &[], &reflection);
        prop_assert!(decision.should_stop);
        prop_assert!(!decision.reasons_triggered.is_empty());
    }

    #[test]
    fn empty_round_always_stops(round in 1u32..4, quality in quality_strategy(), hint in any::<bool>()) {
        let current = RoundResult::new(round, "q", &[]);
        let reflection = Reflection {
            evidence_quality: quality,
            gaps: vec!["dosing".into()],
            should_continue_hint: hint,
            reasoning: String::new(),
        };
        let decision = StoppingEvaluator::default().evaluate(round, 4, &current, &[], &reflection);
        prop_assert!(decision.should_stop);
    }
}
