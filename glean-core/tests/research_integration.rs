//! Integration tests for the research session loop.
//!
//! These drive full sessions through `ResearchOrchestrator` with scripted
//! strategists and in-process providers, covering partial provider failure,
//! cross-round deduplication, evaluator stops, and safety overrides.

use async_trait::async_trait;
use glean_core::GleanConfig;
use glean_core::error::{ProviderError, StrategistError};
use glean_core::research::source::{ArticleRecord, PreprintRecord, TrialRecord, WebRecord};
use glean_core::research::stopping::REASON_HIGH_QUALITY_COVERAGE;
use glean_core::research::{
    CorpusProvider, DecisionRule, EvidenceQuality, HeuristicStrategist, OutputFormat,
    ParallelFetcher, Provenance, ProviderClient, Reflection, ResearchOrchestrator, ResearchPlan,
    RoundResult, SourceDeduplicator, Source, StopReason, StoppingEvaluator, Strategist,
    load_corpus, render_session,
};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns the next scripted batch on every call.
struct ScriptedProvider {
    name: String,
    provenance: Provenance,
    batches: Mutex<VecDeque<Vec<Source>>>,
}

impl ScriptedProvider {
    fn new(name: &str, provenance: Provenance, batches: Vec<Vec<Source>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            provenance,
            batches: Mutex::new(batches.into()),
        })
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provenance(&self) -> Provenance {
        self.provenance
    }

    async fn search(
        &self,
        _query: &str,
        _count: usize,
        _timeout: Duration,
    ) -> Result<Vec<Source>, ProviderError> {
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Never answers within any reasonable timeout.
struct StalledProvider {
    name: String,
    provenance: Provenance,
}

#[async_trait]
impl ProviderClient for StalledProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provenance(&self) -> Provenance {
        self.provenance
    }

    async fn search(
        &self,
        _query: &str,
        _count: usize,
        _timeout: Duration,
    ) -> Result<Vec<Source>, ProviderError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(Vec::new())
    }
}

/// Fixed plan and reflection; refinement appends the first gap.
struct FixedStrategist {
    rounds: u32,
    reflection: Reflection,
}

#[async_trait]
impl Strategist for FixedStrategist {
    async fn plan(&self, _query: &str) -> Result<ResearchPlan, StrategistError> {
        Ok(ResearchPlan {
            estimated_rounds: self.rounds,
            strategy_description: "fixed".into(),
            focus_areas: vec!["efficacy".into()],
        })
    }

    async fn reflect(
        &self,
        _question: &str,
        _current: &RoundResult,
        _prior: &[RoundResult],
        _max_rounds: u32,
    ) -> Result<Reflection, StrategistError> {
        Ok(self.reflection.clone())
    }

    async fn refine_query(
        &self,
        original: &str,
        gaps: &[String],
        _next_round: u32,
    ) -> Result<String, StrategistError> {
        Ok(format!("{original} {}", gaps.first().cloned().unwrap_or_default()))
    }
}

fn reflection(quality: EvidenceQuality, gaps: &[&str], hint: bool) -> Reflection {
    Reflection {
        evidence_quality: quality,
        gaps: gaps.iter().map(|g| g.to_string()).collect(),
        should_continue_hint: hint,
        reasoning: "scripted".into(),
    }
}

fn articles(prefix: &str, range: std::ops::Range<usize>) -> Vec<Source> {
    range
        .map(|i| {
            Source::PeerReviewed(ArticleRecord {
                title: format!("Metformin {prefix} study {i}"),
                abstract_text: format!("Outcome {prefix}{i}"),
                doi: Some(format!("10.5555/{prefix}.{i}")),
                ..Default::default()
            })
        })
        .collect()
}

fn single_provider_orchestrator(
    provider: Arc<ScriptedProvider>,
    strategist: FixedStrategist,
) -> ResearchOrchestrator {
    let mut fetcher = ParallelFetcher::new();
    fetcher.register(provider, Duration::from_secs(3), 1.0);
    ResearchOrchestrator::new(Arc::new(strategist), fetcher, &GleanConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_partial_provider_failure_round_completes() {
    let healthy = ScriptedProvider::new(
        "pubmed",
        Provenance::PeerReviewed,
        vec![articles("a", 0..12)],
    );
    let mut fetcher = ParallelFetcher::new();
    fetcher.register(healthy, Duration::from_millis(3000), 1.0);
    for (name, provenance) in [
        ("medrxiv", Provenance::Preprint),
        ("ctgov", Provenance::ClinicalTrial),
        ("web", Provenance::Web),
    ] {
        fetcher.register(
            Arc::new(StalledProvider {
                name: name.into(),
                provenance,
            }),
            Duration::from_millis(3000),
            1.0,
        );
    }

    let outcome = fetcher.fetch_round(1, "metformin", &[12, 5, 5, 5]).await;
    let errors = outcome.errors_by_provider();
    assert_eq!(errors.len(), 3);
    assert!(errors.values().all(|e| e.contains("timed out")));

    let mut dedup = SourceDeduplicator::new();
    let filtered = dedup.filter(outcome.into_sources());
    assert_eq!(filtered.unique.len(), 12);
}

#[tokio::test(start_paused = true)]
async fn test_session_survives_timeouts() {
    let healthy = ScriptedProvider::new(
        "pubmed",
        Provenance::PeerReviewed,
        vec![articles("a", 0..12)],
    );
    let mut fetcher = ParallelFetcher::new();
    fetcher.register(healthy, Duration::from_millis(3000), 0.7);
    for (name, provenance) in [
        ("medrxiv", Provenance::Preprint),
        ("ctgov", Provenance::ClinicalTrial),
        ("web", Provenance::Web),
    ] {
        fetcher.register(
            Arc::new(StalledProvider {
                name: name.into(),
                provenance,
            }),
            Duration::from_millis(3000),
            0.1,
        );
    }
    let strategist = FixedStrategist {
        rounds: 1,
        reflection: reflection(EvidenceQuality::Low, &[], true),
    };
    let result = ResearchOrchestrator::new(Arc::new(strategist), fetcher, &GleanConfig::default())
        .run_session("metformin")
        .await;

    assert_eq!(result.rounds.len(), 1);
    assert_eq!(result.rounds[0].unique_source_count, 12);
    assert_eq!(result.rounds[0].provider_errors.len(), 3);
    assert_eq!(result.total_unique_sources, 12);
    assert_eq!(result.stop_reason, StopReason::MaxRounds);
}

#[tokio::test]
async fn test_cross_round_doi_duplicates_filtered() {
    let mut round_two = articles("b", 0..10);
    // Same DOIs as round 1, written differently.
    round_two.extend((0..5).map(|i| {
        Source::Web(WebRecord {
            title: format!("Coverage of study {i}"),
            url: format!("https://doi.org/10.5555/A.{i}"),
            ..Default::default()
        })
    }));
    let provider = ScriptedProvider::new(
        "mixed",
        Provenance::PeerReviewed,
        vec![articles("a", 0..20), round_two],
    );
    let strategist = FixedStrategist {
        rounds: 2,
        reflection: reflection(EvidenceQuality::Medium, &["dosing"], true),
    };
    let result = single_provider_orchestrator(provider, strategist)
        .run_session("metformin efficacy")
        .await;

    assert_eq!(result.rounds.len(), 2);
    assert_eq!(result.total_unique_sources, 30);
    assert_eq!(result.duplicates_filtered, 5);
    assert_eq!(result.rounds[1].duplicates_filtered, 5);
    assert_eq!(
        result.queries_used,
        vec!["metformin efficacy", "metformin efficacy dosing"]
    );
}

#[test]
fn test_high_quality_comprehensive_stop_trigger() {
    let sources = articles("a", 0..18);
    let previous = vec![RoundResult::new(1, "q", &sources[..10])];
    let current = RoundResult::new(2, "q", &sources[10..]);
    let decision = StoppingEvaluator::default().evaluate(
        2,
        4,
        &current,
        &previous,
        &reflection(EvidenceQuality::High, &[], true),
    );
    assert!(decision.should_stop);
    assert!(
        decision
            .reasons_triggered
            .iter()
            .any(|r| r == REASON_HIGH_QUALITY_COVERAGE)
    );
}

#[tokio::test]
async fn test_session_stops_on_high_quality_coverage() {
    let provider = ScriptedProvider::new(
        "pubmed",
        Provenance::PeerReviewed,
        vec![articles("a", 0..10), articles("b", 0..8), articles("c", 0..8)],
    );
    let strategist = FixedStrategist {
        rounds: 4,
        reflection: reflection(EvidenceQuality::High, &[], false),
    };
    let result = single_provider_orchestrator(provider, strategist)
        .run_session("metformin")
        .await;

    // Round 1 is held open by the coverage floor, round 2 stops.
    assert_eq!(result.rounds.len(), 2);
    let first = result.rounds[0].decision.as_ref().unwrap();
    assert!(!first.should_stop);
    assert!(first.overridden);
    match &result.stop_reason {
        StopReason::EvaluatorStop { reasons } => {
            assert!(reasons.iter().any(|r| r == REASON_HIGH_QUALITY_COVERAGE));
        }
        other => panic!("unexpected stop reason: {other:?}"),
    }
}

#[tokio::test]
async fn test_round_one_override_continues_despite_hint() {
    let provider = ScriptedProvider::new(
        "pubmed",
        Provenance::PeerReviewed,
        vec![articles("a", 0..5), articles("b", 0..5)],
    );
    let strategist = FixedStrategist {
        rounds: 4,
        reflection: reflection(EvidenceQuality::Low, &[], false),
    };
    let result = single_provider_orchestrator(provider, strategist)
        .run_session("metformin")
        .await;

    let first = result.rounds[0].decision.as_ref().unwrap();
    assert!(!first.should_stop);
    assert_eq!(first.rule, DecisionRule::CoverageFloor);
    assert!(result.rounds.len() >= 2);
}

#[tokio::test]
async fn test_empty_selection_is_not_an_error() {
    let provider = ScriptedProvider::new("pubmed", Provenance::PeerReviewed, vec![]);
    let strategist = FixedStrategist {
        rounds: 2,
        reflection: reflection(EvidenceQuality::Low, &[], true),
    };
    let result = single_provider_orchestrator(provider, strategist)
        .run_session("metformin")
        .await;

    assert_eq!(result.total_unique_sources, 0);
    assert!(result.selection.is_empty());
    assert_eq!(result.stop_reason, StopReason::NoNewSources);

    let markdown = render_session(&result, OutputFormat::Markdown).unwrap();
    assert!(markdown.contains("evidence is insufficient"));
}

#[tokio::test]
async fn test_corpus_session_end_to_end() {
    let corpus = vec![
        Source::PeerReviewed(ArticleRecord {
            title: "Metformin and cardiovascular outcomes".into(),
            abstract_text: "A randomized study of metformin in type 2 diabetes.".into(),
            doi: Some("10.1000/cv.1".into()),
            ..Default::default()
        }),
        Source::Preprint(PreprintRecord {
            title: "Metformin and kidney function".into(),
            doi: Some("10.1101/kid.2".into()),
            ..Default::default()
        }),
        Source::ClinicalTrial(TrialRecord {
            title: "Metformin in older adults".into(),
            nct_id: Some("nct00000001".into()),
            ..Default::default()
        }),
        Source::Web(WebRecord {
            title: "Metformin overview".into(),
            url: "https://www.example.org/metformin/".into(),
            ..Default::default()
        }),
        Source::Web(WebRecord {
            title: "Metformin kidney preprint mirror".into(),
            url: "https://doi.org/10.1101/kid.2".into(),
            ..Default::default()
        }),
    ];
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", serde_json::to_string(&corpus).unwrap()).unwrap();
    let loaded = load_corpus(file.path()).unwrap();
    assert_eq!(loaded, corpus);

    let config = GleanConfig::default();
    let clients: Vec<Arc<dyn ProviderClient>> = CorpusProvider::split_by_provenance(loaded)
        .into_iter()
        .map(|p| Arc::new(p) as Arc<dyn ProviderClient>)
        .collect();
    let fetcher = ParallelFetcher::from_config(clients, &config.fetch);
    let result = ResearchOrchestrator::new(Arc::new(HeuristicStrategist::new()), fetcher, &config)
        .run_session("metformin outcomes")
        .await;

    // The mirrored preprint collapses by DOI; later rounds find nothing new.
    assert_eq!(result.total_unique_sources, 4);
    assert_eq!(result.rounds[0].duplicates_filtered, 1);
    assert!(result.selection.selected_count > 0);
    assert!(result.selection.total_token_estimate <= config.selection.token_budget);

    let json = render_session(&result, OutputFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["query"], "metformin outcomes");
    assert_eq!(value["total_unique_sources"], 4);
}
