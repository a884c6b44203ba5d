//! Multi-round evidence research engine.
//!
//! A session runs up to four rounds of:
//! 1. **Fetch**: query every provider concurrently under per-provider timeouts
//! 2. **Deduplicate**: drop sources already seen by DOI, provider ID, or URL
//! 3. **Reflect**: ask the strategist for quality and gaps (not on the final round)
//! 4. **Decide**: stopping rules plus safety overrides
//! 5. **Refine**: rewrite the query toward the identified gaps
//!
//! Afterwards every unique source is ranked and a token-budgeted subset is
//! selected for a downstream synthesizer.

pub mod corpus;
pub mod dedup;
pub mod engine;
pub mod fetcher;
pub mod heuristic;
pub mod output;
pub mod progress;
pub mod ranking;
pub mod selection;
pub mod session;
pub mod source;
pub mod stopping;
pub mod strategist;

pub use corpus::{CorpusProvider, load_corpus};
pub use dedup::{DedupOutcome, SourceDeduplicator};
pub use engine::{ResearchOrchestrator, apply_safety_overrides};
pub use fetcher::{FetchOutcome, ParallelFetcher, ProviderClient, ProviderFetch};
pub use heuristic::HeuristicStrategist;
pub use output::{OutputFormat, render_session};
pub use progress::{ProgressSink, ResearchEvent};
pub use ranking::{RankedSource, RankingResult, RelevanceRanker, ScoreBreakdown};
pub use selection::{SelectionOptions, SelectionResult, SelectionStrategy, SourceSelector};
pub use session::{
    DecisionRule, PhaseTransition, ResearchPhase, RoundDecision, RoundResult, SessionResult,
    StopReason,
};
pub use source::{Provenance, Source, SourceIdentifier};
pub use stopping::{StoppingConfig, StoppingDecision, StoppingEvaluator};
pub use strategist::{EvidenceQuality, Reflection, ResearchPlan, Strategist};
