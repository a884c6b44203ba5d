//! Research session state: phases, per-round results, and the final result.
//!
//! Round results are immutable once appended to a session. A session's
//! results are owned by the caller after [`SessionResult`] is returned;
//! nothing is persisted.

use super::ranking::RankingResult;
use super::selection::SelectionResult;
use super::source::{Provenance, Source};
use super::strategist::{Reflection, ResearchPlan};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Current phase of a research session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    /// Asking the strategist for a plan.
    Planning,
    /// Running the parallel provider fetch for a round.
    Fetching,
    /// Filtering the round's sources against the session's seen set.
    Deduplicating,
    /// Asking the strategist to assess the round.
    Reflecting,
    /// Combining the stopping evaluator with safety overrides.
    Deciding,
    /// Rewriting the query for the next round.
    Refining,
    /// Scoring every unique source collected.
    Ranking,
    /// Budgeted selection for synthesis.
    Selecting,
    /// Session finished.
    Complete,
}

impl ResearchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResearchPhase::Complete)
    }

    /// Whether this phase belongs to a specific round.
    pub fn is_round_phase(&self) -> bool {
        matches!(
            self,
            ResearchPhase::Fetching
                | ResearchPhase::Deduplicating
                | ResearchPhase::Reflecting
                | ResearchPhase::Deciding
                | ResearchPhase::Refining
        )
    }
}

impl fmt::Display for ResearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResearchPhase::Planning => "planning",
            ResearchPhase::Fetching => "fetching",
            ResearchPhase::Deduplicating => "deduplicating",
            ResearchPhase::Reflecting => "reflecting",
            ResearchPhase::Deciding => "deciding",
            ResearchPhase::Refining => "refining",
            ResearchPhase::Ranking => "ranking",
            ResearchPhase::Selecting => "selecting",
            ResearchPhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// One entry in a session's phase history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub phase: ResearchPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
}

/// Which rule settled a round's continue/stop decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    /// Hard stop: the round ceiling was reached.
    MaxRoundsReached,
    /// Hard stop: the round produced no new unique sources.
    NoNewSources,
    /// Forced continue: round 1 ended below the coverage floor.
    CoverageFloor,
    /// Forced continue: cumulative sources below the absolute floor.
    AbsoluteFloor,
    /// The stopping evaluator's verdict was used as-is.
    Evaluator,
}

/// Final decision for a round after safety overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundDecision {
    pub should_stop: bool,
    /// Stopping conditions the evaluator triggered, in evaluation order.
    pub reasons: Vec<String>,
    pub rule: DecisionRule,
    /// True when a safety override flipped the evaluator's verdict.
    pub overridden: bool,
}

impl RoundDecision {
    pub fn stop_reason(&self) -> StopReason {
        match self.rule {
            DecisionRule::MaxRoundsReached => StopReason::MaxRounds,
            DecisionRule::NoNewSources => StopReason::NoNewSources,
            _ => StopReason::EvaluatorStop {
                reasons: self.reasons.clone(),
            },
        }
    }
}

/// Why a session stopped iterating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Round ceiling reached; the normal terminal state.
    MaxRounds,
    /// A round added nothing new.
    NoNewSources,
    /// The stopping evaluator judged the evidence sufficient.
    EvaluatorStop { reasons: Vec<String> },
}

/// Statistics and sources for one completed round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    pub round_number: u32,
    /// Query the round was fetched with.
    pub query: String,
    /// Unique (post-dedup) sources grouped by provenance.
    pub sources_by_provenance: BTreeMap<Provenance, Vec<Source>>,
    pub unique_source_count: usize,
    /// Sources returned by providers before deduplication.
    pub fetched_count: usize,
    pub duplicates_filtered: usize,
    pub provider_errors: BTreeMap<String, String>,
    pub provider_timings_ms: BTreeMap<String, u64>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<Reflection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<RoundDecision>,
}

impl RoundResult {
    /// Build a round result from the round's unique sources in fetch order.
    pub fn new(round_number: u32, query: impl Into<String>, unique: &[Source]) -> Self {
        let mut sources_by_provenance: BTreeMap<Provenance, Vec<Source>> = BTreeMap::new();
        for source in unique {
            sources_by_provenance
                .entry(source.provenance())
                .or_default()
                .push(source.clone());
        }
        Self {
            round_number,
            query: query.into(),
            sources_by_provenance,
            unique_source_count: unique.len(),
            fetched_count: unique.len(),
            duplicates_filtered: 0,
            provider_errors: BTreeMap::new(),
            provider_timings_ms: BTreeMap::new(),
            duration_ms: 0,
            reflection: None,
            decision: None,
        }
    }

    /// Iterate the round's unique sources.
    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources_by_provenance.values().flatten()
    }

    pub fn count_for(&self, provenance: Provenance) -> usize {
        self.sources_by_provenance
            .get(&provenance)
            .map_or(0, Vec::len)
    }
}

/// Everything a research session produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub query: String,
    pub plan: ResearchPlan,
    /// True when the strategist's plan was unusable and the default was used.
    pub plan_fallback: bool,
    pub max_rounds: u32,
    /// Query used by each round, in order.
    pub queries_used: Vec<String>,
    pub rounds: Vec<RoundResult>,
    pub total_unique_sources: usize,
    pub duplicates_filtered: usize,
    pub total_duration_ms: u64,
    pub stop_reason: StopReason,
    pub phases: Vec<PhaseTransition>,
    pub ranking: RankingResult,
    pub selection: SelectionResult,
}

impl SessionResult {
    pub fn provider_error_count(&self) -> usize {
        self.rounds.iter().map(|r| r.provider_errors.len()).sum()
    }
}
