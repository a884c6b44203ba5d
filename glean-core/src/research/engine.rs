//! Research orchestrator: the multi-round session state machine.
//!
//! Planning, then per round: fetch, deduplicate, reflect (skipped on the
//! final round), decide, refine. After the loop every unique source is
//! ranked and a budgeted subset is selected. Nothing inside a session is
//! fatal; every strategist or provider failure degrades to a fallback.

use super::dedup::SourceDeduplicator;
use super::fetcher::ParallelFetcher;
use super::progress::{ProgressSink, ResearchEvent};
use super::ranking::RelevanceRanker;
use super::selection::SourceSelector;
use super::session::{
    DecisionRule, PhaseTransition, ResearchPhase, RoundDecision, RoundResult, SessionResult,
    StopReason,
};
use super::source::Source;
use super::stopping::{REASON_MAX_ROUNDS, StoppingDecision, StoppingEvaluator};
use super::strategist::{MAX_ROUNDS, Reflection, ResearchPlan, Strategist};
use crate::config::{GleanConfig, ResearchConfig};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Combine the evaluator's verdict with the session safety rules.
///
/// Rules apply in order: hard stop at the round ceiling, hard stop on an
/// empty round, forced continue below the round-1 coverage floor, forced
/// continue below the absolute floor, otherwise the evaluator's verdict.
pub fn apply_safety_overrides(
    round_number: u32,
    max_rounds: u32,
    round_unique: usize,
    cumulative: usize,
    base: &StoppingDecision,
    config: &ResearchConfig,
) -> RoundDecision {
    let rounds_remain = round_number < max_rounds;
    let (should_stop, rule) = if round_number >= max_rounds {
        (true, DecisionRule::MaxRoundsReached)
    } else if round_unique == 0 {
        (true, DecisionRule::NoNewSources)
    } else if round_number == 1 && cumulative < config.coverage_floor && rounds_remain {
        (false, DecisionRule::CoverageFloor)
    } else if cumulative < config.absolute_floor && rounds_remain {
        (false, DecisionRule::AbsoluteFloor)
    } else {
        (base.should_stop, DecisionRule::Evaluator)
    };

    RoundDecision {
        should_stop,
        reasons: base.reasons_triggered.clone(),
        rule,
        overridden: should_stop != base.should_stop,
    }
}

struct PhaseTracker<'a> {
    progress: &'a ProgressSink,
    history: Vec<PhaseTransition>,
}

impl<'a> PhaseTracker<'a> {
    fn new(progress: &'a ProgressSink) -> Self {
        Self {
            progress,
            history: Vec::new(),
        }
    }

    fn enter(&mut self, phase: ResearchPhase, round: Option<u32>) {
        debug!(phase = %phase, round = ?round, "Research phase transition");
        self.history.push(PhaseTransition { phase, round });
        self.progress.emit(ResearchEvent::PhaseChanged { phase, round });
    }
}

/// Drives research sessions over a strategist and a set of providers.
pub struct ResearchOrchestrator {
    strategist: Arc<dyn Strategist>,
    fetcher: ParallelFetcher,
    config: ResearchConfig,
    evaluator: StoppingEvaluator,
    ranker: RelevanceRanker,
    selector: SourceSelector,
    progress: ProgressSink,
}

impl ResearchOrchestrator {
    pub fn new(
        strategist: Arc<dyn Strategist>,
        fetcher: ParallelFetcher,
        config: &GleanConfig,
    ) -> Self {
        Self {
            strategist,
            fetcher,
            config: config.research.clone(),
            evaluator: StoppingEvaluator::new(config.stopping.clone()),
            ranker: RelevanceRanker::new(),
            selector: SourceSelector::new(config.selection.clone()),
            progress: ProgressSink::disabled(),
        }
    }

    /// Publish progress events to `progress`, including per-provider events.
    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.fetcher.set_progress(progress.clone());
        self.progress = progress;
        self
    }

    /// Replace the ranker, e.g. to pin the recency reference year.
    pub fn with_ranker(mut self, ranker: RelevanceRanker) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn progress(&self) -> &ProgressSink {
        &self.progress
    }

    /// Run one full session for `query`. Always returns a result.
    pub async fn run_session(&self, query: &str) -> SessionResult {
        let started = Instant::now();
        let session_id = Uuid::new_v4();
        let mut phases = PhaseTracker::new(&self.progress);

        info!(%session_id, query, "Starting research session");
        self.progress.emit(ResearchEvent::SessionStarted {
            session_id,
            query: query.to_string(),
        });

        phases.enter(ResearchPhase::Planning, None);
        let (plan, plan_fallback) = match self.strategist.plan(query).await {
            Ok(plan) => (plan.clamped(), false),
            Err(e) => {
                warn!(error = %e, "Plan unavailable, using default plan");
                (ResearchPlan::fallback(), true)
            }
        };
        let ceiling = self.config.max_rounds_ceiling.clamp(1, MAX_ROUNDS);
        let max_rounds = plan.estimated_rounds.clamp(1, ceiling);
        info!(
            estimated_rounds = plan.estimated_rounds,
            max_rounds,
            focus_areas = plan.focus_areas.len(),
            fallback = plan_fallback,
            "Research plan ready"
        );
        self.progress.emit(ResearchEvent::PlanReady {
            estimated_rounds: plan.estimated_rounds,
            focus_areas: plan.focus_areas.clone(),
            fallback: plan_fallback,
        });

        let mut dedup = SourceDeduplicator::new();
        let mut rounds: Vec<RoundResult> = Vec::new();
        let mut all_sources: Vec<Source> = Vec::new();
        let mut current_query = query.to_string();
        let mut stop_reason = StopReason::MaxRounds;

        for round_number in 1..=max_rounds {
            let round_started = Instant::now();
            let target = if round_number == 1 {
                self.config.initial_round_target
            } else {
                self.config.followup_round_target
            };

            phases.enter(ResearchPhase::Fetching, Some(round_number));
            self.progress.emit(ResearchEvent::RoundStarted {
                round: round_number,
                query: current_query.clone(),
                target,
            });
            let outcome = self
                .fetcher
                .fetch_target(round_number, &current_query, target)
                .await;
            let fetched_count = outcome.total_sources();
            let provider_errors = outcome.errors_by_provider();
            let provider_timings_ms = outcome.timings_by_provider();

            phases.enter(ResearchPhase::Deduplicating, Some(round_number));
            let filtered = dedup.filter(outcome.into_sources());
            let mut round = RoundResult::new(round_number, current_query.clone(), &filtered.unique);
            round.fetched_count = fetched_count;
            round.duplicates_filtered = filtered.duplicate_count;
            round.provider_errors = provider_errors;
            round.provider_timings_ms = provider_timings_ms;
            all_sources.extend(filtered.unique);
            let cumulative = all_sources.len();

            info!(
                round = round_number,
                unique = round.unique_source_count,
                duplicates = round.duplicates_filtered,
                errors = round.provider_errors.len(),
                cumulative,
                "Round fetched"
            );
            self.progress.emit(ResearchEvent::RoundCompleted {
                round: round_number,
                unique_sources: round.unique_source_count,
                duplicates: round.duplicates_filtered,
                duration_ms: round_started.elapsed().as_millis() as u64,
            });

            let decision = if round_number >= max_rounds {
                phases.enter(ResearchPhase::Deciding, Some(round_number));
                let base = StoppingDecision {
                    should_stop: true,
                    reasons_triggered: vec![format!(
                        "{REASON_MAX_ROUNDS} ({round_number}/{max_rounds})"
                    )],
                };
                apply_safety_overrides(
                    round_number,
                    max_rounds,
                    round.unique_source_count,
                    cumulative,
                    &base,
                    &self.config,
                )
            } else {
                phases.enter(ResearchPhase::Reflecting, Some(round_number));
                let (reflection, fallback) = match self
                    .strategist
                    .reflect(query, &round, &rounds, max_rounds)
                    .await
                {
                    Ok(reflection) => (reflection, false),
                    Err(e) => {
                        warn!(round = round_number, error = %e, "Reflection unavailable, using fallback");
                        (
                            Reflection::fallback(true, cumulative, self.config.absolute_floor),
                            true,
                        )
                    }
                };
                self.progress.emit(ResearchEvent::ReflectionReady {
                    round: round_number,
                    evidence_quality: reflection.evidence_quality,
                    gaps: reflection.gaps.len(),
                    fallback,
                });

                phases.enter(ResearchPhase::Deciding, Some(round_number));
                let base = self.evaluator.evaluate(
                    round_number,
                    max_rounds,
                    &round,
                    &rounds,
                    &reflection,
                );
                round.reflection = Some(reflection);
                apply_safety_overrides(
                    round_number,
                    max_rounds,
                    round.unique_source_count,
                    cumulative,
                    &base,
                    &self.config,
                )
            };

            if decision.overridden {
                info!(
                    round = round_number,
                    rule = ?decision.rule,
                    reasons = ?decision.reasons,
                    "Safety override forced continuation"
                );
            } else {
                info!(
                    round = round_number,
                    should_stop = decision.should_stop,
                    rule = ?decision.rule,
                    reasons = ?decision.reasons,
                    "Round decision"
                );
            }
            self.progress.emit(ResearchEvent::DecisionMade {
                round: round_number,
                should_stop: decision.should_stop,
                reasons: decision.reasons.clone(),
            });

            let gaps = round
                .reflection
                .as_ref()
                .map(|r| r.gaps.clone())
                .unwrap_or_default();
            let should_stop = decision.should_stop;
            if should_stop {
                stop_reason = decision.stop_reason();
            }
            round.decision = Some(decision);
            round.duration_ms = round_started.elapsed().as_millis() as u64;
            rounds.push(round);

            if should_stop {
                break;
            }

            phases.enter(ResearchPhase::Refining, Some(round_number));
            let next_round = round_number + 1;
            if gaps.is_empty() {
                debug!(next_round, "No gaps identified, reusing query");
                continue;
            }
            match self.strategist.refine_query(query, &gaps, next_round).await {
                Ok(refined) if !refined.trim().is_empty() => {
                    current_query = refined.trim().to_string();
                    info!(next_round, query = %current_query, "Query refined");
                    self.progress.emit(ResearchEvent::QueryRefined {
                        next_round,
                        query: current_query.clone(),
                    });
                }
                Ok(_) => {
                    warn!(next_round, "Refined query was empty, reusing previous query");
                }
                Err(e) => {
                    warn!(next_round, error = %e, "Query refinement failed, reusing previous query");
                }
            }
        }

        phases.enter(ResearchPhase::Ranking, None);
        let ranking = self.ranker.rank(query, &all_sources);

        phases.enter(ResearchPhase::Selecting, None);
        let selection = self.selector.select(&ranking.ranked);

        phases.enter(ResearchPhase::Complete, None);
        let total_duration_ms = started.elapsed().as_millis() as u64;
        info!(
            %session_id,
            rounds = rounds.len(),
            unique = all_sources.len(),
            duplicates = dedup.duplicates_filtered(),
            selected = selection.selected_count,
            strategy = selection.selection_strategy.as_str(),
            duration_ms = total_duration_ms,
            "Research session complete"
        );
        self.progress.emit(ResearchEvent::SessionCompleted {
            rounds: rounds.len(),
            total_unique_sources: all_sources.len(),
            selected: selection.selected_count,
            duration_ms: total_duration_ms,
        });

        SessionResult {
            session_id,
            query: query.to_string(),
            plan,
            plan_fallback,
            max_rounds,
            queries_used: rounds.iter().map(|r| r.query.clone()).collect(),
            rounds,
            total_unique_sources: all_sources.len(),
            duplicates_filtered: dedup.duplicates_filtered(),
            total_duration_ms,
            stop_reason,
            phases: phases.history,
            ranking,
            selection,
        }
    }
}
