//! Multi-criteria stopping evaluator.
//!
//! A pure function of round statistics and the strategist's reflection.
//! Every rule is evaluated and every triggered rule is reported; the
//! session should stop when at least one fired. Safety overrides are applied
//! afterwards by the orchestrator, not here.

use super::session::RoundResult;
use super::strategist::{EvidenceQuality, Reflection};
use serde::{Deserialize, Serialize};

pub const REASON_MAX_ROUNDS: &str = "Maximum rounds reached";
pub const REASON_HIGH_QUALITY_COVERAGE: &str = "High evidence quality with comprehensive coverage";
pub const REASON_NO_NEW_SOURCES: &str = "No new unique sources found in this round";
pub const REASON_STRATEGIST_DONE: &str = "Strategist indicated research is sufficient";
pub const REASON_COMPREHENSIVE: &str = "Comprehensive source threshold reached";
pub const REASON_HIGH_QUALITY_FEW_GAPS: &str = "High evidence quality with minimal gaps";
pub const REASON_DIMINISHING_RETURNS: &str = "Diminishing returns across recent rounds";

/// Maximum open gaps for the minimal-gaps rule.
const MINIMAL_GAPS: usize = 1;

/// Tunable thresholds for the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoppingConfig {
    /// Cumulative unique sources that count as comprehensive coverage.
    pub comprehensive_threshold: usize,
    /// Minimum combined yield of the last two rounds before diminishing
    /// returns stop the session.
    pub min_recent_yield: usize,
}

impl Default for StoppingConfig {
    fn default() -> Self {
        Self {
            comprehensive_threshold: 30,
            min_recent_yield: 3,
        }
    }
}

/// Evaluator verdict: stop if any rule triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoppingDecision {
    pub should_stop: bool,
    pub reasons_triggered: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StoppingEvaluator {
    config: StoppingConfig,
}

impl StoppingEvaluator {
    pub fn new(config: StoppingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoppingConfig {
        &self.config
    }

    /// Evaluate all stopping rules for `current`.
    ///
    /// `previous` holds the rounds completed before `current`, oldest first.
    pub fn evaluate(
        &self,
        round_number: u32,
        max_rounds: u32,
        current: &RoundResult,
        previous: &[RoundResult],
        reflection: &Reflection,
    ) -> StoppingDecision {
        let cumulative: usize = previous
            .iter()
            .map(|r| r.unique_source_count)
            .sum::<usize>()
            + current.unique_source_count;
        let high_quality = reflection.evidence_quality == EvidenceQuality::High;
        let mut reasons = Vec::new();

        if round_number >= max_rounds {
            reasons.push(format!("{REASON_MAX_ROUNDS} ({round_number}/{max_rounds})"));
        }

        if high_quality && reflection.gaps.is_empty() {
            reasons.push(REASON_HIGH_QUALITY_COVERAGE.to_string());
        }

        if current.unique_source_count == 0 {
            reasons.push(REASON_NO_NEW_SOURCES.to_string());
        }

        if !reflection.should_continue_hint {
            reasons.push(REASON_STRATEGIST_DONE.to_string());
        }

        if cumulative >= self.config.comprehensive_threshold {
            reasons.push(format!(
                "{REASON_COMPREHENSIVE} ({cumulative} >= {})",
                self.config.comprehensive_threshold
            ));
        }

        if high_quality && reflection.gaps.len() <= MINIMAL_GAPS {
            reasons.push(REASON_HIGH_QUALITY_FEW_GAPS.to_string());
        }

        if let Some(last) = previous.last() {
            let recent = last.unique_source_count + current.unique_source_count;
            if recent < self.config.min_recent_yield {
                reasons.push(format!(
                    "{REASON_DIMINISHING_RETURNS} ({recent} new in last two rounds)"
                ));
            }
        }

        StoppingDecision {
            should_stop: !reasons.is_empty(),
            reasons_triggered: reasons,
        }
    }
}
