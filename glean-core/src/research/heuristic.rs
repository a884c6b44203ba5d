//! Model-free strategist for offline runs and tests.
//!
//! Every judgment is a deterministic function of the query and the rounds
//! collected so far, so sessions driven by it are reproducible.

use super::ranking::{extract_keywords, normalize_text};
use super::session::RoundResult;
use super::source::Provenance;
use super::strategist::{
    EvidenceQuality, MAX_FOCUS_AREAS, MAX_ROUNDS, Reflection, ResearchPlan, Strategist,
};
use crate::error::StrategistError;
use async_trait::async_trait;

const COMPARATIVE_MARKERS: &[&str] = &[
    " vs ", " vs. ", " versus ", "compared", "compare", "comparison", "difference", "better than",
    "vergleich", "unterschied", "besser als",
];

/// Query keyword count above which a query counts as broad.
const BROAD_QUERY_KEYWORDS: usize = 6;
/// Cumulative sources for high evidence quality.
const HIGH_QUALITY_SOURCES: usize = 20;
/// Peer-reviewed plus trial sources for high evidence quality.
const HIGH_QUALITY_PRIMARY: usize = 5;
const MEDIUM_QUALITY_SOURCES: usize = 10;
/// Gaps appended to a query per refinement.
const GAPS_PER_REFINEMENT: usize = 2;

const TRIAL_GAP: &str = "clinical trial";
const PEER_REVIEWED_GAP: &str = "peer-reviewed study";

#[derive(Debug, Clone, Default)]
pub struct HeuristicStrategist;

impl HeuristicStrategist {
    pub fn new() -> Self {
        Self
    }

    fn is_comparative(query: &str) -> bool {
        let padded = format!(" {} ", query.to_lowercase());
        COMPARATIVE_MARKERS.iter().any(|m| padded.contains(m))
    }

    fn clause_count(query: &str) -> usize {
        let lowered = format!(" {} ", query.to_lowercase());
        1 + query.matches([',', ';']).count()
            + lowered.matches(" and ").count()
            + lowered.matches(" und ").count()
    }
}

#[async_trait]
impl Strategist for HeuristicStrategist {
    async fn plan(&self, query: &str) -> Result<ResearchPlan, StrategistError> {
        if query.trim().is_empty() {
            return Err(StrategistError::Unavailable {
                message: "empty query".to_string(),
            });
        }

        let keywords = extract_keywords(query);
        let comparative = Self::is_comparative(query);
        let broad = keywords.len() > BROAD_QUERY_KEYWORDS;
        let multi_clause = Self::clause_count(query) >= 3;
        let rounds = 2 + u32::from(comparative) + u32::from(broad || multi_clause);

        let mut traits = Vec::new();
        if comparative {
            traits.push("comparative");
        }
        if broad {
            traits.push("broad");
        }
        if multi_clause {
            traits.push("multi-part");
        }
        let strategy_description = if traits.is_empty() {
            "Focused query: broad first round, then gap filling".to_string()
        } else {
            format!(
                "{} query: broad first round, then targeted gap filling",
                traits.join(", ")
            )
        };

        Ok(ResearchPlan {
            estimated_rounds: rounds.min(MAX_ROUNDS),
            strategy_description,
            focus_areas: keywords.into_iter().take(MAX_FOCUS_AREAS).collect(),
        })
    }

    async fn reflect(
        &self,
        question: &str,
        current: &RoundResult,
        prior: &[RoundResult],
        max_rounds: u32,
    ) -> Result<Reflection, StrategistError> {
        let rounds: Vec<&RoundResult> = prior.iter().chain(std::iter::once(current)).collect();
        let cumulative: usize = rounds.iter().map(|r| r.unique_source_count).sum();
        let count_for = |p: Provenance| rounds.iter().map(|r| r.count_for(p)).sum::<usize>();
        let primary = count_for(Provenance::PeerReviewed) + count_for(Provenance::ClinicalTrial);

        let corpus: String = rounds
            .iter()
            .flat_map(|r| r.sources())
            .map(|s| normalize_text(&format!("{} {} ", s.title(), s.text())))
            .collect();

        let mut gaps: Vec<String> = extract_keywords(question)
            .into_iter()
            .take(MAX_FOCUS_AREAS)
            .filter(|k| !corpus.contains(k.as_str()))
            .collect();
        if count_for(Provenance::PeerReviewed) == 0 {
            gaps.push(PEER_REVIEWED_GAP.to_string());
        }
        if count_for(Provenance::ClinicalTrial) == 0 {
            gaps.push(TRIAL_GAP.to_string());
        }

        let evidence_quality = if cumulative >= HIGH_QUALITY_SOURCES && primary >= HIGH_QUALITY_PRIMARY
        {
            EvidenceQuality::High
        } else if cumulative >= MEDIUM_QUALITY_SOURCES {
            EvidenceQuality::Medium
        } else {
            EvidenceQuality::Low
        };

        let rounds_remain = current.round_number < max_rounds;
        let should_continue_hint =
            rounds_remain && (evidence_quality != EvidenceQuality::High || !gaps.is_empty());

        let provenance_types = Provenance::ALL
            .into_iter()
            .filter(|p| count_for(*p) > 0)
            .count();
        let reasoning = format!(
            "{cumulative} unique sources ({primary} peer-reviewed or trial) across {provenance_types} provenance types; {} open gaps",
            gaps.len()
        );

        Ok(Reflection {
            evidence_quality,
            gaps,
            should_continue_hint,
            reasoning,
        })
    }

    async fn refine_query(
        &self,
        original: &str,
        gaps: &[String],
        _next_round: u32,
    ) -> Result<String, StrategistError> {
        let lowered = original.to_lowercase();
        let additions: Vec<&str> = gaps
            .iter()
            .map(|g| g.trim())
            .filter(|g| !g.is_empty() && !lowered.contains(&g.to_lowercase()))
            .take(GAPS_PER_REFINEMENT)
            .collect();
        if additions.is_empty() {
            return Ok(original.to_string());
        }
        Ok(format!("{} {}", original.trim(), additions.join(" ")))
    }
}
