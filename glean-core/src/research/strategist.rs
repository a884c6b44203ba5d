//! Strategist contract: planning, reflection, and query refinement.
//!
//! The strategist supplies judgment calls (usually LLM-backed) as a
//! stateless service. This module defines the trait, the value types that
//! cross it, the parsers that turn raw model text into those values, and
//! the conservative fallbacks the orchestrator substitutes when a call fails.

use super::session::RoundResult;
use crate::error::StrategistError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hard ceiling on rounds per session.
pub const MAX_ROUNDS: u32 = 4;

/// Maximum number of focus areas kept from a plan.
pub const MAX_FOCUS_AREAS: usize = 5;

/// Research plan produced once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPlan {
    /// Planned number of rounds, in `[1, MAX_ROUNDS]`.
    pub estimated_rounds: u32,
    pub strategy_description: String,
    /// At most `MAX_FOCUS_AREAS` entries.
    pub focus_areas: Vec<String>,
}

impl ResearchPlan {
    /// Default plan used when the strategist cannot produce one.
    pub fn fallback() -> Self {
        Self {
            estimated_rounds: 2,
            strategy_description:
                "Default strategy: broad first round, then one gap-filling round".to_string(),
            focus_areas: Vec::new(),
        }
    }

    /// Clamp rounds to `[1, MAX_ROUNDS]` and keep at most `MAX_FOCUS_AREAS`
    /// non-empty focus areas.
    pub fn clamped(mut self) -> Self {
        self.estimated_rounds = self.estimated_rounds.clamp(1, MAX_ROUNDS);
        self.focus_areas = self
            .focus_areas
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .take(MAX_FOCUS_AREAS)
            .collect();
        self
    }
}

/// Coarse evidence quality assigned by the strategist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceQuality {
    Low,
    Medium,
    High,
}

impl fmt::Display for EvidenceQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidenceQuality::Low => f.write_str("low"),
            EvidenceQuality::Medium => f.write_str("medium"),
            EvidenceQuality::High => f.write_str("high"),
        }
    }
}

impl FromStr for EvidenceQuality {
    type Err = StrategistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "weak" => Ok(EvidenceQuality::Low),
            "medium" | "moderate" => Ok(EvidenceQuality::Medium),
            "high" | "strong" => Ok(EvidenceQuality::High),
            other => Err(StrategistError::ResponseParse {
                message: format!("unknown evidence quality '{other}'"),
            }),
        }
    }
}

/// Strategist's assessment of the evidence gathered so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub evidence_quality: EvidenceQuality,
    pub gaps: Vec<String>,
    pub should_continue_hint: bool,
    pub reasoning: String,
}

impl Reflection {
    /// Conservative reflection used when the strategist's response is
    /// unusable: medium quality, continue only while rounds remain and the
    /// cumulative source count is below `absolute_floor`.
    pub fn fallback(rounds_remain: bool, cumulative_sources: usize, absolute_floor: usize) -> Self {
        Self {
            evidence_quality: EvidenceQuality::Medium,
            gaps: Vec::new(),
            should_continue_hint: rounds_remain && cumulative_sources < absolute_floor,
            reasoning: "Reflection unavailable; using conservative default".to_string(),
        }
    }
}

/// External collaborator supplying planning, reflection, and refinement.
///
/// Implementations are stateless from the engine's point of view: each call
/// is a pure `(input) -> decision` request. Errors are never fatal; the
/// orchestrator substitutes a fallback for every failed call.
#[async_trait]
pub trait Strategist: Send + Sync {
    /// Produce a research plan for the query.
    async fn plan(&self, query: &str) -> Result<ResearchPlan, StrategistError>;

    /// Assess the current round against everything gathered before it.
    async fn reflect(
        &self,
        question: &str,
        current: &RoundResult,
        prior: &[RoundResult],
        max_rounds: u32,
    ) -> Result<Reflection, StrategistError>;

    /// Rewrite the original query to target the identified gaps.
    async fn refine_query(
        &self,
        original: &str,
        gaps: &[String],
        next_round: u32,
    ) -> Result<String, StrategistError>;
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(alias = "estimatedRounds", alias = "rounds")]
    estimated_rounds: i64,
    #[serde(default, alias = "strategyDescription", alias = "strategy")]
    strategy_description: String,
    #[serde(default, alias = "focusAreas")]
    focus_areas: Vec<String>,
}

#[derive(Deserialize)]
struct RawReflection {
    #[serde(alias = "evidenceQuality", alias = "quality")]
    evidence_quality: String,
    #[serde(default)]
    gaps: Vec<String>,
    #[serde(
        alias = "shouldContinue",
        alias = "shouldContinueHint",
        alias = "should_continue"
    )]
    should_continue_hint: bool,
    #[serde(default)]
    reasoning: String,
}

#[derive(Deserialize)]
struct RawRefinement {
    #[serde(alias = "refinedQuery", alias = "refined_query")]
    query: String,
}

/// Parse a plan from raw model text (optionally fenced JSON).
pub fn parse_plan(text: &str) -> Result<ResearchPlan, StrategistError> {
    let raw: RawPlan = parse_json_object(text)?;
    let rounds = raw.estimated_rounds.clamp(1, MAX_ROUNDS as i64) as u32;
    Ok(ResearchPlan {
        estimated_rounds: rounds,
        strategy_description: raw.strategy_description.trim().to_string(),
        focus_areas: raw.focus_areas,
    }
    .clamped())
}

/// Parse a reflection from raw model text (optionally fenced JSON).
pub fn parse_reflection(text: &str) -> Result<Reflection, StrategistError> {
    let raw: RawReflection = parse_json_object(text)?;
    let evidence_quality = raw.evidence_quality.parse()?;
    Ok(Reflection {
        evidence_quality,
        gaps: raw
            .gaps
            .into_iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect(),
        should_continue_hint: raw.should_continue_hint,
        reasoning: raw.reasoning.trim().to_string(),
    })
}

/// Parse a refined query from raw model text.
///
/// Accepts a JSON object with a `query`/`refinedQuery` field, or plain text
/// whose first non-empty line is the query.
pub fn parse_refined_query(text: &str) -> Result<String, StrategistError> {
    let query = match parse_json_object::<RawRefinement>(text) {
        Ok(raw) => raw.query,
        Err(_) => strip_code_fences(text)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string(),
    };
    let query = query.trim().trim_matches('"').trim().to_string();
    if query.is_empty() {
        return Err(StrategistError::ResponseParse {
            message: "refined query is empty".to_string(),
        });
    }
    Ok(query)
}

fn parse_json_object<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, StrategistError> {
    let body = strip_code_fences(text);
    let start = body.find('{');
    let end = body.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &body[s..=e],
        _ => {
            return Err(StrategistError::ResponseParse {
                message: "no JSON object found in response".to_string(),
            });
        }
    };
    serde_json::from_str(json).map_err(|e| StrategistError::ResponseParse {
        message: e.to_string(),
    })
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, e.g. ```json
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
