//! Budget-constrained source selection for synthesis.
//!
//! Pipeline: relevance floor, base limit (extended when enough high-quality
//! sources exist), near-duplicate collapse, then a greedy token budget.
//! An empty selection is a valid result, not an error.

use super::ranking::{RankedSource, extract_keywords};
use super::source::Source;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Characters per estimated token.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionOptions {
    pub base_limit: usize,
    /// Ceiling when the high-quality pool exceeds `base_limit`.
    pub extended_limit: usize,
    pub high_quality_threshold: u32,
    pub token_budget: usize,
    pub min_relevance_score: u32,
    /// Similarity at or above which two sources count as near-duplicates.
    pub semantic_similarity_threshold: f64,
    pub enable_semantic_dedup: bool,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            base_limit: 15,
            extended_limit: 25,
            high_quality_threshold: 70,
            token_budget: 12_000,
            min_relevance_score: 30,
            semantic_similarity_threshold: 0.85,
            enable_semantic_dedup: true,
        }
    }
}

/// Which rule determined the final selection boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionStrategy {
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "extended-high-quality")]
    ExtendedHighQuality,
    #[serde(rename = "token-constrained")]
    TokenConstrained,
    #[serde(rename = "none")]
    None,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::Base => "base",
            SelectionStrategy::ExtendedHighQuality => "extended-high-quality",
            SelectionStrategy::TokenConstrained => "token-constrained",
            SelectionStrategy::None => "none",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub average_relevance: f64,
    pub min_relevance: u32,
    pub max_relevance: u32,
    pub high_quality_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedSource {
    #[serde(flatten)]
    pub ranked: RankedSource,
    pub estimated_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Selected sources, best first.
    pub selected_sources: Vec<SelectedSource>,
    pub selected_count: usize,
    /// Sources dropped as near-duplicates.
    pub deduplicated_count: usize,
    /// Sources dropped by the relevance floor.
    pub below_floor_count: usize,
    pub total_token_estimate: usize,
    pub selection_strategy: SelectionStrategy,
    pub quality_metrics: QualityMetrics,
}

impl SelectionResult {
    pub fn empty() -> Self {
        Self {
            selected_sources: Vec::new(),
            selected_count: 0,
            deduplicated_count: 0,
            below_floor_count: 0,
            total_token_estimate: 0,
            selection_strategy: SelectionStrategy::None,
            quality_metrics: QualityMetrics::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selected_sources.is_empty()
    }
}

impl Default for SelectionResult {
    fn default() -> Self {
        Self::empty()
    }
}

/// Token cost of a source: one token per four characters of title and text,
/// rounded up.
pub fn estimate_tokens(source: &Source) -> usize {
    let chars = source.title().chars().count() + source.text().chars().count();
    chars.div_ceil(CHARS_PER_TOKEN)
}

fn keyword_set(source: &Source) -> HashSet<String> {
    extract_keywords(&format!("{} {}", source.title(), source.text()))
        .into_iter()
        .collect()
}

/// Jaccard similarity of two keyword sets. Two empty sets are unrelated.
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Keyword-set similarity of two sources' title and text.
pub fn text_similarity(a: &Source, b: &Source) -> f64 {
    jaccard_similarity(&keyword_set(a), &keyword_set(b))
}

#[derive(Debug, Clone, Default)]
pub struct SourceSelector {
    options: SelectionOptions,
}

impl SourceSelector {
    pub fn new(options: SelectionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SelectionOptions {
        &self.options
    }

    /// Select a budgeted subset of `ranked`.
    ///
    /// Input order does not matter; sources are considered by descending
    /// score with ties in input order.
    pub fn select(&self, ranked: &[RankedSource]) -> SelectionResult {
        let opts = &self.options;

        let mut candidates: Vec<&RankedSource> = ranked
            .iter()
            .filter(|r| r.relevance_score >= opts.min_relevance_score)
            .collect();
        let below_floor_count = ranked.len() - candidates.len();
        if candidates.is_empty() {
            debug!(considered = ranked.len(), "No sources above relevance floor");
            return SelectionResult {
                below_floor_count,
                ..SelectionResult::empty()
            };
        }
        candidates.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));

        let high_quality = candidates
            .iter()
            .filter(|r| r.relevance_score >= opts.high_quality_threshold)
            .count();
        let (limit, mut strategy) = if high_quality > opts.base_limit {
            (
                high_quality.min(opts.extended_limit).max(opts.base_limit),
                SelectionStrategy::ExtendedHighQuality,
            )
        } else {
            (opts.base_limit, SelectionStrategy::Base)
        };
        candidates.truncate(limit);

        let mut deduplicated_count = 0;
        if opts.enable_semantic_dedup {
            let mut kept: Vec<(&RankedSource, HashSet<String>)> = Vec::new();
            for candidate in candidates {
                let keywords = keyword_set(&candidate.source);
                let duplicate = kept.iter().any(|(_, other)| {
                    jaccard_similarity(&keywords, other) >= opts.semantic_similarity_threshold
                });
                if duplicate {
                    deduplicated_count += 1;
                } else {
                    kept.push((candidate, keywords));
                }
            }
            candidates = kept.into_iter().map(|(r, _)| r).collect();
        }

        let mut selected_sources = Vec::with_capacity(candidates.len());
        let mut total_token_estimate = 0;
        for candidate in candidates {
            let estimated_tokens = estimate_tokens(&candidate.source);
            if total_token_estimate + estimated_tokens > opts.token_budget {
                strategy = SelectionStrategy::TokenConstrained;
                break;
            }
            total_token_estimate += estimated_tokens;
            selected_sources.push(SelectedSource {
                ranked: candidate.clone(),
                estimated_tokens,
            });
        }

        let quality_metrics = quality_metrics(&selected_sources, opts.high_quality_threshold);

        debug!(
            selected = selected_sources.len(),
            deduplicated = deduplicated_count,
            below_floor = below_floor_count,
            tokens = total_token_estimate,
            strategy = strategy.as_str(),
            "Source selection complete"
        );

        SelectionResult {
            selected_count: selected_sources.len(),
            selected_sources,
            deduplicated_count,
            below_floor_count,
            total_token_estimate,
            selection_strategy: strategy,
            quality_metrics,
        }
    }
}

fn quality_metrics(selected: &[SelectedSource], high_quality_threshold: u32) -> QualityMetrics {
    if selected.is_empty() {
        return QualityMetrics::default();
    }
    let scores = selected.iter().map(|s| s.ranked.relevance_score);
    QualityMetrics {
        average_relevance: scores.clone().map(f64::from).sum::<f64>() / selected.len() as f64,
        min_relevance: scores.clone().min().unwrap_or(0),
        max_relevance: scores.clone().max().unwrap_or(0),
        high_quality_count: scores.filter(|s| *s >= high_quality_threshold).count(),
    }
}
