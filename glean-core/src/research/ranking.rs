//! Deterministic relevance ranking.
//!
//! Scores are `min(100, keyword + credibility + recency)` and never involve
//! a model call. Identical inputs always produce identical output; ties keep
//! fetch order.

use super::source::{Provenance, Source};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Upper bound of the keyword component.
pub const MAX_KEYWORD_SCORE: u32 = 70;
/// Keyword score used when the query has no keywords left after filtering.
pub const NEUTRAL_KEYWORD_SCORE: u32 = 35;
pub const MAX_SCORE: u32 = 100;

const STOP_WORDS_EN: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "been", "being", "have", "has", "had", "does",
    "did", "will", "would", "shall", "should", "may", "might", "must", "can", "could", "with",
    "from", "about", "into", "through", "during", "before", "after", "above", "below",
    "between", "this", "that", "these", "those", "its", "but", "not", "what", "which", "who",
    "whom", "how", "why", "when", "where", "there", "their", "them", "they", "than", "then",
    "also", "any", "all", "some", "such", "more", "most", "other", "very", "our", "your",
    "you", "his", "her", "she", "him", "over", "under", "again", "each", "only", "own", "same",
    "too", "just", "because", "while", "both", "few", "nor", "off", "out", "once", "here",
];

const STOP_WORDS_DE: &[&str] = &[
    "der", "die", "das", "und", "oder", "aber", "ist", "sind", "war", "waren", "ein", "eine",
    "einer", "eines", "einem", "einen", "mit", "von", "vom", "zum", "zur", "auf", "für", "bei",
    "aus", "nach", "über", "unter", "wie", "was", "wer", "welche", "welcher", "welches",
    "nicht", "auch", "sich", "dem", "den", "des", "ich", "sie", "wir", "ihr", "man", "kann",
    "können", "hat", "haben", "wird", "werden", "durch", "gegen", "ohne", "sehr", "mehr",
    "als", "dass", "wenn", "noch", "nur", "schon", "bis", "beim", "gibt",
];

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS_EN.contains(&word) || STOP_WORDS_DE.contains(&word)
}

/// Lowercase and delete punctuation, keeping letters, digits, and whitespace.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

/// Distinct query keywords in first-occurrence order.
///
/// Drops tokens of two characters or fewer and English/German stop-words.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    normalize_text(text)
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !is_stop_word(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(String::from)
        .collect()
}

/// Fixed boost by provenance type.
pub fn credibility_boost(provenance: Provenance) -> u32 {
    match provenance {
        Provenance::PeerReviewed | Provenance::ClinicalTrial => 15,
        Provenance::Preprint => 8,
        Provenance::Web => 5,
    }
}

/// Boost by publication age in whole years. Unknown dates get nothing.
pub fn recency_boost(publish_year: Option<i32>, reference_year: i32) -> u32 {
    match publish_year.map(|y| reference_year - y) {
        Some(age) if age <= 1 => 15,
        Some(age) if age <= 3 => 10,
        Some(age) if age <= 5 => 5,
        _ => 0,
    }
}

/// Per-component contribution to a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub keyword: u32,
    pub credibility: u32,
    pub recency: u32,
    pub matched_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSource {
    pub source: Source,
    /// Combined score in `[0, 100]`.
    pub relevance_score: u32,
    pub breakdown: ScoreBreakdown,
    /// Position of the source in fetch order.
    pub fetch_index: usize,
}

impl RankedSource {
    pub fn provenance(&self) -> Provenance {
        self.source.provenance()
    }
}

/// Ranked sources, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingResult {
    pub keywords: Vec<String>,
    pub ranked: Vec<RankedSource>,
    pub average_score: f64,
}

impl RankingResult {
    pub fn top(&self, n: usize) -> &[RankedSource] {
        &self.ranked[..n.min(self.ranked.len())]
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RelevanceRanker {
    reference_year: i32,
}

impl Default for RelevanceRanker {
    fn default() -> Self {
        Self::new()
    }
}

impl RelevanceRanker {
    /// Ranker measuring recency against the current UTC year.
    pub fn new() -> Self {
        Self {
            reference_year: Utc::now().year(),
        }
    }

    /// Ranker with a fixed reference year, for reproducible runs.
    pub fn with_reference_year(reference_year: i32) -> Self {
        Self { reference_year }
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    /// Score one source against pre-extracted keywords.
    pub fn score(&self, keywords: &[String], source: &Source) -> (u32, ScoreBreakdown) {
        let (keyword, matched_keywords) = if keywords.is_empty() {
            (NEUTRAL_KEYWORD_SCORE, Vec::new())
        } else {
            let haystack = normalize_text(&format!("{} {}", source.title(), source.text()));
            let matched: Vec<String> = keywords
                .iter()
                .filter(|k| haystack.contains(k.as_str()))
                .cloned()
                .collect();
            let ratio = matched.len() as f64 / keywords.len() as f64;
            ((ratio * MAX_KEYWORD_SCORE as f64).round() as u32, matched)
        };

        let breakdown = ScoreBreakdown {
            keyword,
            credibility: credibility_boost(source.provenance()),
            recency: recency_boost(source.publish_year(), self.reference_year),
            matched_keywords,
        };
        let total = (breakdown.keyword + breakdown.credibility + breakdown.recency).min(MAX_SCORE);
        (total, breakdown)
    }

    /// Score and sort `sources` (in fetch order) for `query`.
    pub fn rank(&self, query: &str, sources: &[Source]) -> RankingResult {
        let keywords = extract_keywords(query);

        let mut ranked: Vec<RankedSource> = sources
            .iter()
            .enumerate()
            .map(|(fetch_index, source)| {
                let (relevance_score, breakdown) = self.score(&keywords, source);
                RankedSource {
                    source: source.clone(),
                    relevance_score,
                    breakdown,
                    fetch_index,
                }
            })
            .collect();
        // Stable: equal scores keep fetch order.
        ranked.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));

        let average_score = if ranked.is_empty() {
            0.0
        } else {
            ranked.iter().map(|r| r.relevance_score as f64).sum::<f64>() / ranked.len() as f64
        };

        RankingResult {
            keywords,
            ranked,
            average_score,
        }
    }
}
