//! Session result rendering.

use super::selection::SelectionStrategy;
use super::session::{RoundResult, SessionResult, StopReason};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Output format for a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Pretty-printed serialization of the full [`SessionResult`].
    #[default]
    Json,
    /// Human-readable report: plan, rounds, selected sources.
    Markdown,
}

/// Render a session in the requested format.
pub fn render_session(result: &SessionResult, format: OutputFormat) -> crate::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Markdown => Ok(render_markdown(result)),
    }
}

fn render_markdown(result: &SessionResult) -> String {
    let mut out = format!("# Research Session: {}\n\n", result.query);

    let _ = writeln!(out, "**Session:** `{}`", result.session_id);
    let _ = writeln!(
        out,
        "**Rounds:** {} of {} | **Unique sources:** {} | **Duplicates filtered:** {} | **Duration:** {}ms",
        result.rounds.len(),
        result.max_rounds,
        result.total_unique_sources,
        result.duplicates_filtered,
        result.total_duration_ms
    );
    let _ = writeln!(out, "**Stopped:** {}\n", describe_stop(&result.stop_reason));

    out.push_str("## Plan\n\n");
    let fallback = if result.plan_fallback {
        " (default plan)"
    } else {
        ""
    };
    let _ = writeln!(out, "{}{fallback}\n", result.plan.strategy_description);
    if !result.plan.focus_areas.is_empty() {
        let _ = writeln!(out, "Focus areas: {}\n", result.plan.focus_areas.join(", "));
    }

    out.push_str("## Rounds\n\n");
    out.push_str("| Round | Query | Unique | Duplicates | Provider errors | Decision |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    for round in &result.rounds {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |",
            round.round_number,
            round.query.replace('|', "\\|"),
            round.unique_source_count,
            round.duplicates_filtered,
            round.provider_errors.len(),
            describe_decision(round)
        );
    }
    out.push('\n');

    let errors: Vec<(u32, &String, &String)> = result
        .rounds
        .iter()
        .flat_map(|r| {
            r.provider_errors
                .iter()
                .map(move |(p, e)| (r.round_number, p, e))
        })
        .collect();
    if !errors.is_empty() {
        out.push_str("### Provider errors\n\n");
        for (round, provider, error) in errors {
            let _ = writeln!(out, "- round {round}, `{provider}`: {error}");
        }
        out.push('\n');
    }

    let selection = &result.selection;
    let _ = writeln!(
        out,
        "## Selected Sources ({} of {}, strategy: {})\n",
        selection.selected_count,
        result.ranking.len(),
        selection.selection_strategy.as_str()
    );
    if selection.is_empty() {
        let cause = if selection.selection_strategy == SelectionStrategy::TokenConstrained {
            "No source fit within the token budget"
        } else {
            "No sources met the relevance floor"
        };
        let _ = writeln!(out, "{cause}; evidence is insufficient.");
        return out;
    }
    for (i, selected) in selection.selected_sources.iter().enumerate() {
        let ranked = &selected.ranked;
        let b = &ranked.breakdown;
        let _ = writeln!(
            out,
            "{}. **{}** [{}] score {} (keywords {}, credibility {}, recency {})",
            i + 1,
            ranked.source.title(),
            ranked.provenance(),
            ranked.relevance_score,
            b.keyword,
            b.credibility,
            b.recency
        );
        if let Some(id) = ranked.source.identifier() {
            let _ = writeln!(out, "   {id}");
        }
    }
    let m = &selection.quality_metrics;
    let _ = writeln!(
        out,
        "\nAverage relevance {:.1} (min {}, max {}), {} high quality, ~{} tokens, {} near-duplicates collapsed",
        m.average_relevance,
        m.min_relevance,
        m.max_relevance,
        m.high_quality_count,
        selection.total_token_estimate,
        selection.deduplicated_count
    );
    out
}

fn describe_stop(reason: &StopReason) -> String {
    match reason {
        StopReason::MaxRounds => "maximum rounds reached".to_string(),
        StopReason::NoNewSources => "no new sources".to_string(),
        StopReason::EvaluatorStop { reasons } => reasons.join("; "),
    }
}

fn describe_decision(round: &RoundResult) -> String {
    match &round.decision {
        Some(d) if d.should_stop => "stop".to_string(),
        Some(d) if d.overridden => "continue (override)".to_string(),
        Some(_) => "continue".to_string(),
        None => "-".to_string(),
    }
}
