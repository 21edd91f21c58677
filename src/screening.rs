//! Deterministic forbidden-term screening.  A hit short-circuits the
//! pipeline with a fixed zero-score verdict and the model is never called.

use aho_corasick::AhoCorasick;

use crate::prompt::OutputMode;
use crate::verdict::{table_cell, AnalysisResult, ComparisonRow, NarrativeResult, Tone, Verdict};

/// Return the first configured term (in list order) that occurs verbatim in
/// `text`.  Matching is case-sensitive.
pub fn find_forbidden_term<'a>(text: &str, terms: &'a [String]) -> Option<&'a str> {
    let patterns: Vec<&str> = terms
        .iter()
        .map(String::as_str)
        .filter(|t| !t.is_empty())
        .collect();
    if patterns.is_empty() || text.is_empty() {
        return None;
    }
    match AhoCorasick::new(&patterns) {
        Ok(ac) => ac
            .find_overlapping_iter(text)
            .map(|m| m.pattern().as_usize())
            .min()
            .map(|idx| patterns[idx]),
        Err(err) => {
            tracing::warn!(error = %err, "forbidden-term automaton failed to build, scanning linearly");
            patterns.into_iter().find(|t| text.contains(t))
        }
    }
}

pub fn forbidden_result(term: &str) -> AnalysisResult {
    AnalysisResult {
        score: 0,
        tone: Tone::Aggressive,
        summary: format!(
            "Failed: the message contains the forbidden term \"{term}\", so it cannot be sent as written."
        ),
        pros: Vec::new(),
        cons: vec![
            format!("Uses the forbidden term \"{term}\"."),
            "Messages containing forbidden terms score 0 regardless of the rest of the content."
                .to_owned(),
        ],
        comparison_table: vec![ComparisonRow {
            aspect: "Forbidden term".to_owned(),
            original: term.to_owned(),
            better: "Remove the term and restate the point in neutral language.".to_owned(),
        }],
    }
}

fn forbidden_narrative(term: &str) -> NarrativeResult {
    let result = forbidden_result(term);
    let mut report = format!("### Result: Failed\n\n{}\n\n", result.summary);
    report.push_str("| Aspect | Original | Better |\n|---|---|---|\n");
    for row in &result.comparison_table {
        report.push_str(&format!(
            "| {} | {} | {} |\n",
            table_cell(&row.aspect),
            table_cell(&row.original),
            table_cell(&row.better)
        ));
    }
    NarrativeResult {
        score: 0,
        tone: Tone::Aggressive,
        report,
    }
}

pub fn forbidden_verdict(term: &str, mode: OutputMode) -> Verdict {
    match mode {
        OutputMode::Json => Verdict::Structured(forbidden_result(term)),
        OutputMode::Narrative => Verdict::Narrative(forbidden_narrative(term)),
    }
}
