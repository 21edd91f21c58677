//! Result shapes returned to the caller.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum Tone {
    Aggressive,
    Professional,
    Passive,
    #[default]
    Neutral,
}

impl Tone {
    pub const ALL: [Tone; 4] = [
        Tone::Aggressive,
        Tone::Professional,
        Tone::Passive,
        Tone::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Aggressive => "Aggressive",
            Tone::Professional => "Professional",
            Tone::Passive => "Passive",
            Tone::Neutral => "Neutral",
        }
    }

    /// Case-insensitive match against the four labels.
    pub fn parse(raw: &str) -> Option<Tone> {
        let raw = raw.trim();
        Tone::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ComparisonRow {
    pub aspect: String,
    pub original: String,
    pub better: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub score: u8,
    pub tone: Tone,
    pub summary: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub comparison_table: Vec<ComparisonRow>,
}

/// Markdown-report variant: the comparison lives inside `report` as a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrativeResult {
    pub score: u8,
    pub tone: Tone,
    pub report: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Verdict {
    Structured(AnalysisResult),
    Narrative(NarrativeResult),
}

impl Verdict {
    pub fn score(&self) -> u8 {
        match self {
            Verdict::Structured(r) => r.score,
            Verdict::Narrative(r) => r.score,
        }
    }

    pub fn tone(&self) -> Tone {
        match self {
            Verdict::Structured(r) => r.tone,
            Verdict::Narrative(r) => r.tone,
        }
    }
}

pub const FALLBACK_SCORE: u8 = 50;
pub const FALLBACK_SUMMARY: &str =
    "The analysis service returned a response that could not be read. Please try again.";

/// Returned when neither strict parsing nor structural recovery produced an object.
pub fn fallback_result() -> AnalysisResult {
    AnalysisResult {
        score: FALLBACK_SCORE,
        tone: Tone::Neutral,
        summary: FALLBACK_SUMMARY.to_owned(),
        pros: Vec::new(),
        cons: Vec::new(),
        comparison_table: Vec::new(),
    }
}

pub fn fallback_narrative() -> NarrativeResult {
    NarrativeResult {
        score: FALLBACK_SCORE,
        tone: Tone::Neutral,
        report: FALLBACK_SUMMARY.to_owned(),
    }
}

/// Escape a value for use inside a markdown table cell.
pub(crate) fn table_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}
