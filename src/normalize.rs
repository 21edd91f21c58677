//! Self-healing parser for model replies.
//!
//! The model's answer is untrusted text.  It goes through three stages:
//!
//! 1. strict: the whole reply parses as a JSON object;
//! 2. recovered: the first balanced `{...}` span inside the reply parses;
//! 3. fallback: a fixed neutral verdict.
//!
//! Whatever object comes out of stage 1 or 2 is then normalized field by
//! field, so a missing or mistyped field never reaches the caller.  None of
//! this can fail: a formatting slip upstream is never an error downstream.

use serde_json::{Map, Value};

use crate::prompt::OutputMode;
use crate::verdict::{
    fallback_narrative, fallback_result, AnalysisResult, ComparisonRow, NarrativeResult, Tone,
    Verdict,
};

pub const DEFAULT_SCORE: u8 = 0;
pub const DEFAULT_SUMMARY: &str = "Analysis complete.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Strict,
    Recovered,
    Fallback,
}

impl ParseStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStage::Strict => "strict",
            ParseStage::Recovered => "recovered",
            ParseStage::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub verdict: Verdict,
    pub stage: ParseStage,
}

fn parse_object(candidate: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_type(&other))),
        Err(err) => Err(err.to_string()),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The first `{...}` span whose braces balance.  Braces inside JSON string
/// literals are ignored, so `{"a": "}"}` is taken whole.  An opening brace
/// that never closes is skipped and the scan resumes at the next `{`.
/// Returns `None` when no opening brace starts a balanced span.
pub fn extract_balanced_object(raw: &str) -> Option<&str> {
    let mut from = 0;
    while let Some(rel) = raw[from..].find('{') {
        let start = from + rel;
        if let Some(len) = balanced_len(&raw[start..]) {
            return Some(&raw[start..start + len]);
        }
        from = start + 1;
    }
    None
}

/// Byte length of the balanced object opening at the start of `s`.
fn balanced_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in s.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Run the strict → recovered → fallback state machine over a raw reply.
pub fn parse_model_output(raw: &str, mode: OutputMode) -> Normalized {
    let trimmed = raw.trim();
    let (object, stage) = match parse_object(trimmed) {
        Ok(map) => (Some(map), ParseStage::Strict),
        Err(strict_err) => {
            tracing::debug!(error = %strict_err, "strict parse of model reply failed");
            match extract_balanced_object(trimmed).map(parse_object) {
                Some(Ok(map)) => (Some(map), ParseStage::Recovered),
                Some(Err(recovery_err)) => {
                    tracing::warn!(error = %recovery_err, reply_len = raw.len(), "embedded object in model reply is not valid JSON");
                    (None, ParseStage::Fallback)
                }
                None => {
                    tracing::warn!(reply_len = raw.len(), "model reply contains no JSON object");
                    (None, ParseStage::Fallback)
                }
            }
        }
    };

    let verdict = match (object, mode) {
        (Some(map), OutputMode::Json) => Verdict::Structured(normalize_result(&map)),
        (Some(map), OutputMode::Narrative) => Verdict::Narrative(normalize_narrative(&map)),
        (None, OutputMode::Json) => Verdict::Structured(fallback_result()),
        (None, OutputMode::Narrative) => Verdict::Narrative(fallback_narrative()),
    };
    Normalized { verdict, stage }
}

/// Numbers are rounded and clamped into 0..=100; anything else is the default.
pub fn normalize_score(value: Option<&Value>) -> u8 {
    match value.and_then(Value::as_f64) {
        Some(n) if n.is_finite() => n.round().clamp(0.0, 100.0) as u8,
        _ => DEFAULT_SCORE,
    }
}

pub fn normalize_tone(value: Option<&Value>) -> Tone {
    value
        .and_then(Value::as_str)
        .and_then(Tone::parse)
        .unwrap_or_default()
}

fn string_or(value: Option<&Value>, default: &str) -> String {
    match value.and_then(Value::as_str).map(str::trim) {
        Some(s) if !s.is_empty() => s.to_owned(),
        _ => default.to_owned(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn cell(row: &Map<String, Value>, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.trim().to_owned(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn comparison_rows(value: Option<&Value>) -> Vec<ComparisonRow> {
    value
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_object)
                .map(|row| ComparisonRow {
                    aspect: cell(row, "aspect"),
                    original: cell(row, "original"),
                    better: cell(row, "better"),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn normalize_result(obj: &Map<String, Value>) -> AnalysisResult {
    let table = obj
        .get("comparisonTable")
        .or_else(|| obj.get("comparison_table"));
    AnalysisResult {
        score: normalize_score(obj.get("score")),
        tone: normalize_tone(obj.get("tone")),
        summary: string_or(obj.get("summary"), DEFAULT_SUMMARY),
        pros: string_list(obj.get("pros")),
        cons: string_list(obj.get("cons")),
        comparison_table: comparison_rows(table),
    }
}

pub fn normalize_narrative(obj: &Map<String, Value>) -> NarrativeResult {
    NarrativeResult {
        score: normalize_score(obj.get("score")),
        tone: normalize_tone(obj.get("tone")),
        report: string_or(obj.get("report"), ""),
    }
}
