//! Input sanitization.
//!
//! Every caller-supplied field passes through here before it is interpolated
//! into a prompt or compared against the forbidden-term list.  The functions
//! never fail: wrong types collapse to defaults and oversized values are
//! truncated.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

pub const MAX_TEXT_CHARS: usize = 500;
pub const MAX_SITUATION_CHARS: usize = 200;
pub const MAX_FORBIDDEN_TERMS: usize = 20;
pub const MAX_TERM_CHARS: usize = 50;
pub const MAX_MIME_CHARS: usize = 100;
pub const DEFAULT_SITUATION: &str = "General";
pub const DEFAULT_AUDIO_MIME: &str = "audio/webm";

/// A request after sanitization.  All bounds hold; `audio` is only present
/// when it decoded as base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub text: String,
    pub situation: String,
    pub forbidden_terms: Vec<String>,
    pub audio: Option<String>,
    pub audio_mime_type: Option<String>,
}

impl AnalysisRequest {
    pub fn has_input(&self) -> bool {
        !self.text.is_empty() || self.audio.is_some()
    }
}

/// Remove characters that could close the prompt's quoting, then bound the
/// length.  Applying it twice yields the same string.
pub fn sanitize_text(raw: &str, max_chars: usize) -> String {
    strip_quoting(raw, max_chars).trim().to_owned()
}

fn strip_quoting(raw: &str, max_chars: usize) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '`' | '"' | '\\'))
        .take(max_chars)
        .collect()
}

fn text_field(body: &Value, key: &str, max_chars: usize) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .map(|s| sanitize_text(s, max_chars))
        .unwrap_or_default()
}

/// Terms keep their surrounding whitespace so `" no "` does not match inside
/// "know".  Blank terms are dropped.
pub fn sanitize_terms(value: Option<&Value>) -> Vec<String> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .map(|s| strip_quoting(s, MAX_TERM_CHARS))
        .filter(|s| !s.trim().is_empty())
        .take(MAX_FORBIDDEN_TERMS)
        .collect()
}

fn sanitize_mime(raw: &str) -> Option<String> {
    let essence = raw.split(';').next().unwrap_or_default();
    let mime: String = essence
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '+' | '.' | '-'))
        .take(MAX_MIME_CHARS)
        .collect();
    if mime.contains('/') {
        Some(mime)
    } else {
        None
    }
}

/// Accepts raw base64 or a `data:<mime>;base64,` URL.  Returns the bare
/// payload and the mime type embedded in the data URL, if any.
fn sanitize_audio(raw: &str) -> Option<(String, Option<String>)> {
    let raw = raw.trim();
    let (payload, embedded_mime) = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest.split_once(',')?;
            let mime = meta.strip_suffix(";base64").unwrap_or(meta);
            (data, sanitize_mime(mime))
        }
        None => (raw, None),
    };
    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if payload.is_empty() {
        return None;
    }
    match STANDARD.decode(payload.as_bytes()) {
        Ok(bytes) if !bytes.is_empty() => Some((payload, embedded_mime)),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(error = %err, "discarding audio payload that is not valid base64");
            None
        }
    }
}

/// Build a bounded `AnalysisRequest` out of an arbitrary JSON body.
pub fn sanitize_request(body: &Value) -> AnalysisRequest {
    let text = text_field(body, "text", MAX_TEXT_CHARS);
    let situation = match text_field(body, "situation", MAX_SITUATION_CHARS) {
        s if s.is_empty() => DEFAULT_SITUATION.to_owned(),
        s => s,
    };
    let forbidden_terms = sanitize_terms(body.get("forbiddenWords"));

    let (audio, audio_mime_type) = match body
        .get("audio")
        .and_then(Value::as_str)
        .and_then(sanitize_audio)
    {
        Some((payload, embedded_mime)) => {
            let mime = body
                .get("mimeType")
                .and_then(Value::as_str)
                .and_then(sanitize_mime)
                .or(embedded_mime)
                .unwrap_or_else(|| DEFAULT_AUDIO_MIME.to_owned());
            (Some(payload), Some(mime))
        }
        None => (None, None),
    };

    AnalysisRequest {
        text,
        situation,
        forbidden_terms,
        audio,
        audio_mime_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_quote_breaking_characters() {
        let out = sanitize_text(r#"say "hi" `now` \n"#, MAX_TEXT_CHARS);
        assert_eq!(out, "say hi now n");
    }

    #[test]
    fn sanitizing_twice_is_a_no_op() {
        let samples = [
            "  padded\t",
            "\"quoted\" and `ticked` and \\slashed\\",
            "ไทย ข้อความ ที่ยาว",
            "",
        ];
        for raw in samples {
            let once = sanitize_text(raw, 10);
            assert_eq!(sanitize_text(&once, 10), once, "input {raw:?}");
        }
        let long = "x ".repeat(400);
        let once = sanitize_text(&long, MAX_TEXT_CHARS);
        assert!(once.chars().count() <= MAX_TEXT_CHARS);
        assert_eq!(sanitize_text(&once, MAX_TEXT_CHARS), once);
    }

    #[test]
    fn truncates_by_characters_not_bytes() {
        let out = sanitize_text(&"é".repeat(600), MAX_TEXT_CHARS);
        assert_eq!(out.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn wrong_types_fall_back_to_defaults() {
        let req = sanitize_request(&json!({
            "text": 42,
            "situation": ["not", "a", "string"],
            "forbiddenWords": "idiot",
            "audio": false
        }));
        assert_eq!(req.text, "");
        assert_eq!(req.situation, DEFAULT_SITUATION);
        assert!(req.forbidden_terms.is_empty());
        assert!(req.audio.is_none());
        assert!(!req.has_input());
    }

    #[test]
    fn forbidden_terms_are_bounded() {
        let mut words: Vec<Value> = (0..30).map(|i| json!(format!("term{i}"))).collect();
        words.insert(0, json!(""));
        words.insert(1, json!(7));
        words.insert(2, json!("y".repeat(80)));
        let terms = sanitize_terms(Some(&Value::Array(words)));
        assert_eq!(terms.len(), MAX_FORBIDDEN_TERMS);
        assert_eq!(terms[0].chars().count(), MAX_TERM_CHARS);
        assert_eq!(terms[1], "term0");
    }

    #[test]
    fn forbidden_terms_keep_configured_padding() {
        let terms = sanitize_terms(Some(&json!([" no ", "   ", "\"ok\""])));
        assert_eq!(terms, vec![" no ".to_owned(), "ok".to_owned()]);
        assert_eq!(crate::screening::find_forbidden_term("I know", &terms), None);
        assert_eq!(
            crate::screening::find_forbidden_term("I said no thanks", &terms),
            Some(" no ")
        );
    }

    #[test]
    fn audio_data_url_supplies_mime_type() {
        let req = sanitize_request(&json!({
            "audio": "data:audio/ogg;base64,AAEC"
        }));
        assert_eq!(req.audio.as_deref(), Some("AAEC"));
        assert_eq!(req.audio_mime_type.as_deref(), Some("audio/ogg"));
        assert!(req.has_input());
    }

    #[test]
    fn explicit_mime_type_wins_and_invalid_audio_is_dropped() {
        let req = sanitize_request(&json!({
            "audio": "AAEC",
            "mimeType": "Audio/MP4; codecs=\"x\""
        }));
        assert_eq!(req.audio_mime_type.as_deref(), Some("audio/mp4"));

        let bad = sanitize_request(&json!({ "text": "hi", "audio": "***" }));
        assert!(bad.audio.is_none());
        assert!(bad.audio_mime_type.is_none());
    }

    #[test]
    fn audio_without_mime_type_gets_default() {
        let req = sanitize_request(&json!({ "audio": "AAEC" }));
        assert_eq!(req.audio_mime_type.as_deref(), Some(DEFAULT_AUDIO_MIME));
    }
}
