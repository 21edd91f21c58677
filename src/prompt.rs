//! Prompt composition.
//!
//! Rendering is pure: the same sanitized request and mode always produce the
//! same instruction text.

use std::fmt::Write as _;

use crate::sanitize::AnalysisRequest;

/// Which answer contract the model is asked to follow.  Each mode has a
/// matching schema in `normalize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Json,
    Narrative,
}

impl OutputMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" | "structured" => Some(OutputMode::Json),
            "narrative" | "markdown" => Some(OutputMode::Narrative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Json => "json",
            OutputMode::Narrative => "narrative",
        }
    }
}

/// One ordered segment of the outbound model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    InlineAudio { mime_type: String, data: String },
}

const RUBRIC: &str = "\
Rules:
1. If the message contains or clearly implies any forbidden keyword or intent, set score to 0.
2. Evaluate professionalism, empathy and clarity, then give one overall score from 0 to 100.
3. Classify the tone as exactly one of: Aggressive, Professional, Passive, Neutral.
";

const JSON_CONTRACT: &str = r#"4. Respond with a single JSON object and nothing else: no markdown fences, no commentary.

JSON structure:
{
  "score": number,
  "tone": "Aggressive" | "Professional" | "Passive" | "Neutral",
  "summary": "markdown string",
  "pros": ["string"],
  "cons": ["string"],
  "comparisonTable": [{"aspect": "string", "original": "string", "better": "string"}]
}
"#;

const NARRATIVE_CONTRACT: &str = r#"4. Respond with a single JSON object and nothing else. Put the full written feedback in "report" as markdown.
5. The report must contain a markdown table with the header | Aspect | Original | Better | comparing the original wording with an improved version.

JSON structure:
{
  "score": number,
  "tone": "Aggressive" | "Professional" | "Passive" | "Neutral",
  "report": "markdown string containing the table"
}
"#;

pub fn compose_prompt(req: &AnalysisRequest, mode: OutputMode) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("Role: Specialist in crisis communication.\n");
    out.push_str("Task: Analyze the user's message based on the provided situation.\n\n");
    out.push_str("Context:\n");
    let _ = writeln!(out, "- Situation: \"{}\"", req.situation);
    match (req.text.is_empty(), req.audio.is_some()) {
        (true, true) => out.push_str("- User's message: provided as the attached audio recording.\n"),
        _ => {
            let _ = writeln!(out, "- User's message: \"{}\"", req.text);
        }
    }
    let _ = writeln!(
        out,
        "- Forbidden keywords/intent: [{}]",
        req.forbidden_terms.join(", ")
    );
    if req.audio.is_some() {
        out.push_str(
            "- Audio: transcribe the attached recording and evaluate what was said and how it was delivered.\n",
        );
    }
    out.push('\n');
    out.push_str(RUBRIC);
    out.push_str(match mode {
        OutputMode::Json => JSON_CONTRACT,
        OutputMode::Narrative => NARRATIVE_CONTRACT,
    });
    out
}

/// Prompt text first, then the inline recording when one was supplied.
pub fn prompt_parts(req: &AnalysisRequest, mode: OutputMode) -> Vec<PromptPart> {
    let mut parts = vec![PromptPart::Text(compose_prompt(req, mode))];
    if let Some(data) = &req.audio {
        parts.push(PromptPart::InlineAudio {
            mime_type: req
                .audio_mime_type
                .clone()
                .unwrap_or_else(|| crate::sanitize::DEFAULT_AUDIO_MIME.to_owned()),
            data: data.clone(),
        });
    }
    parts
}
