use std::env;

use anyhow::{anyhow, bail, Result};

use crate::prompt::OutputMode;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Provider key. `None` is reported per request as a configuration error
    /// rather than refusing to start.
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub upstream_timeout_ms: u64,
    pub temperature: Option<f32>,
    pub output_mode: OutputMode,
    pub cooldown_secs: u64,
    pub rate_limit_sweep: usize,
    pub max_request_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_owned(),
            api_base: DEFAULT_API_BASE.to_owned(),
            upstream_timeout_ms: 25_000,
            temperature: None,
            output_mode: OutputMode::Json,
            cooldown_secs: 8,
            rate_limit_sweep: 100,
            max_request_bytes: 8 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let api_key = env::var("GOOGLE_API_KEY")
            .ok()
            .and_then(|raw| clean_secret(&raw));

        let model = parse_string_env("TONESCORE_MODEL")?.unwrap_or(defaults.model);
        let api_base = parse_string_env("TONESCORE_API_BASE")?
            .map(|base| base.trim_end_matches('/').to_owned())
            .unwrap_or(defaults.api_base);

        let output_mode = match parse_string_env("TONESCORE_OUTPUT_MODE")? {
            Some(raw) => OutputMode::parse(&raw).ok_or_else(|| {
                anyhow!("TONESCORE_OUTPUT_MODE must be one of: json, narrative")
            })?,
            None => defaults.output_mode,
        };

        let temperature = parse_optional_f32("TONESCORE_TEMPERATURE")?;
        if let Some(t) = temperature {
            if !(0.0..=2.0).contains(&t) {
                bail!("TONESCORE_TEMPERATURE must be between 0.0 and 2.0");
            }
        }

        Ok(Self {
            api_key,
            model,
            api_base,
            upstream_timeout_ms: parse_optional_u64("TONESCORE_UPSTREAM_TIMEOUT_MS")?
                .unwrap_or(defaults.upstream_timeout_ms),
            temperature,
            output_mode,
            cooldown_secs: parse_optional_u64("TONESCORE_COOLDOWN_SECS")?
                .unwrap_or(defaults.cooldown_secs),
            rate_limit_sweep: parse_optional_u64("TONESCORE_RATE_LIMIT_SWEEP")?
                .map(|v| v as usize)
                .unwrap_or(defaults.rate_limit_sweep),
            max_request_bytes: parse_optional_u64("TONESCORE_MAX_REQUEST_BYTES")?
                .map(|v| v as usize)
                .unwrap_or(defaults.max_request_bytes),
        })
    }
}

/// Deployment dashboards tend to paste secrets with surrounding quotes.
pub fn clean_secret(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| *c != '"' && *c != '\'').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_owned())
    }
}

fn parse_string_env(var: &str) -> Result<Option<String>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value.trim().to_owned())),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match parse_string_env(var)? {
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        None => Ok(None),
    }
}

fn parse_optional_f32(var: &str) -> Result<Option<f32>> {
    match parse_string_env(var)? {
        Some(value) => value
            .parse::<f32>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number", var)),
        None => Ok(None),
    }
}
