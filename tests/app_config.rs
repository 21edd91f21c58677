#[path = "common/mod.rs"]
mod common;

use common::EnvGuard;
use once_cell::sync::Lazy;
use std::sync::Mutex;
use tonescore::{build_state_from_env, AppConfig};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[test]
fn rejects_non_numeric_cooldown() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let mut env = EnvGuard::new();
    env.set("TONESCORE_COOLDOWN_SECS", "soon");

    let err = AppConfig::from_env().expect_err("expected invalid integer to error");
    assert!(format!("{}", err).contains("TONESCORE_COOLDOWN_SECS"));
}

#[test]
fn rejects_unknown_output_mode() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let mut env = EnvGuard::new();
    env.remove("TONESCORE_COOLDOWN_SECS");
    env.set("TONESCORE_OUTPUT_MODE", "xml");

    let err = AppConfig::from_env().expect_err("expected invalid mode to error");
    assert!(format!("{}", err).contains("TONESCORE_OUTPUT_MODE"));
}

#[test]
fn rejects_out_of_range_temperature() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let mut env = EnvGuard::new();
    env.remove("TONESCORE_OUTPUT_MODE");
    env.set("TONESCORE_TEMPERATURE", "3.5");

    let err = AppConfig::from_env().expect_err("expected temperature bound to error");
    assert!(format!("{}", err).contains("TONESCORE_TEMPERATURE"));
}

#[test]
fn empty_values_fall_back_to_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let mut env = EnvGuard::new();
    env.set_many(&[
        ("TONESCORE_MODEL", "   "),
        ("TONESCORE_COOLDOWN_SECS", ""),
        ("TONESCORE_OUTPUT_MODE", ""),
        ("TONESCORE_TEMPERATURE", ""),
        ("GOOGLE_API_KEY", "\"\""),
    ]);

    let cfg = AppConfig::from_env().unwrap();
    let defaults = AppConfig::default();
    assert_eq!(cfg.model, defaults.model);
    assert_eq!(cfg.cooldown_secs, defaults.cooldown_secs);
    assert!(cfg.api_key.is_none());
}

#[test]
fn state_builds_without_api_key() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let mut env = EnvGuard::new();
    env.remove("GOOGLE_API_KEY");
    env.remove("TONESCORE_TEMPERATURE");
    env.remove("TONESCORE_OUTPUT_MODE");
    env.remove("TONESCORE_COOLDOWN_SECS");
    env.set("TONESCORE_MODEL", "gemini-custom");

    let state = build_state_from_env().expect("missing key is reported per request");
    assert!(state.config.api_key.is_none());
    assert_eq!(state.analyzer.gateway_name(), "gemini-custom");
}
