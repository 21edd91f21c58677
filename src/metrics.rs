//! Process-lifetime counters and a request latency histogram, exposed in
//! Prometheus text format.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::AnalysisError;
use crate::normalize::ParseStage;
use crate::pipeline::Outcome;

// Upstream calls dominate latency, so buckets reach well past a second.
const BUCKETS_MS: [u64; 12] = [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000];

pub struct Metrics {
    requests_total: AtomicU64,
    rate_limited_total: AtomicU64,
    validation_errors_total: AtomicU64,
    configuration_errors_total: AtomicU64,
    forbidden_total: AtomicU64,
    upstream_overloaded_total: AtomicU64,
    upstream_failures_total: AtomicU64,
    parsed_strict_total: AtomicU64,
    parsed_recovered_total: AtomicU64,
    fallback_total: AtomicU64,
    hist_counts: Vec<AtomicU64>,
    hist_sum_ms: AtomicU64,
    hist_count: AtomicU64,
    started: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            validation_errors_total: AtomicU64::new(0),
            configuration_errors_total: AtomicU64::new(0),
            forbidden_total: AtomicU64::new(0),
            upstream_overloaded_total: AtomicU64::new(0),
            upstream_failures_total: AtomicU64::new(0),
            parsed_strict_total: AtomicU64::new(0),
            parsed_recovered_total: AtomicU64::new(0),
            fallback_total: AtomicU64::new(0),
            hist_counts: BUCKETS_MS.iter().map(|_| AtomicU64::new(0)).collect(),
            hist_sum_ms: AtomicU64::new(0),
            hist_count: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_success(&self, outcome: Outcome, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Forbidden => &self.forbidden_total,
            Outcome::Model(ParseStage::Strict) => &self.parsed_strict_total,
            Outcome::Model(ParseStage::Recovered) => &self.parsed_recovered_total,
            Outcome::Model(ParseStage::Fallback) => &self.fallback_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.observe_latency(latency_ms);
    }

    pub fn record_error(&self, err: &AnalysisError, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let counter = match err {
            AnalysisError::Validation(_) => &self.validation_errors_total,
            AnalysisError::Configuration(_) => &self.configuration_errors_total,
            AnalysisError::RateLimited { .. } => &self.rate_limited_total,
            AnalysisError::UpstreamOverloaded { .. } => &self.upstream_overloaded_total,
            AnalysisError::UpstreamFailure(_) => &self.upstream_failures_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.observe_latency(latency_ms);
    }

    fn observe_latency(&self, ms: u64) {
        self.hist_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.hist_count.fetch_add(1, Ordering::Relaxed);
        // first bucket >= value; larger values only land in +Inf
        if let Some(idx) = BUCKETS_MS.iter().position(|ub| ms <= *ub) {
            self.hist_counts[idx].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn render(&self) -> String {
        let mut buf = String::new();
        let counters: [(&str, &str, &AtomicU64); 10] = [
            ("tonescore_requests_total", "Analyze requests handled", &self.requests_total),
            ("tonescore_rate_limited_total", "Requests denied by the per-identity cool-down", &self.rate_limited_total),
            ("tonescore_validation_errors_total", "Requests rejected for missing or invalid input", &self.validation_errors_total),
            ("tonescore_configuration_errors_total", "Requests failed for missing provider configuration", &self.configuration_errors_total),
            ("tonescore_forbidden_total", "Verdicts produced by the forbidden-term pre-check", &self.forbidden_total),
            ("tonescore_upstream_overloaded_total", "Provider quota or overload responses", &self.upstream_overloaded_total),
            ("tonescore_upstream_failures_total", "Other provider or transport failures", &self.upstream_failures_total),
            ("tonescore_parse_strict_total", "Model replies that parsed as a JSON object", &self.parsed_strict_total),
            ("tonescore_parse_recovered_total", "Model replies repaired by brace extraction", &self.parsed_recovered_total),
            ("tonescore_parse_fallback_total", "Model replies replaced by the fallback verdict", &self.fallback_total),
        ];
        for (name, help, value) in counters {
            writeln!(buf, "# HELP {name} {help}").ok();
            writeln!(buf, "# TYPE {name} counter").ok();
            writeln!(buf, "{name} {}", value.load(Ordering::Relaxed)).ok();
        }

        writeln!(
            buf,
            "# HELP tonescore_request_latency_ms Request latency histogram milliseconds"
        )
        .ok();
        writeln!(buf, "# TYPE tonescore_request_latency_ms histogram").ok();
        let mut cumulative: u64 = 0;
        for (i, ub) in BUCKETS_MS.iter().enumerate() {
            cumulative += self.hist_counts[i].load(Ordering::Relaxed);
            writeln!(
                buf,
                "tonescore_request_latency_ms_bucket{{le=\"{}\"}} {}",
                ub, cumulative
            )
            .ok();
        }
        let count = self.hist_count.load(Ordering::Relaxed);
        writeln!(buf, "tonescore_request_latency_ms_bucket{{le=\"+Inf\"}} {}", count).ok();
        writeln!(
            buf,
            "tonescore_request_latency_ms_sum {}",
            self.hist_sum_ms.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(buf, "tonescore_request_latency_ms_count {}", count).ok();

        writeln!(
            buf,
            "# HELP tonescore_build_info Build information\n# TYPE tonescore_build_info gauge"
        )
        .ok();
        writeln!(
            buf,
            "tonescore_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )
        .ok();
        writeln!(
            buf,
            "# HELP tonescore_process_uptime_seconds Process uptime seconds\n# TYPE tonescore_process_uptime_seconds gauge"
        )
        .ok();
        writeln!(
            buf,
            "tonescore_process_uptime_seconds {}",
            self.started.elapsed().as_secs_f64()
        )
        .ok();
        buf
    }
}
