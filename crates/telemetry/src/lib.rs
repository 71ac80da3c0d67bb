//! Structured logging init and in-process decision/quota/audit metrics.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Errors raised while wiring optional telemetry backends.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The OpenTelemetry pipeline failed to initialize.
    #[error("otel setup failed: {0}")]
    Otel(String),
}

/// Initialize structured JSON logging, env-filter driven (`RUST_LOG`, e.g.
/// `"info,gateway=debug"`).
pub fn init_json_logging() {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Initialize an OpenTelemetry tracer (optional; behind the `otel` feature).
/// Does not attach a `tracing` layer — see the teacher's own doc note.
#[cfg(feature = "otel")]
pub fn init_otel(service_name: &str) -> Result<(), TelemetryError> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::trace as sdktrace;
    use opentelemetry_sdk::{runtime, Resource};

    let resource = Resource::new(vec![KeyValue::new("service.name", service_name.to_owned())]);
    let _tracer_provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().http())
        .with_trace_config(sdktrace::config().with_resource(resource))
        .install_batch(runtime::Tokio)
        .map_err(|e| TelemetryError::Otel(e.to_string()))?;
    Ok(())
}

/// In-process, low-cardinality counters for decisions, quota refusals, and
/// audit drops (§7 ambient metrics: `decision.count{kind}`,
/// `quota.refused.count{kind}`, `audit.dropped.count`).
#[derive(Clone, Default)]
pub struct GatewayMetrics {
    decisions_allowed: Arc<AtomicU64>,
    decisions_blocked: Arc<AtomicU64>,
    quota_refused_rate: Arc<AtomicU64>,
    quota_refused_aggregate: Arc<AtomicU64>,
    audit_dropped: Arc<AtomicU64>,
}

impl GatewayMetrics {
    /// Construct a fresh, zeroed metrics set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision outcome.
    pub fn record_decision(&self, allowed: bool) {
        if allowed {
            self.decisions_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.decisions_blocked.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a request-rate quota refusal.
    pub fn record_rate_refusal(&self) {
        self.quota_refused_rate.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an aggregate-value quota refusal.
    pub fn record_aggregate_refusal(&self) {
        self.quota_refused_aggregate.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one or more dropped audit entries.
    pub fn record_audit_dropped(&self, count: u64) {
        if count > 0 {
            self.audit_dropped.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Snapshot: `(allowed, blocked, rate_refused, aggregate_refused, audit_dropped)`.
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.decisions_allowed.load(Ordering::Relaxed),
            self.decisions_blocked.load(Ordering::Relaxed),
            self.quota_refused_rate.load(Ordering::Relaxed),
            self.quota_refused_aggregate.load(Ordering::Relaxed),
            self.audit_dropped.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_decisions_and_refusals() {
        let metrics = GatewayMetrics::new();
        metrics.record_decision(true);
        metrics.record_decision(false);
        metrics.record_rate_refusal();
        metrics.record_aggregate_refusal();
        metrics.record_audit_dropped(3);
        assert_eq!(metrics.snapshot(), (1, 1, 1, 1, 3));
    }
}
