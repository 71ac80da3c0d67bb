//! `GatewayConfig`: typed process-wide tunables (§5).

use std::env;

/// Selects the `CounterStore` backend, affecting approximation guarantees
/// under partition (§5 `counter_backend`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterBackend {
    /// An in-process map; exact within one instance, not shared across them.
    Local,
    /// A networked, shared store; approximate under partition or latency.
    Shared,
}

/// Process-wide tunables recognized by the Decision Pipeline (§5 table).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Seconds a cached policy is reused before refetch. Default `300`.
    pub policy_cache_ttl_seconds: u64,
    /// Seconds a project-identity lookup is reused. Default `300`.
    pub project_cache_ttl_seconds: u64,
    /// If set, infrastructure faults yield a blocked `Decision`; otherwise
    /// they are surfaced to the caller as a [`crate::GatewayFault`].
    pub fail_closed: bool,
    /// Overrides the default block reason in fail-closed mode.
    pub fail_closed_reason: Option<String>,
    /// Bound on queued audit entries before the oldest is dropped.
    pub audit_buffer_size: usize,
    /// Selects the `CounterStore` backend.
    pub counter_backend: CounterBackend,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            policy_cache_ttl_seconds: 300,
            project_cache_ttl_seconds: 300,
            fail_closed: true,
            fail_closed_reason: None,
            audit_buffer_size: 1024,
            counter_backend: CounterBackend::Local,
        }
    }
}

impl GatewayConfig {
    /// Build a config from defaults overridden by `GATEWAY_*` environment
    /// variables, mirroring the teacher's `ORCA_*`-prefixed env reads.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("GATEWAY_POLICY_CACHE_TTL_SECONDS") {
            if let Ok(n) = v.parse() {
                cfg.policy_cache_ttl_seconds = n;
            }
        }
        if let Ok(v) = env::var("GATEWAY_PROJECT_CACHE_TTL_SECONDS") {
            if let Ok(n) = v.parse() {
                cfg.project_cache_ttl_seconds = n;
            }
        }
        if let Ok(v) = env::var("GATEWAY_FAIL_CLOSED") {
            cfg.fail_closed = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = env::var("GATEWAY_FAIL_CLOSED_REASON") {
            cfg.fail_closed_reason = Some(v);
        }
        if let Ok(v) = env::var("GATEWAY_AUDIT_BUFFER_SIZE") {
            if let Ok(n) = v.parse() {
                cfg.audit_buffer_size = n;
            }
        }
        if let Ok(v) = env::var("GATEWAY_COUNTER_BACKEND") {
            cfg.counter_backend =
                if v.eq_ignore_ascii_case("shared") { CounterBackend::Shared } else { CounterBackend::Local };
        }
        cfg
    }
}
