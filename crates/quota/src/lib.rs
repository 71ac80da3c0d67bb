//! Quota Engine (C4): sliding-window request-rate and aggregate-value
//! limits sharing one `CounterStore` backend.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::VecDeque;
use std::sync::Mutex;

use dashmap::DashMap;
use gateway_core::InfraFault;

/// Outcome of one sliding-window operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlidingOutcome {
    /// Whether the new weight was admitted (and recorded).
    pub admitted: bool,
    /// Sum of weights in the window after the operation (post-record when
    /// admitted, pre-record otherwise).
    pub current: f64,
}

/// A keyed, atomic, sliding-window counter backend.
///
/// Implementations must serialize operations per key; operations on
/// different keys must not contend with each other (§5).
pub trait CounterStore: Send + Sync {
    /// Atomically evaluate and, if admitted, record `weight` at `now` with
    /// the given `window`/`max`, dropping entries older than `now - window`
    /// first.
    ///
    /// # Errors
    /// Returns [`InfraFault`] if the backend is unavailable.
    fn sliding_increment(
        &self,
        key: &str,
        weight: f64,
        window_ms: u64,
        max: f64,
        now_ms: u64,
    ) -> Result<SlidingOutcome, InfraFault>;

    /// Best-effort removal of the most recent recorded increment of
    /// `weight` at `now_ms` for `key`, used to undo a request-counter
    /// consumption when a later pipeline stage rejects the action.
    ///
    /// # Errors
    /// Returns [`InfraFault`] if the backend is unavailable.
    fn rollback(&self, key: &str, weight: f64, now_ms: u64) -> Result<(), InfraFault>;
}

/// A local, process-local [`CounterStore`] backed by a per-key bounded
/// deque of `(timestamp, weight)` entries.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    windows: DashMap<String, Mutex<VecDeque<(u64, f64)>>>,
}

impl InMemoryCounterStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self { windows: DashMap::new() }
    }
}

impl CounterStore for InMemoryCounterStore {
    fn sliding_increment(
        &self,
        key: &str,
        weight: f64,
        window_ms: u64,
        max: f64,
        now_ms: u64,
    ) -> Result<SlidingOutcome, InfraFault> {
        let entry = self.windows.entry(key.to_string()).or_default();
        let mut deque = entry.lock().map_err(|_| InfraFault::Internal("counter lock poisoned".into()))?;

        // The window is the half-open interval (now - window, now]: an
        // entry recorded exactly at the floor has aged out. Computed in
        // i64 (rather than saturating u64 subtraction) so a floor that
        // would go negative never spuriously expires an entry at ts=0.
        let floor = now_ms as i64 - window_ms as i64;
        while matches!(deque.front(), Some((ts, _)) if *ts as i64 <= floor) {
            deque.pop_front();
        }

        let sum: f64 = deque.iter().map(|(_, w)| *w).sum();
        if sum + weight > max {
            tracing::debug!(key, weight, current = sum, max, "sliding window refused increment");
            return Ok(SlidingOutcome { admitted: false, current: sum });
        }

        deque.push_back((now_ms, weight));
        Ok(SlidingOutcome { admitted: true, current: sum + weight })
    }

    fn rollback(&self, key: &str, weight: f64, now_ms: u64) -> Result<(), InfraFault> {
        if let Some(entry) = self.windows.get(key) {
            let mut deque = entry.lock().map_err(|_| InfraFault::Internal("counter lock poisoned".into()))?;
            match deque.iter().rposition(|(ts, w)| *ts == now_ms && *w == weight) {
                Some(pos) => {
                    deque.remove(pos);
                }
                None => tracing::warn!(key, weight, now_ms, "rollback found no matching increment to remove"),
            }
        }
        Ok(())
    }
}

/// Result of a request-rate check (§4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitCheck {
    /// Whether the request is admitted under the configured limit.
    pub admitted: bool,
    /// Reason to surface on the `Decision` when `!admitted`.
    pub reason: String,
    /// The key the decision was recorded under, for a subsequent rollback.
    pub key: String,
}

/// Result of an aggregate-value check (§4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateLimitCheck {
    /// Whether the value is admitted under the configured limit.
    pub admitted: bool,
    /// Reason to surface on the `Decision` when `!admitted`.
    pub reason: String,
    /// The key the decision was recorded under, for a subsequent rollback.
    pub key: String,
    /// The weight recorded (or attempted), for a subsequent rollback.
    pub weight: f64,
}

/// The Quota Engine: applies request-rate and aggregate-value limits
/// against a shared [`CounterStore`].
pub struct QuotaEngine<'a> {
    store: &'a dyn CounterStore,
}

impl<'a> QuotaEngine<'a> {
    /// Build an engine over the given backend.
    #[must_use]
    pub fn new(store: &'a dyn CounterStore) -> Self {
        Self { store }
    }

    /// Build the request-counter key `(project_id, agent_name, action_type)`.
    #[must_use]
    pub fn request_key(project_id: &str, agent_name: &str, action_type: &str) -> String {
        format!("req:{project_id}:{agent_name}:{action_type}")
    }

    /// Build the aggregate-counter key `(project_id, rule_identity)`.
    #[must_use]
    pub fn aggregate_key(project_id: &str, rule_identity: &str) -> String {
        format!("agg:{project_id}:{rule_identity}")
    }

    /// `TryConsume`: check and, if admitted, record one unit against a
    /// per-identity request-rate limit.
    ///
    /// # Errors
    /// Returns [`InfraFault`] if the backend is unavailable.
    pub fn try_consume(
        &self,
        key: String,
        max_requests: u64,
        window_seconds: u64,
        now_ms: u64,
    ) -> Result<RateLimitCheck, InfraFault> {
        let outcome =
            self.store.sliding_increment(&key, 1.0, window_seconds * 1000, max_requests as f64, now_ms)?;
        let reason = format!(
            "rate limit exceeded ({}/{max_requests} in last {window_seconds} seconds)",
            outcome.current as u64
        );
        Ok(RateLimitCheck { admitted: outcome.admitted, reason, key })
    }

    /// `TryAdd`: check and, if admitted, record a numeric contribution
    /// against a cumulative-value limit.
    ///
    /// # Errors
    /// Returns [`InfraFault`] if the backend is unavailable.
    pub fn try_add(
        &self,
        key: String,
        value: f64,
        max: f64,
        window_seconds: u64,
        now_ms: u64,
    ) -> Result<AggregateLimitCheck, InfraFault> {
        let outcome = self.store.sliding_increment(&key, value, window_seconds * 1000, max, now_ms)?;
        let reason = format!(
            "aggregate limit exceeded (current+value {} > max {max} over last {window_seconds} seconds)",
            outcome.current
        );
        Ok(AggregateLimitCheck { admitted: outcome.admitted, reason, key, weight: value })
    }

    /// Undo a prior admitted `try_consume`/`try_add` recorded at `now_ms`.
    ///
    /// # Errors
    /// Returns [`InfraFault`] if the backend is unavailable.
    pub fn rollback(&self, key: &str, weight: f64, now_ms: u64) -> Result<(), InfraFault> {
        self.store.rollback(key, weight, now_ms)
    }
}
