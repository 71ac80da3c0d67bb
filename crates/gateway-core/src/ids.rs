//! ID utilities: monotonic counters and opaque action identifiers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a new monotonic identifier (starts at 1). Process-local only.
pub fn next_monotonic_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Milliseconds since UNIX epoch, using the system wall clock.
///
/// Decision timing and cache TTLs prefer the injected `Clock`; this helper
/// exists for the handful of call sites (id generation, default configs)
/// that need a timestamp before any `Clock` is in scope.
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis()
        as u64
}

/// Generate a fresh, globally-unique, monotonic-friendly action id.
///
/// The leading zero-padded monotonic counter keeps ids sortable within a
/// process; the UUID suffix keeps them unique across processes sharing a
/// `CounterStore`/`AuditSink` backend. The exact textual format is an
/// internal core detail — callers must treat `action_id` as opaque.
pub fn new_action_id() -> String {
    format!("{:020}-{}", next_monotonic_id(), Uuid::new_v4())
}
