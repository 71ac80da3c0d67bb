//! The `Decision` output type returned by `Decide`.

use serde::{Deserialize, Serialize};

/// The final, immutable output of a `Decide` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Opaque, globally-unique identifier; `None` only for simulated calls.
    pub action_id: Option<String>,
    /// Milliseconds since UNIX epoch when the decision was produced.
    pub timestamp: u64,
    /// Human-readable reason naming the failing predicate; required when
    /// `!allowed`, always `None` when `allowed`.
    pub reason: Option<String>,
    /// Opaque identifier of the policy version consulted.
    pub policy_version: String,
    /// Wall-clock duration of the `Decide` call, in fractional milliseconds.
    pub execution_time_ms: f64,
    /// Whether this decision was produced by a side-effect-free simulation.
    pub simulated: bool,
}

impl Decision {
    /// Construct an allowed decision. Panics (debug-only invariant) if a
    /// reason was supplied — allowed decisions never carry one (§3, §8.2).
    #[must_use]
    pub fn allow(
        action_id: Option<String>,
        timestamp: u64,
        policy_version: impl Into<String>,
        execution_time_ms: f64,
        simulated: bool,
    ) -> Self {
        Self {
            allowed: true,
            action_id,
            timestamp,
            reason: None,
            policy_version: policy_version.into(),
            execution_time_ms,
            simulated,
        }
    }

    /// Construct a blocked decision with a mandatory, non-empty reason.
    #[must_use]
    pub fn block(
        action_id: Option<String>,
        timestamp: u64,
        reason: impl Into<String>,
        policy_version: impl Into<String>,
        execution_time_ms: f64,
        simulated: bool,
    ) -> Self {
        Self {
            allowed: false,
            action_id,
            timestamp,
            reason: Some(reason.into()),
            policy_version: policy_version.into(),
            execution_time_ms,
            simulated,
        }
    }
}

/// Truncate a reason string to a safe length so blocked decisions never
/// echo unbounded parameter content (§7).
pub const MAX_REASON_LEN: usize = 240;

/// Truncate `s` to at most [`MAX_REASON_LEN`] bytes on a char boundary,
/// appending an ellipsis marker when truncated.
#[must_use]
pub fn truncate_reason(s: &str) -> String {
    if s.len() <= MAX_REASON_LEN {
        return s.to_string();
    }
    let mut end = MAX_REASON_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
