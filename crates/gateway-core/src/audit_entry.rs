//! `AuditEntry`: an `Action` extended with the fields of the `Decision` it
//! produced. Created exactly once per non-simulated `Decide` call (§3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Action, Decision};

/// An `Action` paired with the outcome it produced, as submitted to an
/// `AuditSink`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// Project the action was evaluated against.
    pub project_id: String,
    /// Agent that requested the action.
    pub agent_name: String,
    /// Action type requested.
    pub action_type: String,
    /// Parameter bag supplied with the action.
    pub params: Value,
    /// Whether the action was allowed.
    pub allowed: bool,
    /// Opaque action id; always present (simulations never reach the sink).
    pub action_id: String,
    /// Milliseconds since UNIX epoch when the decision was produced.
    pub timestamp: u64,
    /// Reason, present iff `!allowed`.
    pub reason: Option<String>,
    /// Policy version consulted for this decision.
    pub policy_version: String,
    /// Wall-clock duration of the originating `Decide` call.
    pub execution_time_ms: f64,
}

impl AuditEntry {
    /// Combine an `Action` and the non-simulated `Decision` it produced.
    ///
    /// # Panics
    /// Panics if `decision.action_id` is `None` — callers must only audit
    /// non-simulated decisions, which always carry an action id.
    #[must_use]
    pub fn from_action_and_decision(action: &Action, decision: &Decision) -> Self {
        let action_id = decision
            .action_id
            .clone()
            .expect("AuditEntry requires a non-simulated Decision (action_id present)");
        Self {
            project_id: action.project_id.clone(),
            agent_name: action.agent_name.clone(),
            action_type: action.action_type.clone(),
            params: action.params.clone(),
            allowed: decision.allowed,
            action_id,
            timestamp: decision.timestamp,
            reason: decision.reason.clone(),
            policy_version: decision.policy_version.clone(),
            execution_time_ms: decision.execution_time_ms,
        }
    }
}
