//! The `Action` input type: a caller-supplied description of an intended
//! effectful operation, submitted to the gateway for a decision.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Maximum nesting depth tolerated in `Action::params`. Bounds recursion in
/// path resolution (§3: "params... depth bounded").
pub const MAX_PARAM_DEPTH: usize = 32;

/// `Action` failed validation before it could be submitted for a decision.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionInvalid {
    /// `project_id` was empty.
    #[error("project_id must be non-empty")]
    EmptyProjectId,
    /// `agent_name` was empty.
    #[error("agent_name must be non-empty")]
    EmptyAgentName,
    /// `action_type` was empty.
    #[error("action_type must be non-empty")]
    EmptyActionType,
    /// `params` nested deeper than `MAX_PARAM_DEPTH`.
    #[error("params nesting exceeds max depth {0}")]
    ParamsTooDeep(usize),
}

/// A caller-supplied record describing an intended effectful operation.
///
/// Every field is caller-supplied; the gateway validates but never
/// transforms `params` before constraint evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    /// Tenant/project identifying the active policy to evaluate against.
    pub project_id: String,
    /// Identity of the agent requesting the action.
    pub agent_name: String,
    /// The kind of effectful operation being requested, e.g. `"pay_invoice"`.
    pub action_type: String,
    /// Arbitrary JSON-like parameter bag describing the action.
    pub params: Value,
}

impl Action {
    /// Construct and validate a new `Action`.
    ///
    /// # Errors
    /// Returns [`ActionInvalid`] if any required string field is empty or
    /// `params` nests deeper than [`MAX_PARAM_DEPTH`].
    pub fn new(
        project_id: impl Into<String>,
        agent_name: impl Into<String>,
        action_type: impl Into<String>,
        params: Value,
    ) -> Result<Self, ActionInvalid> {
        let action =
            Self { project_id: project_id.into(), agent_name: agent_name.into(), action_type: action_type.into(), params };
        action.validate()?;
        Ok(action)
    }

    /// Re-run validation, e.g. after deserializing an `Action` from an
    /// external boundary.
    pub fn validate(&self) -> Result<(), ActionInvalid> {
        if self.project_id.trim().is_empty() {
            return Err(ActionInvalid::EmptyProjectId);
        }
        if self.agent_name.trim().is_empty() {
            return Err(ActionInvalid::EmptyAgentName);
        }
        if self.action_type.trim().is_empty() {
            return Err(ActionInvalid::EmptyActionType);
        }
        let depth = value_depth(&self.params, 0);
        if depth > MAX_PARAM_DEPTH {
            return Err(ActionInvalid::ParamsTooDeep(depth));
        }
        Ok(())
    }
}

fn value_depth(v: &Value, current: usize) -> usize {
    match v {
        Value::Array(items) => {
            items.iter().map(|i| value_depth(i, current + 1)).max().unwrap_or(current)
        }
        Value::Object(map) => {
            map.values().map(|i| value_depth(i, current + 1)).max().unwrap_or(current)
        }
        _ => current,
    }
}

/// Resolve a dot-separated path against a `params` tree.
///
/// Each segment indexes either an object key, or (if the segment parses as
/// a non-negative integer) an array element. Returns `None` ("`PathAbsent`")
/// when any segment fails to resolve.
#[must_use]
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let idx: usize = segment.parse().ok()?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}
