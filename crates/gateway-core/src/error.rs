//! Shared fault types for the collaborator boundary (`PolicyStore`,
//! `CounterStore`, `AuditSink`). Per §7, these are "infrastructure faults",
//! never policy decisions — a blocked action is a `Decision`, not an `Err`.

use thiserror::Error;

/// An error raised by a backing store (`PolicyStore`, `CounterStore`) or by
/// a deadline elapsing while waiting on one.
#[derive(Debug, Error, Clone)]
pub enum InfraFault {
    /// The backing store is unreachable or returned an unexpected failure.
    #[error("infrastructure fault: {0}")]
    Unavailable(String),
    /// The caller's deadline elapsed while waiting on a backing store call.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// An engine invariant was violated; never silently swallowed.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl InfraFault {
    /// Short, stable label used in metrics and log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            InfraFault::Unavailable(_) => "unavailable",
            InfraFault::DeadlineExceeded => "deadline_exceeded",
            InfraFault::Internal(_) => "internal",
        }
    }
}
