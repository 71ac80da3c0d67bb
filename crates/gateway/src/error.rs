//! `GatewayFault`: the caller-facing error type for administrative
//! operations and for `Decide` when fail-closed mode is disabled.

use gateway_core::{ActionInvalid, InfraFault};
use thiserror::Error;

/// Errors surfaced by the gateway crate's public operations.
#[derive(Debug, Error, Clone)]
pub enum GatewayFault {
    /// A collaborator (`PolicyStore`, `CounterStore`, `AuditSink`) faulted.
    #[error(transparent)]
    Infra(#[from] InfraFault),
    /// The submitted `Action` failed validation before evaluation began.
    #[error(transparent)]
    InvalidAction(#[from] ActionInvalid),
    /// The policy document failed to load (administrative upsert only).
    #[error(transparent)]
    PolicyMalformed(#[from] policy::PolicyMalformed),
}
