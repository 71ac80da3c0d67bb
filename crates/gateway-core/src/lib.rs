//! Gateway core primitives and shared types.
//!
//! This crate has no knowledge of policy evaluation, quotas, or audit
//! storage — it defines the data model (`Action`, `Decision`, `AuditEntry`)
//! and the small set of process-wide utilities (ids, clock) that every
//! other gateway crate builds on.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Version of the gateway core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod action;
pub mod audit_entry;
pub mod clock;
pub mod decision;
pub mod error;
pub mod ids;

pub use action::Action;
pub use audit_entry::AuditEntry;
pub use clock::{Clock, SystemClock, VirtualClock};
pub use decision::Decision;
pub use error::InfraFault;
