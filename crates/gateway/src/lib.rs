//! The Decision Pipeline (C5): orchestrates policy fetch (with caching),
//! the Rule Matcher, the Quota Engine, fail-closed handling, simulation
//! mode, and audit emission behind a single `Engine::decide` operation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod store;

pub use config::{CounterBackend, GatewayConfig};
pub use engine::{DecideOptions, Engine};
pub use error::GatewayFault;
pub use store::{InMemoryPolicyStore, PolicyStore};
