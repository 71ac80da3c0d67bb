//! Policy Model (C1), Constraint Evaluator (C2), and Rule Matcher (C3):
//! load, validate, and evaluate policy documents against actions.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod constraint;
pub mod matcher;
pub mod model;

pub use constraint::{evaluate, CompiledPattern, Constraint, EvalResult, RawConstraint};
pub use matcher::{match_rule, Verdict};
pub use model::{AggregateLimit, Effect, Policy, PolicyMalformed, RateLimit, Rule};
