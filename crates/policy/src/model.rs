//! Policy Model (C1): the typed, validated in-memory representation of a
//! policy document, and its loader.

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use crate::constraint::{Constraint, RawConstraint};

/// A policy document failed validation while loading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyMalformed {
    /// The document could not be parsed into the expected shape at all.
    #[error("malformed policy document: {0}")]
    Shape(String),
    /// `default` was present but not `"allow"`/`"block"`.
    #[error("default must be 'allow' or 'block', got '{0}'")]
    BadDefault(String),
    /// `rules` was present but not a JSON array.
    #[error("rules must be a sequence")]
    RulesNotSequence,
    /// A rule's `action_type` was missing, non-string, or empty.
    #[error("rules[{index}].action_type must be a non-empty string")]
    BadActionType {
        /// Index of the offending rule.
        index: usize,
    },
    /// A rule's `effect` was present but not `"allow"`/`"block"`.
    #[error("rules[{index}].effect must be 'allow' or 'block', got '{value}'")]
    BadEffect {
        /// Index of the offending rule.
        index: usize,
        /// The invalid value supplied.
        value: String,
    },
    /// A rule's constraint map had a validation failure.
    #[error("rules[{index}].constraints['{path}']: {reason}")]
    BadConstraint {
        /// Index of the offending rule.
        index: usize,
        /// Dotted parameter path the constraint applies to.
        path: String,
        /// Why the constraint was rejected.
        reason: String,
    },
    /// A rule's `rate_limit` had a non-positive or missing field.
    #[error("rules[{index}].rate_limit: {reason}")]
    BadRateLimit {
        /// Index of the offending rule.
        index: usize,
        /// Why the rate limit was rejected.
        reason: String,
    },
    /// A rule's `aggregate_limit` had a non-positive or missing field.
    #[error("rules[{index}].aggregate_limit: {reason}")]
    BadAggregateLimit {
        /// Index of the offending rule.
        index: usize,
        /// Why the aggregate limit was rejected.
        reason: String,
    },
}

/// Allow or block: the effect of a matched rule, and a policy's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Permit the action.
    Allow,
    /// Block the action.
    Block,
}

impl Effect {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Effect::Allow),
            "block" => Some(Effect::Block),
            _ => None,
        }
    }
}

/// `{ max_requests, window_seconds }` — a per-identity request-rate cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    /// Maximum admitted requests per window.
    pub max_requests: u64,
    /// Window length, in seconds.
    pub window_seconds: u64,
}

/// `{ field, max, window_seconds }` — a cumulative-value cap summed across
/// allowed events in a rolling window.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateLimit {
    /// Dotted parameter path whose numeric value is summed.
    pub field: String,
    /// Maximum cumulative value per window.
    pub max: f64,
    /// Window length, in seconds.
    pub window_seconds: u64,
}

/// One compiled entry of a policy's `rules` sequence.
#[derive(Debug, Clone)]
pub struct Rule {
    /// A literal action type, or the wildcard `"*"`.
    pub action_type: String,
    /// The effect applied when this rule matches with no constraint
    /// violation. Defaults to `Allow`.
    pub effect: Effect,
    /// Constraints, keyed by dotted parameter path, evaluated in ascending
    /// lexical path order (§4.1).
    pub constraints: BTreeMap<String, Constraint>,
    /// If present, only these agents may match this rule (others skip it).
    pub allowed_agents: Option<HashSet<String>>,
    /// If present, these agents are unconditionally blocked by this rule.
    /// `"*"` means all agents.
    pub blocked_agents: Option<HashSet<String>>,
    /// Optional per-identity request-rate cap.
    pub rate_limit: Option<RateLimit>,
    /// Optional cumulative-value cap.
    pub aggregate_limit: Option<AggregateLimit>,
}

/// A validated, in-memory policy document.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Human-readable policy name.
    pub name: String,
    /// Opaque version identifier, recorded on every `Decision`.
    pub version: String,
    /// Effect applied when no rule matches.
    pub default: Effect,
    /// Rules in declaration order.
    pub rules: Vec<Rule>,
}

impl Policy {
    /// The implicit policy used when a project has never configured one:
    /// no rules, default allow — unconfigured projects do not block (§4.5).
    #[must_use]
    pub fn empty_allow(version: impl Into<String>) -> Self {
        Self { name: String::new(), version: version.into(), default: Effect::Allow, rules: Vec::new() }
    }

    /// Select the rules applicable to `action_type`, literal matches before
    /// wildcard matches, ties broken by declaration order (§4.1).
    #[must_use]
    pub fn match_candidates<'a>(&'a self, action_type: &str) -> Vec<(usize, &'a Rule)> {
        let mut literal = Vec::new();
        let mut wildcard = Vec::new();
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.action_type == action_type {
                literal.push((index, rule));
            } else if rule.action_type == "*" {
                wildcard.push((index, rule));
            }
        }
        literal.extend(wildcard);
        literal
    }

    /// Load and validate a policy from an opaque JSON rule document.
    ///
    /// # Errors
    /// Returns [`PolicyMalformed`] on any of the conditions listed in §4.1:
    /// negative limits, unknown constraint tags, an uncompilable `pattern`,
    /// a `default` outside `{allow, block}`, a non-string `action_type`, or
    /// `rules` not given as a sequence. Unknown top-level document fields
    /// are tolerated.
    pub fn load(raw: &Value) -> Result<Self, PolicyMalformed> {
        let doc: RawPolicy =
            serde_json::from_value(raw.clone()).map_err(|e| PolicyMalformed::Shape(e.to_string()))?;

        let default = match &doc.default {
            Some(s) => Effect::parse(s).ok_or_else(|| PolicyMalformed::BadDefault(s.clone()))?,
            None => Effect::Allow,
        };

        let raw_rules = match raw.get("rules") {
            None => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => return Err(PolicyMalformed::RulesNotSequence),
        };

        let mut rules = Vec::with_capacity(raw_rules.len());
        for (index, raw_rule) in raw_rules.into_iter().enumerate() {
            rules.push(compile_rule(index, raw_rule)?);
        }

        Ok(Self {
            name: doc.name.unwrap_or_default(),
            version: doc.version.unwrap_or_else(|| "unversioned".to_string()),
            default,
            rules,
        })
    }

    /// Load and validate a policy from a YAML document (CLI/admin
    /// convenience); funnels through the same validation as [`Policy::load`].
    ///
    /// # Errors
    /// Returns [`PolicyMalformed`] if the YAML does not parse, or the same
    /// semantic errors as [`Policy::load`].
    pub fn load_from_yaml_str(yaml: &str) -> Result<Self, PolicyMalformed> {
        let value: Value =
            serde_yaml::from_str(yaml).map_err(|e| PolicyMalformed::Shape(e.to_string()))?;
        Self::load(&value)
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawPolicy {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    default: Option<String>,
    // `rules` is re-extracted from the raw Value directly (see Policy::load)
    // so that "present but not an array" can be distinguished from "absent".
    #[serde(default)]
    #[allow(dead_code)]
    rules: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
struct RawRule {
    #[serde(default)]
    action_type: Option<Value>,
    #[serde(default)]
    effect: Option<String>,
    #[serde(default)]
    constraints: Option<BTreeMap<String, RawConstraint>>,
    #[serde(default)]
    allowed_agents: Option<Vec<String>>,
    #[serde(default)]
    blocked_agents: Option<Vec<String>>,
    #[serde(default)]
    rate_limit: Option<RawRateLimit>,
    #[serde(default)]
    aggregate_limit: Option<RawAggregateLimit>,
}

#[derive(Debug, Deserialize)]
struct RawRateLimit {
    max_requests: i64,
    window_seconds: i64,
}

#[derive(Debug, Deserialize)]
struct RawAggregateLimit {
    field: String,
    max: f64,
    window_seconds: i64,
}

fn compile_rule(index: usize, raw_value: Value) -> Result<Rule, PolicyMalformed> {
    let raw: RawRule = serde_json::from_value(raw_value)
        .map_err(|e| PolicyMalformed::Shape(format!("rules[{index}]: {e}")))?;

    let action_type = match raw.action_type {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        _ => return Err(PolicyMalformed::BadActionType { index }),
    };

    let effect = match raw.effect {
        Some(s) => Effect::parse(&s).ok_or(PolicyMalformed::BadEffect { index, value: s })?,
        None => Effect::Allow,
    };

    let mut constraints = BTreeMap::new();
    if let Some(raw_constraints) = raw.constraints {
        for (path, raw_constraint) in raw_constraints {
            let compiled = Constraint::compile(raw_constraint).map_err(|reason| {
                PolicyMalformed::BadConstraint { index, path: path.clone(), reason }
            })?;
            constraints.insert(path, compiled);
        }
    }

    let allowed_agents = raw.allowed_agents.map(|v| v.into_iter().collect::<HashSet<_>>());
    let blocked_agents = raw.blocked_agents.map(|v| v.into_iter().collect::<HashSet<_>>());

    let rate_limit = match raw.rate_limit {
        Some(r) => {
            if r.max_requests <= 0 {
                return Err(PolicyMalformed::BadRateLimit {
                    index,
                    reason: "max_requests must be a positive integer".into(),
                });
            }
            if r.window_seconds <= 0 {
                return Err(PolicyMalformed::BadRateLimit {
                    index,
                    reason: "window_seconds must be a positive integer".into(),
                });
            }
            Some(RateLimit { max_requests: r.max_requests as u64, window_seconds: r.window_seconds as u64 })
        }
        None => None,
    };

    let aggregate_limit = match raw.aggregate_limit {
        Some(a) => {
            if a.window_seconds <= 0 {
                return Err(PolicyMalformed::BadAggregateLimit {
                    index,
                    reason: "window_seconds must be a positive integer".into(),
                });
            }
            if !(a.max.is_finite()) || a.max <= 0.0 {
                return Err(PolicyMalformed::BadAggregateLimit {
                    index,
                    reason: "max must be a positive, finite number".into(),
                });
            }
            if a.field.trim().is_empty() {
                return Err(PolicyMalformed::BadAggregateLimit {
                    index,
                    reason: "field must be non-empty".into(),
                });
            }
            Some(AggregateLimit { field: a.field, max: a.max, window_seconds: a.window_seconds as u64 })
        }
        None => None,
    };

    Ok(Rule { action_type, effect, constraints, allowed_agents, blocked_agents, rate_limit, aggregate_limit })
}
