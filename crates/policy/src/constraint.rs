//! Constraint Evaluator (C2): evaluates one `(path, Constraint)` tuple
//! against a `params` tree.

use gateway_core::action::resolve_path;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// Maximum length of an observed-value snippet embedded in a violation
/// reason, so reasons never echo unbounded parameter content (§7).
const MAX_VALUE_SNIPPET: usize = 80;

/// Raw, not-yet-compiled constraint as deserialized from a policy document.
/// Unknown tags are rejected at the `serde` layer (`deny_unknown_fields`),
/// matching "unknown tags is an error at policy-load time" (§4.1).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConstraint {
    /// `{min: number}` tag.
    pub min: Option<f64>,
    /// `{max: number}` tag.
    pub max: Option<f64>,
    /// `{in: [value,...]}` tag.
    #[serde(rename = "in", default)]
    pub in_values: Option<Vec<Value>>,
    /// `{not_in: [value,...]}` tag.
    #[serde(default)]
    pub not_in: Option<Vec<Value>>,
    /// `{equals: value}` tag.
    #[serde(default)]
    pub equals: Option<Value>,
    /// `{pattern: regex-string}` tag.
    #[serde(default)]
    pub pattern: Option<String>,
}

/// A compiled regex pattern constraint, retaining its source text for
/// diagnostics.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    /// The original pattern text, as authored in the policy document.
    pub source: String,
    /// The compiled matcher.
    pub regex: Regex,
}

/// A validated constraint: one or more compatible tags evaluated together
/// against the same resolved value.
#[derive(Debug, Clone, Default)]
pub struct Constraint {
    /// `{min: number}` tag.
    pub min: Option<f64>,
    /// `{max: number}` tag.
    pub max: Option<f64>,
    /// `{in: [value,...]}` tag.
    pub in_values: Option<Vec<Value>>,
    /// `{not_in: [value,...]}` tag.
    pub not_in: Option<Vec<Value>>,
    /// `{equals: value}` tag.
    pub equals: Option<Value>,
    /// `{pattern: regex-string}` tag, pre-compiled.
    pub pattern: Option<CompiledPattern>,
}

impl Constraint {
    /// Compile a [`RawConstraint`], rejecting an invalid `pattern` regex.
    ///
    /// # Errors
    /// Returns a human-readable message if `pattern` does not compile.
    pub fn compile(raw: RawConstraint) -> Result<Self, String> {
        let pattern = match raw.pattern {
            Some(src) => {
                let regex =
                    Regex::new(&src).map_err(|e| format!("invalid pattern '{src}': {e}"))?;
                Some(CompiledPattern { source: src, regex })
            }
            None => None,
        };
        Ok(Self {
            min: raw.min,
            max: raw.max,
            in_values: raw.in_values,
            not_in: raw.not_in,
            equals: raw.equals,
            pattern,
        })
    }
}

/// Outcome of evaluating one constraint against a resolved parameter value.
#[derive(Debug, Clone)]
pub struct EvalResult {
    /// Whether every tag present on the constraint was satisfied.
    pub satisfied: bool,
    /// Populated with the first failing tag's reason when `!satisfied`.
    pub reason: Option<String>,
}

fn satisfied() -> EvalResult {
    EvalResult { satisfied: true, reason: None }
}

fn violated(reason: String) -> EvalResult {
    EvalResult { satisfied: false, reason: Some(reason) }
}

fn snippet(v: Option<&Value>) -> String {
    let text = match v {
        None => "<absent>".to_string(),
        Some(value) => value.to_string(),
    };
    if text.len() <= MAX_VALUE_SNIPPET {
        text
    } else {
        let mut end = MAX_VALUE_SNIPPET;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

fn as_finite_number(v: Option<&Value>) -> Option<f64> {
    let n = v?.as_f64()?;
    n.is_finite().then_some(n)
}

/// Evaluate a single `(path, constraint)` tuple against `params`.
///
/// A missing path ("`PathAbsent`") is a violation for every positive tag
/// (`min`, `max`, `in`, `equals`, `pattern`) and vacuously satisfied for
/// `not_in`. When multiple tags are present on one constraint, they are
/// checked in the fixed order `min, max, in, not_in, equals, pattern`
/// (§4.2) and the first failing tag determines the reason.
#[must_use]
pub fn evaluate(path: &str, constraint: &Constraint, params: &Value) -> EvalResult {
    let resolved = resolve_path(params, path);

    if let Some(n) = constraint.min {
        match as_finite_number(resolved) {
            Some(v) if v >= n => {}
            _ => {
                return violated(format!(
                    "{path}: value {} does not meet minimum {n} (tag: min)",
                    snippet(resolved)
                ))
            }
        }
    }
    if let Some(n) = constraint.max {
        match as_finite_number(resolved) {
            Some(v) if v <= n => {}
            _ => {
                return violated(format!(
                    "{path}: value {} exceeds maximum {n} (tag: max)",
                    snippet(resolved)
                ))
            }
        }
    }
    if let Some(values) = &constraint.in_values {
        match resolved {
            Some(v) if values.iter().any(|candidate| candidate == v) => {}
            _ => {
                return violated(format!(
                    "{path}: value {} is not one of the allowed values (tag: in)",
                    snippet(resolved)
                ))
            }
        }
    }
    if let Some(values) = &constraint.not_in {
        match resolved {
            None => {}
            Some(v) if !values.iter().any(|candidate| candidate == v) => {}
            _ => {
                return violated(format!(
                    "{path}: value {} is on the blocked list (tag: not_in)",
                    snippet(resolved)
                ))
            }
        }
    }
    if let Some(expected) = &constraint.equals {
        match resolved {
            Some(v) if v == expected => {}
            _ => {
                return violated(format!(
                    "{path}: value {} does not equal required value {expected} (tag: equals)",
                    snippet(resolved)
                ))
            }
        }
    }
    if let Some(p) = &constraint.pattern {
        match resolved {
            Some(Value::String(s)) if p.regex.is_match(s) => {}
            _ => {
                return violated(format!(
                    "{path}: value {} does not match pattern '{}' (tag: pattern)",
                    snippet(resolved),
                    p.source
                ))
            }
        }
    }
    satisfied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(raw: RawConstraint) -> Constraint {
        Constraint::compile(raw).unwrap()
    }

    #[test]
    fn min_max_combined() {
        let c = compile(RawConstraint { min: Some(0.0), max: Some(10_000.0), ..Default::default() });
        let params = json!({"params": {"amount": 5000}});
        assert!(evaluate("params.amount", &c, &params).satisfied);

        let params_high = json!({"params": {"amount": 50_000}});
        let r = evaluate("params.amount", &c, &params_high);
        assert!(!r.satisfied);
        assert!(r.reason.unwrap().contains("10000"));
    }

    #[test]
    fn in_rejects_absent_and_non_member() {
        let c = compile(RawConstraint {
            in_values: Some(vec![json!("USD"), json!("EUR")]),
            ..Default::default()
        });
        assert!(evaluate("params.currency", &c, &json!({"params": {"currency": "USD"}})).satisfied);
        assert!(!evaluate("params.currency", &c, &json!({"params": {"currency": "JPY"}})).satisfied);
        assert!(!evaluate("params.currency", &c, &json!({"params": {}})).satisfied);
        assert!(!evaluate("params.currency", &c, &json!({"params": {"currency": null}})).satisfied);
    }

    #[test]
    fn not_in_is_vacuous_on_absent_and_null() {
        let c = compile(RawConstraint {
            not_in: Some(vec![json!("blocked")]),
            ..Default::default()
        });
        assert!(evaluate("params.tag", &c, &json!({"params": {}})).satisfied);
        assert!(evaluate("params.tag", &c, &json!({"params": {"tag": null}})).satisfied);
        assert!(!evaluate("params.tag", &c, &json!({"params": {"tag": "blocked"}})).satisfied);
    }

    #[test]
    fn numeric_constraint_against_non_numeric_is_violation_not_error() {
        let c = compile(RawConstraint { min: Some(1.0), ..Default::default() });
        let r = evaluate("params.amount", &c, &json!({"params": {"amount": "oops"}}));
        assert!(!r.satisfied);
    }

    #[test]
    fn pattern_partial_match_without_anchors() {
        let c = compile(RawConstraint { pattern: Some("ab+c".into()), ..Default::default() });
        assert!(evaluate("params.s", &c, &json!({"params": {"s": "xxabbcyy"}})).satisfied);
        assert!(!evaluate("params.s", &c, &json!({"params": {"s": "xyz"}})).satisfied);
    }

    #[test]
    fn pattern_against_non_string_is_violation() {
        let c = compile(RawConstraint { pattern: Some(".*".into()), ..Default::default() });
        assert!(!evaluate("params.s", &c, &json!({"params": {"s": 5}})).satisfied);
    }

    #[test]
    fn invalid_regex_fails_to_compile() {
        let raw = RawConstraint { pattern: Some("(".into()), ..Default::default() };
        assert!(Constraint::compile(raw).is_err());
    }

    #[test]
    fn unknown_tag_is_rejected_at_deserialize() {
        let err = serde_json::from_value::<RawConstraint>(json!({"min": 1, "bogus": true}))
            .unwrap_err();
        assert!(err.to_string().contains("bogus") || err.to_string().contains("unknown"));
    }

    #[test]
    fn equals_tag() {
        let c = compile(RawConstraint { equals: Some(json!("exact")), ..Default::default() });
        assert!(evaluate("p", &c, &json!({"p": "exact"})).satisfied);
        assert!(!evaluate("p", &c, &json!({"p": "other"})).satisfied);
        assert!(!evaluate("p", &c, &json!({})).satisfied);
    }

    #[test]
    fn fixed_tag_order_reports_first_failure() {
        // min fails first even though max is also violated-adjacent; order is min,max,in,not_in,equals,pattern.
        let c = compile(RawConstraint { min: Some(100.0), max: Some(1.0), ..Default::default() });
        let r = evaluate("p", &c, &json!({"p": 50}));
        assert!(r.reason.unwrap().contains("tag: min"));
    }
}
