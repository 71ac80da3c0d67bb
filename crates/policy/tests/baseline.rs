//! Baseline end-to-end matching scenarios against a loaded policy document.

use policy::{match_rule, Effect, Policy, Verdict};
use serde_json::json;

fn s1_s4_policy() -> Policy {
    Policy::load(&json!({
        "default": "block",
        "rules": [{
            "action_type": "pay_invoice",
            "constraints": {
                "params.amount": {"max": 10000, "min": 0},
                "params.currency": {"in": ["USD", "EUR"]}
            }
        }]
    }))
    .unwrap()
}

#[test]
fn allowed_payment_matches_and_satisfies_constraints() {
    let policy = s1_s4_policy();
    let verdict = match_rule(&policy, "invoice_agent", "pay_invoice", &json!({"amount": 5000, "currency": "USD"}));
    assert!(matches!(verdict, Verdict::AllowPending { rule_index: 0, .. }));
}

#[test]
fn amount_too_high_blocks_with_path_and_limit_in_reason() {
    let policy = s1_s4_policy();
    let verdict = match_rule(&policy, "invoice_agent", "pay_invoice", &json!({"amount": 50_000, "currency": "USD"}));
    match verdict {
        Verdict::Block { reason } => {
            assert!(reason.contains("params.amount"));
            assert!(reason.contains("10000"));
        }
        _ => panic!("expected block"),
    }
}

#[test]
fn currency_not_in_allowed_set_blocks() {
    let policy = s1_s4_policy();
    let verdict = match_rule(&policy, "invoice_agent", "pay_invoice", &json!({"amount": 100, "currency": "JPY"}));
    match verdict {
        Verdict::Block { reason } => assert!(reason.contains("params.currency")),
        _ => panic!("expected block"),
    }
}

#[test]
fn unmatched_action_type_falls_through_to_default() {
    let policy = s1_s4_policy();
    let verdict = match_rule(&policy, "invoice_agent", "delete_user", &json!({}));
    assert!(matches!(verdict, Verdict::Default { effect: Effect::Block }));
}

#[test]
fn missing_param_vs_present_null_boundary_behaviors() {
    let policy = Policy::load(&json!({
        "default": "allow",
        "rules": [{
            "action_type": "t",
            "constraints": {
                "p.not_in_field": {"not_in": ["blocked"]},
                "p.in_field": {"in": ["a", "b"]}
            }
        }]
    }))
    .unwrap();

    // `not_in` is satisfied by both an absent field and an explicit null.
    let verdict = match_rule(&policy, "a", "t", &json!({"p": {"in_field": "a"}}));
    assert!(matches!(verdict, Verdict::AllowPending { .. }));
    let verdict = match_rule(&policy, "a", "t", &json!({"p": {"in_field": "a", "not_in_field": null}}));
    assert!(matches!(verdict, Verdict::AllowPending { .. }));

    // `in` is violated by both an absent field and an explicit null.
    let verdict = match_rule(&policy, "a", "t", &json!({"p": {}}));
    assert!(matches!(verdict, Verdict::Block { .. }));
    let verdict = match_rule(&policy, "a", "t", &json!({"p": {"in_field": null}}));
    assert!(matches!(verdict, Verdict::Block { .. }));
}
