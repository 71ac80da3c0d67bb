//! Rule Matcher (C3): selects the applicable rule for an action and
//! produces a base allow/block verdict from agent lists and constraints.

use serde_json::Value;

use crate::constraint::evaluate;
use crate::model::{Effect, Policy, Rule};

/// The intermediate outcome of rule matching: allow-pending, block, or
/// fall-through to the policy default.
#[derive(Debug, Clone)]
pub enum Verdict<'a> {
    /// A rule matched with no violation; quota checks follow before the
    /// final `Decision` is produced.
    AllowPending {
        /// Index of the matched rule within `policy.rules`.
        rule_index: usize,
        /// The matched rule.
        rule: &'a Rule,
    },
    /// A rule or the policy default determined an immediate block.
    Block {
        /// Human-readable reason naming the failing predicate.
        reason: String,
    },
    /// No candidate rule matched; the policy's default effect applies with
    /// no further checks.
    Default {
        /// The policy's configured default effect.
        effect: Effect,
    },
}

/// Run the full rule-matching algorithm (§4.3) for one action.
#[must_use]
pub fn match_rule<'a>(policy: &'a Policy, agent_name: &str, action_type: &str, params: &Value) -> Verdict<'a> {
    for (rule_index, rule) in policy.match_candidates(action_type) {
        if let Some(allowed) = &rule.allowed_agents {
            if !allowed.contains(agent_name) {
                continue;
            }
        }

        if let Some(blocked) = &rule.blocked_agents {
            if blocked.contains(agent_name) || blocked.contains("*") {
                return Verdict::Block {
                    reason: format!("agent {agent_name} is blocked for action {action_type}"),
                };
            }
        }

        if let Some(violation) = first_violation(rule, params) {
            return Verdict::Block { reason: violation };
        }

        if rule.effect == Effect::Block {
            return Verdict::Block {
                reason: format!("rule {rule_index} declares action {action_type} blocked"),
            };
        }

        return Verdict::AllowPending { rule_index, rule };
    }

    Verdict::Default { effect: policy.default }
}

fn first_violation(rule: &Rule, params: &Value) -> Option<String> {
    for (path, constraint) in &rule.constraints {
        let result = evaluate(path, constraint, params);
        if !result.satisfied {
            return Some(result.reason.unwrap_or_else(|| format!("{path}: constraint violated")));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Policy;
    use serde_json::json;

    fn policy_from(raw: Value) -> Policy {
        Policy::load(&raw).unwrap()
    }

    #[test]
    fn no_candidates_falls_through_to_default() {
        let policy = policy_from(json!({"default": "block", "rules": []}));
        let verdict = match_rule(&policy, "agent-a", "pay_invoice", &json!({}));
        assert!(matches!(verdict, Verdict::Default { effect: Effect::Block }));
    }

    #[test]
    fn allowed_agents_gate_skips_non_members() {
        let policy = policy_from(json!({
            "default": "allow",
            "rules": [
                {"action_type": "pay_invoice", "allowed_agents": ["trusted-bot"], "effect": "block"},
                {"action_type": "pay_invoice", "effect": "allow"}
            ]
        }));
        let verdict = match_rule(&policy, "other-bot", "pay_invoice", &json!({}));
        assert!(matches!(verdict, Verdict::AllowPending { rule_index: 1, .. }));
    }

    #[test]
    fn allowed_agents_gate_admits_members() {
        let policy = policy_from(json!({
            "default": "allow",
            "rules": [{"action_type": "pay_invoice", "allowed_agents": ["trusted-bot"], "effect": "block"}]
        }));
        let verdict = match_rule(&policy, "trusted-bot", "pay_invoice", &json!({}));
        assert!(matches!(verdict, Verdict::Block { .. }));
    }

    #[test]
    fn blocked_agents_bar_is_immediate() {
        let policy = policy_from(json!({
            "default": "allow",
            "rules": [{"action_type": "pay_invoice", "blocked_agents": ["rogue-bot"]}]
        }));
        let verdict = match_rule(&policy, "rogue-bot", "pay_invoice", &json!({}));
        match verdict {
            Verdict::Block { reason } => assert!(reason.contains("rogue-bot")),
            _ => panic!("expected block"),
        }
    }

    #[test]
    fn blocked_agents_wildcard_blocks_everyone() {
        let policy = policy_from(json!({
            "default": "allow",
            "rules": [{"action_type": "pay_invoice", "blocked_agents": ["*"]}]
        }));
        assert!(matches!(
            match_rule(&policy, "anyone", "pay_invoice", &json!({})),
            Verdict::Block { .. }
        ));
    }

    #[test]
    fn constraint_violation_blocks_with_evaluator_reason() {
        let policy = policy_from(json!({
            "default": "allow",
            "rules": [{
                "action_type": "pay_invoice",
                "constraints": {"params.amount": {"max": 100}}
            }]
        }));
        let verdict = match_rule(&policy, "a", "pay_invoice", &json!({"params": {"amount": 500}}));
        match verdict {
            Verdict::Block { reason } => assert!(reason.contains("tag: max")),
            _ => panic!("expected block"),
        }
    }

    #[test]
    fn matched_rule_with_no_violation_allows_pending() {
        let policy = policy_from(json!({
            "default": "block",
            "rules": [{
                "action_type": "pay_invoice",
                "constraints": {"params.amount": {"max": 100}}
            }]
        }));
        let verdict = match_rule(&policy, "a", "pay_invoice", &json!({"params": {"amount": 50}}));
        assert!(matches!(verdict, Verdict::AllowPending { rule_index: 0, .. }));
    }

    #[test]
    fn explicit_block_effect_short_circuits_quota() {
        let policy = policy_from(json!({
            "default": "allow",
            "rules": [{"action_type": "pay_invoice", "effect": "block"}]
        }));
        let verdict = match_rule(&policy, "a", "pay_invoice", &json!({}));
        assert!(matches!(verdict, Verdict::Block { .. }));
    }

    #[test]
    fn allowed_agents_gate_lets_later_rules_apply() {
        // First rule's gate excludes the agent; the wildcard rule picks up instead.
        let policy = policy_from(json!({
            "default": "block",
            "rules": [
                {"action_type": "pay_invoice", "allowed_agents": ["only-this-one"], "effect": "allow"},
                {"action_type": "*", "effect": "allow"}
            ]
        }));
        let verdict = match_rule(&policy, "someone-else", "pay_invoice", &json!({}));
        assert!(matches!(verdict, Verdict::AllowPending { rule_index: 1, .. }));
    }
}
