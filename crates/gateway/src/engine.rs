//! The Decision Pipeline (C5): the single public `decide` operation that
//! orchestrates policy fetch, matching, quota gating, simulation, and
//! audit emission.

use std::sync::Arc;
use std::time::{Duration, Instant};

use audit::{AuditQuery, AuditQueryError, AuditSink};
use dashmap::DashMap;
use gateway_core::action::resolve_path;
use gateway_core::{Action, AuditEntry, Clock, Decision, InfraFault};
use gateway_core::decision::truncate_reason;
use gateway_core::ids::new_action_id;
use policy::{match_rule, Effect, Policy, Rule, Verdict};
use quota::{CounterStore, QuotaEngine};
use telemetry::GatewayMetrics;
use tracing::{instrument, warn};

use crate::config::GatewayConfig;
use crate::error::GatewayFault;
use crate::store::PolicyStore;

struct CachedPolicy {
    policy: Arc<Policy>,
    fetched_at_ms: u64,
}

/// Options accepted by [`Engine::decide`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DecideOptions {
    /// If set, the pipeline evaluates the action but records no quota
    /// increments, assigns no `action_id`, and emits no `AuditEntry` (§4.5).
    pub simulate: bool,
}

/// The Decision Pipeline: ties the Policy Model, Rule Matcher, Constraint
/// Evaluator, and Quota Engine together behind one `decide` operation.
pub struct Engine {
    policy_store: Arc<dyn PolicyStore>,
    counter_store: Arc<dyn CounterStore>,
    audit_sink: Arc<dyn AuditSink>,
    audit_query: Option<Arc<dyn AuditQuery>>,
    clock: Arc<dyn Clock>,
    metrics: GatewayMetrics,
    config: GatewayConfig,
    cache: DashMap<String, CachedPolicy>,
}

impl Engine {
    /// Construct a pipeline over the given collaborators.
    #[must_use]
    pub fn new(
        policy_store: Arc<dyn PolicyStore>,
        counter_store: Arc<dyn CounterStore>,
        audit_sink: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            policy_store,
            counter_store,
            audit_sink,
            audit_query: None,
            clock,
            metrics: GatewayMetrics::new(),
            config,
            cache: DashMap::new(),
        }
    }

    /// Attach a read-back collaborator for administrative `ListAudit` calls.
    #[must_use]
    pub fn with_audit_query(mut self, audit_query: Arc<dyn AuditQuery>) -> Self {
        self.audit_query = Some(audit_query);
        self
    }

    /// The in-process decision/quota/audit counters accumulated so far.
    #[must_use]
    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    /// Evaluate `action` and return a `Decision`.
    ///
    /// # Errors
    /// Returns [`GatewayFault`] if `action` fails validation, or if an
    /// infrastructure fault occurs while `fail_closed` is disabled.
    #[instrument(skip_all, fields(project_id = %action.project_id, agent_name = %action.agent_name, action_type = %action.action_type))]
    pub fn decide(&self, action: &Action, options: DecideOptions) -> Result<Decision, GatewayFault> {
        let timer = Instant::now();
        action.validate()?;

        let policy = match self.fetch_policy(&action.project_id) {
            Ok(p) => p,
            Err(fault) => return self.fail_closed_or_err(fault, &timer, "unavailable".to_string()),
        };

        let (mut allowed, mut reason, matched_rule) = self.evaluate_verdict(&policy, action);

        if allowed && !options.simulate {
            if let Some((rule_index, rule)) = matched_rule {
                match self.apply_quota(&policy, rule_index, rule, action, &timer) {
                    Ok(Some(refusal_reason)) => {
                        allowed = false;
                        reason = Some(refusal_reason);
                    }
                    Ok(None) => {}
                    Err(fault) => return self.fail_closed_or_err(fault, &timer, policy.version.clone()),
                }
            }
        }

        let decision = self.finalize(&policy, action, allowed, reason, options, &timer);

        if !options.simulate {
            self.submit_audit(action, &decision);
        }
        self.metrics.record_decision(decision.allowed);

        Ok(decision)
    }

    /// Evaluate match + constraints (C3) and apply the policy default
    /// (§4.5 steps 2–3).
    fn evaluate_verdict<'a>(
        &self,
        policy: &'a Policy,
        action: &Action,
    ) -> (bool, Option<String>, Option<(usize, &'a Rule)>) {
        match match_rule(policy, &action.agent_name, &action.action_type, &action.params) {
            Verdict::AllowPending { rule_index, rule } => (true, None, Some((rule_index, rule))),
            Verdict::Block { reason } => (false, Some(reason), None),
            Verdict::Default { effect: Effect::Allow } => (true, None, None),
            Verdict::Default { effect: Effect::Block } => {
                (false, Some("no matching rule; policy default is block".to_string()), None)
            }
        }
    }

    /// Quota gating for a matched, non-simulated rule (§4.4, §4.5 step 4).
    /// Returns `Ok(Some(reason))` if the action is refused, `Ok(None)` if
    /// it is admitted (and recorded).
    fn apply_quota(
        &self,
        policy: &Policy,
        rule_index: usize,
        rule: &Rule,
        action: &Action,
        timer: &Instant,
    ) -> Result<Option<String>, InfraFault> {
        let _ = timer;
        let now_ms = self.clock.now_ms();
        let quota = QuotaEngine::new(self.counter_store.as_ref());

        let mut recorded: Option<(String, f64)> = None;

        if let Some(rate_limit) = &rule.rate_limit {
            let key = QuotaEngine::request_key(&action.project_id, &action.agent_name, &action.action_type);
            let check = quota.try_consume(key, rate_limit.max_requests, rate_limit.window_seconds, now_ms)?;
            if !check.admitted {
                self.metrics.record_rate_refusal();
                return Ok(Some(check.reason));
            }
            recorded = Some((check.key, 1.0));
        }

        if let Some(aggregate_limit) = &rule.aggregate_limit {
            let value =
                resolve_path(&action.params, &aggregate_limit.field).and_then(serde_json::Value::as_f64).unwrap_or(0.0);
            let rule_identity = format!("{}:{rule_index}", policy.version);
            let key = QuotaEngine::aggregate_key(&action.project_id, &rule_identity);
            let check = quota.try_add(key, value, aggregate_limit.max, aggregate_limit.window_seconds, now_ms)?;
            if !check.admitted {
                self.metrics.record_aggregate_refusal();
                if let Some((rollback_key, weight)) = recorded.take() {
                    if let Err(e) = quota.rollback(&rollback_key, weight, now_ms) {
                        warn!(error = %e, "failed to roll back rate-limit consumption after aggregate refusal");
                    }
                }
                return Ok(Some(check.reason));
            }
        }

        Ok(None)
    }

    fn finalize(
        &self,
        policy: &Policy,
        action: &Action,
        allowed: bool,
        reason: Option<String>,
        options: DecideOptions,
        timer: &Instant,
    ) -> Decision {
        let _ = action;
        let timestamp = self.clock.now_ms();
        let execution_time_ms = timer.elapsed().as_secs_f64() * 1000.0;
        let action_id = if options.simulate { None } else { Some(new_action_id()) };

        if allowed {
            Decision::allow(action_id, timestamp, policy.version.clone(), execution_time_ms, options.simulate)
        } else {
            let reason = truncate_reason(&reason.unwrap_or_else(|| "blocked".to_string()));
            Decision::block(action_id, timestamp, reason, policy.version.clone(), execution_time_ms, options.simulate)
        }
    }

    fn submit_audit(&self, action: &Action, decision: &Decision) {
        let entry = AuditEntry::from_action_and_decision(action, decision);
        if !self.audit_sink.append(entry) {
            self.metrics.record_audit_dropped(1);
            warn!(project_id = %action.project_id, "audit entry dropped due to backpressure");
        }
    }

    fn fail_closed_or_err(
        &self,
        fault: InfraFault,
        timer: &Instant,
        policy_version: String,
    ) -> Result<Decision, GatewayFault> {
        if !self.config.fail_closed {
            return Err(GatewayFault::Infra(fault));
        }
        warn!(error = %fault, "infrastructure fault; applying fail-closed block");
        let reason = self
            .config
            .fail_closed_reason
            .clone()
            .unwrap_or_else(|| "service unavailable (fail-closed)".to_string());
        let timestamp = self.clock.now_ms();
        let execution_time_ms = timer.elapsed().as_secs_f64() * 1000.0;
        Ok(Decision::block(None, timestamp, reason, policy_version, execution_time_ms, false))
    }

    /// Fetch the active policy for `project_id`, consulting the read-mostly
    /// cache first (§4.5 step 1, §5 cache TTL). A project with no policy
    /// ever configured resolves to an implicit `default=allow` policy —
    /// unconfigured projects do not block.
    fn fetch_policy(&self, project_id: &str) -> Result<Arc<Policy>, InfraFault> {
        let now_ms = self.clock.now_ms();
        let ttl_ms = self.config.policy_cache_ttl_seconds * 1000;

        if let Some(cached) = self.cache.get(project_id) {
            if now_ms.saturating_sub(cached.fetched_at_ms) < ttl_ms {
                return Ok(cached.policy.clone());
            }
        }

        let policy = match self.policy_store.get(project_id)? {
            Some(p) => p,
            None => Arc::new(Policy::empty_allow("unconfigured")),
        };
        self.cache.insert(project_id.to_string(), CachedPolicy { policy: policy.clone(), fetched_at_ms: now_ms });
        Ok(policy)
    }

    /// Replace a project's active policy and invalidate its cache entry so
    /// subsequent `Decide` calls observe it immediately (§5).
    ///
    /// # Errors
    /// Returns [`GatewayFault`] if the `PolicyStore` is unavailable.
    pub fn upsert_policy(&self, project_id: &str, raw: &serde_json::Value) -> Result<(), GatewayFault> {
        let policy = Policy::load(raw)?;
        self.policy_store.put(project_id, policy)?;
        self.cache.remove(project_id);
        Ok(())
    }

    /// Fetch the currently active policy for `project_id` (administrative
    /// `GetActivePolicy`), bypassing nothing — this consults the same cache
    /// `decide` uses.
    ///
    /// # Errors
    /// Returns [`GatewayFault`] if the `PolicyStore` is unavailable.
    pub fn get_active_policy(&self, project_id: &str) -> Result<Arc<Policy>, GatewayFault> {
        Ok(self.fetch_policy(project_id)?)
    }

    /// List audit entries recorded for `project_id` (administrative
    /// `ListAudit`), if an `AuditQuery` collaborator was attached.
    ///
    /// # Errors
    /// Returns [`AuditQueryError`] if no query collaborator is attached or
    /// the backing store cannot be read.
    pub fn list_audit(&self, project_id: &str) -> Result<Vec<AuditEntry>, AuditQueryError> {
        match &self.audit_query {
            Some(query) => query.list(project_id),
            None => Err(AuditQueryError::Malformed("no AuditQuery collaborator attached".to_string())),
        }
    }

    /// Run `decide` under a deadline, surfacing `DeadlineExceeded` as an
    /// infrastructure fault if it elapses (§5 cancellation and timeouts).
    ///
    /// # Errors
    /// Returns [`GatewayFault`] on validation failure, collaborator fault,
    /// or deadline elapse while `fail_closed` is disabled.
    pub async fn decide_with_deadline(
        self: &Arc<Self>,
        action: Action,
        options: DecideOptions,
        deadline: Duration,
    ) -> Result<Decision, GatewayFault> {
        let engine = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || engine.decide(&action, options));
        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                Err(GatewayFault::Infra(InfraFault::Internal(format!("decide task panicked: {join_error}"))))
            }
            Err(_elapsed) => self.fail_closed_or_err(InfraFault::DeadlineExceeded, &Instant::now(), "unknown".to_string()),
        }
    }
}
