// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Evaluation Engine
//!
//! Turns (principal, capability, environment, claims) into a
//! [`PolicyEvaluationResult`].
//!
//! ## Algorithm
//!
//! ```text
//! rules in request environment
//!   └─ pass 1: principal bound to this exact subject
//!   └─ pass 2: principal bound to one of the caller's groups
//!   └─ pass 3: principal with a bare type (no subject/group binding)
//!        └─ first rule whose capabilities match AND whose conditions hold wins
//! no winner → Denied(NoMatchingPolicy)
//! ```
//!
//! Conditions are independent fail-closed checks: a present condition whose
//! input is missing denies. There is no explicit DENY effect.
//!
//! The evaluated policy sits behind a single swappable reference so
//! [`PolicyEngine::reload`] is atomic for in-flight evaluations.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::domain::access_policy::{AccessPolicy, PolicyConditions, PolicyRule, TimeWindow};
use crate::domain::capability::CapabilityPattern;
use crate::domain::evaluation::{
    Decision, DenialReason, EvaluationClaims, EvaluationErrorKind, PolicyEvaluationResult,
};
use crate::domain::principal::{Environment, PrincipalType, VerifiedPrincipal};

/// One authorization question.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub principal_id: &'a str,
    pub groups: &'a [String],
    pub principal_type: PrincipalType,
    pub capability: &'a str,
    pub environment: &'a str,
    pub claims: &'a EvaluationClaims,
}

impl<'a> AccessRequest<'a> {
    pub fn for_principal(
        principal: &'a VerifiedPrincipal,
        capability: &'a str,
        environment: &'a str,
        claims: &'a EvaluationClaims,
    ) -> Self {
        Self {
            principal_id: &principal.subject,
            groups: &principal.groups,
            principal_type: principal.principal_type,
            capability,
            environment,
            claims,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchPass {
    Subject,
    Group,
    Type,
}

const PASSES: [MatchPass; 3] = [MatchPass::Subject, MatchPass::Group, MatchPass::Type];

pub struct PolicyEngine {
    policy: RwLock<Arc<AccessPolicy>>,
}

impl PolicyEngine {
    /// `policy` must already have passed
    /// [`crate::application::policy_loader::validate_policy`].
    pub fn new(policy: AccessPolicy) -> Self {
        Self {
            policy: RwLock::new(Arc::new(policy)),
        }
    }

    /// Swaps in a new, already validated policy.
    pub fn reload(&self, policy: AccessPolicy) {
        let rules = policy.policies.len();
        *self.policy.write() = Arc::new(policy);
        info!(rules, "Policy engine reloaded");
    }

    pub fn policy(&self) -> Arc<AccessPolicy> {
        Arc::clone(&self.policy.read())
    }

    pub fn evaluate(&self, request: &AccessRequest<'_>) -> PolicyEvaluationResult {
        self.evaluate_at(request, Utc::now())
    }

    /// Evaluates against an explicit clock reading.
    pub fn evaluate_at(&self, request: &AccessRequest<'_>, now: DateTime<Utc>) -> PolicyEvaluationResult {
        let result = self.decide(request, now);
        let outcome = match &result.decision {
            Decision::Allowed { policy_name } => {
                debug!(
                    principal = %request.principal_id,
                    capability = %request.capability,
                    environment = %request.environment,
                    policy = %policy_name,
                    "Access granted"
                );
                "allowed"
            }
            Decision::Denied(reason) => {
                info!(
                    principal = %request.principal_id,
                    capability = %request.capability,
                    environment = %request.environment,
                    %reason,
                    "Access denied"
                );
                "denied"
            }
            Decision::Error(kind) => {
                info!(principal = %request.principal_id, error = %kind, "Access request could not be evaluated");
                "error"
            }
        };
        metrics::counter!("policy_evaluations_total", "outcome" => outcome).increment(1);
        result
    }

    fn decide(&self, request: &AccessRequest<'_>, now: DateTime<Utc>) -> PolicyEvaluationResult {
        let Ok(environment) = Environment::from_str(request.environment) else {
            return PolicyEvaluationResult::error(EvaluationErrorKind::UnknownEnvironment(
                request.environment.to_string(),
            ));
        };

        let policy = self.policy();
        let rules: Vec<&PolicyRule> = policy
            .policies
            .iter()
            .filter(|rule| rule.applies_to(environment))
            .collect();

        for pass in PASSES {
            for rule in &rules {
                if !principal_matches(&policy, rule, pass, request) {
                    continue;
                }
                if !capability_matches(&policy, rule, request.capability) {
                    continue;
                }
                match conditions_hold(rule.conditions.as_ref(), request.claims, now) {
                    Ok(()) => return PolicyEvaluationResult::allow(&rule.name, rule.audit),
                    Err(condition) => debug!(
                        rule = %rule.name,
                        condition,
                        "Rule matched but condition not satisfied"
                    ),
                }
            }
        }

        PolicyEvaluationResult::deny(DenialReason::NoMatchingPolicy)
    }
}

fn principal_matches(policy: &AccessPolicy, rule: &PolicyRule, pass: MatchPass, request: &AccessRequest<'_>) -> bool {
    let Some(definition) = policy.resolve_principal(rule) else {
        return false;
    };
    match pass {
        MatchPass::Subject => definition.okta_subject.as_deref() == Some(request.principal_id),
        MatchPass::Group => definition
            .okta_group
            .as_ref()
            .is_some_and(|group| request.groups.contains(group)),
        MatchPass::Type => !definition.is_specific() && definition.principal_type == request.principal_type,
    }
}

fn capability_matches(policy: &AccessPolicy, rule: &PolicyRule, capability: &str) -> bool {
    policy
        .resolve_capabilities(rule)
        .iter()
        .filter_map(|raw| CapabilityPattern::parse(raw).ok())
        .any(|pattern| pattern.matches(capability))
}

/// `Err` names the first condition that failed.
fn conditions_hold(
    conditions: Option<&PolicyConditions>,
    claims: &EvaluationClaims,
    now: DateTime<Utc>,
) -> Result<(), &'static str> {
    let Some(conditions) = conditions else {
        return Ok(());
    };

    if conditions.require_mfa == Some(true) && !claims.mfa_verified {
        return Err("require_mfa");
    }

    if let Some(max_ttl) = conditions.max_ttl_seconds {
        match claims.token_lifetime() {
            Some(lifetime) if (0..=max_ttl as i64).contains(&lifetime) => {}
            _ => return Err("max_ttl_seconds"),
        }
    }

    if let Some(allowlist) = &conditions.ip_allowlist {
        if !claims.source_ip_in(allowlist) {
            return Err("ip_allowlist");
        }
    }

    if let Some(window) = &conditions.time_window {
        if !within_time_window(window, now) {
            return Err("time_window");
        }
    }

    if let Some(scope) = &conditions.required_scope {
        if !claims.scopes.iter().any(|s| s == scope) {
            return Err("required_scope");
        }
    }

    if let Some(max_age) = conditions.max_auth_age_seconds {
        match claims.auth_time {
            Some(auth_time)
                if now
                    .timestamp()
                    .checked_sub(auth_time)
                    .is_some_and(|age| age <= max_age as i64) => {}
            _ => return Err("max_auth_age_seconds"),
        }
    }

    Ok(())
}

/// Inclusive `[start, end]` in the window's zone. A window whose end is
/// before its start wraps past midnight. Unparseable windows never match.
fn within_time_window(window: &TimeWindow, now: DateTime<Utc>) -> bool {
    let (Ok(start), Ok(end), Ok(zone)) = (
        NaiveTime::parse_from_str(window.start.trim(), "%H:%M"),
        NaiveTime::parse_from_str(window.end.trim(), "%H:%M"),
        window.timezone.trim().parse::<Tz>(),
    ) else {
        return false;
    };
    let local = now.with_timezone(&zone).time();
    if start <= end {
        start <= local && local <= end
    } else {
        local >= start || local <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const POLICY: &str = r#"
version: "1.0"
principals:
  admins:
    type: HUMAN
    okta_group: hr-platform-admins
  humans:
    type: HUMAN
  agents:
    type: AI_AGENT
  alice:
    type: HUMAN
    okta_subject: alice@local.test
capability_groups:
  hcm: [workday.hcm.*]
  payroll: [workday.payroll.*]
policies:
  - name: alice-hcm
    principal: alice
    capabilities: hcm
    environments: [local, prod]
    audit: VERBOSE
  - name: humans-hcm
    principal: humans
    capabilities: hcm
    environments: [local, prod]
  - name: admins-payroll-mfa
    principal: admins
    capabilities: payroll
    environments: [local]
    conditions:
      require_mfa: true
  - name: agents-short-lived
    principal: agents
    capabilities: hcm
    environments: [local]
    conditions:
      max_ttl_seconds: 300
  - name: agents-payroll-scoped
    principal: agents
    capabilities: payroll
    environments: [local]
    conditions:
      required_scope: "mcp:use"
      max_auth_age_seconds: 600
  - name: office-hours
    principal: { type: MACHINE }
    capabilities: ["workday.time.*"]
    environments: [local]
    conditions:
      time_window: { start: "09:00", end: "17:00", timezone: "America/New_York" }
      ip_allowlist: ["10.0.0.5"]
"#;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(AccessPolicy::from_yaml_str(POLICY).unwrap())
    }

    fn request<'a>(
        subject: &'a str,
        groups: &'a [String],
        principal_type: PrincipalType,
        capability: &'a str,
        claims: &'a EvaluationClaims,
    ) -> AccessRequest<'a> {
        AccessRequest {
            principal_id: subject,
            groups,
            principal_type,
            capability,
            environment: "local",
            claims,
        }
    }

    #[test]
    fn test_mfa_required_rule() {
        let engine = engine();
        let groups = vec!["hr-platform-admins".to_string()];
        let with_mfa = EvaluationClaims { mfa_verified: true, ..Default::default() };
        let result = engine.evaluate(&request(
            "admin@local.test",
            &groups,
            PrincipalType::Human,
            "workday.payroll.get_compensation",
            &with_mfa,
        ));
        assert!(result.allowed());
        assert_eq!(result.policy_name(), Some("admins-payroll-mfa"));

        let without_mfa = EvaluationClaims::default();
        let result = engine.evaluate(&request(
            "admin@local.test",
            &groups,
            PrincipalType::Human,
            "workday.payroll.get_compensation",
            &without_mfa,
        ));
        assert!(!result.allowed());
        assert_eq!(result.reason().as_deref(), Some("No matching policy found"));
    }

    #[test]
    fn test_agent_token_lifetime_bound() {
        let engine = engine();
        let long = EvaluationClaims { issued_at: Some(0), expires_at: Some(3600), ..Default::default() };
        let short = EvaluationClaims { issued_at: Some(0), expires_at: Some(100), ..Default::default() };
        let missing = EvaluationClaims::default();

        let check = |claims: &EvaluationClaims| {
            engine
                .evaluate(&request("bot", &[], PrincipalType::AiAgent, "workday.hcm.get_employee", claims))
                .allowed()
        };
        assert!(!check(&long));
        assert!(check(&short));
        assert!(!check(&missing));

        let overflowing = EvaluationClaims { issued_at: Some(i64::MIN), expires_at: Some(100), ..Default::default() };
        let inverted = EvaluationClaims { issued_at: Some(3600), expires_at: Some(0), ..Default::default() };
        assert!(!check(&overflowing));
        assert!(!check(&inverted));
    }

    #[test]
    fn test_capability_group_wildcards() {
        let engine = engine();
        let claims = EvaluationClaims::default();
        let hcm = engine.evaluate(&request("bob", &[], PrincipalType::Human, "workday.hcm.get_employee", &claims));
        assert_eq!(hcm.policy_name(), Some("humans-hcm"));

        let payroll = engine.evaluate(&request(
            "bob",
            &[],
            PrincipalType::Human,
            "workday.payroll.get_compensation",
            &claims,
        ));
        assert!(!payroll.allowed());
    }

    #[test]
    fn test_subject_rule_wins_over_type_rule() {
        let result = engine().evaluate(&request(
            "alice@local.test",
            &[],
            PrincipalType::Human,
            "workday.hcm.get_employee",
            &EvaluationClaims::default(),
        ));
        assert_eq!(result.policy_name(), Some("alice-hcm"));
        assert_eq!(result.audit_level, crate::domain::access_policy::AuditLevel::Verbose);
    }

    #[test]
    fn test_specific_rules_skip_type_pass() {
        // An admin-group rule must not apply to a human outside the group.
        let result = engine().evaluate(&request(
            "mallory",
            &[],
            PrincipalType::Human,
            "workday.payroll.get_compensation",
            &EvaluationClaims { mfa_verified: true, ..Default::default() },
        ));
        assert!(!result.allowed());
    }

    #[test]
    fn test_scope_and_auth_age_conditions() {
        let engine = engine();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let fresh = EvaluationClaims {
            scopes: vec!["mcp:use".into()],
            auth_time: Some(now.timestamp() - 60),
            ..Default::default()
        };
        let stale = EvaluationClaims { auth_time: Some(now.timestamp() - 3600), ..fresh.clone() };
        let unscoped = EvaluationClaims { scopes: vec![], ..fresh.clone() };
        let no_auth_time = EvaluationClaims { auth_time: None, ..fresh.clone() };

        let check = |claims: &EvaluationClaims| {
            engine
                .evaluate_at(
                    &request("bot", &[], PrincipalType::AiAgent, "workday.payroll.get_compensation", claims),
                    now,
                )
                .allowed()
        };
        assert!(check(&fresh));
        assert!(!check(&stale));
        assert!(!check(&unscoped));
        assert!(!check(&no_auth_time));

        // Claims far outside the clock's range fail closed instead of wrapping.
        let extreme_auth_time = EvaluationClaims { auth_time: Some(i64::MIN), ..fresh.clone() };
        assert!(!check(&extreme_auth_time));
    }

    #[test]
    fn test_time_window_and_ip_allowlist() {
        let engine = engine();
        let claims = EvaluationClaims::default().with_source_ip("10.0.0.5");
        // 15:00 UTC is 10:00 in New York (EST).
        let inside = Utc.with_ymd_and_hms(2026, 1, 15, 15, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 1, 15, 23, 30, 0).unwrap();
        let check = |claims: &EvaluationClaims, now| {
            engine
                .evaluate_at(&request("svc", &[], PrincipalType::Machine, "workday.time.request", claims), now)
                .allowed()
        };
        assert!(check(&claims, inside));
        assert!(!check(&claims, outside));
        assert!(!check(&EvaluationClaims::default(), inside));
        assert!(!check(&EvaluationClaims::default().with_source_ip("10.0.0.6"), inside));
    }

    #[test]
    fn test_time_window_edges() {
        let window = TimeWindow { start: "22:00".into(), end: "02:00".into(), timezone: "UTC".into() };
        assert!(within_time_window(&window, Utc.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap()));
        assert!(within_time_window(&window, Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap()));
        assert!(!within_time_window(&window, Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()));

        let bad_zone = TimeWindow { start: "09:00".into(), end: "17:00".into(), timezone: "Mars/Olympus".into() };
        assert!(!within_time_window(&bad_zone, Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()));
        let bad_time = TimeWindow { start: "9am".into(), end: "17:00".into(), timezone: "UTC".into() };
        assert!(!within_time_window(&bad_time, Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()));
    }

    #[test]
    fn test_unknown_environment_is_an_error_outcome() {
        let claims = EvaluationClaims::default();
        let mut req = request("bob", &[], PrincipalType::Human, "workday.hcm.get_employee", &claims);
        req.environment = "qa";
        let result = engine().evaluate(&req);
        assert!(matches!(
            result.decision,
            Decision::Error(EvaluationErrorKind::UnknownEnvironment(_))
        ));
        assert!(!result.allowed());
    }

    #[test]
    fn test_environment_filtering_and_reload() {
        let engine = engine();
        let claims = EvaluationClaims::default();
        let mut req = request("svc", &[], PrincipalType::AiAgent, "workday.hcm.get_employee", &claims);
        req.environment = "prod";
        assert!(!engine.evaluate(&req).allowed());

        let replacement = r#"
version: "2.0"
policies:
  - name: agents-prod
    principal: { type: AI_AGENT }
    capabilities: ["*"]
    environments: [prod]
"#;
        engine.reload(AccessPolicy::from_yaml_str(replacement).unwrap());
        assert_eq!(engine.evaluate(&req).policy_name(), Some("agents-prod"));
        assert_eq!(engine.policy().version, "2.0");
    }
}
