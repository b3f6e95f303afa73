// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Verifier
//!
//! Runs [`PolicyTestSuite`] scenarios through the [`PolicyEngine`] and
//! reports which expectations held. A case passes when, in order:
//!
//! 1. allow/deny matches (after per-environment overrides)
//! 2. the matched rule name matches, when one is expected
//! 3. the audit level matches, when one is expected
//! 4. the denial reason contains the expected text, for expected denials

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::application::policy_engine::{AccessRequest, PolicyEngine};
use crate::domain::access_policy::AuditLevel;
use crate::domain::evaluation::EvaluationClaims;
use crate::domain::policy_test::{PolicyTestCase, PolicyTestSuite, SuiteDefaults};

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("Scenario path not found: {0}")]
    MissingSource(PathBuf),
    #[error("failed to read scenarios {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario suite {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Loads one suite file, or every `*.yaml` file of a directory in name order.
pub fn load_suites(path: impl AsRef<Path>) -> Result<Vec<PolicyTestSuite>, ScenarioError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ScenarioError::MissingSource(path.to_path_buf()));
    }
    let io_error = |source| ScenarioError::Io {
        path: path.to_path_buf(),
        source,
    };

    let files = if path.is_dir() {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path).map_err(io_error)? {
            let file = entry.map_err(io_error)?.path();
            if file.extension().is_some_and(|ext| ext == "yaml") {
                files.push(file);
            }
        }
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    files
        .into_iter()
        .map(|file| {
            let content = std::fs::read_to_string(&file).map_err(|source| ScenarioError::Io {
                path: file.clone(),
                source,
            })?;
            PolicyTestSuite::from_yaml_str(&content).map_err(|source| ScenarioError::Parse { path: file, source })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseResult {
    pub id: String,
    pub name: String,
    pub passed: bool,
    pub expected_allowed: bool,
    pub actual_allowed: bool,
    pub expected_policy: Option<String>,
    pub actual_policy: Option<String>,
    pub expected_audit: Option<AuditLevel>,
    pub actual_audit: Option<AuditLevel>,
    pub error: Option<String>,
    pub execution_time_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pass_rate: f64,
    pub execution_time_ms: f64,
    pub results: Vec<CaseResult>,
}

impl VerificationReport {
    fn from_results(results: Vec<CaseResult>, skipped: usize, started: Instant) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let pass_rate = if results.is_empty() {
            0.0
        } else {
            passed as f64 / results.len() as f64 * 100.0
        };
        Self {
            total: results.len() + skipped,
            passed,
            failed: results.len() - passed,
            skipped,
            pass_rate,
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

pub struct PolicyVerifier<'a> {
    engine: &'a PolicyEngine,
}

impl<'a> PolicyVerifier<'a> {
    pub fn new(engine: &'a PolicyEngine) -> Self {
        Self { engine }
    }

    pub fn run_all(&self, suites: &[PolicyTestSuite]) -> VerificationReport {
        let started = Instant::now();
        let mut results = Vec::new();
        let mut skipped = 0;
        for suite in suites {
            let report = self.run_suite(suite);
            skipped += report.skipped;
            results.extend(report.results);
        }
        let report = VerificationReport::from_results(results, skipped, started);
        info!(
            total = report.total,
            passed = report.passed,
            failed = report.failed,
            skipped = report.skipped,
            "Policy verification finished"
        );
        report
    }

    pub fn run_suite(&self, suite: &PolicyTestSuite) -> VerificationReport {
        let started = Instant::now();
        let mut results = Vec::with_capacity(suite.test_cases.len());
        let mut skipped = 0;
        for case in &suite.test_cases {
            if case.skip {
                skipped += 1;
                continue;
            }
            results.push(self.run_case(case, &suite.defaults));
        }
        VerificationReport::from_results(results, skipped, started)
    }

    pub fn run_case(&self, case: &PolicyTestCase, defaults: &SuiteDefaults) -> CaseResult {
        let started = Instant::now();
        let principal = case.principal.clone().or(&defaults.principal);
        let request = case.request.clone().or(&defaults.request);
        let environment = request.environment.unwrap_or_default();
        let expected_allowed = case.expected.allowed_in(&environment);

        let mut result = CaseResult {
            id: case.id.clone(),
            name: case.name.clone(),
            passed: false,
            expected_allowed,
            actual_allowed: false,
            expected_policy: case.expected.policy_matched.clone(),
            actual_policy: None,
            expected_audit: case.expected.audit_level,
            actual_audit: None,
            error: None,
            execution_time_ms: 0.0,
        };

        let (Some(principal_type), Some(capability)) = (principal.principal_type, request.capability) else {
            result.error = Some("Scenario needs a principal type and a capability".to_string());
            result.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
            return result;
        };

        let subject = principal.subject.unwrap_or_default();
        let groups = principal.groups.unwrap_or_default();
        let claims = EvaluationClaims {
            mfa_verified: principal.mfa_verified.unwrap_or(false),
            issued_at: principal.token_issued_at,
            expires_at: principal.token_expires_at,
            source_ip: principal.request_ip,
            scopes: principal.scopes.unwrap_or_default(),
            auth_time: principal.auth_time,
        };
        let evaluation = self.engine.evaluate(&AccessRequest {
            principal_id: &subject,
            groups: &groups,
            principal_type,
            capability: &capability,
            environment: &environment,
            claims: &claims,
        });

        result.actual_allowed = evaluation.allowed();
        result.actual_policy = evaluation.policy_name().map(str::to_string);
        result.actual_audit = Some(evaluation.audit_level);
        result.error = if result.actual_allowed != expected_allowed {
            Some(if expected_allowed {
                format!(
                    "Expected ALLOW but got DENY. Reason: {}",
                    evaluation.reason().unwrap_or_default()
                )
            } else {
                format!(
                    "Expected DENY but got ALLOW. Policy: {}",
                    result.actual_policy.as_deref().unwrap_or("-")
                )
            })
        } else if let Some(expected) = case
            .expected
            .policy_matched
            .as_deref()
            .filter(|expected| result.actual_policy.as_deref() != Some(*expected))
        {
            Some(format!(
                "Policy name mismatch: expected '{}', got '{}'",
                expected,
                result.actual_policy.as_deref().unwrap_or("-")
            ))
        } else if let Some(expected) = case
            .expected
            .audit_level
            .filter(|expected| *expected != evaluation.audit_level)
        {
            Some(format!(
                "Audit level mismatch: expected '{:?}', got '{:?}'",
                expected, evaluation.audit_level
            ))
        } else {
            match case.expected.reason_contains.as_deref() {
                Some(needle) if !expected_allowed => {
                    let reason = evaluation.reason().unwrap_or_default();
                    (!reason.to_lowercase().contains(&needle.to_lowercase())).then(|| {
                        format!("Denial reason doesn't contain '{needle}'. Got: {reason}")
                    })
                }
                _ => None,
            }
        };
        result.passed = result.error.is_none();
        result.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        debug!(id = %result.id, passed = result.passed, "Policy test case evaluated");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::access_policy::AccessPolicy;

    const POLICY: &str = r#"
version: "1.0"
principals:
  employees: { type: HUMAN, okta_group: employees }
  admins: { type: HUMAN, okta_group: hr-platform-admins }
capability_groups:
  hcm-read: [workday.hcm.get_employee]
policies:
  - name: employee-directory
    principal: employees
    capabilities: hcm-read
    environments: [local, prod]
  - name: admin-payroll
    principal: admins
    capabilities: ["workday.payroll.*"]
    environments: [local]
    conditions: { require_mfa: true }
    audit: VERBOSE
"#;

    const SUITE: &str = r#"
version: "1.0"
metadata: { name: Employees, owner: security-team, description: directory access, last_updated: "2026-10-01" }
defaults:
  principal: { type: HUMAN, subject: user@local.test, groups: [employees] }
  request: { environment: local }
test_cases:
  - id: EMP-001
    name: Employee reads the directory
    category: positive
    request: { capability: workday.hcm.get_employee }
    expected: { allowed: true, policy_matched: employee-directory, audit_level: BASIC }
  - id: EMP-002
    name: Employee cannot read payroll
    category: negative
    request: { capability: workday.payroll.get_compensation }
    expected: { allowed: false, reason_contains: "no matching policy" }
  - id: ADM-001
    name: Admin without MFA is refused payroll
    category: edge_case
    principal: { groups: [hr-platform-admins] }
    request: { capability: workday.payroll.get_compensation }
    expected: { allowed: true }
  - id: ADM-002
    name: Admin payroll audit level
    category: positive
    principal: { groups: [hr-platform-admins], mfa_verified: true }
    request: { capability: workday.payroll.get_compensation }
    expected: { allowed: true, audit_level: BASIC }
  - id: ENV-001
    name: Directory is not granted in dev
    category: negative
    request: { capability: workday.hcm.get_employee, environment: dev }
    expected: { allowed: true, environments: { dev: false } }
  - id: SKIP-001
    name: Not yet written
    category: positive
    skip: true
    expected: { allowed: true }
"#;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(AccessPolicy::from_yaml_str(POLICY).unwrap())
    }

    #[test]
    fn test_suite_report() {
        let engine = engine();
        let suite = PolicyTestSuite::from_yaml_str(SUITE).unwrap();
        let report = PolicyVerifier::new(&engine).run_all(&[suite]);

        assert_eq!(report.total, 6);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.passed, 3);
        assert_eq!(report.failed, 2);
        assert!(!report.success());
        assert!((report.pass_rate - 60.0).abs() < 1e-9);

        let failures: Vec<&str> = report.failures().map(|r| r.id.as_str()).collect();
        assert_eq!(failures, ["ADM-001", "ADM-002"]);
        let mfa = &report.results[2];
        assert_eq!(
            mfa.error.as_deref(),
            Some("Expected ALLOW but got DENY. Reason: No matching policy found")
        );
        let audit = &report.results[3];
        assert!(audit.actual_allowed);
        assert_eq!(
            audit.error.as_deref(),
            Some("Audit level mismatch: expected 'Basic', got 'Verbose'")
        );
        assert!(!report.results[4].expected_allowed);
        assert!(report.results[4].passed);
    }

    #[test]
    fn test_wrong_rule_fails_even_when_allowed() {
        let engine = engine();
        let suite = PolicyTestSuite::from_yaml_str(&SUITE.replace(
            "policy_matched: employee-directory",
            "policy_matched: employee-self-service",
        ))
        .unwrap();
        let result = PolicyVerifier::new(&engine).run_case(&suite.test_cases[0], &suite.defaults);
        assert!(result.actual_allowed);
        assert!(!result.passed);
        assert_eq!(
            result.error.as_deref(),
            Some("Policy name mismatch: expected 'employee-self-service', got 'employee-directory'")
        );
    }

    #[test]
    fn test_incomplete_case_fails_without_evaluating() {
        let engine = engine();
        let suite = PolicyTestSuite::from_yaml_str(SUITE).unwrap();
        let result = PolicyVerifier::new(&engine).run_case(&suite.test_cases[5], &suite.defaults);
        assert!(!result.passed);
        assert!(result.actual_audit.is_none());
    }

    #[test]
    fn test_load_suites_from_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), SUITE).unwrap();
        std::fs::write(dir.path().join("a.yaml"), SUITE.replace("Employees", "First")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let suites = load_suites(dir.path()).unwrap();
        assert_eq!(suites.len(), 2);
        assert_eq!(suites[0].metadata.name, "First");

        std::fs::write(dir.path().join("c.yaml"), "test_cases: [").unwrap();
        assert!(matches!(load_suites(dir.path()), Err(ScenarioError::Parse { .. })));
        assert!(matches!(
            load_suites(dir.path().join("missing.yaml")),
            Err(ScenarioError::MissingSource(_))
        ));
    }
}
