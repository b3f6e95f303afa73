// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Access Policy Loading
//!
//! Parses a policy document and runs both validation passes before the
//! policy can reach the engine:
//!
//! 1. Reference validation ([`AccessPolicy::validate_references`]).
//! 2. Capability validation: every capability group member and every literal
//!    rule capability must resolve against the [`CapabilityRegistry`].
//!
//! Both passes always run and every violation is reported together. There is
//! no partial-load mode: any violation rejects the whole document.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::application::capability_registry::CapabilityRegistry;
use crate::domain::access_policy::{AccessPolicy, RuleCapabilities};

#[derive(Debug, thiserror::Error)]
pub enum PolicyLoadError {
    #[error("Policy file not found: {0}")]
    MissingSource(PathBuf),
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse policy document: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Policy validation failed:\n{}", join_lines(.errors))]
    Validation { errors: Vec<String> },
}

fn join_lines(errors: &[String]) -> String {
    errors.join("\n")
}

pub fn load_policy(path: impl AsRef<Path>, registry: &CapabilityRegistry) -> Result<AccessPolicy, PolicyLoadError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PolicyLoadError::MissingSource(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| PolicyLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let policy = parse_policy(&content, registry)?;
    info!(
        path = %path.display(),
        rules = policy.policies.len(),
        version = %policy.version,
        "Access policy loaded"
    );
    Ok(policy)
}

pub fn parse_policy(yaml: &str, registry: &CapabilityRegistry) -> Result<AccessPolicy, PolicyLoadError> {
    let policy = AccessPolicy::from_yaml_str(yaml)?;
    validate_policy(&policy, registry)?;
    Ok(policy)
}

/// Runs reference and capability validation. Ambiguity warnings are logged
/// and never fail the load.
pub fn validate_policy(policy: &AccessPolicy, registry: &CapabilityRegistry) -> Result<(), PolicyLoadError> {
    let report = policy.validate_references();
    for warning in &report.warnings {
        warn!("Policy warning: {}", warning);
    }

    let mut errors = report.errors;

    for (group, members) in &policy.capability_groups {
        for err in registry.validate_capability_list(members) {
            errors.push(format!("Capability group '{group}': {err}"));
        }
    }

    for rule in &policy.policies {
        if let RuleCapabilities::List(capabilities) = &rule.capabilities {
            for err in registry.validate_capability_list(capabilities) {
                errors.push(format!("Policy '{}': {}", rule.name, err));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(PolicyLoadError::Validation { errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
version: "1.0"
metadata: { last_updated: "2026-01-01", owner: platform, description: test }
capabilities:
  - { id: workday.hcm.get_employee, domain: workday.hcm, type: action, sensitivity: medium }
  - { id: workday.payroll.get_compensation, domain: workday.payroll, type: action, sensitivity: critical }
"#;

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::from_yaml_str(CATALOG).unwrap()
    }

    #[test]
    fn test_valid_policy_loads() {
        let yaml = r#"
version: "1.0"
principals:
  admins: { type: HUMAN, okta_group: hr-platform-admins }
capability_groups:
  hcm: [workday.hcm.*]
policies:
  - name: admins-hcm
    principal: admins
    capabilities: hcm
    environments: [local]
"#;
        let policy = parse_policy(yaml, &registry()).unwrap();
        assert_eq!(policy.policies[0].name, "admins-hcm");
    }

    #[test]
    fn test_every_violation_is_enumerated() {
        let yaml = r#"
version: "1.0"
principals: {}
capability_groups:
  broken: [salesforce.*, workday.hcm.get_employe]
policies:
  - name: ghost-rule
    principal: ghost
    capabilities: missing
    environments: [local]
  - name: literal-rule
    principal: { type: AI_AGENT }
    capabilities: [workday.payroll.get_salary]
    environments: [local]
"#;
        let err = parse_policy(yaml, &registry()).unwrap_err();
        let PolicyLoadError::Validation { errors } = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 5, "{errors:#?}");
        assert!(errors.iter().any(|e| e.contains("undefined principal 'ghost'")));
        assert!(errors.iter().any(|e| e.contains("undefined capability group 'missing'")));
        assert!(errors.iter().any(|e| e.starts_with("Capability group 'broken': Wildcard pattern 'salesforce.*'")));
        assert!(errors
            .iter()
            .any(|e| e.contains("'workday.hcm.get_employe'") && e.contains("workday.hcm.get_employee")));
        assert!(errors.iter().any(|e| e.starts_with("Policy 'literal-rule': Unknown capability")));
    }

    #[test]
    fn test_missing_policy_file() {
        let err = load_policy("/nonexistent/policy.yaml", &registry()).unwrap_err();
        assert!(matches!(err, PolicyLoadError::MissingSource(_)));
    }
}
