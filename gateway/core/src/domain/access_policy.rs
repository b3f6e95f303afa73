// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Access Policy Aggregate
//!
//! The access policy document binds principals to capabilities per
//! environment. It is loaded once, validated in full, and then handed to the
//! [`crate::application::policy_engine::PolicyEngine`] as an immutable value.
//!
//! ## Invariants
//!
//! - Rule names are unique.
//! - Every string principal reference names an entry of `principals`.
//! - Every string capability reference names an entry of `capability_groups`.
//! - Every capability pattern resolves against the capability registry
//!   (checked by [`crate::application::policy_loader`], not here).
//!
//! Inline principals that carry both a type and a subject/group binding are
//! accepted with a warning: they only ever match on the binding, never on the
//! bare type.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::principal::{Environment, PrincipalType};

/// Lower bound accepted for `max_ttl_seconds`.
pub const MIN_MAX_TTL_SECONDS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    #[default]
    Basic,
    Verbose,
}

/// Rule effect. Only grants exist; denial is the absence of a matching grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    #[default]
    Allow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub last_reviewed: Option<String>,
    pub reviewed_by: Option<String>,
    pub ticket: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalDefinition {
    #[serde(rename = "type")]
    pub principal_type: PrincipalType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub okta_subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub okta_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_ticket: Option<String>,
}

impl PrincipalDefinition {
    /// A definition bound to a subject or a group. Specific definitions are
    /// never considered during the type-only matching pass.
    pub fn is_specific(&self) -> bool {
        self.okta_subject.is_some() || self.okta_group.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// `HH:MM`
    pub start: String,
    /// `HH:MM`
    pub end: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Extra constraints a matched rule imposes. Every field is optional and an
/// absent field imposes nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ttl_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_mfa: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_allowlist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_auth_age_seconds: Option<u64>,
}

/// A rule's principal: either the name of an entry in `principals` or an
/// inline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RulePrincipal {
    Reference(String),
    Inline(PrincipalDefinition),
}

/// A rule's capabilities: either a literal list of patterns or the name of a
/// capability group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleCapabilities {
    Group(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub principal: RulePrincipal,
    pub capabilities: RuleCapabilities,
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<PolicyConditions>,
    #[serde(default)]
    pub audit: AuditLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<serde_yaml::Value>,
}

impl PolicyRule {
    pub fn applies_to(&self, environment: Environment) -> bool {
        self.environments.contains(&environment)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PolicyMetadata>,
    #[serde(default)]
    pub principals: BTreeMap<String, PrincipalDefinition>,
    #[serde(default)]
    pub capability_groups: BTreeMap<String, Vec<String>>,
    pub policies: Vec<PolicyRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_constraints: Option<serde_yaml::Value>,
}

/// Outcome of [`AccessPolicy::validate_references`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ReferenceReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl AccessPolicy {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Resolves a rule's principal to its definition. `None` only for an
    /// undefined reference, which validation rejects.
    pub fn resolve_principal<'a>(&'a self, rule: &'a PolicyRule) -> Option<&'a PrincipalDefinition> {
        match &rule.principal {
            RulePrincipal::Reference(name) => self.principals.get(name),
            RulePrincipal::Inline(definition) => Some(definition),
        }
    }

    /// Resolves a rule's capability patterns through the literal list or the
    /// named group.
    pub fn resolve_capabilities<'a>(&'a self, rule: &'a PolicyRule) -> &'a [String] {
        match &rule.capabilities {
            RuleCapabilities::List(list) => list,
            RuleCapabilities::Group(group) => self
                .capability_groups
                .get(group)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }

    /// Structural validation of names and references. Reports every problem
    /// found rather than stopping at the first.
    pub fn validate_references(&self) -> ReferenceReport {
        let mut report = ReferenceReport::default();
        let mut seen = HashSet::new();

        for rule in &self.policies {
            if !seen.insert(rule.name.as_str()) {
                report
                    .errors
                    .push(format!("Duplicate policy name found: '{}'", rule.name));
            }

            match &rule.principal {
                RulePrincipal::Reference(name) if !self.principals.contains_key(name) => {
                    report.errors.push(format!(
                        "Policy '{}' references undefined principal '{}'",
                        rule.name, name
                    ));
                }
                RulePrincipal::Inline(definition) if definition.is_specific() => {
                    report.warnings.push(format!(
                        "Policy '{}' has inline principal with both type '{}' and a specific binding. \
                         It will only match on the binding, not on type alone.",
                        rule.name, definition.principal_type
                    ));
                }
                _ => {}
            }

            if let RuleCapabilities::Group(group) = &rule.capabilities {
                if !self.capability_groups.contains_key(group) {
                    report.errors.push(format!(
                        "Policy '{}' references undefined capability group '{}'",
                        rule.name, group
                    ));
                }
            }

            if let Some(max_ttl) = rule.conditions.as_ref().and_then(|c| c.max_ttl_seconds) {
                if max_ttl < MIN_MAX_TTL_SECONDS {
                    report.errors.push(format!(
                        "Policy '{}' sets max_ttl_seconds to {}, minimum is {}",
                        rule.name, max_ttl, MIN_MAX_TTL_SECONDS
                    ));
                }
            }
        }

        report
    }
}
