// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capability Catalog Value Objects
//!
//! A capability is a named, invocable operation (an action or a long-running
//! flow) identified by a dot-hierarchical id such as `workday.hcm.get_employee`.
//! The catalog document is the canonical list of capabilities; every access
//! policy is validated against it at load time.
//!
//! ## Pattern Matching
//!
//! Policies and capability groups refer to capabilities through a
//! [`CapabilityPattern`]:
//! - `"*"` matches every capability
//! - `"workday.*"` matches `workday` itself and any id below `workday.`
//! - `"workday.hcm.get_employee"` matches that id only
//!
//! Prefix matching is dot-boundary safe: `workday.*` never matches
//! `workday_evil.read`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Whether a capability is a single synchronous action or a composite flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityType {
    Action,
    Flow,
}

/// Data sensitivity classification of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
    Critical,
}

/// One entry of the capability catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub domain: String,
    #[serde(rename = "type")]
    pub kind: CapabilityType,
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub requires_mfa: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    /// Mermaid diagram of a composite flow. Only used to cross-check
    /// `requires_capabilities`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_flow: Option<String>,
    #[serde(default)]
    pub requires_capabilities: Vec<String>,
}

/// Mermaid edge label holding a capability id: `A -->|workday.hcm.get_employee| B`
static FLOW_EDGE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\|([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)+)\|").expect("edge label pattern is valid")
});

impl CapabilityEntry {
    /// Capability ids referenced as edge labels in `implementation_flow`.
    pub fn flow_references(&self) -> BTreeSet<String> {
        let Some(flow) = self.implementation_flow.as_deref() else {
            return BTreeSet::new();
        };
        FLOW_EDGE_LABEL
            .captures_iter(flow)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// Compares the flow diagram against `requires_capabilities` in both
    /// directions. Returns one message per mismatch.
    pub fn flow_reference_mismatches(&self) -> Vec<String> {
        if self.implementation_flow.is_none() {
            return Vec::new();
        }
        let in_flow = self.flow_references();
        let declared: BTreeSet<String> = self.requires_capabilities.iter().cloned().collect();

        let mut problems = Vec::new();
        for missing in in_flow.difference(&declared) {
            problems.push(format!(
                "{}: flow references '{}' which is not listed in requires_capabilities",
                self.id, missing
            ));
        }
        for unused in declared.difference(&in_flow) {
            problems.push(format!(
                "{}: requires_capabilities lists '{}' which does not appear in the flow",
                self.id, unused
            ));
        }
        problems
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub last_updated: String,
    pub owner: String,
    pub description: String,
}

/// The catalog document as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCatalog {
    pub version: String,
    pub metadata: CatalogMetadata,
    pub capabilities: Vec<CapabilityEntry>,
}

impl CapabilityCatalog {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

/// Reason a pattern string could not be turned into a [`CapabilityPattern`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid capability pattern '{0}': '*' is only allowed alone or as a trailing '.*'")]
pub struct PatternError(pub String);

/// A parsed capability reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CapabilityPattern {
    /// `*`
    Any,
    /// A literal capability id.
    Exact(String),
    /// `prefix.*`, stored without the trailing `.*`.
    Prefix(String),
}

impl CapabilityPattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let raw = raw.trim();
        if raw == "*" {
            return Ok(Self::Any);
        }
        if let Some(prefix) = raw.strip_suffix(".*") {
            if prefix.is_empty() || prefix.contains('*') || prefix.ends_with('.') {
                return Err(PatternError(raw.to_string()));
            }
            return Ok(Self::Prefix(prefix.to_string()));
        }
        if raw.is_empty() || raw.contains('*') {
            return Err(PatternError(raw.to_string()));
        }
        Ok(Self::Exact(raw.to_string()))
    }

    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Self::Exact(_))
    }

    pub fn matches(&self, capability_id: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(id) => id == capability_id,
            Self::Prefix(prefix) => match capability_id.strip_prefix(prefix.as_str()) {
                Some("") => true,
                Some(rest) => rest.starts_with('.'),
                None => false,
            },
        }
    }
}

impl fmt::Display for CapabilityPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(id) => f.write_str(id),
            Self::Prefix(prefix) => write!(f, "{prefix}.*"),
        }
    }
}

/// A single problem found by capability list validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityListError {
    #[error("Unknown capability: '{id}'{}", format_suggestions(.suggestions))]
    UnknownCapability { id: String, suggestions: Vec<String> },
    #[error("Wildcard pattern '{pattern}' matches no capabilities")]
    UnmatchedWildcard { pattern: String },
    #[error(transparent)]
    InvalidPattern(#[from] PatternError),
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {})", suggestions.join(", "))
    }
}
