// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Evaluation Value Objects
//!
//! Inputs and outputs of the policy engine. A denial is an ordinary
//! [`Decision::Denied`] value, never an error; [`Decision::Error`] is reserved
//! for requests the engine could not evaluate at all. Both deny access.

use std::fmt;
use std::net::IpAddr;

use serde::{Serialize, Serializer};

use crate::domain::access_policy::AuditLevel;
use crate::domain::principal::VerifiedPrincipal;

/// Why an evaluable request was not granted.
///
/// Deliberately coarse: callers learn that no grant applied, never which
/// rules exist or which condition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    NoMatchingPolicy,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatchingPolicy => f.write_str("No matching policy found"),
        }
    }
}

/// Why a request could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationErrorKind {
    UnknownEnvironment(String),
}

impl fmt::Display for EvaluationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownEnvironment(env) => write!(f, "Invalid environment: {env}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed { policy_name: String },
    Denied(DenialReason),
    Error(EvaluationErrorKind),
}

/// Result of a single policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEvaluationResult {
    pub decision: Decision,
    pub audit_level: AuditLevel,
}

impl PolicyEvaluationResult {
    pub fn allow(policy_name: impl Into<String>, audit_level: AuditLevel) -> Self {
        Self {
            decision: Decision::Allowed {
                policy_name: policy_name.into(),
            },
            audit_level,
        }
    }

    pub fn deny(reason: DenialReason) -> Self {
        Self {
            decision: Decision::Denied(reason),
            audit_level: AuditLevel::Basic,
        }
    }

    pub fn error(kind: EvaluationErrorKind) -> Self {
        Self {
            decision: Decision::Error(kind),
            audit_level: AuditLevel::Basic,
        }
    }

    pub fn allowed(&self) -> bool {
        matches!(self.decision, Decision::Allowed { .. })
    }

    pub fn policy_name(&self) -> Option<&str> {
        match &self.decision {
            Decision::Allowed { policy_name } => Some(policy_name),
            _ => None,
        }
    }

    /// Informational reason, present only when access was not granted.
    pub fn reason(&self) -> Option<String> {
        match &self.decision {
            Decision::Allowed { .. } => None,
            Decision::Denied(reason) => Some(reason.to_string()),
            Decision::Error(kind) => Some(kind.to_string()),
        }
    }
}

#[derive(Serialize)]
struct WireResult<'a> {
    allowed: bool,
    policy_name: Option<&'a str>,
    audit_level: AuditLevel,
    reason: Option<String>,
}

impl Serialize for PolicyEvaluationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireResult {
            allowed: self.allowed(),
            policy_name: self.policy_name(),
            audit_level: self.audit_level,
            reason: self.reason(),
        }
        .serialize(serializer)
    }
}

/// Claims consulted by rule conditions. Missing values fail closed for any
/// condition that needs them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationClaims {
    pub mfa_verified: bool,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub source_ip: Option<String>,
    pub scopes: Vec<String>,
    pub auth_time: Option<i64>,
}

impl EvaluationClaims {
    pub fn from_principal(principal: &VerifiedPrincipal) -> Self {
        Self {
            mfa_verified: principal.mfa_verified,
            issued_at: Some(principal.issued_at),
            expires_at: Some(principal.expires_at),
            source_ip: None,
            scopes: principal.scopes(),
            auth_time: principal.auth_time(),
        }
    }

    pub fn with_source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self
    }

    /// Token lifetime in seconds, when both bounds are known and the
    /// difference is representable.
    pub fn token_lifetime(&self) -> Option<i64> {
        self.expires_at?.checked_sub(self.issued_at?)
    }

    /// Whether the source IP appears in `allowlist`. Addresses are compared
    /// in parsed form so `::1` and `0:0:0:0:0:0:0:1` are equal.
    pub fn source_ip_in(&self, allowlist: &[String]) -> bool {
        let Some(ip) = self.source_ip.as_deref().map(str::trim) else {
            return false;
        };
        let parsed = ip.parse::<IpAddr>().ok();
        allowlist.iter().any(|allowed| {
            let allowed = allowed.trim();
            match (parsed, allowed.parse::<IpAddr>().ok()) {
                (Some(a), Some(b)) => a == b,
                _ => allowed == ip,
            }
        })
    }
}
