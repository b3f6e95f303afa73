// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Principal Identity
//!
//! Runtime identity of a caller, derived fresh for every request from a
//! verified bearer token. A [`VerifiedPrincipal`] is never persisted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The three classes of caller the gateway distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalType {
    Human,
    Machine,
    AiAgent,
}

impl PrincipalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "HUMAN",
            Self::Machine => "MACHINE",
            Self::AiAgent => "AI_AGENT",
        }
    }
}

impl fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HUMAN" => Ok(Self::Human),
            "MACHINE" => Ok(Self::Machine),
            "AI_AGENT" => Ok(Self::AiAgent),
            other => Err(format!("unknown principal type '{other}'")),
        }
    }
}

/// Deployment environment a policy rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dev" => Ok(Self::Dev),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Identity produced by token verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedPrincipal {
    pub subject: String,
    pub principal_type: PrincipalType,
    pub groups: Vec<String>,
    pub issuer: String,
    pub audience: Vec<String>,
    pub issued_at: i64,
    pub expires_at: i64,
    pub token_id: Option<String>,
    /// True when the `amr` claim lists `"mfa"`.
    pub mfa_verified: bool,
    /// Full claim set of the verified token.
    pub raw_claims: Map<String, Value>,
}

impl VerifiedPrincipal {
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    /// Scopes from a space-delimited `scope` claim or an Okta-style `scp` array.
    pub fn scopes(&self) -> Vec<String> {
        match self.raw_claims.get("scope").or_else(|| self.raw_claims.get("scp")) {
            Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn auth_time(&self) -> Option<i64> {
        self.raw_claims.get("auth_time").and_then(Value::as_i64)
    }

    /// Whether this token was minted by a token exchange.
    pub fn is_exchanged(&self) -> bool {
        self.raw_claims.contains_key("acting_as") || self.raw_claims.contains_key("original_token_id")
    }
}
