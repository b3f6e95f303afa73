// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Bearer Token Model
//!
//! Claim layout of the JWT bearer tokens the gateway accepts, the typed
//! errors verification and exchange can raise, and the two seams the rest of
//! the crate depends on:
//!
//! - [`TokenVerifier`] turns a bearer string into a [`VerifiedPrincipal`]. The
//!   local mock issuer and the remote JWKS verifier both implement it.
//! - [`TokenExchanger`] trades a caller's token for a narrow, short-lived one
//!   before the tool bridge calls the backend.
//!
//! ## Exchanged tokens
//!
//! A token minted by an exchange carries `acting_as`, `original_token_id`,
//! a narrowed `scope` and an `auth_time` inherited from the subject token.
//! Such a token is never accepted as the subject of another exchange.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::principal::{PrincipalType, VerifiedPrincipal};

/// Authentication method reference that marks a multi-factor login.
pub const MFA_METHOD: &str = "mfa";

/// RFC 8693 grant type for token exchange.
pub const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Upper bound on the lifetime of an exchanged token, in seconds.
pub const MAX_EXCHANGED_TTL_SECONDS: i64 = 300;

/// The JWT `aud` claim, which may be either a single string or an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AudienceClaim {
    Single(String),
    Multiple(Vec<String>),
}

impl AudienceClaim {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Single(aud) => vec![aud.clone()],
            Self::Multiple(auds) => auds.clone(),
        }
    }
}

/// Claims carried by every gateway bearer token. Custom and exchange claims
/// that have no dedicated field are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iss: String,
    pub aud: AudienceClaim,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Absent on tokens from identity providers that do not emit it; such
    /// callers are treated as humans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_type: Option<PrincipalType>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub amr: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    pub fn mfa_verified(&self) -> bool {
        self.amr.iter().any(|m| m == MFA_METHOD)
    }

    pub fn into_principal(self) -> VerifiedPrincipal {
        let raw_claims = match serde_json::to_value(&self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        VerifiedPrincipal {
            mfa_verified: self.mfa_verified(),
            principal_type: self.principal_type.unwrap_or(PrincipalType::Human),
            audience: self.aud.to_vec(),
            subject: self.sub,
            groups: self.groups,
            issuer: self.iss,
            issued_at: self.iat,
            expires_at: self.exp,
            token_id: self.jti,
            raw_claims,
        }
    }
}

/// Per-request token failure. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token audience is not accepted")]
    InvalidAudience,
    #[error("token issuer is not trusted")]
    InvalidIssuer,
    #[error("token has been revoked")]
    Revoked,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("signing key set unavailable: {0}")]
    KeySet(String),
}

impl TokenError {
    /// Stable identifier exposed to callers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Expired => "token_expired",
            Self::InvalidAudience => "invalid_audience",
            Self::InvalidIssuer => "invalid_issuer",
            Self::Revoked | Self::InvalidToken(_) => "invalid_token",
            Self::KeySet(_) => "jwks_error",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            _ => Self::InvalidToken(err.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Subject token is already an exchanged token")]
    AlreadyExchanged,
    #[error("subject token rejected: {0}")]
    InvalidSubjectToken(#[from] TokenError),
    #[error("token exchange endpoint failed: {0}")]
    Endpoint(String),
    #[error("failed to sign exchanged token: {0}")]
    Signing(String),
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedPrincipal, TokenError>;
}

#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Returns a scoped access token minted from `subject_token`.
    async fn exchange(&self, subject_token: &str) -> Result<String, ExchangeError>;
}
