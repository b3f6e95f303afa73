// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Local Token Issuer
//!
//! An OIDC-compatible issuer for local development and tests. Tokens are real
//! RS256 JWTs signed with an in-process RSA key, so the verification path is
//! the same one the remote verifier uses against a production identity
//! provider.
//!
//! The issuer also owns the revocation list and performs token exchange
//! (RFC 8693): a caller's token is traded for a short-lived token scoped to
//! the tool bridge. Exchanged tokens are marked with `acting_as` and
//! `original_token_id` and cannot themselves be exchanged again.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{decode_header, encode, Algorithm, Header};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::principal::{PrincipalType, VerifiedPrincipal};
use crate::domain::token::{
    ExchangeError, TokenClaims, TokenError, TokenExchanger, TokenVerifier, ACCESS_TOKEN_TYPE,
    MAX_EXCHANGED_TTL_SECONDS, MFA_METHOD, TOKEN_EXCHANGE_GRANT_TYPE,
};
use crate::infrastructure::auth::keys::{JwksDocument, KeyError, SigningKeyPair};
use crate::infrastructure::auth::revocation::RevocationList;
use crate::infrastructure::auth::verifier::{decode_claims, record_verification};

/// Default token lifetime per principal type, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenLifetimes {
    pub default_seconds: i64,
    pub ai_agent_seconds: i64,
    pub machine_seconds: i64,
    pub exchange_seconds: i64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            default_seconds: 3600,
            ai_agent_seconds: 300,
            machine_seconds: 86_400,
            exchange_seconds: 300,
        }
    }
}

impl TokenLifetimes {
    pub fn for_type(&self, principal_type: PrincipalType) -> i64 {
        match principal_type {
            PrincipalType::AiAgent => self.ai_agent_seconds,
            PrincipalType::Machine => self.machine_seconds,
            PrincipalType::Human => self.default_seconds,
        }
    }

    pub fn exchange(&self) -> i64 {
        self.exchange_seconds.min(MAX_EXCHANGED_TTL_SECONDS)
    }
}

#[derive(Debug, Clone)]
pub struct IssuerSettings {
    pub issuer: String,
    pub audience: String,
    pub client_id: String,
    pub lifetimes: TokenLifetimes,
    pub leeway_seconds: u64,
    /// Recorded as `acting_as` on exchanged tokens.
    pub exchange_actor: String,
    pub exchange_scope: String,
}

impl Default for IssuerSettings {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:9000/oauth2/default".to_string(),
            audience: "api://hr-ai-platform".to_string(),
            client_id: "mock-client-id".to_string(),
            lifetimes: TokenLifetimes::default(),
            leeway_seconds: 60,
            exchange_actor: "mcp-server".to_string(),
            exchange_scope: "mcp:use".to_string(),
        }
    }
}

/// A principal the issuer knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockUser {
    pub subject: String,
    pub principal_type: PrincipalType,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mfa_verified: bool,
    #[serde(default)]
    pub custom_claims: Map<String, Value>,
}

impl MockUser {
    pub fn new(subject: impl Into<String>, principal_type: PrincipalType) -> Self {
        Self {
            subject: subject.into(),
            principal_type,
            groups: Vec::new(),
            name: None,
            email: None,
            mfa_verified: false,
            custom_claims: Map::new(),
        }
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_mfa(mut self) -> Self {
        self.mfa_verified = true;
        self
    }

    fn claims(&self) -> Map<String, Value> {
        let mut claims = Map::new();
        claims.insert("sub".into(), json!(self.subject));
        claims.insert("principal_type".into(), json!(self.principal_type.as_str()));
        if !self.groups.is_empty() {
            claims.insert("groups".into(), json!(self.groups));
        }
        if let Some(name) = &self.name {
            claims.insert("name".into(), json!(name));
        }
        if let Some(email) = &self.email {
            claims.insert("email".into(), json!(email));
        }
        let amr = if self.mfa_verified { vec![MFA_METHOD, "pwd"] } else { vec!["pwd"] };
        claims.insert("amr".into(), json!(amr));
        for (key, value) in &self.custom_claims {
            claims.insert(key.clone(), value.clone());
        }
        claims
    }
}

/// Users every local issuer starts with.
pub fn default_users() -> Vec<MockUser> {
    vec![
        MockUser::new("admin@local.test", PrincipalType::Human)
            .with_groups(&["hr-platform-admins"])
            .with_name("Test Admin")
            .with_email("admin@local.test")
            .with_mfa(),
        MockUser::new("user@local.test", PrincipalType::Human)
            .with_groups(&["employees"])
            .with_name("Test User")
            .with_email("user@local.test"),
        MockUser::new("svc-workflow@local.test", PrincipalType::Machine).with_name("Onboarding Workflow Service"),
        MockUser::new("agent-assistant@local.test", PrincipalType::AiAgent).with_name("HR Assistant Agent"),
        MockUser::new("unauthorized@local.test", PrincipalType::Human)
            .with_name("Unauthorized User")
            .with_email("unauthorized@local.test"),
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenKind {
    #[default]
    Access,
    Id,
}

/// Parameters for [`LocalTokenIssuer::issue_token`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub subject: String,
    #[serde(default)]
    pub principal_type: Option<PrincipalType>,
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
    #[serde(default, rename = "additional_claims")]
    pub extra_claims: Map<String, Value>,
    #[serde(skip)]
    pub kind: TokenKind,
}

impl TokenRequest {
    pub fn for_subject(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn principal_type(mut self, principal_type: PrincipalType) -> Self {
        self.principal_type = Some(principal_type);
        self
    }

    pub fn groups(mut self, groups: &[&str]) -> Self {
        self.groups = Some(groups.iter().map(|g| g.to_string()).collect());
        self
    }

    pub fn ttl_seconds(mut self, ttl: i64) -> Self {
        self.ttl_seconds = Some(ttl);
        self
    }

    pub fn claim(mut self, key: &str, value: Value) -> Self {
        self.extra_claims.insert(key.to_string(), value);
        self
    }

    pub fn id_token(mut self) -> Self {
        self.kind = TokenKind::Id;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IssuerError {
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Form fields accepted by the token endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenGrant {
    pub grant_type: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub subject_token: Option<String>,
    #[serde(default)]
    pub subject_token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_token_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),
    #[error("invalid_request: {0}")]
    InvalidRequest(String),
    #[error("invalid_grant: unknown user '{0}'")]
    UnknownUser(String),
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),
    #[error(transparent)]
    Issuer(#[from] IssuerError),
    #[error("server_error: {0}")]
    Server(String),
}

impl GrantError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnknownUser(_) | Self::InvalidGrant(_) => "invalid_grant",
            Self::Issuer(_) | Self::Server(_) => "server_error",
        }
    }
}

pub struct LocalTokenIssuer {
    settings: IssuerSettings,
    keys: SigningKeyPair,
    users: RwLock<HashMap<String, MockUser>>,
    revoked: RevocationList,
}

impl LocalTokenIssuer {
    /// Creates an issuer with a freshly generated signing key.
    pub fn new(settings: IssuerSettings) -> Result<Self, KeyError> {
        Ok(Self::with_keys(settings, SigningKeyPair::generate()?))
    }

    pub fn with_keys(settings: IssuerSettings, keys: SigningKeyPair) -> Self {
        let users = default_users().into_iter().map(|u| (u.subject.clone(), u)).collect();
        info!(issuer = %settings.issuer, kid = %keys.kid(), "Local token issuer initialized");
        Self {
            settings,
            keys,
            users: RwLock::new(users),
            revoked: RevocationList::new(),
        }
    }

    pub fn settings(&self) -> &IssuerSettings {
        &self.settings
    }

    pub fn kid(&self) -> &str {
        self.keys.kid()
    }

    pub fn register_user(&self, user: MockUser) {
        debug!(subject = %user.subject, principal_type = %user.principal_type, "Registered user");
        self.users.write().insert(user.subject.clone(), user);
    }

    pub fn user(&self, subject: &str) -> Option<MockUser> {
        self.users.read().get(subject).cloned()
    }

    pub fn users(&self) -> Vec<MockUser> {
        let mut users: Vec<_> = self.users.read().values().cloned().collect();
        users.sort_by(|a, b| a.subject.cmp(&b.subject));
        users
    }

    pub fn issue_token(&self, request: TokenRequest) -> Result<String, IssuerError> {
        let now = Utc::now().timestamp();
        let user = self.user(&request.subject);

        let mut claims = match &user {
            Some(user) => user.claims(),
            None => {
                let mut claims = Map::new();
                claims.insert("sub".into(), json!(request.subject));
                claims
            }
        };
        let principal_type = request
            .principal_type
            .or_else(|| user.as_ref().map(|u| u.principal_type))
            .unwrap_or(PrincipalType::Human);
        claims.insert("principal_type".into(), json!(principal_type.as_str()));
        if let Some(groups) = &request.groups {
            claims.insert("groups".into(), json!(groups));
        }

        let ttl = request
            .ttl_seconds
            .unwrap_or_else(|| self.settings.lifetimes.for_type(principal_type));
        let jti = Uuid::new_v4().to_string();
        claims.insert("iss".into(), json!(self.settings.issuer));
        claims.insert("aud".into(), json!(self.settings.audience));
        claims.insert("iat".into(), json!(now));
        claims.insert("exp".into(), json!(now + ttl));
        claims.insert("jti".into(), json!(jti));
        claims.insert("cid".into(), json!(self.settings.client_id));
        if request.kind == TokenKind::Id {
            claims.insert("nonce".into(), json!(Uuid::new_v4().to_string()));
            claims.insert("auth_time".into(), json!(now));
        }
        claims.extend(request.extra_claims);

        let token = self.sign(&claims)?;
        debug!(subject = %request.subject, %principal_type, ttl, jti = %jti, "Issued token");
        Ok(token)
    }

    fn sign(&self, claims: &Map<String, Value>) -> Result<String, jsonwebtoken::errors::Error> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.keys.kid().to_string());
        encode(&header, claims, self.keys.encoding_key())
    }

    /// Full verification: signature, key id, claims and revocation.
    pub fn verify_claims(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let header = decode_header(token)?;
        if let Some(kid) = header.kid.as_deref() {
            if kid != self.keys.kid() {
                return Err(TokenError::InvalidToken(format!("unknown signing key '{kid}'")));
            }
        }
        let claims = decode_claims(
            token,
            self.keys.decoding_key(),
            &self.settings.issuer,
            &self.settings.audience,
            self.settings.leeway_seconds,
        )?;
        if let Some(jti) = &claims.jti {
            if self.revoked.is_revoked(jti, Utc::now().timestamp()) {
                return Err(TokenError::Revoked);
            }
        }
        Ok(claims)
    }

    /// Revokes a token by its `jti`. Returns false when the token carries no
    /// `jti` or `exp`, or cannot be decoded at all.
    pub fn revoke(&self, token: &str) -> bool {
        let Some(claims) = unverified_claims(token) else {
            return false;
        };
        match (
            claims.get("jti").and_then(Value::as_str),
            claims.get("exp").and_then(Value::as_i64),
        ) {
            (Some(jti), Some(exp)) => {
                self.revoked.revoke(jti, exp);
                info!(jti, "Token revoked");
                true
            }
            _ => false,
        }
    }

    /// RFC 7662 introspection. Any verification failure reports an inactive
    /// token without further detail.
    pub fn introspect(&self, token: &str) -> Value {
        match self.verify_claims(token) {
            Ok(claims) => json!({
                "active": true,
                "sub": claims.sub,
                "client_id": claims.extra.get("cid"),
                "username": claims.sub,
                "token_type": "Bearer",
                "exp": claims.exp,
                "iat": claims.iat,
                "iss": claims.iss,
                "aud": claims.aud,
                "principal_type": claims.principal_type.unwrap_or(PrincipalType::Human),
                "groups": claims.groups,
            }),
            Err(_) => json!({ "active": false }),
        }
    }

    pub fn userinfo(&self, token: &str) -> Result<Value, TokenError> {
        let claims = self.verify_claims(token)?;
        let mut info = Map::new();
        info.insert("sub".into(), json!(claims.sub));
        match self.user(&claims.sub) {
            Some(user) => {
                if let Some(name) = user.name {
                    info.insert("name".into(), json!(name));
                }
                if let Some(email) = user.email {
                    info.insert("email".into(), json!(email));
                    info.insert("email_verified".into(), json!(true));
                }
                if !user.groups.is_empty() {
                    info.insert("groups".into(), json!(user.groups));
                }
                info.insert("principal_type".into(), json!(user.principal_type));
            }
            None => {
                info.insert("groups".into(), json!(claims.groups));
                info.insert(
                    "principal_type".into(),
                    json!(claims.principal_type.unwrap_or(PrincipalType::Human)),
                );
                for key in ["name", "email"] {
                    if let Some(value) = claims.extra.get(key) {
                        info.insert(key.into(), value.clone());
                    }
                }
            }
        }
        Ok(Value::Object(info))
    }

    /// Trades a verified subject token for a short-lived, narrowly scoped
    /// token acting on behalf of the same principal.
    pub fn exchange_token(&self, subject_token: &str) -> Result<String, ExchangeError> {
        let subject = self.verify_claims(subject_token)?;
        if subject.extra.contains_key("acting_as") || subject.extra.contains_key("original_token_id") {
            return Err(ExchangeError::AlreadyExchanged);
        }

        let now = Utc::now().timestamp();
        let ttl = self.settings.lifetimes.exchange();
        let auth_time = subject
            .extra
            .get("auth_time")
            .and_then(Value::as_i64)
            .unwrap_or(subject.iat);
        let principal_type = subject.principal_type.unwrap_or(PrincipalType::Human);

        let mut claims = Map::new();
        claims.insert("sub".into(), json!(subject.sub));
        claims.insert("principal_type".into(), json!(principal_type.as_str()));
        claims.insert("groups".into(), json!(subject.groups));
        claims.insert("amr".into(), json!(subject.amr));
        claims.insert("iss".into(), json!(self.settings.issuer));
        claims.insert("aud".into(), json!(self.settings.audience));
        claims.insert("iat".into(), json!(now));
        claims.insert("exp".into(), json!(now + ttl));
        claims.insert("jti".into(), json!(Uuid::new_v4().to_string()));
        claims.insert("cid".into(), json!(self.settings.client_id));
        claims.insert("scope".into(), json!(self.settings.exchange_scope));
        claims.insert("acting_as".into(), json!(self.settings.exchange_actor));
        claims.insert("original_token_id".into(), json!(subject.jti));
        claims.insert("auth_time".into(), json!(auth_time));

        let token = self.sign(&claims).map_err(|e| ExchangeError::Signing(e.to_string()))?;
        info!(
            subject = %subject.sub,
            %principal_type,
            ttl,
            scope = %self.settings.exchange_scope,
            "Token exchanged"
        );
        Ok(token)
    }

    pub fn jwks(&self) -> JwksDocument {
        self.keys.jwks()
    }

    pub fn discovery_document(&self) -> Value {
        let base = self.settings.issuer.trim_end_matches('/');
        json!({
            "issuer": self.settings.issuer,
            "authorization_endpoint": format!("{base}/v1/authorize"),
            "token_endpoint": format!("{base}/v1/token"),
            "userinfo_endpoint": format!("{base}/v1/userinfo"),
            "jwks_uri": format!("{base}/v1/keys"),
            "introspection_endpoint": format!("{base}/v1/introspect"),
            "revocation_endpoint": format!("{base}/v1/revoke"),
            "response_types_supported": ["code", "id_token", "token", "code id_token", "code token", "id_token token", "code id_token token"],
            "subject_types_supported": ["public"],
            "id_token_signing_alg_values_supported": ["RS256"],
            "scopes_supported": ["openid", "profile", "email", "groups", self.settings.exchange_scope],
            "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post", "private_key_jwt"],
            "claims_supported": ["sub", "name", "email", "groups", "principal_type", "iss", "aud", "exp", "iat", "jti"],
            "grant_types_supported": ["authorization_code", "refresh_token", "client_credentials", "password", TOKEN_EXCHANGE_GRANT_TYPE],
        })
    }

    /// Token endpoint dispatch.
    pub fn handle_grant(&self, grant: TokenGrant) -> Result<TokenResponse, GrantError> {
        let scope = grant.scope.unwrap_or_else(|| "openid".to_string());
        match grant.grant_type.as_str() {
            "client_credentials" => {
                let client_id = grant
                    .client_id
                    .ok_or_else(|| GrantError::InvalidRequest("client_id required".to_string()))?;
                let principal_type = self
                    .user(&client_id)
                    .map(|u| u.principal_type)
                    .unwrap_or(PrincipalType::Machine);
                let access_token =
                    self.issue_token(TokenRequest::for_subject(&client_id).principal_type(principal_type))?;
                Ok(TokenResponse {
                    access_token,
                    id_token: None,
                    token_type: "Bearer".to_string(),
                    expires_in: self.settings.lifetimes.for_type(principal_type),
                    scope,
                    issued_token_type: None,
                })
            }
            "password" => {
                let username = grant
                    .username
                    .ok_or_else(|| GrantError::InvalidRequest("username required".to_string()))?;
                let user = self
                    .user(&username)
                    .ok_or_else(|| GrantError::UnknownUser(username.clone()))?;
                let access_token = self.issue_token(TokenRequest::for_subject(&username))?;
                let id_token = self.issue_token(TokenRequest::for_subject(&username).id_token())?;
                Ok(TokenResponse {
                    access_token,
                    id_token: Some(id_token),
                    token_type: "Bearer".to_string(),
                    expires_in: self.settings.lifetimes.for_type(user.principal_type),
                    scope,
                    issued_token_type: None,
                })
            }
            TOKEN_EXCHANGE_GRANT_TYPE => {
                let subject_token = grant
                    .subject_token
                    .ok_or_else(|| GrantError::InvalidRequest("subject_token required".to_string()))?;
                let access_token = self.exchange_token(&subject_token).map_err(|e| match e {
                    ExchangeError::Signing(msg) => GrantError::Server(msg),
                    other => GrantError::InvalidGrant(other.to_string()),
                })?;
                Ok(TokenResponse {
                    access_token,
                    id_token: None,
                    token_type: "Bearer".to_string(),
                    expires_in: self.settings.lifetimes.exchange(),
                    scope: self.settings.exchange_scope.clone(),
                    issued_token_type: Some(ACCESS_TOKEN_TYPE.to_string()),
                })
            }
            other => Err(GrantError::UnsupportedGrantType(other.to_string())),
        }
    }
}

/// Payload of a JWT without any verification. Only used to locate the `jti`
/// of a token being revoked.
fn unverified_claims(token: &str) -> Option<Map<String, Value>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[async_trait]
impl TokenVerifier for LocalTokenIssuer {
    async fn verify(&self, token: &str) -> Result<VerifiedPrincipal, TokenError> {
        let result = self.verify_claims(token).map(TokenClaims::into_principal);
        record_verification(&result);
        result
    }
}

#[async_trait]
impl TokenExchanger for LocalTokenIssuer {
    async fn exchange(&self, subject_token: &str) -> Result<String, ExchangeError> {
        self.exchange_token(subject_token)
    }
}
