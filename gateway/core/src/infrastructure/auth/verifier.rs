// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Bearer token verification.
//!
//! [`decode_claims`] holds the signature and claim checks shared by every
//! verifier. [`RemoteJwksVerifier`] is the production variant: it trusts the
//! key set an identity provider publishes at `{issuer}/v1/keys` and caches it
//! for a bounded time.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::principal::VerifiedPrincipal;
use crate::domain::token::{TokenClaims, TokenError, TokenVerifier};

/// Signature, issuer, audience and expiry checks. `iat` presence is enforced
/// by [`TokenClaims`] itself.
pub(crate) fn decode_claims(
    token: &str,
    key: &DecodingKey,
    issuer: &str,
    audience: &str,
    leeway_seconds: u64,
) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation.leeway = leeway_seconds;
    Ok(decode::<TokenClaims>(token, key, &validation)?.claims)
}

/// Counts and logs a verification outcome.
pub(crate) fn record_verification(result: &Result<VerifiedPrincipal, TokenError>) {
    match result {
        Ok(principal) => {
            debug!(subject = %principal.subject, principal_type = %principal.principal_type, "Token verified");
            metrics::counter!("token_verifications_total", "outcome" => "valid").increment(1);
        }
        Err(err) => {
            warn!(error_code = err.error_code(), "Token verification failed: {}", err);
            metrics::counter!("token_verifications_total", "outcome" => err.error_code()).increment(1);
        }
    }
}

/// Minimum spacing between refetches triggered by unknown key ids, so
/// unauthenticated traffic cannot drive requests to the provider.
const FORCED_REFETCH_INTERVAL: Duration = Duration::from_secs(30);

struct CachedKeySet {
    keys: JwkSet,
    fetched_at: Instant,
    forced_at: Option<Instant>,
}

pub struct RemoteJwksVerifier {
    issuer: String,
    audience: String,
    jwks_uri: String,
    leeway_seconds: u64,
    cache_ttl: Duration,
    forced_refetch_interval: Duration,
    http: reqwest::Client,
    cache: RwLock<Option<CachedKeySet>>,
}

impl RemoteJwksVerifier {
    pub fn new(issuer: &str, audience: &str, cache_ttl: Duration, leeway_seconds: u64) -> Self {
        let issuer = issuer.trim_end_matches('/').to_string();
        Self {
            jwks_uri: format!("{issuer}/v1/keys"),
            issuer,
            audience: audience.to_string(),
            leeway_seconds,
            cache_ttl,
            forced_refetch_interval: FORCED_REFETCH_INTERVAL,
            http: reqwest::Client::new(),
            cache: RwLock::new(None),
        }
    }

    pub fn with_forced_refetch_interval(mut self, interval: Duration) -> Self {
        self.forced_refetch_interval = interval;
        self
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    async fn fetch(&self) -> Result<JwkSet, TokenError> {
        debug!(uri = %self.jwks_uri, "Fetching signing key set");
        let response = self
            .http
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| TokenError::KeySet(e.to_string()))?
            .error_for_status()
            .map_err(|e| TokenError::KeySet(e.to_string()))?;
        response
            .json::<JwkSet>()
            .await
            .map_err(|e| TokenError::KeySet(e.to_string()))
    }

    /// Cached key set, refetched when stale or when `force` is set. Forced
    /// refetches are honored at most once per `forced_refetch_interval`.
    async fn key_set(&self, force: bool) -> Result<JwkSet, TokenError> {
        if !force {
            let guard = self.cache.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(cached.keys.clone());
                }
            }
        }

        // Re-check under the write lock so concurrent callers share one fetch.
        let mut guard = self.cache.write().await;
        let mut forced_at = None;
        if let Some(cached) = guard.as_ref() {
            let fresh = cached.fetched_at.elapsed() < self.cache_ttl;
            let recently_forced = cached
                .forced_at
                .is_some_and(|at| at.elapsed() < self.forced_refetch_interval);
            if fresh && (!force || recently_forced) {
                if force {
                    debug!(uri = %self.jwks_uri, "Forced key set refetch suppressed");
                }
                return Ok(cached.keys.clone());
            }
            forced_at = cached.forced_at;
        }

        let keys = self.fetch().await?;
        let now = Instant::now();
        *guard = Some(CachedKeySet {
            keys: keys.clone(),
            fetched_at: now,
            forced_at: if force { Some(now) } else { forced_at },
        });
        Ok(keys)
    }

    /// Resolves the key for `kid`, refetching once if the cached set does not
    /// know it (the provider may have rotated keys).
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, TokenError> {
        let mut keys = self.key_set(false).await?;
        if keys.find(kid).is_none() {
            keys = self.key_set(true).await?;
        }
        let jwk = keys
            .find(kid)
            .ok_or_else(|| TokenError::InvalidToken(format!("unknown signing key '{kid}'")))?;
        DecodingKey::from_jwk(jwk).map_err(|e| TokenError::KeySet(e.to_string()))
    }

    async fn verify_inner(&self, token: &str) -> Result<VerifiedPrincipal, TokenError> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| TokenError::InvalidToken("token header has no key id".to_string()))?;
        let key = self.decoding_key(&kid).await?;
        let claims = decode_claims(token, &key, &self.issuer, &self.audience, self.leeway_seconds)?;
        Ok(claims.into_principal())
    }
}

#[async_trait]
impl TokenVerifier for RemoteJwksVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedPrincipal, TokenError> {
        let result = self.verify_inner(token).await;
        record_verification(&result);
        result
    }
}
