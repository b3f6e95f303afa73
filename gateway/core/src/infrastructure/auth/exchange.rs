// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Token exchange against a remote issuer, and a cache in front of any
//! [`TokenExchanger`].

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::token::{ExchangeError, TokenExchanger, ACCESS_TOKEN_TYPE, TOKEN_EXCHANGE_GRANT_TYPE};

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: String,
}

/// RFC 8693 client for `{issuer}/v1/token`.
pub struct HttpTokenExchanger {
    token_endpoint: String,
    scope: String,
    http: reqwest::Client,
}

impl HttpTokenExchanger {
    pub fn new(issuer: &str, scope: &str, timeout: Duration) -> Result<Self, ExchangeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::Endpoint(e.to_string()))?;
        Ok(Self {
            token_endpoint: format!("{}/v1/token", issuer.trim_end_matches('/')),
            scope: scope.to_string(),
            http,
        })
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(&self, subject_token: &str) -> Result<String, ExchangeError> {
        let form = [
            ("grant_type", TOKEN_EXCHANGE_GRANT_TYPE),
            ("subject_token", subject_token),
            ("subject_token_type", ACCESS_TOKEN_TYPE),
            ("scope", self.scope.as_str()),
        ];
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| ExchangeError::Endpoint(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Endpoint(format!("status {status}: {body}")));
        }
        let body: ExchangeResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError::Endpoint(e.to_string()))?;
        Ok(body.access_token)
    }
}

struct CachedToken {
    token: String,
    stored_at: Instant,
}

/// Bounded cache of exchanged tokens keyed by the SHA-256 digest of the
/// subject token. Least recently used entries are evicted at capacity and
/// entries older than the TTL are never returned.
pub struct ExchangeTokenCache {
    entries: Mutex<LruCache<String, CachedToken>>,
    ttl: Duration,
}

impl ExchangeTokenCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn key_for(subject_token: &str) -> String {
        hex::encode(Sha256::digest(subject_token.as_bytes()))
    }

    pub fn get(&self, subject_token: &str) -> Option<String> {
        let key = Self::key_for(subject_token);
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(cached) if cached.stored_at.elapsed() < self.ttl => Some(cached.token.clone()),
            Some(_) => {
                entries.pop(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, subject_token: &str, exchanged: String) {
        self.entries.lock().put(
            Self::key_for(subject_token),
            CachedToken {
                token: exchanged,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wraps an exchanger so repeated calls with the same subject token reuse the
/// scoped token until it ages out of the cache.
pub struct CachingExchanger {
    inner: Arc<dyn TokenExchanger>,
    cache: ExchangeTokenCache,
}

impl CachingExchanger {
    pub fn new(inner: Arc<dyn TokenExchanger>, cache: ExchangeTokenCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &ExchangeTokenCache {
        &self.cache
    }
}

#[async_trait]
impl TokenExchanger for CachingExchanger {
    async fn exchange(&self, subject_token: &str) -> Result<String, ExchangeError> {
        if let Some(token) = self.cache.get(subject_token) {
            debug!("Exchange cache hit");
            return Ok(token);
        }
        let token = self.inner.exchange(subject_token).await?;
        self.cache.insert(subject_token, token.clone());
        Ok(token)
    }
}
