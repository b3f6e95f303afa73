// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Gateway Bootstrap
//!
//! Builds the authorization core from a [`GatewayConfig`]:
//!
//! ```text
//! catalog ──► CapabilityRegistry ──► policy loader ──► PolicyEngine
//! auth.mode
//!   local  ──► LocalTokenIssuer (verifier + exchanger)
//!   remote ──► RemoteJwksVerifier + HttpTokenExchanger
//! exchanger ──► CachingExchanger ──► ToolGateway ◄── HttpCapabilityBackend
//! ```
//!
//! Startup fails if the catalog or policy cannot be loaded and validated.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::application::capability_registry::CapabilityRegistry;
use crate::application::policy_engine::{AccessRequest, PolicyEngine};
use crate::application::policy_loader::load_policy;
use crate::application::tool_gateway::{ToolGateway, ToolGatewaySettings};
use crate::config::{AuthMode, GatewayConfig};
use crate::domain::evaluation::{EvaluationClaims, PolicyEvaluationResult};
use crate::domain::principal::VerifiedPrincipal;
use crate::domain::token::{TokenExchanger, TokenVerifier};
use crate::infrastructure::auth::exchange::{CachingExchanger, ExchangeTokenCache, HttpTokenExchanger};
use crate::infrastructure::auth::issuer::{IssuerSettings, LocalTokenIssuer};
use crate::infrastructure::auth::keys::SigningKeyPair;
use crate::infrastructure::auth::verifier::RemoteJwksVerifier;
use crate::infrastructure::backend_client::HttpCapabilityBackend;

/// Recorded as `acting_as` on tokens minted for backend calls.
const EXCHANGE_ACTOR: &str = "mcp-server";

pub struct GatewayContext {
    pub config: GatewayConfig,
    pub registry: Arc<CapabilityRegistry>,
    pub engine: Arc<PolicyEngine>,
    pub verifier: Arc<dyn TokenVerifier>,
    /// Present in local auth mode only.
    pub issuer: Option<Arc<LocalTokenIssuer>>,
    pub tool_gateway: Arc<ToolGateway>,
}

impl GatewayContext {
    pub fn from_config(config: GatewayConfig) -> anyhow::Result<Self> {
        let keys = match (&config.auth.mode, &config.auth.signing_key_path) {
            (AuthMode::Local, Some(path)) => {
                let pem = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read signing key {path:?}"))?;
                Some(
                    SigningKeyPair::from_pkcs1_pem(&pem)
                        .with_context(|| format!("Invalid signing key {path:?}"))?,
                )
            }
            _ => None,
        };
        Self::build(config, keys)
    }

    /// Like [`Self::from_config`], signing local tokens with `keys` instead
    /// of a freshly generated key.
    pub fn with_signing_key(config: GatewayConfig, keys: SigningKeyPair) -> anyhow::Result<Self> {
        Self::build(config, Some(keys))
    }

    fn build(config: GatewayConfig, keys: Option<SigningKeyPair>) -> anyhow::Result<Self> {
        config.validate()?;

        let registry = Arc::new(
            CapabilityRegistry::load(&config.catalog_path)
                .with_context(|| format!("Failed to load capability catalog {:?}", config.catalog_path))?,
        );
        let policy = load_policy(&config.policy_path, &registry)
            .with_context(|| format!("Failed to load access policy {:?}", config.policy_path))?;
        let engine = Arc::new(PolicyEngine::new(policy));

        let timeout = Duration::from_secs(config.tool_gateway.request_timeout_seconds);
        let (verifier, exchanger, issuer): (Arc<dyn TokenVerifier>, Arc<dyn TokenExchanger>, _) =
            match config.auth.mode {
                AuthMode::Local => {
                    let settings = IssuerSettings {
                        issuer: config.auth.issuer.clone(),
                        audience: config.auth.audience.clone(),
                        client_id: config.auth.client_id.clone(),
                        lifetimes: config.auth.ttl,
                        leeway_seconds: config.auth.leeway_seconds,
                        exchange_actor: EXCHANGE_ACTOR.to_string(),
                        exchange_scope: config.tool_gateway.exchange_scope.clone(),
                    };
                    let issuer = Arc::new(match keys {
                        Some(keys) => LocalTokenIssuer::with_keys(settings, keys),
                        None => LocalTokenIssuer::new(settings).context("Failed to create signing key")?,
                    });
                    (
                        issuer.clone() as Arc<dyn TokenVerifier>,
                        issuer.clone() as Arc<dyn TokenExchanger>,
                        Some(issuer),
                    )
                }
                AuthMode::Remote => {
                    let verifier = RemoteJwksVerifier::new(
                        &config.auth.issuer,
                        &config.auth.audience,
                        Duration::from_secs(config.auth.jwks_cache_ttl_seconds),
                        config.auth.leeway_seconds,
                    );
                    let exchanger =
                        HttpTokenExchanger::new(&config.auth.issuer, &config.tool_gateway.exchange_scope, timeout)?;
                    (
                        Arc::new(verifier) as Arc<dyn TokenVerifier>,
                        Arc::new(exchanger) as Arc<dyn TokenExchanger>,
                        None,
                    )
                }
            };

        let capacity = NonZeroUsize::new(config.tool_gateway.exchange_cache_capacity)
            .context("exchange cache capacity must be at least 1")?;
        let exchanger = Arc::new(CachingExchanger::new(
            exchanger,
            ExchangeTokenCache::new(
                capacity,
                Duration::from_secs(config.tool_gateway.exchange_cache_ttl_seconds),
            ),
        ));

        let backend = Arc::new(HttpCapabilityBackend::new(&config.tool_gateway.backend_base_url, timeout)?);
        let tool_gateway = Arc::new(ToolGateway::new(
            verifier.clone(),
            exchanger,
            backend,
            ToolGatewaySettings {
                admin_group: config.tool_gateway.admin_group.clone(),
                employee_group: config.tool_gateway.employee_group.clone(),
                expose_backend_detail: config.environment.exposes_internal_errors(),
            },
        ));

        info!(
            environment = %config.environment,
            auth_mode = ?config.auth.mode,
            capabilities = registry.count(),
            rules = engine.policy().policies.len(),
            "Gateway core initialized"
        );

        Ok(Self {
            config,
            registry,
            engine,
            verifier,
            issuer,
            tool_gateway,
        })
    }

    /// Evaluates `capability` for `principal` in the configured environment.
    pub fn evaluate(
        &self,
        principal: &VerifiedPrincipal,
        capability: &str,
        source_ip: Option<&str>,
    ) -> PolicyEvaluationResult {
        let mut claims = EvaluationClaims::from_principal(principal);
        if let Some(ip) = source_ip {
            claims = claims.with_source_ip(ip);
        }
        let environment = self.config.environment.as_str();
        self.engine
            .evaluate(&AccessRequest::for_principal(principal, capability, environment, &claims))
    }

    /// Loads the catalog and policy off to the side and validates them
    /// together. Only when both succeed are the registry and engine swapped;
    /// on any failure both keep serving what they had.
    pub fn reload_policy(&self) -> anyhow::Result<()> {
        let registry = CapabilityRegistry::load(&self.config.catalog_path)
            .with_context(|| format!("Failed to load capability catalog {:?}", self.config.catalog_path))?;
        let policy = load_policy(&self.config.policy_path, &registry)
            .with_context(|| format!("Failed to load access policy {:?}", self.config.policy_path))?;
        self.registry.replace_with(&registry);
        self.engine.reload(policy);
        Ok(())
    }
}
