// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Gateway Configuration
//!
//! YAML configuration for the gateway core. Every section has defaults, so an
//! empty document (or no document at all) yields a working local setup.
//!
//! ## Discovery Order
//!
//! 1. Explicit path passed by the host process (fails if missing or invalid)
//! 2. `HR_GATEWAY_CONFIG` environment variable
//! 3. `./hr-gateway.yaml`
//! 4. `~/.hr-gateway/config.yaml`
//! 5. `/etc/hr-gateway/config.yaml`
//!
//! Environment variable overrides are applied after loading.
//!
//! ## Example
//!
//! ```yaml
//! environment: dev
//! catalog_path: config/capabilities/index.yaml
//! policy_path: config/policy-workday.yaml
//! auth:
//!   mode: remote
//!   issuer: https://example.okta.com/oauth2/default
//!   audience: api://hr-ai-platform
//! tool_gateway:
//!   backend_base_url: http://capability-api:8000
//! logging:
//!   level: debug
//!   format: json
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::token::MAX_EXCHANGED_TTL_SECONDS;
use crate::infrastructure::auth::issuer::TokenLifetimes;

/// Where the gateway is running. `test` is accepted for test harnesses; no
/// policy rule targets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Local,
    Dev,
    Staging,
    Prod,
    Test,
}

impl RuntimeEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Prod => "prod",
            Self::Test => "test",
        }
    }

    /// Internal backend failure detail is only shown to callers locally.
    pub fn exposes_internal_errors(&self) -> bool {
        matches!(self, Self::Local | Self::Test)
    }
}

impl fmt::Display for RuntimeEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dev" => Ok(Self::Dev),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            "test" => Ok(Self::Test),
            other => Err(format!("Invalid environment: {other}. Must be one of local, dev, staging, prod, test")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Tokens are issued and verified by the in-process issuer.
    #[default]
    Local,
    /// Tokens are verified against a remote issuer's published key set.
    Remote,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(format!("unknown auth mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub issuer: String,
    pub audience: String,
    pub client_id: String,
    pub jwks_cache_ttl_seconds: u64,
    pub leeway_seconds: u64,
    pub ttl: TokenLifetimes,
    /// PKCS#1 PEM key for the local issuer. A fresh key is generated at
    /// startup when unset, so tokens do not survive a restart.
    pub signing_key_path: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Local,
            issuer: "http://localhost:9000/oauth2/default".to_string(),
            audience: "api://hr-ai-platform".to_string(),
            client_id: "mock-client-id".to_string(),
            jwks_cache_ttl_seconds: 300,
            leeway_seconds: 60,
            ttl: TokenLifetimes::default(),
            signing_key_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolGatewayConfig {
    pub backend_base_url: String,
    pub request_timeout_seconds: u64,
    pub exchange_scope: String,
    pub exchange_cache_capacity: usize,
    pub exchange_cache_ttl_seconds: u64,
    pub admin_group: String,
    pub employee_group: String,
}

impl Default for ToolGatewayConfig {
    fn default() -> Self {
        Self {
            backend_base_url: "http://localhost:8000".to_string(),
            request_timeout_seconds: 30,
            exchange_scope: "mcp:use".to_string(),
            exchange_cache_capacity: 1000,
            exchange_cache_ttl_seconds: 240,
            admin_group: "hr-platform-admins".to_string(),
            employee_group: "employees".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub environment: RuntimeEnvironment,
    pub catalog_path: PathBuf,
    pub policy_path: PathBuf,
    pub auth: AuthConfig,
    pub tool_gateway: ToolGatewayConfig,
    pub logging: LoggingConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::Local,
            catalog_path: PathBuf::from("config/capabilities/index.yaml"),
            policy_path: PathBuf::from("config/policy-workday.yaml"),
            auth: AuthConfig::default(),
            tool_gateway: ToolGatewayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// First existing configuration file in discovery order, if any.
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("HR_GATEWAY_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./hr-gateway.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".hr-gateway").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/hr-gateway/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, falling back to defaults.
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = explicit_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from: {:?}", path);
            Self::from_yaml_file(&path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`. Values that do not parse are logged
    /// and ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("ENVIRONMENT") {
            match val.parse::<RuntimeEnvironment>() {
                Ok(env) => {
                    tracing::info!("Environment override: ENVIRONMENT={}", env);
                    self.environment = env;
                }
                Err(e) => tracing::warn!("Ignoring ENVIRONMENT override: {}", e),
            }
        }

        if let Some(val) = lookup("AUTH_MODE") {
            match val.parse::<AuthMode>() {
                Ok(mode) => self.auth.mode = mode,
                Err(e) => tracing::warn!("Invalid value for AUTH_MODE: '{}'. Ignoring. ({})", val, e),
            }
        }

        if let Some(val) = lookup("POLICY_PATH") {
            self.policy_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("CAPABILITY_CATALOG_PATH") {
            self.catalog_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("CAPABILITY_API_BASE_URL") {
            self.tool_gateway.backend_base_url = val;
        }
        if let Some(val) = lookup("LOG_LEVEL") {
            self.logging.level = val.to_ascii_lowercase();
        }
        if let Some(val) = lookup("OKTA_ISSUER") {
            self.auth.issuer = val;
        }
        if let Some(val) = lookup("OKTA_AUDIENCE") {
            self.auth.audience = val;
        }
        if let Some(val) = lookup("OKTA_CLIENT_ID") {
            self.auth.client_id = val;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.auth.issuer.trim().is_empty() {
            anyhow::bail!("auth.issuer cannot be empty");
        }
        if self.auth.audience.trim().is_empty() {
            anyhow::bail!("auth.audience cannot be empty");
        }
        if self.auth.mode == AuthMode::Remote && !self.auth.issuer.starts_with("http") {
            anyhow::bail!(
                "auth.issuer must be an http(s) URL in remote mode, got '{}'",
                self.auth.issuer
            );
        }
        if self.auth.ttl.exchange_seconds > MAX_EXCHANGED_TTL_SECONDS {
            anyhow::bail!(
                "auth.ttl.exchange_seconds ({}) exceeds the maximum of {} seconds",
                self.auth.ttl.exchange_seconds,
                MAX_EXCHANGED_TTL_SECONDS
            );
        }
        if self.auth.ttl.exchange_seconds <= 0 {
            anyhow::bail!("auth.ttl.exchange_seconds must be positive");
        }
        // Cached scoped tokens must age out before the tokens themselves expire.
        let exchange_seconds = self.auth.ttl.exchange_seconds as u64;
        if self.tool_gateway.exchange_cache_ttl_seconds >= exchange_seconds {
            anyhow::bail!(
                "tool_gateway.exchange_cache_ttl_seconds ({}) must be below auth.ttl.exchange_seconds ({})",
                self.tool_gateway.exchange_cache_ttl_seconds,
                exchange_seconds
            );
        }
        if self.tool_gateway.exchange_cache_capacity == 0 {
            anyhow::bail!("tool_gateway.exchange_cache_capacity must be at least 1");
        }
        if self.tool_gateway.backend_base_url.trim().is_empty() {
            anyhow::bail!("tool_gateway.backend_base_url cannot be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = GatewayConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.auth.ttl.ai_agent_seconds, 300);
        assert_eq!(config.tool_gateway.exchange_scope, "mcp:use");
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = GatewayConfig::from_yaml_str(
            r#"
environment: prod
auth:
  mode: remote
  issuer: https://example.okta.com/oauth2/default
  ttl:
    machine_seconds: 600
logging:
  format: json
"#,
        )
        .unwrap();
        assert_eq!(config.environment, RuntimeEnvironment::Prod);
        assert_eq!(config.auth.mode, AuthMode::Remote);
        assert_eq!(config.auth.ttl.machine_seconds, 600);
        assert_eq!(config.auth.ttl.default_seconds, 3600);
        assert_eq!(config.auth.audience, "api://hr-ai-platform");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.environment.exposes_internal_errors());
    }

    #[test]
    fn test_validation() {
        assert!(GatewayConfig::from_yaml_str("auth: { ttl: { exchange_seconds: 900 } }").is_err());
        assert!(GatewayConfig::from_yaml_str("tool_gateway: { exchange_cache_capacity: 0 }").is_err());
        assert!(GatewayConfig::from_yaml_str("auth: { audience: '' }").is_err());
        assert!(GatewayConfig::from_yaml_str("auth: { mode: remote, issuer: okta }").is_err());
        assert!(GatewayConfig::from_yaml_str("environment: qa").is_err());
    }

    #[test]
    fn test_exchange_cache_window_is_shorter_than_exchanged_token() {
        let err = GatewayConfig::from_yaml_str("auth: { ttl: { exchange_seconds: 60 } }").unwrap_err();
        assert!(err.to_string().contains("exchange_cache_ttl_seconds (240)"), "{err}");
        assert!(GatewayConfig::from_yaml_str(
            "auth: { ttl: { exchange_seconds: 300 } }\ntool_gateway: { exchange_cache_ttl_seconds: 300 }"
        )
        .is_err());

        let config = GatewayConfig::from_yaml_str(
            "auth: { ttl: { exchange_seconds: 60 } }\ntool_gateway: { exchange_cache_ttl_seconds: 45 }",
        )
        .unwrap();
        assert_eq!(config.tool_gateway.exchange_cache_ttl_seconds, 45);
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ENVIRONMENT", "DEV"),
            ("POLICY_PATH", "/srv/policy.yaml"),
            ("CAPABILITY_API_BASE_URL", "http://api:8000"),
            ("LOG_LEVEL", "DEBUG"),
            ("AUTH_MODE", "remote"),
            ("OKTA_ISSUER", "https://example.okta.com/oauth2/default"),
        ]);
        let mut config = GatewayConfig::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.environment, RuntimeEnvironment::Dev);
        assert_eq!(config.policy_path, PathBuf::from("/srv/policy.yaml"));
        assert_eq!(config.tool_gateway.backend_base_url, "http://api:8000");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.auth.mode, AuthMode::Remote);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_override_is_ignored() {
        let mut config = GatewayConfig::default();
        config.apply_overrides_from(|key| (key == "ENVIRONMENT").then(|| "qa".to_string()));
        assert_eq!(config.environment, RuntimeEnvironment::Local);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        assert!(GatewayConfig::load_or_default(Some(PathBuf::from("/nonexistent/hr-gateway.yaml"))).is_err());
    }
}
