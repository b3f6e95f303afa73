// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Tool Gateway
//!
//! Second enforcement layer in front of the Capability API for tool-calling
//! clients. Every invocation runs the same pipeline:
//!
//! 1. Authenticate the bearer token through the configured [`TokenVerifier`].
//! 2. Resolve the caller's [`ToolRole`] and check the role → tool table.
//!    Unknown tools are refused with the same message as disallowed ones.
//! 3. Enforce MFA for tools that require it (humans only).
//! 4. Build backend parameters from the tool arguments.
//! 5. Exchange the caller's token for a scoped, short-lived one.
//! 6. Call the backend action and return its `data` payload.
//!
//! Backend failures are mapped to caller-facing messages; server-side
//! detail is only exposed when the gateway runs in a local environment.
//! Steps 5 and 6 are audited on the `audit` tracing target whether they
//! succeed or fail.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::backend::CapabilityBackend;
use crate::domain::principal::{PrincipalType, VerifiedPrincipal};
use crate::domain::token::{TokenExchanger, TokenVerifier};
use crate::domain::tool::{find_tool, ToolError, ToolRole, TOOLS};
use crate::infrastructure::audit::{AuditStatus, ToolAuditLogger};

#[derive(Debug, Clone)]
pub struct ToolGatewaySettings {
    pub admin_group: String,
    pub employee_group: String,
    /// Pass backend 5xx detail through to callers.
    pub expose_backend_detail: bool,
}

impl Default for ToolGatewaySettings {
    fn default() -> Self {
        Self {
            admin_group: "hr-platform-admins".to_string(),
            employee_group: "employees".to_string(),
            expose_backend_detail: false,
        }
    }
}

/// Result of tool discovery for one caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolListing {
    pub principal: String,
    pub role: ToolRole,
    pub available_tools: Vec<&'static str>,
}

pub struct ToolGateway {
    verifier: Arc<dyn TokenVerifier>,
    exchanger: Arc<dyn TokenExchanger>,
    backend: Arc<dyn CapabilityBackend>,
    audit: ToolAuditLogger,
    settings: ToolGatewaySettings,
}

/// Accepts either a bare token or an `Authorization` header value.
fn strip_bearer(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .unwrap_or(raw)
        .trim()
}

impl ToolGateway {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        exchanger: Arc<dyn TokenExchanger>,
        backend: Arc<dyn CapabilityBackend>,
        settings: ToolGatewaySettings,
    ) -> Self {
        Self {
            verifier,
            exchanger,
            backend,
            audit: ToolAuditLogger::new(),
            settings,
        }
    }

    pub fn resolve_role(&self, principal: &VerifiedPrincipal) -> ToolRole {
        ToolRole::resolve(
            principal.principal_type,
            &principal.groups,
            &self.settings.admin_group,
            &self.settings.employee_group,
        )
    }

    pub fn is_tool_allowed(&self, principal: &VerifiedPrincipal, tool_name: &str) -> bool {
        let role = self.resolve_role(principal);
        let allowed = find_tool(tool_name).is_some() && role.can_use(tool_name);
        if allowed {
            debug!(principal = %principal.subject, %role, tool = tool_name, "Tool access granted");
        } else {
            warn!(
                principal = %principal.subject,
                principal_type = %principal.principal_type,
                groups = ?principal.groups,
                %role,
                tool = tool_name,
                "Tool access denied"
            );
        }
        allowed
    }

    async fn authenticate(&self, bearer: Option<&str>) -> Result<(String, VerifiedPrincipal), ToolError> {
        let token = bearer.map(strip_bearer).filter(|t| !t.is_empty()).ok_or(ToolError::MissingToken)?;
        let principal = self
            .verifier
            .verify(token)
            .await
            .map_err(|_| ToolError::InvalidToken)?;
        Ok((token.to_string(), principal))
    }

    /// Tools the caller may invoke, in discovery order.
    pub async fn list_available_tools(&self, bearer: Option<&str>) -> Result<ToolListing, ToolError> {
        let (_, principal) = self.authenticate(bearer).await?;
        let role = self.resolve_role(&principal);
        Ok(ToolListing {
            available_tools: TOOLS
                .iter()
                .map(|tool| tool.name)
                .filter(|name| role.can_use(name))
                .collect(),
            principal: principal.subject,
            role,
        })
    }

    pub async fn invoke(
        &self,
        bearer: Option<&str>,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let result = self.run(bearer, tool_name, arguments).await;
        let label = find_tool(tool_name).map(|t| t.name).unwrap_or("unknown");
        let status = match &result {
            Ok(_) => "success",
            Err(err) => err.code(),
        };
        metrics::counter!("tool_invocations_total", "tool" => label, "status" => status).increment(1);
        result
    }

    async fn run(&self, bearer: Option<&str>, tool_name: &str, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        let (token, principal) = self.authenticate(bearer).await?;

        let tool = match find_tool(tool_name) {
            Some(tool) if self.is_tool_allowed(&principal, tool_name) => tool,
            _ => {
                return Err(ToolError::ToolNotPermitted {
                    principal_type: principal.principal_type.to_string(),
                    tool: tool_name.to_string(),
                })
            }
        };

        if tool.requires_mfa && principal.principal_type == PrincipalType::Human && !principal.mfa_verified {
            warn!(principal = %principal.subject, tool = tool.name, "MFA required");
            return Err(ToolError::MfaRequired);
        }

        let parameters = (tool.build_params)(arguments).map_err(|msg| {
            warn!(tool = tool.name, "Parameter preparation failed: {}", msg);
            ToolError::InvalidParameters(msg)
        })?;

        let scoped = match self.exchanger.exchange(&token).await {
            Ok(scoped) => scoped,
            Err(err) => {
                warn!(principal = %principal.subject, tool = tool.name, "Token exchange failed: {}", err);
                self.audit
                    .record(tool.name, &principal.subject, &parameters, AuditStatus::Error);
                return Err(ToolError::ExchangeFailed);
            }
        };

        match self
            .backend
            .call_action(tool.domain, tool.action, parameters.clone(), &scoped)
            .await
        {
            Ok(data) => {
                self.audit
                    .record(tool.name, &principal.subject, &parameters, AuditStatus::Success);
                Ok(data)
            }
            Err(err) => {
                self.audit
                    .record(tool.name, &principal.subject, &parameters, AuditStatus::Error);
                Err(err.into_tool_error(self.settings.expose_backend_detail))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backend::BackendError;
    use crate::infrastructure::auth::issuer::{IssuerSettings, LocalTokenIssuer, TokenRequest};
    use crate::infrastructure::auth::keys::{SigningKeyPair, TEST_RSA_PRIVATE_PEM};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<(String, String, Value, String)>>,
        failure: Option<BackendError>,
    }

    #[async_trait]
    impl CapabilityBackend for RecordingBackend {
        async fn call_action(
            &self,
            domain: &str,
            action: &str,
            parameters: Value,
            token: &str,
        ) -> Result<Value, BackendError> {
            self.calls
                .lock()
                .push((domain.to_string(), action.to_string(), parameters, token.to_string()));
            match &self.failure {
                Some(err) => Err(err.clone()),
                None => Ok(json!({"ok": true})),
            }
        }
    }

    fn setup(backend: RecordingBackend, expose: bool) -> (Arc<LocalTokenIssuer>, Arc<RecordingBackend>, ToolGateway) {
        let issuer = Arc::new(LocalTokenIssuer::with_keys(
            IssuerSettings::default(),
            SigningKeyPair::from_pkcs1_pem(TEST_RSA_PRIVATE_PEM).unwrap(),
        ));
        let backend = Arc::new(backend);
        let gateway = ToolGateway::new(
            issuer.clone(),
            issuer.clone(),
            backend.clone(),
            ToolGatewaySettings {
                expose_backend_detail: expose,
                ..ToolGatewaySettings::default()
            },
        );
        (issuer, backend, gateway)
    }

    fn token(issuer: &LocalTokenIssuer, subject: &str) -> String {
        issuer.issue_token(TokenRequest::for_subject(subject)).unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_agent_cannot_invoke_compensation() {
        let (issuer, backend, gateway) = setup(RecordingBackend::default(), false);
        let bearer = token(&issuer, "agent-assistant@local.test");
        let err = gateway
            .invoke(Some(&bearer), "get_compensation", &args(json!({"employee_id": "EMP001"})))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "FORBIDDEN: Principal type 'AI_AGENT' is not authorized to use tool 'get_compensation'."
        );
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_indistinguishable_from_forbidden() {
        let (issuer, _, gateway) = setup(RecordingBackend::default(), false);
        let bearer = token(&issuer, "admin@local.test");
        let err = gateway
            .invoke(Some(&bearer), "delete_everyone", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ToolNotPermitted { .. }));
    }

    #[tokio::test]
    async fn test_admin_call_uses_exchanged_token() {
        let (issuer, backend, gateway) = setup(RecordingBackend::default(), false);
        let bearer = format!("Bearer {}", token(&issuer, "admin@local.test"));
        let data = gateway
            .invoke(Some(&bearer), "get_compensation", &args(json!({"employee_id": "EMP042"})))
            .await
            .unwrap();
        assert_eq!(data, json!({"ok": true}));

        let calls = backend.calls.lock();
        let (domain, action, params, scoped) = &calls[0];
        assert_eq!(domain, "workday.payroll");
        assert_eq!(action, "get_compensation");
        assert_eq!(params, &json!({"employee_id": "EMP042"}));

        let claims = issuer.verify_claims(scoped).unwrap();
        assert_eq!(claims.extra["acting_as"], "mcp-server");
        assert_eq!(claims.extra["scope"], "mcp:use");
    }

    #[tokio::test]
    async fn test_payroll_requires_mfa_for_humans() {
        let (issuer, backend, gateway) = setup(RecordingBackend::default(), false);
        let bearer = token(&issuer, "user@local.test");
        let err = gateway
            .invoke(Some(&bearer), "list_pay_statements", &args(json!({"employee_id": "EMP001"})))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::MfaRequired);
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_and_invalid_tokens() {
        let (_, _, gateway) = setup(RecordingBackend::default(), false);
        assert_eq!(
            gateway.invoke(None, "get_employee", &Map::new()).await.unwrap_err(),
            ToolError::MissingToken
        );
        assert_eq!(
            gateway.invoke(Some("Bearer "), "get_employee", &Map::new()).await.unwrap_err(),
            ToolError::MissingToken
        );
        assert_eq!(
            gateway
                .invoke(Some("not-a-jwt"), "get_employee", &Map::new())
                .await
                .unwrap_err(),
            ToolError::InvalidToken
        );
    }

    #[tokio::test]
    async fn test_invalid_parameters_stop_before_backend() {
        let (issuer, backend, gateway) = setup(RecordingBackend::default(), false);
        let bearer = token(&issuer, "user@local.test");
        let err = gateway.invoke(Some(&bearer), "get_employee", &Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_exchanged_bearer_cannot_be_reexchanged() {
        let (issuer, backend, gateway) = setup(RecordingBackend::default(), false);
        let exchanged = issuer.exchange_token(&token(&issuer, "user@local.test")).unwrap();
        let err = gateway
            .invoke(Some(&exchanged), "get_employee", &args(json!({"employee_id": "EMP001"})))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::ExchangeFailed);
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_mapping_respects_exposure() {
        let failure = BackendError::Status {
            status: 500,
            message: "connection pool exhausted".into(),
            error_code: None,
        };
        let (issuer, _, gateway) = setup(
            RecordingBackend {
                failure: Some(failure.clone()),
                ..RecordingBackend::default()
            },
            false,
        );
        let bearer = token(&issuer, "user@local.test");
        let err = gateway
            .invoke(Some(&bearer), "get_employee", &args(json!({"employee_id": "EMP001"})))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::BackendFailure { detail: None });

        let (issuer, _, gateway) = setup(
            RecordingBackend {
                failure: Some(failure),
                ..RecordingBackend::default()
            },
            true,
        );
        let bearer = token(&issuer, "user@local.test");
        let err = gateway
            .invoke(Some(&bearer), "get_employee", &args(json!({"employee_id": "EMP001"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection pool exhausted"));
    }

    #[tokio::test]
    async fn test_tool_listing_per_role() {
        let (issuer, _, gateway) = setup(RecordingBackend::default(), false);

        let listing = gateway
            .list_available_tools(Some(&token(&issuer, "agent-assistant@local.test")))
            .await
            .unwrap();
        assert_eq!(listing.role, ToolRole::AiAgent);
        assert_eq!(
            listing.available_tools,
            vec!["get_employee", "get_manager_chain", "get_org_chart", "update_contact_info", "get_pto_balance"]
        );

        let listing = gateway
            .list_available_tools(Some(&token(&issuer, "admin@local.test")))
            .await
            .unwrap();
        assert_eq!(listing.role, ToolRole::Admin);
        assert_eq!(listing.available_tools.len(), 12);

        let listing = gateway
            .list_available_tools(Some(&token(&issuer, "svc-workflow@local.test")))
            .await
            .unwrap();
        assert!(listing.available_tools.is_empty());

        let listing = gateway
            .list_available_tools(Some(&token(&issuer, "unauthorized@local.test")))
            .await
            .unwrap();
        assert_eq!(listing.role, ToolRole::Human);
        assert!(listing.available_tools.is_empty());
    }
}
