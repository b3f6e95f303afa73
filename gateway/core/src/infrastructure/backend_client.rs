// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP client for the Capability API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::domain::backend::{BackendError, CapabilityBackend};

/// Identifies calls routed through the tool bridge.
const ACTING_THROUGH: &str = "mcp-server";

pub struct HttpCapabilityBackend {
    base_url: String,
    client: Client,
}

impl HttpCapabilityBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Pulls `message` (or a `detail` field) and `error_code` out of an
/// error body, falling back to the raw text.
fn parse_error_body(body: &str) -> (String, Option<String>) {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return (body.to_string(), None);
    };
    let message = parsed
        .get("message")
        .or_else(|| parsed.get("detail"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    let error_code = parsed.get("error_code").and_then(Value::as_str).map(str::to_string);
    (message, error_code)
}

#[async_trait]
impl CapabilityBackend for HttpCapabilityBackend {
    async fn call_action(
        &self,
        domain: &str,
        action: &str,
        parameters: Value,
        token: &str,
    ) -> Result<Value, BackendError> {
        let url = format!("{}/actions/{}/{}", self.base_url, domain, action);
        debug!(%url, "Calling capability backend");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("X-Acting-Through", ACTING_THROUGH)
            .json(&json!({ "parameters": parameters }))
            .send()
            .await
            .map_err(|e| {
                error!(%url, "Backend connection error: {}", e);
                BackendError::Connection(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%url, status = status.as_u16(), "Backend error: {}", body);
            let (message, error_code) = parse_error_body(&body);
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
                error_code,
            });
        }

        let mut body: Value = response.json().await.map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(body
            .get_mut("data")
            .map(Value::take)
            .unwrap_or_else(|| json!({})))
    }
}
