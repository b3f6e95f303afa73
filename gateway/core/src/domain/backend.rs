// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Seam to the Capability API that executes authorized actions, and the
//! translation of its failures into caller-facing tool errors.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::tool::ToolError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        error_code: Option<String>,
    },
    #[error("backend unreachable: {0}")]
    Connection(String),
    #[error("backend response could not be decoded: {0}")]
    Decode(String),
}

impl BackendError {
    /// Maps a backend failure to the message a tool caller sees. 5xx detail
    /// is only passed through when `expose_detail` is set.
    pub fn into_tool_error(self, expose_detail: bool) -> ToolError {
        match self {
            Self::Status {
                status: 401,
                message,
                error_code,
            } => {
                if message.to_lowercase().contains("mfa") || error_code.as_deref() == Some("MFA_REQUIRED") {
                    ToolError::MfaRequired
                } else {
                    ToolError::SessionExpired
                }
            }
            Self::Status { status: 403, message, .. } => ToolError::PermissionDenied(message),
            Self::Status { status: 404, message, .. } => ToolError::NotFound(message),
            Self::Status { status, message, .. } if status >= 500 => ToolError::BackendFailure {
                detail: expose_detail.then_some(message),
            },
            Self::Status { status, message, .. } => ToolError::Backend { status, message },
            Self::Connection(_) => ToolError::ServiceUnavailable,
            Self::Decode(_) => ToolError::Internal,
        }
    }
}

#[async_trait]
pub trait CapabilityBackend: Send + Sync {
    /// Executes `domain.action` with `parameters` on behalf of the holder of
    /// `token`, returning the response `data` payload.
    async fn call_action(&self, domain: &str, action: &str, parameters: Value, token: &str)
        -> Result<Value, BackendError>;
}
