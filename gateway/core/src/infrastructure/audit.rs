// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tool Audit Logger
//!
//! Emits one structured record per tool invocation on the `audit` tracing
//! target. Routing those records to durable storage is left to whichever
//! subscriber the host installs.

use std::fmt;

use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Success,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ToolAuditLogger;

impl ToolAuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn record(&self, tool: &str, principal_id: &str, parameters: &Value, status: AuditStatus) {
        match status {
            AuditStatus::Success => info!(
                target: "audit",
                event_type = tool,
                principal_id,
                status = %status,
                payload = %parameters,
                "Tool invocation"
            ),
            AuditStatus::Error => warn!(
                target: "audit",
                event_type = tool,
                principal_id,
                status = %status,
                payload = %parameters,
                "Tool invocation failed"
            ),
        }
    }
}
