// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Tool Catalog and Roles
//!
//! Static description of the tools exposed to tool-calling clients, the
//! coarse roles callers are mapped to, and the role → tool table that decides
//! what each role can see and invoke. This table is enforced before the
//! policy engine is ever consulted.
//!
//! Each [`ToolDefinition`] maps a tool to one backend `(domain, action)` pair
//! and carries the function that turns tool arguments into backend
//! parameters. The table is fixed at compile time.

use std::fmt;

use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::domain::principal::PrincipalType;

/// Effective role of a tool caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolRole {
    Admin,
    Employee,
    AiAgent,
    Machine,
    Human,
}

const AI_AGENT_TOOLS: &[&str] = &[
    "get_employee",
    "get_manager_chain",
    "get_org_chart",
    "update_contact_info",
    "get_pto_balance",
];

const EMPLOYEE_TOOLS: &[&str] = &[
    "get_employee",
    "get_manager_chain",
    "get_org_chart",
    "update_contact_info",
    "get_pto_balance",
    "request_time_off",
    "cancel_time_off",
    "list_pay_statements",
];

const ADMIN_TOOLS: &[&str] = &[
    "get_employee",
    "get_manager_chain",
    "get_org_chart",
    "update_contact_info",
    "get_pto_balance",
    "request_time_off",
    "cancel_time_off",
    "list_pay_statements",
    "approve_time_off",
    "list_direct_reports",
    "get_compensation",
    "get_pay_statement",
];

impl ToolRole {
    /// Humans are promoted by group membership, admin first. Machines and
    /// agents keep their principal type as role.
    pub fn resolve(
        principal_type: PrincipalType,
        groups: &[String],
        admin_group: &str,
        employee_group: &str,
    ) -> Self {
        match principal_type {
            PrincipalType::Human if groups.iter().any(|g| g == admin_group) => Self::Admin,
            PrincipalType::Human if groups.iter().any(|g| g == employee_group) => Self::Employee,
            PrincipalType::Human => Self::Human,
            PrincipalType::Machine => Self::Machine,
            PrincipalType::AiAgent => Self::AiAgent,
        }
    }

    pub fn allowed_tools(&self) -> &'static [&'static str] {
        match self {
            Self::Admin => ADMIN_TOOLS,
            Self::Employee => EMPLOYEE_TOOLS,
            Self::AiAgent => AI_AGENT_TOOLS,
            Self::Machine | Self::Human => &[],
        }
    }

    pub fn can_use(&self, tool_name: &str) -> bool {
        self.allowed_tools().contains(&tool_name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Employee => "EMPLOYEE",
            Self::AiAgent => "AI_AGENT",
            Self::Machine => "MACHINE",
            Self::Human => "HUMAN",
        }
    }
}

impl fmt::Display for ToolRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type ParamBuilder = fn(&Map<String, Value>) -> Result<Value, String>;

/// One row of the tool registration table.
pub struct ToolDefinition {
    pub name: &'static str,
    pub domain: &'static str,
    pub action: &'static str,
    /// Human callers must present an MFA-backed token.
    pub requires_mfa: bool,
    pub description: &'static str,
    pub build_params: ParamBuilder,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("action", &self.action)
            .field("requires_mfa", &self.requires_mfa)
            .finish()
    }
}

/// All tools in discovery order.
pub static TOOLS: &[ToolDefinition] = &[
    ToolDefinition {
        name: "get_employee",
        domain: "workday.hcm",
        action: "get_employee",
        requires_mfa: false,
        description: "Look up an employee profile.",
        build_params: employee_only,
    },
    ToolDefinition {
        name: "get_manager_chain",
        domain: "workday.hcm",
        action: "get_manager_chain",
        requires_mfa: false,
        description: "Get the reporting line for an employee.",
        build_params: employee_only,
    },
    ToolDefinition {
        name: "get_org_chart",
        domain: "workday.hcm",
        action: "get_org_chart",
        requires_mfa: false,
        description: "Get the organization chart below a root employee.",
        build_params: org_chart,
    },
    ToolDefinition {
        name: "list_direct_reports",
        domain: "workday.hcm",
        action: "list_direct_reports",
        requires_mfa: false,
        description: "List the direct reports of a manager.",
        build_params: direct_reports,
    },
    ToolDefinition {
        name: "update_contact_info",
        domain: "workday.hcm",
        action: "update_contact_info",
        requires_mfa: false,
        description: "Update an employee's contact information.",
        build_params: contact_update,
    },
    ToolDefinition {
        name: "get_pto_balance",
        domain: "workday.time",
        action: "get_balance",
        requires_mfa: false,
        description: "Check vacation and sick leave balances.",
        build_params: employee_only,
    },
    ToolDefinition {
        name: "request_time_off",
        domain: "workday.time",
        action: "request",
        requires_mfa: false,
        description: "Submit a new time off request.",
        build_params: time_off_request,
    },
    ToolDefinition {
        name: "cancel_time_off",
        domain: "workday.time",
        action: "cancel",
        requires_mfa: false,
        description: "Cancel a pending or approved time off request.",
        build_params: time_off_cancel,
    },
    ToolDefinition {
        name: "approve_time_off",
        domain: "workday.time",
        action: "approve",
        requires_mfa: false,
        description: "Approve a pending time off request.",
        build_params: request_only,
    },
    ToolDefinition {
        name: "get_compensation",
        domain: "workday.payroll",
        action: "get_compensation",
        requires_mfa: true,
        description: "View salary and bonus details.",
        build_params: employee_only,
    },
    ToolDefinition {
        name: "get_pay_statement",
        domain: "workday.payroll",
        action: "get_pay_statement",
        requires_mfa: true,
        description: "View a detailed pay statement.",
        build_params: statement_only,
    },
    ToolDefinition {
        name: "list_pay_statements",
        domain: "workday.payroll",
        action: "list_pay_statements",
        requires_mfa: true,
        description: "List historical pay statements.",
        build_params: pay_statement_history,
    },
];

pub fn find_tool(name: &str) -> Option<&'static ToolDefinition> {
    TOOLS.iter().find(|tool| tool.name == name)
}

fn required_str(args: &Map<String, Value>, key: &str) -> Result<String, String> {
    match args.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(format!("missing required parameter '{key}'")),
    }
}

fn optional_str(args: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("parameter '{key}' must be a string")),
    }
}

fn optional_int(args: &Map<String, Value>, key: &str) -> Result<Option<i64>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("parameter '{key}' must be an integer")),
    }
}

fn employee_only(args: &Map<String, Value>) -> Result<Value, String> {
    Ok(json!({ "employee_id": required_str(args, "employee_id")? }))
}

fn request_only(args: &Map<String, Value>) -> Result<Value, String> {
    Ok(json!({ "request_id": required_str(args, "request_id")? }))
}

fn statement_only(args: &Map<String, Value>) -> Result<Value, String> {
    Ok(json!({ "statement_id": required_str(args, "statement_id")? }))
}

fn direct_reports(args: &Map<String, Value>) -> Result<Value, String> {
    Ok(json!({ "manager_id": required_str(args, "manager_id")? }))
}

fn org_chart(args: &Map<String, Value>) -> Result<Value, String> {
    Ok(json!({
        "root_id": required_str(args, "root_id")?,
        "depth": optional_int(args, "depth")?.unwrap_or(2),
    }))
}

fn contact_update(args: &Map<String, Value>) -> Result<Value, String> {
    let updates = match args.get("updates") {
        Some(Value::Object(updates)) => updates.clone(),
        _ => return Err("missing required parameter 'updates'".to_string()),
    };
    Ok(json!({
        "employee_id": required_str(args, "employee_id")?,
        "updates": updates,
    }))
}

/// Generates an idempotency key for a new time off request.
fn new_transaction_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("TXN-{}", id[..8].to_ascii_uppercase())
}

fn time_off_request(args: &Map<String, Value>) -> Result<Value, String> {
    let hours = args
        .get("hours")
        .and_then(Value::as_f64)
        .ok_or_else(|| "missing required parameter 'hours'".to_string())?;
    let transaction_id = optional_str(args, "transaction_id")?
        .filter(|id| !id.is_empty())
        .unwrap_or_else(new_transaction_id);
    Ok(json!({
        "employee_id": required_str(args, "employee_id")?,
        "type": required_str(args, "type")?,
        "start_date": required_str(args, "start_date")?,
        "end_date": required_str(args, "end_date")?,
        "hours": hours,
        "transaction_id": transaction_id,
    }))
}

fn time_off_cancel(args: &Map<String, Value>) -> Result<Value, String> {
    Ok(json!({
        "request_id": required_str(args, "request_id")?,
        "reason": optional_str(args, "reason")?,
    }))
}

fn pay_statement_history(args: &Map<String, Value>) -> Result<Value, String> {
    Ok(json!({
        "employee_id": required_str(args, "employee_id")?,
        "year": optional_int(args, "year")?,
    }))
}

/// Caller-facing tool failure. `Display` renders the exact message returned
/// to the tool-calling client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("UNAUTHORIZED: Missing Authorization token in context.")]
    MissingToken,
    #[error("UNAUTHORIZED: Invalid or malformed token.")]
    InvalidToken,
    #[error("FORBIDDEN: Principal type '{principal_type}' is not authorized to use tool '{tool}'.")]
    ToolNotPermitted { principal_type: String, tool: String },
    #[error("MFA_REQUIRED: This action requires multi-factor authentication.")]
    MfaRequired,
    #[error("INVALID_PARAMETERS: {0}")]
    InvalidParameters(String),
    #[error("TOKEN_EXCHANGE_FAILED: Could not obtain a scoped credential.")]
    ExchangeFailed,
    #[error("UNAUTHORIZED: Session expired or invalid token.")]
    SessionExpired,
    #[error("FORBIDDEN: You do not have permission for this action. ({0})")]
    PermissionDenied(String),
    #[error("NOT_FOUND: The requested resource was not found. ({0})")]
    NotFound(String),
    #[error("INTERNAL_ERROR: An unexpected error occurred in the backend. Please try again later.{}", detail_suffix(.detail))]
    BackendFailure { detail: Option<String> },
    #[error("SERVICE_UNAVAILABLE: Could not connect to the HR backend. Please check if the Capability API is running.")]
    ServiceUnavailable,
    #[error("ERROR ({status}): {message}")]
    Backend { status: u16, message: String },
    #[error("INTERNAL_ERROR: An unexpected error occurred.")]
    Internal,
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
}

impl ToolError {
    /// Leading identifier of the message, for metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken | Self::InvalidToken | Self::SessionExpired => "UNAUTHORIZED",
            Self::ToolNotPermitted { .. } | Self::PermissionDenied(_) => "FORBIDDEN",
            Self::MfaRequired => "MFA_REQUIRED",
            Self::InvalidParameters(_) => "INVALID_PARAMETERS",
            Self::ExchangeFailed => "TOKEN_EXCHANGE_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BackendFailure { .. } | Self::Internal => "INTERNAL_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Backend { .. } => "ERROR",
        }
    }
}
