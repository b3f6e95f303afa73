// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capability Gateway Core
//!
//! Authorization decision core of the HR capability gateway.
//!
//! ```text
//! bearer token ──► TokenVerifier ──► VerifiedPrincipal + claims
//!                                        │
//!        tool traffic ──► ToolGateway (role → tool, MFA, token exchange)
//!                                        │
//!                                        ▼
//!   CapabilityRegistry ──validates──► AccessPolicy ──► PolicyEngine ──► decision
//! ```
//!
//! # Architecture
//!
//! - `domain`: capability, policy, principal, token and tool types with no I/O
//! - `application`: registry, policy loading, evaluation, tool gateway, bootstrap
//! - `infrastructure`: token issuing/verification/exchange, backend client, audit
//! - `presentation`: HTTP surface of the local token issuer

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod telemetry;

pub use application::bootstrap::GatewayContext;
pub use application::capability_registry::CapabilityRegistry;
pub use application::policy_engine::{AccessRequest, PolicyEngine};
pub use application::tool_gateway::ToolGateway;
pub use config::GatewayConfig;
pub use domain::evaluation::{Decision, EvaluationClaims, PolicyEvaluationResult};
pub use domain::principal::{PrincipalType, VerifiedPrincipal};
pub use domain::token::{TokenError, TokenExchanger, TokenVerifier};
