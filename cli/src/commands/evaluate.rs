// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! One-off authorization check: verify a token, then evaluate a capability.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use capability_gateway_core::config::GatewayConfig;
use capability_gateway_core::{AccessRequest, EvaluationClaims, GatewayContext, TokenVerifier};

#[derive(Args)]
pub struct EvaluateArgs {
    /// Bearer token (with or without the `Bearer ` prefix)
    #[arg(long, env = "HR_GATEWAY_TOKEN")]
    pub token: String,

    /// Capability id, e.g. workday.hcm.get_employee
    #[arg(long)]
    pub capability: String,

    /// Caller address for ip_allowlist conditions
    #[arg(long)]
    pub source_ip: Option<String>,

    /// Evaluate in this environment instead of the configured one
    #[arg(long)]
    pub environment: Option<String>,
}

pub async fn execute(args: EvaluateArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfig::load_or_default(config_override).context("Failed to load configuration")?;
    let context = GatewayContext::from_config(config)?;

    let token = args.token.trim();
    let token = token.strip_prefix("Bearer ").unwrap_or(token);
    let principal = context
        .verifier
        .verify(token)
        .await
        .context("Token rejected")?;

    let mut claims = EvaluationClaims::from_principal(&principal);
    if let Some(ip) = &args.source_ip {
        claims = claims.with_source_ip(ip.as_str());
    }
    let environment = args
        .environment
        .unwrap_or_else(|| context.config.environment.as_str().to_string());
    let result = context.engine.evaluate(&AccessRequest::for_principal(
        &principal,
        &args.capability,
        &environment,
        &claims,
    ));

    let verdict = if result.allowed() {
        "ALLOWED".green()
    } else {
        "DENIED".red()
    };
    eprintln!(
        "{} {} {} in {}",
        verdict,
        principal.subject.bold(),
        args.capability,
        environment
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
