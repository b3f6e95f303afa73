// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local token issuer commands
//!
//! Commands: serve

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;
use tracing::info;

use capability_gateway_core::config::{AuthMode, GatewayConfig};
use capability_gateway_core::presentation::issuer_api::issuer_router;
use capability_gateway_core::GatewayContext;

#[derive(Subcommand)]
pub enum IssuerCommand {
    /// Serve discovery, JWKS, token and test endpoints over HTTP
    Serve {
        #[arg(long, env = "ISSUER_HOST", default_value = "127.0.0.1")]
        host: String,

        #[arg(long, env = "ISSUER_PORT", default_value = "9000")]
        port: u16,
    },
}

pub async fn handle_command(command: IssuerCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        IssuerCommand::Serve { host, port } => serve(config_override, &host, port).await,
    }
}

async fn serve(config_override: Option<PathBuf>, host: &str, port: u16) -> Result<()> {
    let config = GatewayConfig::load_or_default(config_override).context("Failed to load configuration")?;
    if config.auth.mode != AuthMode::Local {
        anyhow::bail!("the local issuer requires auth.mode: local");
    }

    let context = GatewayContext::from_config(config)?;
    let issuer = context
        .issuer
        .clone()
        .context("local auth mode did not create an issuer")?;

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        %addr,
        issuer = %issuer.settings().issuer,
        kid = %issuer.kid(),
        users = issuer.users().len(),
        "Local issuer listening"
    );

    axum::serve(listener, issuer_router(issuer))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down local issuer");
        })
        .await
        .context("Issuer server failed")
}
