// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use capability_gateway_core::config::{AuthMode, GatewayConfig};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GatewayConfig::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!("  2. ./hr-gateway.yaml");
        println!("  3. ~/.hr-gateway/config.yaml");
        println!("  4. /etc/hr-gateway/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Environment: {}", config.environment);
    println!("  Catalog: {}", config.catalog_path.display());
    println!("  Policy: {}", config.policy_path.display());
    println!();

    println!("{}", "Authentication:".bold());
    println!("  Mode: {:?}", config.auth.mode);
    println!("  Issuer: {}", config.auth.issuer);
    println!("  Audience: {}", config.auth.audience);
    if config.auth.mode == AuthMode::Local {
        match &config.auth.signing_key_path {
            Some(path) => println!("  Signing key: {}", path.display()),
            None => println!("  Signing key: {}", "(generated at startup)".dimmed()),
        }
    }
    println!(
        "  Token lifetimes: default {}s, agent {}s, machine {}s, exchanged {}s",
        config.auth.ttl.default_seconds,
        config.auth.ttl.ai_agent_seconds,
        config.auth.ttl.machine_seconds,
        config.auth.ttl.exchange_seconds
    );
    println!();

    println!("{}", "Tool Gateway:".bold());
    println!("  Backend: {}", config.tool_gateway.backend_base_url);
    println!("  Exchange scope: {}", config.tool_gateway.exchange_scope);
    println!(
        "  Exchange cache: {} entries, {}s",
        config.tool_gateway.exchange_cache_capacity, config.tool_gateway.exchange_cache_ttl_seconds
    );
    println!(
        "  Backend errors: {}",
        if config.environment.exposes_internal_errors() {
            "detailed"
        } else {
            "sanitized"
        }
    );

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}
