// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # HR Gateway CLI
//!
//! Operator tooling for the gateway core.
//!
//! ## Commands
//!
//! - `hr-gateway config show|validate` - Configuration management
//! - `hr-gateway policy check|capabilities|verify` - Catalog and policy validation, scenario runs
//! - `hr-gateway issuer serve` - Run the local token issuer over HTTP
//! - `hr-gateway evaluate` - Verify a token and evaluate one capability

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;

use capability_gateway_core::config::{GatewayConfig, LoggingConfig};
use capability_gateway_core::telemetry::init_logging;
use commands::{ConfigCommand, EvaluateArgs, IssuerCommand, PolicyCommand};

/// HR capability gateway operator CLI
#[derive(Parser)]
#[command(name = "hr-gateway")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "HR_GATEWAY_CONFIG",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides `logging.level`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Capability catalog and access policy checks
    #[command(name = "policy")]
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },

    /// Local token issuer
    #[command(name = "issuer")]
    Issuer {
        #[command(subcommand)]
        command: IssuerCommand,
    },

    /// Verify a bearer token and evaluate a capability for it
    #[command(name = "evaluate")]
    Evaluate(EvaluateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&logging_settings(cli.config.clone(), cli.log_level.as_deref()))?;

    match cli.command {
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::Policy { command }) => commands::policy::handle_command(command, cli.config).await,
        Some(Commands::Issuer { command }) => commands::issuer::handle_command(command, cli.config).await,
        Some(Commands::Evaluate(args)) => commands::evaluate::execute(args, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Logging settings from the configuration file and `LOG_LEVEL`, with
/// `--log-level` taking precedence. A configuration that fails to load falls
/// back to defaults here; the command itself reports the error.
fn logging_settings(config_override: Option<PathBuf>, log_level: Option<&str>) -> LoggingConfig {
    let mut logging = GatewayConfig::load_or_default(config_override)
        .map(|config| config.logging)
        .unwrap_or_default();
    if let Some(level) = log_level {
        logging.level = level.to_ascii_lowercase();
    }
    logging
}

#[cfg(test)]
mod tests {
    use super::*;
    use capability_gateway_core::config::LogFormat;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_evaluate_arguments() {
        let cli = Cli::try_parse_from([
            "hr-gateway",
            "evaluate",
            "--token",
            "abc",
            "--capability",
            "workday.hcm.get_employee",
            "--source-ip",
            "10.0.0.5",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Evaluate(args)) => {
                assert_eq!(args.capability, "workday.hcm.get_employee");
                assert_eq!(args.source_ip.as_deref(), Some("10.0.0.5"));
                assert!(args.environment.is_none());
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_logging_follows_config_file_unless_flag_given() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hr-gateway.yaml");
        std::fs::write(&path, "logging:\n  level: debug\n  format: json\n").unwrap();

        let logging = logging_settings(Some(path.clone()), None);
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.format, LogFormat::Json);

        let logging = logging_settings(Some(path), Some("WARN"));
        assert_eq!(logging.level, "warn");
        assert_eq!(logging.format, LogFormat::Json);
    }

    #[test]
    fn test_unloadable_config_falls_back_to_default_logging() {
        let logging = logging_settings(Some(PathBuf::from("/nonexistent/hr-gateway.yaml")), Some("trace"));
        assert_eq!(logging.level, "trace");
        assert_eq!(logging.format, LogFormat::Text);
    }

    #[test]
    fn test_policy_verify_arguments() {
        let cli = Cli::try_parse_from(["hr-gateway", "policy", "verify", "--scenarios", "scenarios/", "--format", "json"])
            .unwrap();
        match cli.command {
            Some(Commands::Policy {
                command: PolicyCommand::Verify { scenarios, policy, format },
            }) => {
                assert_eq!(scenarios, PathBuf::from("scenarios/"));
                assert!(policy.is_none());
                assert_eq!(format, commands::policy::ReportFormat::Json);
            }
            _ => panic!("expected policy verify"),
        }
    }

    #[test]
    fn test_issuer_serve_defaults() {
        let cli = Cli::try_parse_from(["hr-gateway", "issuer", "serve"]).unwrap();
        match cli.command {
            Some(Commands::Issuer {
                command: IssuerCommand::Serve { host, port },
            }) => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(port, 9000);
            }
            _ => panic!("expected issuer serve"),
        }
    }
}
