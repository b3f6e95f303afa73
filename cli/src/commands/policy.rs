// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Catalog and policy commands
//!
//! Commands: check, capabilities, verify

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};

use capability_gateway_core::application::policy_loader::load_policy;
use capability_gateway_core::application::policy_verifier::{load_suites, PolicyVerifier, VerificationReport};
use capability_gateway_core::config::GatewayConfig;
use capability_gateway_core::{CapabilityRegistry, PolicyEngine};

#[derive(Subcommand)]
pub enum PolicyCommand {
    /// Load the catalog and policy and report every validation problem
    Check {
        /// Policy file (default: policy_path from configuration)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// List catalog capabilities
    Capabilities {
        /// Only capabilities in this domain (e.g. workday.hcm)
        #[arg(long)]
        domain: Option<String>,

        /// Only capabilities that require MFA
        #[arg(long)]
        mfa: bool,
    },

    /// Run policy test scenarios against the policy
    Verify {
        /// Scenario suite file, or a directory of *.yaml suites
        #[arg(long, default_value = "tests/policy/scenarios")]
        scenarios: PathBuf,

        /// Policy file (default: policy_path from configuration)
        #[arg(long, value_name = "FILE")]
        policy: Option<PathBuf>,

        /// Report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
        format: ReportFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Table,
    Json,
}

pub async fn handle_command(command: PolicyCommand, config_override: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfig::load_or_default(config_override).context("Failed to load configuration")?;
    match command {
        PolicyCommand::Check { file } => check(&config, file),
        PolicyCommand::Capabilities { domain, mfa } => capabilities(&config, domain, mfa),
        PolicyCommand::Verify {
            scenarios,
            policy,
            format,
        } => verify(&config, &scenarios, policy, format),
    }
}

fn registry(config: &GatewayConfig) -> Result<CapabilityRegistry> {
    CapabilityRegistry::load(&config.catalog_path)
        .with_context(|| format!("Failed to load capability catalog {:?}", config.catalog_path))
}

fn check(config: &GatewayConfig, file: Option<PathBuf>) -> Result<()> {
    let registry = registry(config)?;
    println!(
        "Catalog {} (version {}): {} capabilities",
        config.catalog_path.display(),
        registry.version(),
        registry.count()
    );

    let flow_problems = registry.validate_flows();
    for problem in &flow_problems {
        println!("  {} {}", "warning:".yellow(), problem);
    }

    let path = file.unwrap_or_else(|| config.policy_path.clone());
    let policy = load_policy(&path, &registry)?;
    println!(
        "Policy {} (version {}): {} principals, {} capability groups, {} rules",
        path.display(),
        policy.version,
        policy.principals.len(),
        policy.capability_groups.len(),
        policy.policies.len()
    );

    println!("{}", "✓ Policy is valid".green());
    Ok(())
}

fn capabilities(config: &GatewayConfig, domain: Option<String>, mfa_only: bool) -> Result<()> {
    let registry = registry(config)?;
    let entries = match &domain {
        Some(domain) => registry.get_by_domain(domain),
        None => registry.get_all(),
    };

    let mut shown = 0;
    for entry in entries.iter().filter(|e| !mfa_only || e.requires_mfa) {
        let mut line = format!("{:<45} {:?}/{:?}", entry.id, entry.kind, entry.sensitivity);
        if entry.requires_mfa {
            line.push_str(" mfa");
        }
        if entry.deprecated {
            line.push_str(&format!(" {}", "deprecated".dimmed()));
        }
        println!("{line}");
        shown += 1;
    }
    println!("{} capabilities", shown);
    Ok(())
}

fn verify(config: &GatewayConfig, scenarios: &Path, policy: Option<PathBuf>, format: ReportFormat) -> Result<()> {
    let registry = registry(config)?;
    let path = policy.unwrap_or_else(|| config.policy_path.clone());
    let engine = PolicyEngine::new(load_policy(&path, &registry)?);
    let suites = load_suites(scenarios)?;
    let report = PolicyVerifier::new(&engine).run_all(&suites);

    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Table => print_report(&report),
    }

    if !report.success() {
        anyhow::bail!("{} of {} policy test cases failed", report.failed, report.total);
    }
    Ok(())
}

fn print_report(report: &VerificationReport) {
    let verdict = |allowed: bool| if allowed { "ALLOW" } else { "DENY" };

    println!("{}", "Policy Verification Report".bold());
    println!("  Total:     {}", report.total);
    println!("  Passed:    {}", report.passed.to_string().green());
    println!("  Failed:    {}", report.failed.to_string().red());
    println!("  Skipped:   {}", report.skipped);
    println!("  Pass rate: {:.1}%", report.pass_rate);
    println!();

    println!(
        "{:<12} {:<40} {:<8} {:<8} {:<6} {}",
        "ID", "TEST", "EXPECTED", "ACTUAL", "RESULT", "POLICY"
    );
    for result in &report.results {
        let outcome = if result.passed { "PASS".green() } else { "FAIL".red() };
        let name: String = result.name.chars().take(40).collect();
        println!(
            "{:<12} {:<40} {:<8} {:<8} {:<6} {}",
            result.id,
            name,
            verdict(result.expected_allowed),
            verdict(result.actual_allowed),
            outcome,
            result.actual_policy.as_deref().unwrap_or("-")
        );
    }

    let mut failures = report.failures().peekable();
    if failures.peek().is_some() {
        println!();
        println!("{}", "Failures:".red().bold());
        for result in failures {
            println!("  [{}] {}: {}", result.id, result.name, result.error.as_deref().unwrap_or("-"));
        }
    }
}
