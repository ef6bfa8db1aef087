use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use tfrego_kernel::adapters::terraform::HclFileSource;
use tfrego_kernel::config::DispatchConfig;
use tfrego_kernel::dispatch::run_dispatch;
use tfrego_kernel::engine::RegoEngine;
use tfrego_kernel::rules::RuleModuleLoader;

/// Rego policy checks over Terraform configuration
#[derive(Parser, Debug)]
#[command(name = "tfrego")]
#[command(about = "Evaluate deny_* Rego rules against Terraform resources", long_about = None)]
struct Cli {
    /// Rego module, data document or directory of them
    #[arg(long = "policy", required = true)]
    policies: Vec<PathBuf>,

    /// Terraform/HCL file to check
    #[arg(long = "config", required = true)]
    configs: Vec<PathBuf>,

    /// Path to dispatch settings JSON
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Path to an input document JSON, overrides the settings' input
    #[arg(long)]
    input: Option<PathBuf>,

    /// Stop at the first failed rule
    #[arg(long)]
    fail_fast: bool,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // ----------------------------
    // Load settings
    // ----------------------------
    let mut config = match &cli.settings {
        Some(path) => read_json::<DispatchConfig>(path)?,
        None => DispatchConfig::default_config(),
    };
    if let Some(path) = &cli.input {
        config.input = read_json(path)?;
    }
    config.fail_fast |= cli.fail_fast;

    // ----------------------------
    // Load rule modules
    // ----------------------------
    let loaded = RuleModuleLoader::new().load(&cli.policies)?;

    // ----------------------------
    // Run dispatch
    // ----------------------------
    let source = Arc::new(HclFileSource::new(cli.configs));
    let report = run_dispatch(&loaded, &RegoEngine::new(), source, &config)?;
    info!(
        run_id = %report.run_id,
        findings = report.total_findings(),
        "dispatch finished"
    );

    // ----------------------------
    // Output
    // ----------------------------
    println!("{}", serde_json::to_string_pretty(&report)?);

    let failed: Vec<_> = report.failed().map(|r| r.rule.as_str()).collect();
    if !failed.is_empty() {
        bail!("{} rule(s) failed: {}", failed.len(), failed.join(", "));
    }

    Ok(())
}
