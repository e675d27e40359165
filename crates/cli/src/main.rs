//! Gatewright CLI entry point.
//!
//! This binary is the composition root for the entire system:
//!
//! 1. **Wire observability** — configure `tracing-subscriber` with an
//!    env-filter layer (`RUST_LOG`, defaulting to `info`).
//! 2. **Parse configuration** — resolve the environment options into an
//!    immutable [`converge::RunConfiguration`]; nothing else reads the
//!    environment.
//! 3. **Construct infrastructure** — [`host::ProcessRunner`],
//!    [`host::LocalArtifactStore`] rooted at the working directory, and
//!    [`gateway::GatewayClient`], injected into the
//!    [`converge::ConvergenceRunner`].
//! 4. **Report** — render the run summary and map the outcome to the
//!    process exit code: 0 without hard failures, 1 otherwise.

use std::sync::Arc;

use anyhow::Context;

use converge::{
    ConvergenceRunner, Converged, ProbeOutcome, RunConfiguration, RunReport, StepOutcome,
};
use gateway::GatewayClient;
use host::{LocalArtifactStore, ProcessRunner};

#[tokio::main]
async fn main() {
    init_tracing();

    match run().await {
        Ok((config, report)) => {
            print_summary(&config, &report);
            if report.has_hard_failure() {
                std::process::exit(1);
            }
        }
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "run aborted");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn run() -> anyhow::Result<(RunConfiguration, RunReport)> {
    let config = RunConfiguration::from_lookup(|key| std::env::var(key).ok())?;

    let commands = Arc::new(ProcessRunner);
    let root = std::env::current_dir().context("working directory is not accessible")?;
    let store = Arc::new(LocalArtifactStore::new(root));
    let gateway = Arc::new(GatewayClient::new(
        config.admin_url.as_str(),
        config.proxy_url.as_str(),
    )?);

    let runner = ConvergenceRunner::new(config.clone(), commands, store, gateway);
    let report = runner.run().await?;
    Ok((config, report))
}

fn print_summary(config: &RunConfiguration, report: &RunReport) {
    println!("== convergence summary (run {}) ==", report.run_id);

    println!("resources:");
    for resource in &report.resources {
        let state = match resource.converged {
            Converged::AlreadyPresent => "already present",
            Converged::Created => "created",
        };
        println!("  {} {:<24} {state}", resource.kind, resource.target);
    }

    println!("steps:");
    for result in &report.pipeline.results {
        match &result.outcome {
            StepOutcome::Success => match &result.identifier {
                Some(id) => println!("  {:<20} ok (id {id})", result.step.as_str()),
                None => println!("  {:<20} ok", result.step.as_str()),
            },
            StepOutcome::SoftFailure { reason } => {
                println!("  {:<20} warn: {reason}", result.step.as_str());
            }
            StepOutcome::HardFailure { reason } => {
                println!("  {:<20} FAILED: {reason}", result.step.as_str());
            }
        }
    }

    if !report.verification.probes.is_empty() {
        println!("verification:");
        for probe in &report.verification.probes {
            match &probe.outcome {
                ProbeOutcome::Completed { status, remaining } => {
                    let throttled = if probe.is_throttled() { " throttled" } else { "" };
                    match remaining {
                        Some(remaining) => println!(
                            "  probe {}: {status} (remaining {remaining}){throttled}",
                            probe.attempt
                        ),
                        None => println!("  probe {}: {status}{throttled}", probe.attempt),
                    }
                }
                ProbeOutcome::Unreachable { reason } => {
                    println!("  probe {}: unreachable ({reason})", probe.attempt);
                }
            }
        }
        if report.verification.saw_throttle() {
            println!("rate limiting is in effect");
        }
    }

    println!("dashboard: {}", config.dashboard_url());
}
