mod budget;
mod config;
mod errors;
mod models;
mod pipeline;
mod proposals;
mod routing;
mod scoring;
mod state;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{load_jobs, Config};
use crate::state::TriageState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting job triage v{}", env!("CARGO_PKG_VERSION"));

    // Profile, catalog and limits must all be valid before any job is touched
    let state = TriageState::from_config(&config).map_err(|e| {
        error!("Refusing to start [{}]: {}", e.code(), e);
        e
    })?;
    info!(
        "Profile '{}' loaded ({} skills, {} models in catalog)",
        state.profile().name,
        state.profile().skills.len(),
        state.router().catalog().models().len()
    );

    let jobs = load_jobs(&config.jobs_path)
        .with_context(|| format!("loading jobs from {}", config.jobs_path.display()))?;

    let report = state.evaluate_batch(&jobs, config.deadline).await;

    for (rank, result) in report.results.iter().enumerate() {
        info!(
            "#{:<2} {:<24} {:.3} {:?} ({})",
            rank + 1,
            result.job_id(),
            result.score(),
            result.stage_reached(),
            result.reason()
        );
    }
    if report.excluded_count() > 0 {
        warn!(
            "{} job(s) excluded from ranking: {} failed, {} timed out",
            report.excluded_count(),
            report.failures.len(),
            report.timed_out.len()
        );
    }

    let plans = state.plan_proposals(
        &report,
        &jobs,
        config.max_proposals,
        config.highend_threshold,
    );
    for plan in &plans {
        info!(
            "Proposal for {} → {} ({}, est. ${:.4}{})",
            plan.job_id,
            plan.decision.model_id,
            plan.decision.provider,
            plan.decision.estimated_cost,
            if plan.high_end { ", high-end" } else { "" }
        );
    }

    let status = state.budget_status();
    info!(
        "Budget: daily {:.4}/{:.2} ({:.1}%), monthly {:.4}/{:.2} ({:.1}%)",
        status.daily.used,
        status.daily.limit,
        status.daily.percent_used,
        status.monthly.used,
        status.monthly.limit,
        status.monthly.percent_used
    );
    if status.has_warning() {
        warn!("Spend is over at least one budget limit");
    }

    Ok(())
}
