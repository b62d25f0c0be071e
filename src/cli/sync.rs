use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::CatalogConfig;
use crate::fetch::GitFetcher;
use crate::sync::{SyncEngine, SyncSummary};
use crate::types::{RunStatus, SyncRun, SyncTrigger, TriggerKind};

use super::init_store;

fn build_engine(config: &CatalogConfig) -> anyhow::Result<SyncEngine> {
    let store = Arc::new(init_store(config)?);
    let fetcher = Arc::new(GitFetcher::new(&config.repository));
    Ok(SyncEngine::new(config.sync.clone(), fetcher, store)?)
}

fn default_actor(actor: Option<String>) -> String {
    actor
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "cli".to_string())
}

fn print_run(run: &SyncRun) {
    let c = &run.counts;
    println!(
        "  {}  {}  projects +{} ~{}  services +{} ~{} orphaned {}",
        run.file_path,
        run.status,
        c.projects_created,
        c.projects_updated,
        c.services_created,
        c.services_updated,
        c.services_orphaned
    );
    if let Some(error) = &run.error {
        println!("      error: {error}");
    }
    for e in &run.validation_errors {
        println!("      {}: {}", e.field, e.message);
    }
}

fn print_summary(summary: &SyncSummary) {
    println!();
    for run in &summary.runs {
        print_run(run);
    }
    for unrecorded in &summary.unrecorded {
        println!("  {}  run not recorded: {}", unrecorded.path, unrecorded.error);
    }
    if let Some(error) = &summary.scan_error {
        println!("  scan failed: {error}");
    }
    for path in &summary.missing_sources {
        println!("  missing manifest: {path}");
    }
    println!();
    println!(
        "{}: {} succeeded, {} failed",
        summary.status, summary.succeeded, summary.failed
    );
    println!();
}

pub async fn run_sync_scan(config: &CatalogConfig) -> anyhow::Result<()> {
    let engine = build_engine(config)?;
    let files = engine.scan().await?;

    if files.is_empty() {
        println!("No manifests found under '{}'.", config.sync.manifest_dir);
        return Ok(());
    }
    for file in &files {
        println!("{file}");
    }
    Ok(())
}

pub async fn run_sync_file(
    config: &CatalogConfig,
    path: String,
    trigger: TriggerKind,
    actor: Option<String>,
) -> anyhow::Result<()> {
    let engine = build_engine(config)?;
    let trigger = SyncTrigger {
        kind: trigger,
        actor: default_actor(actor),
    };

    let run = engine.sync_file(&path, &trigger).await?;

    println!();
    print_run(&run);
    println!();
    println!("Run {}", run.id);

    if run.status != RunStatus::Success {
        anyhow::bail!("Sync of '{}' failed", run.file_path);
    }
    Ok(())
}

pub async fn run_sync_all(config: &CatalogConfig, actor: Option<String>) -> anyhow::Result<()> {
    let engine = build_engine(config)?;
    let summary = engine
        .sync_all(&SyncTrigger::manual(default_actor(actor)))
        .await?;

    print_summary(&summary);

    if summary.status != RunStatus::Success {
        anyhow::bail!("Catalog sync finished with status {}", summary.status);
    }
    Ok(())
}

/// Runs scheduled whole-catalog syncs until Ctrl-C.
pub async fn run_sync_watch(config: &CatalogConfig, interval_secs: u64) -> anyhow::Result<()> {
    if interval_secs == 0 {
        anyhow::bail!("--interval-secs must be greater than zero");
    }

    let engine = build_engine(config)?;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(interval_secs, "Watching manifest repository");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.sync_all(&SyncTrigger::scheduled()).await {
                    Ok(summary) => print_summary(&summary),
                    Err(e) => warn!(error = %e, "Scheduled sync could not be recorded"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                return Ok(());
            }
        }
    }
}
