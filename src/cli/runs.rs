use crate::config::CatalogConfig;
use crate::store::RunHistory;
use crate::store::path::normalize_manifest_path;

use super::{format_relative_time, init_store};

pub fn run_runs_list(
    config: &CatalogConfig,
    limit: i32,
    path: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let store = init_store(config)?;

    let runs = match path {
        Some(path) => store.list_sync_runs_for_path(&normalize_manifest_path(&path)?, limit)?,
        None => store.list_sync_runs(limit)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No sync runs found.");
        return Ok(());
    }
    println!();
    for run in &runs {
        println!(
            "  {}  {}  {}  {} by {}  {}",
            run.id,
            run.status,
            run.file_path,
            run.trigger,
            run.actor,
            format_relative_time(&run.started_at)
        );
    }
    println!();

    Ok(())
}

pub fn run_runs_show(config: &CatalogConfig, id: String) -> anyhow::Result<()> {
    let store = init_store(config)?;
    let run = store
        .get_sync_run(&id)?
        .ok_or_else(|| anyhow::anyhow!("Sync run not found: {}", id))?;

    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}
