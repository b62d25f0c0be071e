mod catalog;
mod commands;
mod runs;
mod sync;
mod team;

pub use catalog::{run_project_list, run_service_list, run_service_purge};
pub use commands::{
    AdminCommands, ProjectCommands, RunsCommands, ServiceCommands, SyncCommands, TeamCommands,
    TriggerArg,
};
pub use runs::{run_runs_list, run_runs_show};
pub use sync::{run_sync_all, run_sync_file, run_sync_scan, run_sync_watch};
pub use team::{run_team_add, run_team_list};

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::CatalogConfig;
use crate::store::{SqliteStore, Store};

/// Loads configuration from `path` if given, then applies the `--data-dir` override.
pub fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> anyhow::Result<CatalogConfig> {
    let mut config = match path {
        Some(path) => CatalogConfig::load(path)?,
        None => CatalogConfig::default(),
    };
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    Ok(config)
}

/// Creates the data directory and schema. Safe to run more than once.
pub fn run_init(config: &CatalogConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;

    let db_path = config.db_path();
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    println!();
    println!("Catalog database ready at {}", db_path.display());
    println!();

    Ok(())
}

/// Opens the store, checking the database exists
pub fn init_store(config: &CatalogConfig) -> anyhow::Result<SqliteStore> {
    let db_path = config.db_path();

    if !db_path.exists() {
        anyhow::bail!(
            "Database not found at {}. Run 'catalog-sync admin init' first.",
            db_path.display()
        );
    }

    SqliteStore::new(&db_path).map_err(Into::into)
}

pub(crate) fn confirm_action(message: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(inquire::Confirm::new(message)
        .with_default(false)
        .prompt()?)
}

pub(crate) fn format_relative_time(dt: &DateTime<Utc>) -> String {
    let diff = Utc::now().signed_duration_since(*dt);

    if diff.num_seconds() < 0 {
        return "in the future".to_string();
    }
    if diff.num_seconds() < 60 {
        return "just now".to_string();
    }
    if diff.num_minutes() < 60 {
        return plural(diff.num_minutes(), "minute");
    }
    if diff.num_hours() < 24 {
        return plural(diff.num_hours(), "hour");
    }
    plural(diff.num_days(), "day")
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}
