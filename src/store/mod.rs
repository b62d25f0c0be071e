pub mod path;
mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Read-only team lookups used to resolve manifest owners.
pub trait TeamDirectory: Send + Sync {
    /// Case-insensitive lookup by team name.
    fn find_team_by_name(&self, name: &str) -> Result<Option<Team>>;
    fn get_team(&self, id: &str) -> Result<Option<Team>>;
}

/// Write operations available inside one catalog transaction.
///
/// Everything done through a writer commits or rolls back together.
pub trait CatalogWriter {
    fn get_project_by_source_path(&self, source_path: &str) -> Result<Option<Project>>;
    fn create_project(&self, project: &Project) -> Result<()>;
    fn update_project(&self, project: &Project) -> Result<()>;

    fn list_services(&self, project_id: &str) -> Result<Vec<Service>>;
    fn create_service(&self, service: &Service) -> Result<()>;
    fn update_service(&self, service: &Service) -> Result<()>;

    /// Flags every auto-synced, not yet orphaned service of `project_id` whose
    /// name is not in `declared`. Returns the names that were newly flagged.
    fn mark_orphaned_except(
        &self,
        project_id: &str,
        declared: &[String],
        at: DateTime<Utc>,
    ) -> Result<Vec<String>>;
}

/// Persistent catalog of projects and services.
pub trait CatalogStore: Send + Sync {
    fn get_project(&self, id: &str) -> Result<Option<Project>>;
    fn get_project_by_source_path(&self, source_path: &str) -> Result<Option<Project>>;
    fn get_project_by_name(&self, name: &str) -> Result<Option<Project>>;
    fn list_projects(&self, cursor: &str, limit: i32) -> Result<Vec<Project>>;
    /// Inserts a manually managed project (not owned by the sync pipeline).
    fn create_project(&self, project: &Project) -> Result<()>;

    fn list_services(&self, project_id: &str) -> Result<Vec<Service>>;
    fn get_service(&self, id: &str) -> Result<Option<Service>>;
    /// Inserts a manually managed service.
    fn create_service(&self, service: &Service) -> Result<()>;
    /// Administrative removal; never called by the sync pipeline.
    fn delete_service(&self, id: &str) -> Result<bool>;

    /// Updates only the sync status fields of the project synced from `source_path`.
    /// Returns false when no such project exists.
    fn set_project_sync_state(
        &self,
        source_path: &str,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<bool>;

    /// Runs `apply` inside a single transaction, committing only if it returns `Ok`.
    fn with_catalog_transaction(
        &self,
        apply: &mut dyn FnMut(&dyn CatalogWriter) -> Result<()>,
    ) -> Result<()>;
}

/// Append-only audit log of sync runs.
pub trait RunHistory: Send + Sync {
    fn record_sync_run(&self, run: &SyncRun) -> Result<()>;
    fn get_sync_run(&self, id: &str) -> Result<Option<SyncRun>>;
    /// Most recent first.
    fn list_sync_runs(&self, limit: i32) -> Result<Vec<SyncRun>>;
    fn list_sync_runs_for_path(&self, file_path: &str, limit: i32) -> Result<Vec<SyncRun>>;
}

/// Store defines the full database interface.
pub trait Store: TeamDirectory + CatalogStore + RunHistory {
    fn initialize(&self) -> Result<()>;

    // Team administration
    fn create_team(&self, team: &Team) -> Result<()>;
    fn list_teams(&self) -> Result<Vec<Team>>;
    fn delete_team(&self, id: &str) -> Result<bool>;

    fn close(&self) -> Result<()>;
}
