#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use catalog_sync::config::SyncConfig;
use catalog_sync::error::{Error, Result};
use catalog_sync::fetch::{FetchError, ManifestFetcher};
use catalog_sync::store::{
    CatalogStore, CatalogWriter, RunHistory, SqliteStore, Store, TeamDirectory,
};
use catalog_sync::sync::SyncEngine;
use catalog_sync::types::{Project, Service, SyncRun, SyncStatus, Team};

/// Manifest repository held in memory.
#[derive(Default)]
pub struct MemoryFetcher {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    denied: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MemoryFetcher {
    pub fn put(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.into());
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn deny(&self, path: &str) {
        self.denied.lock().unwrap().insert(path.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

impl ManifestFetcher for MemoryFetcher {
    fn list_files(&self, prefix: &str) -> std::result::Result<Vec<String>, FetchError> {
        let files = self.files.lock().unwrap();
        Ok(files
            .keys()
            .filter(|p| prefix.is_empty() || p.starts_with(&format!("{prefix}/")))
            .cloned()
            .collect())
    }

    fn get_content(&self, path: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.denied.lock().unwrap().contains(path) {
            return Err(FetchError::AccessDenied(path.to_string()));
        }
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(path.to_string()))
    }
}

pub struct Harness {
    pub temp: TempDir,
    pub store: Arc<SqliteStore>,
    pub fetcher: Arc<MemoryFetcher>,
    pub engine: SyncEngine,
    pub payments: Team,
    pub oncall: Team,
}

impl Harness {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(temp.path().join("catalog.db")).unwrap());
        store.initialize().unwrap();

        let payments = add_team(&store, "Payments");
        let oncall = add_team(&store, "Payments Oncall");

        let fetcher = Arc::new(MemoryFetcher::default());
        let engine =
            SyncEngine::new(SyncConfig::default(), fetcher.clone(), store.clone()).unwrap();

        Self {
            temp,
            store,
            fetcher,
            engine,
            payments,
            oncall,
        }
    }

    pub fn project(&self, path: &str) -> Option<Project> {
        self.store.get_project_by_source_path(path).unwrap()
    }

    pub fn services(&self, path: &str) -> Vec<Service> {
        match self.project(path) {
            Some(project) => self.store.list_services(&project.id).unwrap(),
            None => Vec::new(),
        }
    }

    pub fn service(&self, path: &str, name: &str) -> Service {
        self.services(path)
            .into_iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("service {name} not found"))
    }
}

pub fn add_team(store: &SqliteStore, name: &str) -> Team {
    let team = Team {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: None,
        created_at: Utc::now(),
    };
    store.create_team(&team).unwrap();
    team
}

/// A minimal valid manifest with the given services.
pub fn manifest(name: &str, owner: &str, services: &[&str]) -> String {
    let mut doc = format!(
        "apiVersion: catalog.portal/v1\n\
         kind: Project\n\
         metadata:\n  name: {name}\n  title: {name} title\n  owner: {owner}\n\
         spec:\n  services:\n"
    );
    for service in services {
        doc.push_str(&format!(
            "    - name: {service}\n      title: {service} title\n      language: rust\n"
        ));
    }
    doc
}

/// Catalog store that fails creating one named service inside the transaction.
pub struct FailingCatalog {
    pub inner: Arc<SqliteStore>,
    pub fail_on: String,
}

struct FailingWriter<'a> {
    inner: &'a dyn CatalogWriter,
    fail_on: &'a str,
}

impl CatalogWriter for FailingWriter<'_> {
    fn get_project_by_source_path(&self, source_path: &str) -> Result<Option<Project>> {
        self.inner.get_project_by_source_path(source_path)
    }

    fn create_project(&self, project: &Project) -> Result<()> {
        self.inner.create_project(project)
    }

    fn update_project(&self, project: &Project) -> Result<()> {
        self.inner.update_project(project)
    }

    fn list_services(&self, project_id: &str) -> Result<Vec<Service>> {
        self.inner.list_services(project_id)
    }

    fn create_service(&self, service: &Service) -> Result<()> {
        if service.name == self.fail_on {
            return Err(Error::Conflict("disk full".to_string()));
        }
        self.inner.create_service(service)
    }

    fn update_service(&self, service: &Service) -> Result<()> {
        self.inner.update_service(service)
    }

    fn mark_orphaned_except(
        &self,
        project_id: &str,
        declared: &[String],
        at: chrono::DateTime<Utc>,
    ) -> Result<Vec<String>> {
        self.inner.mark_orphaned_except(project_id, declared, at)
    }
}

impl CatalogStore for FailingCatalog {
    fn get_project(&self, id: &str) -> Result<Option<Project>> {
        self.inner.get_project(id)
    }

    fn get_project_by_source_path(&self, source_path: &str) -> Result<Option<Project>> {
        CatalogStore::get_project_by_source_path(self.inner.as_ref(), source_path)
    }

    fn get_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        self.inner.get_project_by_name(name)
    }

    fn list_projects(&self, cursor: &str, limit: i32) -> Result<Vec<Project>> {
        self.inner.list_projects(cursor, limit)
    }

    fn create_project(&self, project: &Project) -> Result<()> {
        CatalogStore::create_project(self.inner.as_ref(), project)
    }

    fn list_services(&self, project_id: &str) -> Result<Vec<Service>> {
        CatalogStore::list_services(self.inner.as_ref(), project_id)
    }

    fn get_service(&self, id: &str) -> Result<Option<Service>> {
        self.inner.get_service(id)
    }

    fn create_service(&self, service: &Service) -> Result<()> {
        CatalogStore::create_service(self.inner.as_ref(), service)
    }

    fn delete_service(&self, id: &str) -> Result<bool> {
        self.inner.delete_service(id)
    }

    fn set_project_sync_state(
        &self,
        source_path: &str,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<bool> {
        self.inner.set_project_sync_state(source_path, status, error)
    }

    fn with_catalog_transaction(
        &self,
        apply: &mut dyn FnMut(&dyn CatalogWriter) -> Result<()>,
    ) -> Result<()> {
        let fail_on = self.fail_on.as_str();
        self.inner.with_catalog_transaction(&mut |writer| {
            apply(&FailingWriter {
                inner: writer,
                fail_on,
            })
        })
    }
}

/// Run history that refuses to record runs for one path.
pub struct FailingHistory {
    pub inner: Arc<SqliteStore>,
    pub fail_on: String,
}

impl RunHistory for FailingHistory {
    fn record_sync_run(&self, run: &SyncRun) -> Result<()> {
        if run.file_path == self.fail_on {
            return Err(Error::Conflict("history table is read-only".to_string()));
        }
        self.inner.record_sync_run(run)
    }

    fn get_sync_run(&self, id: &str) -> Result<Option<SyncRun>> {
        self.inner.get_sync_run(id)
    }

    fn list_sync_runs(&self, limit: i32) -> Result<Vec<SyncRun>> {
        self.inner.list_sync_runs(limit)
    }

    fn list_sync_runs_for_path(&self, file_path: &str, limit: i32) -> Result<Vec<SyncRun>> {
        self.inner.list_sync_runs_for_path(file_path, limit)
    }
}

/// Team directory whose every read fails.
pub struct UnavailableTeams;

impl TeamDirectory for UnavailableTeams {
    fn find_team_by_name(&self, _name: &str) -> Result<Option<Team>> {
        Err(Error::Conflict("database is locked".to_string()))
    }

    fn get_team(&self, _id: &str) -> Result<Option<Team>> {
        Err(Error::Conflict("database is locked".to_string()))
    }
}
