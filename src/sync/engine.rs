use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::locks::PathLocks;
use super::orphan::detect_orphans;
use super::outcome::{Stage, SyncFailure, SyncSummary, UnrecordedRun};
use super::resolve::IdentityResolver;
use super::upsert::{ApplyContext, upsert_project, upsert_services};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::fetch::{FetchError, ManifestFetcher};
use crate::manifest::{CatalogDocument, ParseError, parse_manifest_str, validate};
use crate::store::path::normalize_manifest_path;
use crate::store::{CatalogStore, RunHistory, Store, TeamDirectory};
use crate::types::{
    RunStatus, SyncCounts, SyncRun, SyncStatus, SyncTrigger, ValidationError,
};

const PROJECT_PAGE_SIZE: i32 = 200;

/// Reconciles manifest files into the catalog, one file at a time.
///
/// Every call to [`SyncEngine::sync_file`] ends in exactly one recorded
/// [`SyncRun`], whatever the outcome.
pub struct SyncEngine {
    config: SyncConfig,
    include: Vec<glob::Pattern>,
    timeout: Option<Duration>,
    fetcher: Arc<dyn ManifestFetcher>,
    catalog: Arc<dyn CatalogStore>,
    teams: Arc<dyn TeamDirectory>,
    history: Arc<dyn RunHistory>,
    locks: PathLocks,
}

/// What a run learned before it stopped, successful or not.
#[derive(Default)]
struct RunState {
    project_id: Option<String>,
    digest: Option<String>,
    counts: SyncCounts,
}

struct Loaded {
    digest: String,
    parsed: std::result::Result<(String, CatalogDocument), SyncFailure>,
}

impl SyncEngine {
    /// Builds an engine whose catalog, team directory and run history all live in `store`.
    pub fn new<S: Store + 'static>(
        config: SyncConfig,
        fetcher: Arc<dyn ManifestFetcher>,
        store: Arc<S>,
    ) -> Result<Self> {
        Self::from_parts(config, fetcher, store.clone(), store.clone(), store)
    }

    pub fn from_parts(
        config: SyncConfig,
        fetcher: Arc<dyn ManifestFetcher>,
        catalog: Arc<dyn CatalogStore>,
        teams: Arc<dyn TeamDirectory>,
        history: Arc<dyn RunHistory>,
    ) -> Result<Self> {
        let include = config
            .include
            .iter()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| Error::Config(format!("invalid include pattern '{p}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            timeout: config.timeout(),
            config,
            include,
            fetcher,
            catalog,
            teams,
            history,
            locks: PathLocks::new(),
        })
    }

    /// Overrides the bound on fetch, parse and validate of one file.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Lists manifest paths under the configured directory. Does not touch the catalog.
    pub async fn scan(&self) -> std::result::Result<Vec<String>, SyncFailure> {
        let fetcher = Arc::clone(&self.fetcher);
        let prefix = self.config.manifest_dir.trim_matches('/').to_string();
        let include = self.include.clone();

        run_blocking(self.timeout, move || {
            fetcher.refresh()?;
            let mut files: Vec<String> = fetcher
                .list_files(&prefix)?
                .into_iter()
                .filter(|path| is_included(&include, &prefix, path))
                .collect();
            files.sort();
            files.dedup();
            Ok(files)
        })
        .await
    }

    /// Syncs one manifest file and records the run.
    ///
    /// Only a failure to write the run record itself is returned as `Err`;
    /// every pipeline failure is reported inside the returned run.
    pub async fn sync_file(&self, path: &str, trigger: &SyncTrigger) -> Result<SyncRun> {
        self.sync_one(path, trigger, true).await
    }

    /// Scans once and syncs every manifest independently.
    pub async fn sync_all(&self, trigger: &SyncTrigger) -> Result<SyncSummary> {
        let started_at = Utc::now();

        let files = match self.scan().await {
            Ok(files) => files,
            Err(failure) => {
                warn!(error = %failure, "Manifest scan failed");
                return Ok(SyncSummary::scan_failed(started_at, failure.to_string()));
            }
        };
        info!(files = files.len(), actor = %trigger.actor, "Syncing all manifests");

        let mut runs = Vec::with_capacity(files.len());
        let mut unrecorded = Vec::new();
        for path in &files {
            match self.sync_one(path, trigger, false).await {
                Ok(run) => runs.push(run),
                Err(e) => {
                    error!(path = %path, error = %e, "Sync run could not be recorded");
                    unrecorded.push(UnrecordedRun {
                        path: path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let missing_sources = self.missing_sources(&files).unwrap_or_else(|e| {
            error!(error = %e, "Could not list projects for missing manifests");
            Vec::new()
        });
        for path in &missing_sources {
            warn!(path = %path, "Synced project has no manifest anymore");
        }

        let summary = SyncSummary::from_runs(started_at, runs, unrecorded, missing_sources);
        info!(
            status = %summary.status,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Catalog sync finished"
        );
        Ok(summary)
    }

    async fn sync_one(&self, path: &str, trigger: &SyncTrigger, refresh: bool) -> Result<SyncRun> {
        let started_at = Utc::now();

        let source_path = match normalize_manifest_path(path) {
            Ok(p) => p,
            Err(e) => {
                let failure =
                    SyncFailure::Fetch(FetchError::NotFound(format!("{}: {e}", path.trim())));
                return self.finish(
                    path.trim(),
                    trigger,
                    started_at,
                    RunState::default(),
                    Err(failure),
                );
            }
        };

        let _token = self.locks.acquire(&source_path).await;

        let mut state = RunState::default();
        let outcome = self.pipeline(&source_path, refresh, &mut state).await;
        self.finish(&source_path, trigger, started_at, state, outcome)
    }

    async fn pipeline(
        &self,
        path: &str,
        refresh: bool,
        state: &mut RunState,
    ) -> std::result::Result<(), SyncFailure> {
        debug!(path = %path, stage = %Stage::Fetching, "Sync stage");
        let fetcher = Arc::clone(&self.fetcher);
        let owned_path = path.to_string();
        let loaded = run_blocking(self.timeout, move || {
            if refresh {
                fetcher.refresh()?;
            }
            let bytes = fetcher.get_content(&owned_path)?;
            let digest = hex::encode(Sha256::digest(&bytes));
            let parsed = parse_and_validate(&owned_path, bytes);
            Ok(Loaded { digest, parsed })
        })
        .await?;

        state.digest = Some(loaded.digest);
        let (raw, document) = loaded.parsed?;

        debug!(path = %path, stage = %Stage::Resolving, "Sync stage");
        self.check_project_name(path, &document)?;
        let resolver = IdentityResolver::new(self.teams.as_ref(), self.config.owner_lookup);
        let resolved = resolver.resolve(document)?;

        self.catalog
            .set_project_sync_state(path, SyncStatus::Syncing, None)?;

        let ctx = ApplyContext {
            source_path: path,
            raw_document: &raw,
            now: Utc::now(),
        };
        let mut counts = SyncCounts::default();
        let mut project_id = None;

        self.catalog.with_catalog_transaction(&mut |writer| {
            counts = SyncCounts::default();

            debug!(path = %path, stage = %Stage::Upserting, "Sync stage");
            let project = upsert_project(writer, &resolved, &ctx, &mut counts)?;
            upsert_services(writer, &project, &resolved, &ctx, &mut counts)?;

            debug!(path = %path, stage = %Stage::DetectingOrphans, "Sync stage");
            detect_orphans(writer, &project.id, &resolved.document, ctx.now, &mut counts)?;

            project_id = Some(project.id);
            Ok(())
        })?;

        state.counts = counts;
        state.project_id = project_id;
        Ok(())
    }

    /// Project names are unique across manifests; another path or a manual
    /// project already holding the name fails this file before any write.
    fn check_project_name(
        &self,
        path: &str,
        document: &CatalogDocument,
    ) -> std::result::Result<(), SyncFailure> {
        let Some(name) = document.project_name() else {
            return Ok(());
        };
        let Some(existing) = self
            .catalog
            .get_project_by_name(name)
            .map_err(SyncFailure::lookup)?
        else {
            return Ok(());
        };
        if existing.source_path.as_deref() == Some(path) {
            return Ok(());
        }

        let holder = match existing.source_path.as_deref() {
            Some(other) => format!("the manifest at {other}"),
            None => "a manually created project".to_string(),
        };
        Err(SyncFailure::Validation(vec![ValidationError::new(
            "metadata.name",
            format!("project name \"{name}\" is already used by {holder}"),
        )]))
    }

    fn finish(
        &self,
        path: &str,
        trigger: &SyncTrigger,
        started_at: DateTime<Utc>,
        mut state: RunState,
        outcome: std::result::Result<(), SyncFailure>,
    ) -> Result<SyncRun> {
        debug!(path = %path, stage = %Stage::Recording, "Sync stage");

        let (status, error, validation_errors) = match &outcome {
            Ok(()) => (RunStatus::Success, None, Vec::new()),
            Err(failure) => (
                RunStatus::Failed,
                Some(failure.to_string()),
                failure.field_errors(),
            ),
        };

        if let Err(failure) = &outcome {
            if failure.touched_catalog() {
                let message = failure.to_string();
                if let Err(e) =
                    self.catalog
                        .set_project_sync_state(path, SyncStatus::Failed, Some(&message))
                {
                    error!(path = %path, error = %e, "Failed to record project sync failure");
                }
            }
        }

        if state.project_id.is_none() {
            match self.catalog.get_project_by_source_path(path) {
                Ok(project) => state.project_id = project.map(|p| p.id),
                Err(e) => warn!(path = %path, error = %e, "Could not look up project for run"),
            }
        }

        let completed_at = Utc::now().max(started_at);
        let run = SyncRun {
            id: Uuid::new_v4().to_string(),
            trigger: trigger.kind,
            actor: trigger.actor.clone(),
            project_id: state.project_id,
            file_path: path.to_string(),
            status,
            counts: state.counts,
            error,
            validation_errors,
            manifest_digest: state.digest,
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds(),
        };

        self.history.record_sync_run(&run)?;

        match &outcome {
            Ok(()) => info!(
                path = %path,
                run_id = %run.id,
                projects_created = run.counts.projects_created,
                projects_updated = run.counts.projects_updated,
                services_created = run.counts.services_created,
                services_updated = run.counts.services_updated,
                services_orphaned = run.counts.services_orphaned,
                "Manifest synced"
            ),
            Err(failure) => warn!(
                path = %path,
                run_id = %run.id,
                stage = %failure.stage(),
                error = %failure,
                "Manifest sync failed"
            ),
        }

        Ok(run)
    }

    /// Source paths of synced projects that the latest scan did not list.
    fn missing_sources(&self, scanned: &[String]) -> Result<Vec<String>> {
        let scanned: HashSet<&str> = scanned.iter().map(String::as_str).collect();
        let mut missing = Vec::new();
        let mut cursor = String::new();

        loop {
            let page = self.catalog.list_projects(&cursor, PROJECT_PAGE_SIZE)?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = last.name.clone();

            for project in &page {
                if !project.auto_synced {
                    continue;
                }
                if let Some(source) = project.source_path.as_deref() {
                    if !scanned.contains(source) {
                        missing.push(source.to_string());
                    }
                }
            }

            if page.len() < PROJECT_PAGE_SIZE as usize {
                break;
            }
        }

        missing.sort();
        Ok(missing)
    }
}

fn parse_and_validate(
    path: &str,
    bytes: Vec<u8>,
) -> std::result::Result<(String, CatalogDocument), SyncFailure> {
    debug!(path = %path, stage = %Stage::Parsing, "Sync stage");
    let raw = String::from_utf8(bytes).map_err(|_| ParseError::NotUtf8)?;
    let document = parse_manifest_str(&raw)?;

    debug!(path = %path, stage = %Stage::Validating, "Sync stage");
    let errors = validate(&document);
    if !errors.is_empty() {
        return Err(SyncFailure::Validation(errors));
    }

    Ok((raw, document))
}

fn is_included(include: &[glob::Pattern], prefix: &str, path: &str) -> bool {
    let relative = if prefix.is_empty() {
        path
    } else {
        match path.strip_prefix(prefix).and_then(|p| p.strip_prefix('/')) {
            Some(relative) => relative,
            None => return false,
        }
    };
    include.iter().any(|pattern| pattern.matches(relative))
}

/// Runs blocking repository work off the async runtime, bounded by `timeout`.
///
/// On timeout the worker is left to finish in the background; its result is dropped.
async fn run_blocking<T, F>(
    timeout: Option<Duration>,
    task: F,
) -> std::result::Result<T, SyncFailure>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, SyncFailure> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(task);

    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, handle)
            .await
            .map_err(|_| SyncFailure::Timeout(limit))?,
        None => handle.await,
    };

    joined.map_err(|e| {
        SyncFailure::Fetch(FetchError::Unavailable(format!("fetch worker failed: {e}")))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(globs: &[&str]) -> Vec<glob::Pattern> {
        globs.iter().map(|g| glob::Pattern::new(g).unwrap()).collect()
    }

    #[test]
    fn test_include_matches_relative_to_prefix() {
        let include = patterns(&["*.yaml", "*.yml"]);

        assert!(is_included(&include, "catalog", "catalog/payments.yaml"));
        assert!(is_included(&include, "catalog", "catalog/teams/search.yml"));
        assert!(!is_included(&include, "catalog", "catalog/README.md"));
        assert!(!is_included(&include, "catalog", "other/payments.yaml"));
        assert!(!is_included(&include, "catalog", "catalogue/payments.yaml"));
        assert!(is_included(&include, "", "payments.yaml"));
    }

    #[test]
    fn test_parse_and_validate_stops_at_first_failing_stage() {
        let err = parse_and_validate("a.yaml", vec![0xff]).unwrap_err();
        assert_eq!(err.stage(), Stage::Parsing);

        let err = parse_and_validate("a.yaml", b"kind: Project\n".to_vec()).unwrap_err();
        assert_eq!(err.stage(), Stage::Validating);
        assert!(err.field_errors().iter().any(|e| e.field == "metadata.owner"));
    }

    #[tokio::test]
    async fn test_run_blocking_times_out() {
        let result = run_blocking(Some(Duration::from_millis(10)), || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await;
        assert_eq!(
            result,
            Err(SyncFailure::Timeout(Duration::from_millis(10)))
        );
    }
}
