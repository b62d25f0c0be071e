use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::de::DeserializeOwned;

use super::schema::SCHEMA;
use super::{CatalogStore, CatalogWriter, RunHistory, Store, TeamDirectory};
use crate::error::{Error, Result};
use crate::types::*;

const TEAM_COLUMNS: &str = "id, name, description, created_at";

const PROJECT_COLUMNS: &str = "id, name, title, description, tags, links, owner_team_id, \
     source_path, raw_document, last_synced_at, sync_status, sync_error, auto_synced, \
     created_at, updated_at";

const SERVICE_COLUMNS: &str = "id, project_id, name, title, description, language, environment, \
     repository, owner_team_id, tags, links, dependencies, catalog_source, auto_synced, \
     orphaned, orphaned_at, raw_document, created_at, updated_at";

const RUN_COLUMNS: &str = "id, trigger, actor, project_id, file_path, status, projects_created, \
     projects_updated, services_created, services_updated, services_orphaned, error, \
     validation_errors, manifest_digest, started_at, completed_at, duration_ms";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

/// Fixed-width UTC timestamps so that text comparison matches time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Error::from)
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn datetime_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(parse_datetime(&row.get::<_, String>(idx)?))
}

fn optional_datetime_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<String>>(idx)?.map(|s| parse_datetime(&s)))
}

/// Unique-key violations become `AlreadyExists`, other constraint failures `Conflict`.
fn map_insert_error(err: rusqlite::Error) -> Error {
    match err {
        rusqlite::Error::SqliteFailure(e, msg)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                Error::AlreadyExists
            } else {
                Error::Conflict(msg.unwrap_or_else(|| e.to_string()))
            }
        }
        e => Error::from(e),
    }
}

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: datetime_column(row, 3)?,
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let status: String = row.get(10)?;
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        tags: json_column(row, 4)?,
        links: json_column(row, 5)?,
        owner_team_id: row.get(6)?,
        source_path: row.get(7)?,
        raw_document: row.get(8)?,
        last_synced_at: optional_datetime_column(row, 9)?,
        sync_status: SyncStatus::parse(&status).unwrap_or_else(|| {
            tracing::error!("Invalid sync status in database: '{}'", status);
            SyncStatus::NeverSynced
        }),
        sync_error: row.get(11)?,
        auto_synced: row.get(12)?,
        created_at: datetime_column(row, 13)?,
        updated_at: datetime_column(row, 14)?,
    })
}

fn service_from_row(row: &Row<'_>) -> rusqlite::Result<Service> {
    Ok(Service {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        language: row.get(5)?,
        environment: row.get::<_, Option<String>>(6)?.map(Environment::from),
        repository: row.get(7)?,
        owner_team_id: row.get(8)?,
        tags: json_column(row, 9)?,
        links: json_column(row, 10)?,
        dependencies: json_column(row, 11)?,
        catalog_source: row.get(12)?,
        auto_synced: row.get(13)?,
        orphaned: row.get(14)?,
        orphaned_at: optional_datetime_column(row, 15)?,
        raw_document: row.get(16)?,
        created_at: datetime_column(row, 17)?,
        updated_at: datetime_column(row, 18)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<SyncRun> {
    let trigger: String = row.get(1)?;
    let status: String = row.get(5)?;
    Ok(SyncRun {
        id: row.get(0)?,
        trigger: TriggerKind::parse(&trigger).unwrap_or_else(|| {
            tracing::error!("Invalid trigger in database: '{}'", trigger);
            TriggerKind::Manual
        }),
        actor: row.get(2)?,
        project_id: row.get(3)?,
        file_path: row.get(4)?,
        status: RunStatus::parse(&status).unwrap_or_else(|| {
            tracing::error!("Invalid run status in database: '{}'", status);
            RunStatus::Failed
        }),
        counts: SyncCounts {
            projects_created: row.get(6)?,
            projects_updated: row.get(7)?,
            services_created: row.get(8)?,
            services_updated: row.get(9)?,
            services_orphaned: row.get(10)?,
        },
        error: row.get(11)?,
        validation_errors: json_column(row, 12)?,
        manifest_digest: row.get(13)?,
        started_at: datetime_column(row, 14)?,
        completed_at: datetime_column(row, 15)?,
        duration_ms: row.get(16)?,
    })
}

// Queries shared by the store and the transactional writer

fn query_project_by_source_path(conn: &Connection, source_path: &str) -> Result<Option<Project>> {
    conn.query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE source_path = ?1"),
        params![source_path],
        project_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn insert_project(conn: &Connection, project: &Project) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO projects ({PROJECT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            project.id,
            project.name,
            project.title,
            project.description,
            to_json(&project.tags)?,
            to_json(&project.links)?,
            project.owner_team_id,
            project.source_path,
            project.raw_document,
            project.last_synced_at.as_ref().map(format_datetime),
            project.sync_status.as_str(),
            project.sync_error,
            project.auto_synced,
            format_datetime(&project.created_at),
            format_datetime(&project.updated_at),
        ],
    )
    .map_err(map_insert_error)?;
    Ok(())
}

fn query_services(conn: &Connection, project_id: &str) -> Result<Vec<Service>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE project_id = ?1 ORDER BY name"
    ))?;

    let rows = stmt.query_map(params![project_id], service_from_row)?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn insert_service(conn: &Connection, service: &Service) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO services ({SERVICE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
        ),
        params![
            service.id,
            service.project_id,
            service.name,
            service.title,
            service.description,
            service.language,
            service.environment.as_ref().map(Environment::as_str),
            service.repository,
            service.owner_team_id,
            to_json(&service.tags)?,
            to_json(&service.links)?,
            to_json(&service.dependencies)?,
            service.catalog_source,
            service.auto_synced,
            service.orphaned,
            service.orphaned_at.as_ref().map(format_datetime),
            service.raw_document,
            format_datetime(&service.created_at),
            format_datetime(&service.updated_at),
        ],
    )
    .map_err(map_insert_error)?;
    Ok(())
}

/// Catalog writes scoped to one open transaction.
struct SqliteCatalogWriter<'a> {
    conn: &'a Connection,
}

impl CatalogWriter for SqliteCatalogWriter<'_> {
    fn get_project_by_source_path(&self, source_path: &str) -> Result<Option<Project>> {
        query_project_by_source_path(self.conn, source_path)
    }

    fn create_project(&self, project: &Project) -> Result<()> {
        insert_project(self.conn, project)
    }

    fn update_project(&self, project: &Project) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE projects SET name = ?1, title = ?2, description = ?3, tags = ?4, links = ?5,
                 owner_team_id = ?6, source_path = ?7, raw_document = ?8, last_synced_at = ?9,
                 sync_status = ?10, sync_error = ?11, auto_synced = ?12, updated_at = ?13
             WHERE id = ?14",
            params![
                project.name,
                project.title,
                project.description,
                to_json(&project.tags)?,
                to_json(&project.links)?,
                project.owner_team_id,
                project.source_path,
                project.raw_document,
                project.last_synced_at.as_ref().map(format_datetime),
                project.sync_status.as_str(),
                project.sync_error,
                project.auto_synced,
                format_datetime(&project.updated_at),
                project.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn list_services(&self, project_id: &str) -> Result<Vec<Service>> {
        query_services(self.conn, project_id)
    }

    fn create_service(&self, service: &Service) -> Result<()> {
        insert_service(self.conn, service)
    }

    fn update_service(&self, service: &Service) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE services SET name = ?1, title = ?2, description = ?3, language = ?4,
                 environment = ?5, repository = ?6, owner_team_id = ?7, tags = ?8, links = ?9,
                 dependencies = ?10, catalog_source = ?11, auto_synced = ?12, orphaned = ?13,
                 orphaned_at = ?14, raw_document = ?15, updated_at = ?16
             WHERE id = ?17",
            params![
                service.name,
                service.title,
                service.description,
                service.language,
                service.environment.as_ref().map(Environment::as_str),
                service.repository,
                service.owner_team_id,
                to_json(&service.tags)?,
                to_json(&service.links)?,
                to_json(&service.dependencies)?,
                service.catalog_source,
                service.auto_synced,
                service.orphaned,
                service.orphaned_at.as_ref().map(format_datetime),
                service.raw_document,
                format_datetime(&service.updated_at),
                service.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn mark_orphaned_except(
        &self,
        project_id: &str,
        declared: &[String],
        at: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "UPDATE services SET orphaned = 1, orphaned_at = ?2, updated_at = ?2
             WHERE project_id = ?1 AND auto_synced = 1 AND orphaned = 0
               AND name NOT IN (SELECT value FROM json_each(?3))
             RETURNING name",
        )?;

        let rows = stmt.query_map(
            params![project_id, format_datetime(&at), to_json(declared)?],
            |row| row.get::<_, String>(0),
        )?;

        let mut names = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        names.sort();
        Ok(names)
    }
}

impl TeamDirectory for SqliteStore {
    fn find_team_by_name(&self, name: &str) -> Result<Option<Team>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE name = ?1 COLLATE NOCASE"),
            params![name],
            team_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_team(&self, id: &str) -> Result<Option<Team>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?1"),
            params![id],
            team_from_row,
        )
        .optional()
        .map_err(Error::from)
    }
}

impl CatalogStore for SqliteStore {
    fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![id],
            project_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_project_by_source_path(&self, source_path: &str) -> Result<Option<Project>> {
        query_project_by_source_path(&self.conn(), source_path)
    }

    fn get_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE name = ?1"),
            params![name],
            project_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_projects(&self, cursor: &str, limit: i32) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE name > ?1 ORDER BY name LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![cursor, limit], project_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn create_project(&self, project: &Project) -> Result<()> {
        insert_project(&self.conn(), project)
    }

    fn list_services(&self, project_id: &str) -> Result<Vec<Service>> {
        query_services(&self.conn(), project_id)
    }

    fn get_service(&self, id: &str) -> Result<Option<Service>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?1"),
            params![id],
            service_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn create_service(&self, service: &Service) -> Result<()> {
        insert_service(&self.conn(), service)
    }

    fn delete_service(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM services WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn set_project_sync_state(
        &self,
        source_path: &str,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<bool> {
        // Leaves `updated_at` alone.
        let rows = self.conn().execute(
            "UPDATE projects SET sync_status = ?1, sync_error = ?2 WHERE source_path = ?3",
            params![status.as_str(), error, source_path],
        )?;
        Ok(rows > 0)
    }

    fn with_catalog_transaction(
        &self,
        apply: &mut dyn FnMut(&dyn CatalogWriter) -> Result<()>,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Dropping the transaction without commit rolls it back.
        apply(&SqliteCatalogWriter { conn: &tx })?;

        tx.commit()?;
        Ok(())
    }
}

impl RunHistory for SqliteStore {
    fn record_sync_run(&self, run: &SyncRun) -> Result<()> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO sync_runs ({RUN_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                params![
                    run.id,
                    run.trigger.as_str(),
                    run.actor,
                    run.project_id,
                    run.file_path,
                    run.status.as_str(),
                    run.counts.projects_created,
                    run.counts.projects_updated,
                    run.counts.services_created,
                    run.counts.services_updated,
                    run.counts.services_orphaned,
                    run.error,
                    to_json(&run.validation_errors)?,
                    run.manifest_digest,
                    format_datetime(&run.started_at),
                    format_datetime(&run.completed_at),
                    run.duration_ms,
                ],
            )
            .map_err(map_insert_error)?;
        Ok(())
    }

    fn get_sync_run(&self, id: &str) -> Result<Option<SyncRun>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {RUN_COLUMNS} FROM sync_runs WHERE id = ?1"),
            params![id],
            run_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_sync_runs(&self, limit: i32) -> Result<Vec<SyncRun>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM sync_runs ORDER BY started_at DESC, rowid DESC LIMIT ?1"
        ))?;

        let rows = stmt.query_map(params![limit], run_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_sync_runs_for_path(&self, file_path: &str, limit: i32) -> Result<Vec<SyncRun>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM sync_runs WHERE file_path = ?1
             ORDER BY started_at DESC, rowid DESC LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![file_path, limit], run_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn create_team(&self, team: &Team) -> Result<()> {
        self.conn()
            .execute(
                &format!("INSERT INTO teams ({TEAM_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"),
                params![
                    team.id,
                    team.name,
                    team.description,
                    format_datetime(&team.created_at),
                ],
            )
            .map_err(map_insert_error)?;
        Ok(())
    }

    fn list_teams(&self) -> Result<Vec<Team>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {TEAM_COLUMNS} FROM teams ORDER BY name"))?;

        let rows = stmt.query_map([], team_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_team(&self, id: &str) -> Result<bool> {
        let result = self
            .conn()
            .execute("DELETE FROM teams WHERE id = ?1", params![id]);

        match result {
            Ok(rows) => Ok(rows > 0),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::Conflict(
                    "team still owns projects or services".to_string(),
                ))
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn close(&self) -> Result<()> {
        self.conn()
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}
