pub const SCHEMA: &str = r#"
-- Teams own projects and services; names match case-insensitively
CREATE TABLE IF NOT EXISTS teams (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    description TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Projects; source_path is the natural key for manifest-synced rows
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT,
    tags TEXT NOT NULL DEFAULT '[]',       -- JSON array
    links TEXT NOT NULL DEFAULT '[]',      -- JSON array of {url, title, type}
    owner_team_id TEXT NOT NULL REFERENCES teams(id),

    -- NULL for manually created projects
    source_path TEXT UNIQUE,
    raw_document TEXT,

    last_synced_at TEXT,
    sync_status TEXT NOT NULL DEFAULT 'never_synced',
    sync_error TEXT,
    auto_synced INTEGER NOT NULL DEFAULT 0,

    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Services belong to one project; (project_id, name) is the natural key
CREATE TABLE IF NOT EXISTS services (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    language TEXT,
    environment TEXT,
    repository TEXT,
    owner_team_id TEXT NOT NULL REFERENCES teams(id),
    tags TEXT NOT NULL DEFAULT '[]',
    links TEXT NOT NULL DEFAULT '[]',
    dependencies TEXT NOT NULL DEFAULT '{}',

    catalog_source TEXT,
    auto_synced INTEGER NOT NULL DEFAULT 0,
    orphaned INTEGER NOT NULL DEFAULT 0,
    orphaned_at TEXT,
    raw_document TEXT,

    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(project_id, name),
    -- Manually created services are never orphaned
    CHECK (orphaned = 0 OR auto_synced = 1)
);

-- One row per sync invocation; append-only, no foreign keys so history outlives projects
CREATE TABLE IF NOT EXISTS sync_runs (
    id TEXT PRIMARY KEY,
    trigger TEXT NOT NULL,
    actor TEXT NOT NULL,
    project_id TEXT,
    file_path TEXT NOT NULL,
    status TEXT NOT NULL,

    projects_created INTEGER NOT NULL DEFAULT 0,
    projects_updated INTEGER NOT NULL DEFAULT 0,
    services_created INTEGER NOT NULL DEFAULT 0,
    services_updated INTEGER NOT NULL DEFAULT 0,
    services_orphaned INTEGER NOT NULL DEFAULT 0,

    error TEXT,
    validation_errors TEXT NOT NULL DEFAULT '[]',  -- JSON array of {field, message}
    manifest_digest TEXT,

    started_at TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,

    CHECK (completed_at >= started_at)
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_team_id);
CREATE INDEX IF NOT EXISTS idx_services_project ON services(project_id);
CREATE INDEX IF NOT EXISTS idx_services_owner ON services(owner_team_id);
CREATE INDEX IF NOT EXISTS idx_sync_runs_path ON sync_runs(file_path, started_at);
CREATE INDEX IF NOT EXISTS idx_sync_runs_started ON sync_runs(started_at);
"#;
