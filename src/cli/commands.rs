use clap::{Subcommand, ValueEnum};

use crate::types::TriggerKind;

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Initialize the data directory and database schema
    Init,
}

#[derive(Subcommand)]
pub enum TeamCommands {
    /// Add a team that manifests can name as owner
    Add {
        /// Team name (matched case-insensitively by manifests)
        #[arg(long)]
        name: String,

        /// Optional description
        #[arg(long)]
        description: Option<String>,
    },

    /// List teams
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// List catalog projects
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// List the services of a project
    List {
        /// Project name
        #[arg(long)]
        project: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Permanently delete an orphaned service
    Purge {
        /// Service ID to delete
        #[arg(long)]
        service_id: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List manifest files in the repository without syncing
    Scan,

    /// Sync a single manifest file
    File {
        /// Manifest path inside the repository
        path: String,

        /// What triggered this sync
        #[arg(long, value_enum, default_value = "manual")]
        trigger: TriggerArg,

        /// Who triggered this sync
        #[arg(long)]
        actor: Option<String>,
    },

    /// Sync every manifest file
    All {
        /// Who triggered this sync
        #[arg(long)]
        actor: Option<String>,
    },

    /// Sync every manifest on a fixed interval until interrupted
    Watch {
        /// Seconds between runs
        #[arg(long, default_value = "300")]
        interval_secs: u64,
    },
}

#[derive(Subcommand)]
pub enum RunsCommands {
    /// List recent sync runs, newest first
    List {
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: i32,

        /// Only runs for this manifest path
        #[arg(long)]
        path: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one sync run in full
    Show {
        /// Run ID
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum TriggerArg {
    Manual,
    Webhook,
}

impl From<TriggerArg> for TriggerKind {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Manual => TriggerKind::Manual,
            TriggerArg::Webhook => TriggerKind::Webhook,
        }
    }
}
