use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use catalog_sync::cli::{
    self, AdminCommands, ProjectCommands, RunsCommands, ServiceCommands, SyncCommands,
    TeamCommands,
};

#[derive(Parser)]
#[command(name = "catalog-sync")]
#[command(about = "Sync project manifests from git into the service catalog", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the catalog database (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Manage owning teams
    Team {
        #[command(subcommand)]
        command: TeamCommands,
    },

    /// Inspect catalog projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Inspect and purge catalog services
    Service {
        #[command(subcommand)]
        command: ServiceCommands,
    },

    /// Reconcile manifests into the catalog
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },

    /// Inspect sync run history
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("catalog_sync=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let config = cli::load_config(args.config.as_deref(), args.data_dir)?;

    match args.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init => cli::run_init(&config)?,
        },
        Commands::Team { command } => match command {
            TeamCommands::Add { name, description } => {
                cli::run_team_add(&config, name, description)?
            }
            TeamCommands::List { json } => cli::run_team_list(&config, json)?,
        },
        Commands::Project { command } => match command {
            ProjectCommands::List { json } => cli::run_project_list(&config, json)?,
        },
        Commands::Service { command } => match command {
            ServiceCommands::List { project, json } => {
                cli::run_service_list(&config, project, json)?
            }
            ServiceCommands::Purge { service_id, yes } => {
                cli::run_service_purge(&config, service_id, yes)?
            }
        },
        Commands::Sync { command } => match command {
            SyncCommands::Scan => cli::run_sync_scan(&config).await?,
            SyncCommands::File {
                path,
                trigger,
                actor,
            } => cli::run_sync_file(&config, path, trigger.into(), actor).await?,
            SyncCommands::All { actor } => cli::run_sync_all(&config, actor).await?,
            SyncCommands::Watch { interval_secs } => {
                cli::run_sync_watch(&config, interval_secs).await?
            }
        },
        Commands::Runs { command } => match command {
            RunsCommands::List { limit, path, json } => {
                cli::run_runs_list(&config, limit, path, json)?
            }
            RunsCommands::Show { id } => cli::run_runs_show(&config, id)?,
        },
    }

    Ok(())
}
