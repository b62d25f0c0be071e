use tracing::info;

use crate::config::CatalogConfig;
use crate::store::CatalogStore;
use crate::types::{Project, Service};

use super::{confirm_action, format_relative_time, init_store};

const PAGE_SIZE: i32 = 200;

fn all_projects(store: &dyn CatalogStore) -> anyhow::Result<Vec<Project>> {
    let mut projects = Vec::new();
    let mut cursor = String::new();
    loop {
        let page = store.list_projects(&cursor, PAGE_SIZE)?;
        let done = page.len() < PAGE_SIZE as usize;
        if let Some(last) = page.last() {
            cursor = last.name.clone();
        }
        projects.extend(page);
        if done {
            return Ok(projects);
        }
    }
}

pub fn run_project_list(config: &CatalogConfig, json: bool) -> anyhow::Result<()> {
    let store = init_store(config)?;
    let projects = all_projects(&store)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&projects)?);
        return Ok(());
    }

    if projects.is_empty() {
        println!("No projects found.");
        return Ok(());
    }
    println!();
    for project in &projects {
        let synced = match &project.last_synced_at {
            Some(at) => format!("synced {}", format_relative_time(at)),
            None => "never synced".to_string(),
        };
        let source = project.source_path.as_deref().unwrap_or("manual");
        println!(
            "  {}  {}  [{}]  {}",
            project.name, source, project.sync_status, synced
        );
        if let Some(error) = &project.sync_error {
            println!("      error: {error}");
        }
    }
    println!();

    Ok(())
}

pub fn run_service_list(config: &CatalogConfig, project: String, json: bool) -> anyhow::Result<()> {
    let store = init_store(config)?;
    let project = store
        .get_project_by_name(&project)?
        .ok_or_else(|| anyhow::anyhow!("Project not found: {}", project))?;
    let services = store.list_services(&project.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&services)?);
        return Ok(());
    }

    if services.is_empty() {
        println!("No services found.");
        return Ok(());
    }
    println!();
    for service in &services {
        println!("  {}  {}  {}", service.id, service.name, service_flags(service));
    }
    println!();

    Ok(())
}

fn service_flags(service: &Service) -> String {
    match (service.auto_synced, &service.orphaned_at) {
        (_, Some(at)) if service.orphaned => format!("orphaned {}", format_relative_time(at)),
        (true, _) => "synced".to_string(),
        (false, _) => "manual".to_string(),
    }
}

/// Deletes an orphaned service. This is the only path that removes service rows.
pub fn run_service_purge(config: &CatalogConfig, service_id: String, yes: bool) -> anyhow::Result<()> {
    let store = init_store(config)?;

    let service = store
        .get_service(&service_id)?
        .ok_or_else(|| anyhow::anyhow!("Service not found: {}", service_id))?;

    if !service.orphaned {
        anyhow::bail!(
            "Service '{}' is not orphaned. Only services removed from their manifest can be purged.",
            service.name
        );
    }

    if !confirm_action(&format!("Permanently delete service '{}'?", service.name), yes)? {
        println!("Cancelled.");
        return Ok(());
    }

    store.delete_service(&service.id)?;
    info!(service = %service.name, id = %service.id, "Orphaned service purged");

    println!();
    println!("Deleted service '{}'", service.name);
    println!();

    Ok(())
}
