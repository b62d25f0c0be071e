use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::CatalogConfig;
use crate::store::{Store, TeamDirectory};
use crate::types::Team;

use super::init_store;

#[derive(Serialize)]
struct TeamOutput<'a> {
    id: &'a str,
    name: &'a str,
    description: Option<&'a str>,
    created_at: String,
}

pub fn run_team_add(
    config: &CatalogConfig,
    name: String,
    description: Option<String>,
) -> anyhow::Result<()> {
    let store = init_store(config)?;

    let name = name.trim().to_string();
    if name.is_empty() {
        anyhow::bail!("Team name cannot be empty");
    }
    if let Some(existing) = store.find_team_by_name(&name)? {
        anyhow::bail!("Team '{}' already exists ({})", existing.name, existing.id);
    }

    let team = Team {
        id: Uuid::new_v4().to_string(),
        name,
        description,
        created_at: Utc::now(),
    };
    store.create_team(&team)?;

    println!();
    println!("Created team \"{}\" ({})", team.name, team.id);
    println!();

    Ok(())
}

pub fn run_team_list(config: &CatalogConfig, json: bool) -> anyhow::Result<()> {
    let store = init_store(config)?;
    let teams = store.list_teams()?;

    if json {
        let output: Vec<TeamOutput> = teams
            .iter()
            .map(|t| TeamOutput {
                id: &t.id,
                name: &t.name,
                description: t.description.as_deref(),
                created_at: t.created_at.to_rfc3339(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if teams.is_empty() {
        println!("No teams found.");
        return Ok(());
    }
    println!();
    for team in &teams {
        println!("  {}  {}", team.id, team.name);
    }
    println!();

    Ok(())
}
