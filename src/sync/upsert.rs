use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::resolve::ResolvedDocument;
use crate::error::{Error, Result};
use crate::manifest::{ServiceEntry, non_empty};
use crate::store::CatalogWriter;
use crate::types::{Project, Service, SyncCounts, SyncStatus};

/// Per-file values shared by every write of one sync.
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext<'a> {
    pub source_path: &'a str,
    /// Manifest text as fetched, kept as the project snapshot.
    pub raw_document: &'a str,
    pub now: DateTime<Utc>,
}

/// Creates or overwrites the project synced from `ctx.source_path`.
///
/// Mutable fields are always taken from the document, so anything absent
/// there is cleared. `projects_updated` is only bumped on a real change.
pub fn upsert_project(
    writer: &dyn CatalogWriter,
    resolved: &ResolvedDocument,
    ctx: &ApplyContext<'_>,
    counts: &mut SyncCounts,
) -> Result<Project> {
    let metadata = &resolved.document.metadata;
    let name = resolved
        .document
        .project_name()
        .ok_or_else(|| Error::BadRequest("manifest has no project name".to_string()))?
        .to_string();
    let title = text(metadata.title.as_deref()).unwrap_or_default();
    let description = text(metadata.description.as_deref());
    let tags = dedup_tags(&metadata.tags);

    match writer.get_project_by_source_path(ctx.source_path)? {
        Some(mut project) => {
            let changed = project.name != name
                || project.title != title
                || project.description != description
                || project.tags != tags
                || project.links != metadata.links
                || project.owner_team_id != resolved.project_owner
                || project.raw_document.as_deref() != Some(ctx.raw_document);

            project.name = name;
            project.title = title;
            project.description = description;
            project.tags = tags;
            project.links = metadata.links.clone();
            project.owner_team_id = resolved.project_owner.clone();
            project.raw_document = Some(ctx.raw_document.to_string());
            project.last_synced_at = Some(ctx.now);
            project.sync_status = SyncStatus::Success;
            project.sync_error = None;
            project.auto_synced = true;
            if changed {
                project.updated_at = ctx.now;
                counts.projects_updated += 1;
            }

            writer.update_project(&project)?;
            debug!(project = %project.name, changed, "Project updated from manifest");
            Ok(project)
        }
        None => {
            let project = Project {
                id: Uuid::new_v4().to_string(),
                name,
                title,
                description,
                tags,
                links: metadata.links.clone(),
                owner_team_id: resolved.project_owner.clone(),
                source_path: Some(ctx.source_path.to_string()),
                raw_document: Some(ctx.raw_document.to_string()),
                last_synced_at: Some(ctx.now),
                sync_status: SyncStatus::Success,
                sync_error: None,
                auto_synced: true,
                created_at: ctx.now,
                updated_at: ctx.now,
            };

            writer.create_project(&project)?;
            counts.projects_created += 1;
            debug!(project = %project.name, "Project created from manifest");
            Ok(project)
        }
    }
}

/// Upserts every declared service of `project`, keyed by (project, name).
///
/// A matching row is overwritten whether or not it was created by sync, and
/// is un-orphaned if it had been flagged. Rows whose content is already
/// current are not written at all.
pub fn upsert_services(
    writer: &dyn CatalogWriter,
    project: &Project,
    resolved: &ResolvedDocument,
    ctx: &ApplyContext<'_>,
    counts: &mut SyncCounts,
) -> Result<()> {
    let mut existing = writer.list_services(&project.id)?;

    for (entry, owner) in resolved
        .document
        .spec
        .services
        .iter()
        .zip(&resolved.service_owners)
    {
        let desired = DesiredService::from_entry(entry, owner)?;

        match existing.iter_mut().find(|s| s.name == desired.name) {
            Some(service) => {
                if desired.matches(service) && service.auto_synced && !service.orphaned {
                    continue;
                }
                if !service.auto_synced {
                    debug!(service = %service.name, "Adopting manually created service");
                }

                desired.apply(service, ctx.source_path);
                service.auto_synced = true;
                service.orphaned = false;
                service.orphaned_at = None;
                service.updated_at = ctx.now;

                writer.update_service(service)?;
                counts.services_updated += 1;
            }
            None => {
                let mut service = Service {
                    id: Uuid::new_v4().to_string(),
                    project_id: project.id.clone(),
                    name: String::new(),
                    title: String::new(),
                    description: None,
                    language: None,
                    environment: None,
                    repository: None,
                    owner_team_id: String::new(),
                    tags: Vec::new(),
                    links: Vec::new(),
                    dependencies: Default::default(),
                    catalog_source: None,
                    auto_synced: true,
                    orphaned: false,
                    orphaned_at: None,
                    raw_document: None,
                    created_at: ctx.now,
                    updated_at: ctx.now,
                };
                desired.apply(&mut service, ctx.source_path);

                writer.create_service(&service)?;
                counts.services_created += 1;
                existing.push(service);
            }
        }
    }

    Ok(())
}

/// Service fields as the manifest declares them.
struct DesiredService<'a> {
    name: String,
    title: String,
    entry: &'a ServiceEntry,
    owner: &'a str,
    tags: Vec<String>,
    snapshot: String,
}

impl<'a> DesiredService<'a> {
    fn from_entry(entry: &'a ServiceEntry, owner: &'a str) -> Result<Self> {
        let name = non_empty(entry.name.as_deref())
            .ok_or_else(|| Error::BadRequest("service entry has no name".to_string()))?
            .to_string();
        let snapshot = entry
            .snapshot()
            .map_err(|e| Error::Serialization(e.to_string()))?;

        Ok(Self {
            name,
            title: text(entry.title.as_deref()).unwrap_or_default(),
            entry,
            owner,
            tags: dedup_tags(&entry.tags),
            snapshot,
        })
    }

    fn matches(&self, service: &Service) -> bool {
        service.title == self.title
            && service.description == text(self.entry.description.as_deref())
            && service.language == text(self.entry.language.as_deref())
            && service.environment == self.entry.environment
            && service.repository == text(self.entry.repository.as_deref())
            && service.owner_team_id == self.owner
            && service.tags == self.tags
            && service.links == self.entry.links
            && service.dependencies == self.entry.dependencies
            && service.raw_document.as_deref() == Some(self.snapshot.as_str())
    }

    fn apply(&self, service: &mut Service, source_path: &str) {
        service.name = self.name.clone();
        service.title = self.title.clone();
        service.description = text(self.entry.description.as_deref());
        service.language = text(self.entry.language.as_deref());
        service.environment = self.entry.environment.clone();
        service.repository = text(self.entry.repository.as_deref());
        service.owner_team_id = self.owner.to_string();
        service.tags = self.tags.clone();
        service.links = self.entry.links.clone();
        service.dependencies = self.entry.dependencies.clone();
        service.catalog_source = Some(source_path.to_string());
        service.raw_document = Some(self.snapshot.clone());
    }
}

fn text(value: Option<&str>) -> Option<String> {
    non_empty(value).map(str::to_string)
}

/// Trims tags and drops blanks and repeats, keeping first-occurrence order.
fn dedup_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_tags_keeps_first_occurrence() {
        let tags = vec![
            "pci".to_string(),
            " payments ".to_string(),
            "pci".to_string(),
            "".to_string(),
            "payments".to_string(),
        ];
        assert_eq!(dedup_tags(&tags), vec!["pci", "payments"]);
    }
}
