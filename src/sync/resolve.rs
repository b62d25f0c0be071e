use std::collections::HashMap;

use uuid::Uuid;

use super::outcome::SyncFailure;
use crate::config::OwnerLookup;
use crate::error::Result;
use crate::manifest::{CatalogDocument, non_empty};
use crate::store::TeamDirectory;

/// A validated document whose owner references have been turned into team ids.
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub document: CatalogDocument,
    pub project_owner: String,
    /// One team id per entry of `document.spec.services`, same order.
    pub service_owners: Vec<String>,
}

/// Strict owner resolution: an unknown reference fails the whole file.
/// Teams are never created on demand.
pub struct IdentityResolver<'a> {
    directory: &'a dyn TeamDirectory,
    lookup: OwnerLookup,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(directory: &'a dyn TeamDirectory, lookup: OwnerLookup) -> Self {
        Self { directory, lookup }
    }

    pub fn resolve(
        &self,
        document: CatalogDocument,
    ) -> std::result::Result<ResolvedDocument, SyncFailure> {
        let mut cache: HashMap<String, Option<String>> = HashMap::new();

        let project_owner = self.resolve_field(
            &mut cache,
            "metadata.owner",
            document.metadata.owner.as_deref(),
        )?;

        let mut service_owners = Vec::with_capacity(document.spec.services.len());
        for (i, service) in document.spec.services.iter().enumerate() {
            let owner = match non_empty(service.owner.as_deref()) {
                Some(reference) => self.resolve_field(
                    &mut cache,
                    &format!("spec.services[{i}].owner"),
                    Some(reference),
                )?,
                None => project_owner.clone(),
            };
            service_owners.push(owner);
        }

        Ok(ResolvedDocument {
            document,
            project_owner,
            service_owners,
        })
    }

    fn resolve_field(
        &self,
        cache: &mut HashMap<String, Option<String>>,
        field: &str,
        reference: Option<&str>,
    ) -> std::result::Result<String, SyncFailure> {
        let reference = non_empty(reference).unwrap_or_default();
        let key = reference.to_ascii_lowercase();

        let team_id = match cache.get(&key) {
            Some(hit) => hit.clone(),
            None => {
                let found = self.lookup(reference).map_err(SyncFailure::lookup)?;
                cache.insert(key, found.clone());
                found
            }
        };

        team_id.ok_or_else(|| SyncFailure::Resolution {
            field: field.to_string(),
            reference: reference.to_string(),
        })
    }

    fn lookup(&self, reference: &str) -> Result<Option<String>> {
        if reference.is_empty() {
            return Ok(None);
        }
        match self.lookup {
            OwnerLookup::Name => Ok(self
                .directory
                .find_team_by_name(reference)?
                .map(|team| team.id)),
            OwnerLookup::Id => {
                let Ok(id) = Uuid::parse_str(reference) else {
                    return Ok(None);
                };
                Ok(self
                    .directory
                    .get_team(&id.hyphenated().to_string())?
                    .map(|team| team.id))
            }
        }
    }
}
