use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::Result;
use crate::manifest::CatalogDocument;
use crate::store::CatalogWriter;
use crate::types::SyncCounts;

/// Flags the project's synced services that the manifest no longer declares.
///
/// Rows are flagged, never deleted. Manual services and rows that are already
/// orphaned are left alone, so `orphaned_at` keeps its first value.
pub fn detect_orphans(
    writer: &dyn CatalogWriter,
    project_id: &str,
    document: &CatalogDocument,
    now: DateTime<Utc>,
    counts: &mut SyncCounts,
) -> Result<Vec<String>> {
    let declared: Vec<String> = document.service_names().map(str::to_string).collect();

    let orphaned = writer.mark_orphaned_except(project_id, &declared, now)?;
    for name in &orphaned {
        info!(project_id = %project_id, service = %name, "Service no longer declared, flagged orphaned");
    }

    counts.services_orphaned += orphaned.len() as u32;
    Ok(orphaned)
}
