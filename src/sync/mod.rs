//! The reconciliation pipeline: resolve owners, upsert, flag orphans, record.

mod engine;
mod locks;
mod orphan;
mod outcome;
mod resolve;
mod upsert;

pub use engine::SyncEngine;
pub use locks::PathLocks;
pub use orphan::detect_orphans;
pub use outcome::{Stage, SyncFailure, SyncSummary, UnrecordedRun};
pub use resolve::{IdentityResolver, ResolvedDocument};
pub use upsert::{ApplyContext, upsert_project, upsert_services};
