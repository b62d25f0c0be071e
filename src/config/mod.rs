mod catalog;

pub use catalog::{CatalogConfig, OwnerLookup, RepositoryConfig, SyncConfig};
