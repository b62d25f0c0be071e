//! # catalog-sync
//!
//! Reconciles declarative project manifests, kept in a git repository, into a
//! developer-portal catalog of projects and services.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! catalog-sync = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use catalog_sync::config::CatalogConfig;
//! use catalog_sync::fetch::GitFetcher;
//! use catalog_sync::store::{SqliteStore, Store};
//! use catalog_sync::sync::SyncEngine;
//! use catalog_sync::types::SyncTrigger;
//!
//! let config = CatalogConfig::load("catalog.toml")?;
//! let store = Arc::new(SqliteStore::new(config.db_path())?);
//! store.initialize()?;
//!
//! let fetcher = Arc::new(GitFetcher::new(&config.repository));
//! let engine = SyncEngine::new(config.sync.clone(), fetcher, store)?;
//! let summary = engine.sync_all(&SyncTrigger::manual("ops")).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the CLI module. Disable with `default-features = false`.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod store;
pub mod sync;
pub mod types;
