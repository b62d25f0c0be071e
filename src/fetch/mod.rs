//! Access to the manifest repository.

mod git;

pub use git::GitFetcher;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the manifest repository.
///
/// Implementations are called from blocking worker threads, so they must be
/// `Send + Sync` and may perform synchronous I/O.
pub trait ManifestFetcher: Send + Sync {
    /// Brings the local view up to date with the hosted repository.
    fn refresh(&self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Lists every file path under `prefix`, recursively.
    fn list_files(&self, prefix: &str) -> Result<Vec<String>, FetchError>;

    /// Returns the raw bytes of the file at `path`.
    fn get_content(&self, path: &str) -> Result<Vec<u8>, FetchError>;
}
