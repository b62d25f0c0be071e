use std::path::{Path, PathBuf};

use git2::{ErrorCode, ObjectType, Oid, Repository, Tree, TreeWalkMode, TreeWalkResult};
use tracing::{debug, info};

use super::{FetchError, ManifestFetcher};
use crate::config::RepositoryConfig;

/// Reads manifests from one branch of a git repository.
///
/// The repository is reopened on every call; `git2::Repository` is not `Sync`
/// and each call is short-lived.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    repo_path: PathBuf,
    remote: Option<String>,
    branch: String,
}

impl GitFetcher {
    pub fn new(config: &RepositoryConfig) -> Self {
        Self {
            repo_path: config.path.clone(),
            remote: config.remote.clone(),
            branch: config.branch.clone(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn open(&self) -> Result<Repository, FetchError> {
        if let Err(e) = std::fs::read_dir(&self.repo_path) {
            return Err(match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    FetchError::AccessDenied(self.repo_path.display().to_string())
                }
                _ => FetchError::NotFound(format!("repository {}", self.repo_path.display())),
            });
        }

        Repository::open(&self.repo_path).map_err(|e| match e.code() {
            ErrorCode::NotFound => {
                FetchError::NotFound(format!("repository {}", self.repo_path.display()))
            }
            _ => map_git_error(e),
        })
    }

    fn branch_tree<'r>(&self, repo: &'r Repository) -> Result<Tree<'r>, FetchError> {
        let oid = resolve_ref(repo, &self.branch)?;
        let commit = repo.find_commit(oid).map_err(map_git_error)?;
        commit.tree().map_err(map_git_error)
    }
}

impl ManifestFetcher for GitFetcher {
    fn refresh(&self) -> Result<(), FetchError> {
        let Some(url) = self.remote.as_deref() else {
            return Ok(());
        };

        if Repository::open_bare(&self.repo_path).is_err() {
            info!("Cloning manifest repository {} into {}", url, self.repo_path.display());
            git2::build::RepoBuilder::new()
                .bare(true)
                .clone(url, &self.repo_path)
                .map_err(map_git_error)?;
            return Ok(());
        }

        let repo = self.open()?;
        let mut remote = match repo.find_remote("origin") {
            Ok(remote) => remote,
            Err(_) => repo.remote_anonymous(url).map_err(map_git_error)?,
        };
        debug!("Fetching {} from {}", self.branch, url);
        remote
            .fetch(&["+refs/heads/*:refs/heads/*"], None, None)
            .map_err(map_git_error)
    }

    fn list_files(&self, prefix: &str) -> Result<Vec<String>, FetchError> {
        let repo = self.open()?;
        let root = self.branch_tree(&repo)?;
        let prefix = prefix.trim_matches('/');

        let subtree = if prefix.is_empty() {
            root
        } else {
            let entry = root
                .get_path(Path::new(prefix))
                .map_err(|_| FetchError::NotFound(format!("path {prefix} on {}", self.branch)))?;
            if entry.kind() != Some(ObjectType::Tree) {
                return Err(FetchError::NotFound(format!("directory {prefix} on {}", self.branch)));
            }
            entry
                .to_object(&repo)
                .and_then(|obj| obj.peel_to_tree())
                .map_err(map_git_error)?
        };

        let mut paths = Vec::new();
        subtree
            .walk(TreeWalkMode::PreOrder, |dir, entry| {
                if entry.kind() == Some(ObjectType::Blob) {
                    if let Some(name) = entry.name() {
                        let relative = format!("{dir}{name}");
                        paths.push(if prefix.is_empty() {
                            relative
                        } else {
                            format!("{prefix}/{relative}")
                        });
                    }
                }
                TreeWalkResult::Ok
            })
            .map_err(map_git_error)?;

        paths.sort();
        Ok(paths)
    }

    fn get_content(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let repo = self.open()?;
        let tree = self.branch_tree(&repo)?;

        let entry = tree
            .get_path(Path::new(path))
            .map_err(|_| FetchError::NotFound(format!("{path} on {}", self.branch)))?;
        if entry.kind() != Some(ObjectType::Blob) {
            return Err(FetchError::NotFound(format!("{path} is not a file")));
        }

        let blob = entry
            .to_object(&repo)
            .and_then(|obj| obj.peel_to_blob())
            .map_err(map_git_error)?;
        Ok(blob.content().to_vec())
    }
}

/// Resolves a branch, remote-tracking branch, tag or commit SHA to a commit id.
fn resolve_ref(repo: &Repository, ref_spec: &str) -> Result<Oid, FetchError> {
    let ref_spec = if ref_spec.is_empty() { "HEAD" } else { ref_spec };

    for candidate in [
        format!("refs/heads/{ref_spec}"),
        format!("refs/remotes/origin/{ref_spec}"),
        format!("refs/tags/{ref_spec}"),
    ] {
        if let Ok(reference) = repo.find_reference(&candidate) {
            if let Ok(commit) = reference.peel_to_commit() {
                return Ok(commit.id());
            }
        }
    }

    if ref_spec.len() == 40 {
        if let Ok(oid) = Oid::from_str(ref_spec) {
            if repo.find_commit(oid).is_ok() {
                return Ok(oid);
            }
        }
    }

    if ref_spec == "HEAD" {
        let head = repo
            .head()
            .map_err(|_| FetchError::NotFound("HEAD (repository is empty)".to_string()))?;
        return head
            .peel_to_commit()
            .map(|c| c.id())
            .map_err(|_| FetchError::NotFound("HEAD (repository is empty)".to_string()));
    }

    Err(FetchError::NotFound(format!("branch {ref_spec}")))
}

fn map_git_error(err: git2::Error) -> FetchError {
    match err.code() {
        ErrorCode::NotFound => FetchError::NotFound(err.message().to_string()),
        ErrorCode::Auth | ErrorCode::Certificate => {
            FetchError::AccessDenied(err.message().to_string())
        }
        _ => FetchError::Unavailable(err.message().to_string()),
    }
}
