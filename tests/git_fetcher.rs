//! GitFetcher against repositories built on disk with git2.

mod common;

use std::path::Path;
use std::sync::Arc;

use git2::{Repository, RepositoryInitOptions, Signature};
use tempfile::TempDir;

use catalog_sync::config::{RepositoryConfig, SyncConfig};
use catalog_sync::fetch::{FetchError, GitFetcher, ManifestFetcher};
use catalog_sync::store::{SqliteStore, Store};
use catalog_sync::sync::SyncEngine;
use catalog_sync::types::{RunStatus, SyncTrigger};

use common::{add_team, manifest};

fn init_repo(dir: &Path) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    Repository::init_opts(dir, &opts).unwrap()
}

/// Writes `files` into the working tree and commits them on the current branch.
fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str) {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();

    for (path, content) in files {
        let full = workdir.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, content).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }
    index.write().unwrap();

    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("Catalog Bot", "bot@example.com").unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap();
}

fn fetcher_for(path: &Path, branch: &str) -> GitFetcher {
    GitFetcher::new(&RepositoryConfig {
        path: path.to_path_buf(),
        remote: None,
        branch: branch.to_string(),
    })
}

#[test]
fn test_lists_files_under_prefix_recursively() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(temp.path());
    commit_files(
        &repo,
        &[
            ("catalog/payments.yaml", "a"),
            ("catalog/search/indexer.yml", "b"),
            ("README.md", "c"),
        ],
        "initial",
    );

    let fetcher = fetcher_for(temp.path(), "main");

    assert_eq!(
        fetcher.list_files("catalog").unwrap(),
        vec!["catalog/payments.yaml", "catalog/search/indexer.yml"]
    );
    assert_eq!(fetcher.list_files("").unwrap().len(), 3);
    assert_eq!(fetcher.get_content("catalog/payments.yaml").unwrap(), b"a");
}

#[test]
fn test_reads_committed_content_not_working_tree() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(temp.path());
    commit_files(&repo, &[("catalog/payments.yaml", "committed")], "initial");
    std::fs::write(temp.path().join("catalog/payments.yaml"), "dirty").unwrap();

    let fetcher = fetcher_for(temp.path(), "main");
    assert_eq!(
        fetcher.get_content("catalog/payments.yaml").unwrap(),
        b"committed"
    );
}

#[test]
fn test_missing_things_are_not_found() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(temp.path());
    commit_files(&repo, &[("catalog/payments.yaml", "a")], "initial");

    let fetcher = fetcher_for(temp.path(), "main");
    assert!(matches!(
        fetcher.get_content("catalog/nope.yaml"),
        Err(FetchError::NotFound(_))
    ));
    assert!(matches!(
        fetcher.get_content("catalog"),
        Err(FetchError::NotFound(_))
    ));
    assert!(matches!(
        fetcher.list_files("nowhere"),
        Err(FetchError::NotFound(_))
    ));

    let other_branch = fetcher_for(temp.path(), "release");
    assert!(matches!(
        other_branch.list_files("catalog"),
        Err(FetchError::NotFound(_))
    ));

    let missing_repo = fetcher_for(&temp.path().join("absent"), "main");
    assert!(matches!(
        missing_repo.list_files("catalog"),
        Err(FetchError::NotFound(_))
    ));
}

#[test]
fn test_resolves_tags_and_commit_ids() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(temp.path());
    commit_files(&repo, &[("catalog/payments.yaml", "v1")], "v1");

    let v1 = repo.head().unwrap().peel_to_commit().unwrap();
    repo.tag_lightweight("v1", v1.as_object(), false).unwrap();
    commit_files(&repo, &[("catalog/payments.yaml", "v2")], "v2");

    let by_tag = fetcher_for(temp.path(), "v1");
    assert_eq!(by_tag.get_content("catalog/payments.yaml").unwrap(), b"v1");

    let by_sha = fetcher_for(temp.path(), &v1.id().to_string());
    assert_eq!(by_sha.get_content("catalog/payments.yaml").unwrap(), b"v1");

    let head = fetcher_for(temp.path(), "HEAD");
    assert_eq!(head.get_content("catalog/payments.yaml").unwrap(), b"v2");
}

#[test]
fn test_refresh_mirrors_and_fetches_remote() {
    let temp = TempDir::new().unwrap();
    let upstream_dir = temp.path().join("upstream");
    let upstream = init_repo(&upstream_dir);
    commit_files(&upstream, &[("catalog/a.yaml", "a")], "first");

    let mirror = temp.path().join("mirror.git");
    let fetcher = GitFetcher::new(&RepositoryConfig {
        path: mirror.clone(),
        remote: Some(upstream_dir.to_string_lossy().to_string()),
        branch: "main".to_string(),
    });

    fetcher.refresh().unwrap();
    assert!(Repository::open_bare(&mirror).is_ok());
    assert_eq!(fetcher.list_files("catalog").unwrap(), vec!["catalog/a.yaml"]);

    commit_files(&upstream, &[("catalog/b.yaml", "b")], "second");
    fetcher.refresh().unwrap();
    assert_eq!(
        fetcher.list_files("catalog").unwrap(),
        vec!["catalog/a.yaml", "catalog/b.yaml"]
    );
}

#[tokio::test]
async fn test_engine_syncs_from_git_repository() {
    let temp = TempDir::new().unwrap();
    let repo_dir = temp.path().join("repo");
    let repo = init_repo(&repo_dir);
    let doc = manifest("payments-platform", "Payments", &["payments-api", "payments-worker"]);
    commit_files(
        &repo,
        &[
            ("catalog/payments.yaml", doc.as_str()),
            ("catalog/notes.txt", "ignored"),
        ],
        "add payments",
    );

    let store = Arc::new(SqliteStore::new(temp.path().join("catalog.db")).unwrap());
    store.initialize().unwrap();
    add_team(&store, "payments");

    let fetcher = Arc::new(fetcher_for(&repo_dir, "main"));
    let engine = SyncEngine::new(SyncConfig::default(), fetcher, store.clone()).unwrap();

    let summary = engine.sync_all(&SyncTrigger::manual("ci")).await.unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.runs.len(), 1);
    assert_eq!(summary.runs[0].file_path, "catalog/payments.yaml");
    assert_eq!(summary.runs[0].counts.services_created, 2);
}
