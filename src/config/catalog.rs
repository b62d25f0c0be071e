use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How manifest `owner` references are matched against the team directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerLookup {
    /// Case-insensitive team name.
    #[default]
    Name,
    /// Team id (UUID).
    Id,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub data_dir: PathBuf,
    pub repository: RepositoryConfig,
    pub sync: SyncConfig,
}

/// Where the manifest repository lives and which branch to read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Local working tree or bare mirror.
    pub path: PathBuf,
    /// When set, `path` is maintained as a bare mirror of this URL.
    pub remote: Option<String>,
    pub branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Path prefix inside the repository that holds manifests.
    pub manifest_dir: String,
    /// Glob patterns a listed file must match to count as a manifest.
    pub include: Vec<String>,
    pub owner_lookup: OwnerLookup,
    /// Upper bound for fetch + parse + validate of one file.
    pub timeout_secs: Option<u64>,
}

impl CatalogConfig {
    /// Loads configuration from a TOML file. Missing sections fall back to defaults.
    ///
    /// Relative paths, including the defaults, are taken from the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: CatalogConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.sync.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("catalog.db")
    }

    fn rebase(&mut self, base: &Path) {
        if self.data_dir.is_relative() {
            self.data_dir = base.join(&self.data_dir);
        }
        if self.repository.path.is_relative() {
            self.repository.path = base.join(&self.repository.path);
        }
    }
}

impl SyncConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        for pattern in &self.include {
            glob::Pattern::new(pattern)
                .map_err(|e| Error::Config(format!("invalid include pattern '{pattern}': {e}")))?;
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::Config("timeout_secs must be greater than zero".to_string()));
        }
        Ok(())
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            repository: RepositoryConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./catalog-repo"),
            remote: None,
            branch: "main".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            manifest_dir: "catalog".to_string(),
            include: vec!["*.yaml".to_string(), "*.yml".to_string()],
            owner_lookup: OwnerLookup::Name,
            timeout_secs: Some(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = CatalogConfig::from_toml("").unwrap();
        assert_eq!(config.repository.branch, "main");
        assert_eq!(config.sync.manifest_dir, "catalog");
        assert_eq!(config.sync.owner_lookup, OwnerLookup::Name);
        assert_eq!(config.db_path(), PathBuf::from("./data/catalog.db"));
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config = CatalogConfig::from_toml(
            r#"
            data_dir = "/var/lib/catalog"

            [repository]
            path = "/srv/manifests"
            branch = "release"

            [sync]
            owner_lookup = "id"
            "#,
        )
        .unwrap();

        assert_eq!(config.repository.path, PathBuf::from("/srv/manifests"));
        assert_eq!(config.repository.branch, "release");
        assert!(config.repository.remote.is_none());
        assert_eq!(config.sync.owner_lookup, OwnerLookup::Id);
        assert_eq!(config.sync.include, vec!["*.yaml", "*.yml"]);
        assert_eq!(config.sync.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_relative_paths_follow_the_config_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let config_path = temp.path().join("catalog.toml");
        std::fs::write(
            &config_path,
            "data_dir = \"state\"\n\n[repository]\npath = \"/srv/manifests\"\n",
        )
        .unwrap();

        let config = CatalogConfig::load(&config_path).unwrap();
        assert_eq!(config.data_dir, temp.path().join("state"));
        assert_eq!(config.db_path(), temp.path().join("state").join("catalog.db"));
        assert_eq!(config.repository.path, PathBuf::from("/srv/manifests"));

        std::fs::write(&config_path, "").unwrap();
        let config = CatalogConfig::load(&config_path).unwrap();
        assert_eq!(config.repository.path, temp.path().join("./catalog-repo"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            CatalogConfig::from_toml("[sync]\ninclude = [\"[\"]"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            CatalogConfig::from_toml("[sync]\ntimeout_secs = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            CatalogConfig::from_toml("[sync]\nowner_lookup = \"email\""),
            Err(Error::Config(_))
        ));
    }
}
