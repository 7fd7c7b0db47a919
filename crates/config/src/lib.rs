//! Configuration for the songbook pipeline.
//!
//! Values are layered: built-in defaults, then a config file (TOML, YAML or
//! JSON, picked by extension), then `SONGBOOK_*` environment variables with
//! `__` separating nested keys (`SONGBOOK_ENGINE__TIMEOUT_SECS=60`).
//!
//! ```toml
//! [catalog]
//! type = "sqlite"
//! path = "/srv/songbook/songs.sqlite3"
//!
//! [storage]
//! type = "local"
//! path = "/srv/songbook/published"
//!
//! [engine]
//! timeout_secs = 90
//! assets = ["/srv/songbook/fonts"]
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SONGBOOK_";
const CONFIG_FILE_NAME: &str = "songbook.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    pub document: DocumentConfig,
}

/// Where song records are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CatalogConfig {
    /// The `song` table of an existing catalog database, opened read-only.
    Sqlite { path: PathBuf },
    /// A directory of song JSON files in the import format.
    Json { dir: PathBuf },
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::Json { dir: data_dir().join("songs") }
    }
}

/// Where published artifacts go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    Local {
        path: PathBuf,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
        key_id: String,
        key_secret: String,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local { path: data_dir().join("published") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Typesetting program. Discovered on `PATH` when unset.
    pub program: Option<PathBuf>,
    /// Replaces the default engine arguments when set.
    pub args: Option<Vec<String>>,
    pub timeout_secs: u64,
    pub max_passes: u32,
    /// Parent directory for per-build working directories. System temp dir when unset.
    pub work_root: Option<PathBuf>,
    /// Files or directories copied into every working directory (fonts, images).
    pub assets: Vec<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { program: None, args: None, timeout_secs: 120, max_passes: 4, work_root: None, assets: Vec::new() }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Document template replacing the built-in one.
    pub template: Option<PathBuf>,
    /// Storage key template replacing the built-in one.
    pub key_template: Option<String>,
}

impl Config {
    /// Config file location used when none is given explicitly.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load and validate configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if there is a file there, otherwise only defaults and the
    /// environment apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(path)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// The merged configuration sources, before extraction.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::MissingFile(path.to_path_buf())),
            Some(path) => merge_file(figment, path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => merge_file(figment, &path)?,
                None => figment,
            },
        };
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("engine.timeout_secs must be greater than zero".to_string()));
        }
        if self.engine.max_passes == 0 {
            exn::bail!(ErrorKind::Invalid("engine.max_passes must be greater than zero".to_string()));
        }
        match &self.storage {
            StorageConfig::Local { path } if !path.is_absolute() => {
                exn::bail!(ErrorKind::Invalid(format!("storage.path must be absolute, got {}", path.display())));
            },
            StorageConfig::S3 { bucket, .. } if bucket.trim().is_empty() => {
                exn::bail!(ErrorKind::Invalid("storage.bucket must not be empty".to_string()));
            },
            _ => {},
        }
        if self.document.key_template.as_deref().is_some_and(|t| t.trim().is_empty()) {
            exn::bail!(ErrorKind::Invalid("document.key_template must not be empty".to_string()));
        }
        Ok(())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    tracing::debug!(path = %path.display(), "Loading config file");
    let merged = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    };
    Ok(merged)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "songbook")
}

fn data_dir() -> PathBuf {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf()).unwrap_or_else(|| PathBuf::from("songbook"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn valid() -> Config {
        Config {
            storage: StorageConfig::Local { path: PathBuf::from("/srv/songbook/published") },
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.timeout(), Duration::from_secs(120));
        assert_eq!(config.engine.max_passes, 4);
        assert!(config.engine.assets.is_empty());
        assert!(config.document.key_template.is_none());
        assert!(matches!(config.catalog, CatalogConfig::Json { .. }));
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            let root = jail.directory().to_path_buf();
            jail.create_file(
                "songbook.toml",
                &format!(
                    r#"
                    [catalog]
                    type = "sqlite"
                    path = "songs.sqlite3"

                    [storage]
                    type = "local"
                    path = "{}"

                    [engine]
                    timeout_secs = 30
                    "#,
                    root.join("published").display()
                ),
            )?;
            let config = Config::load(Some(Path::new("songbook.toml"))).unwrap();
            assert_eq!(config.catalog, CatalogConfig::Sqlite { path: PathBuf::from("songs.sqlite3") });
            assert_eq!(config.storage, StorageConfig::Local { path: root.join("published") });
            assert_eq!(config.engine.timeout_secs, 30);
            assert_eq!(config.engine.max_passes, 4);
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "songbook.yaml",
                "storage:\n  type: local\n  path: /srv/published\nengine:\n  max_passes: 2\n",
            )?;
            jail.set_env("SONGBOOK_ENGINE__MAX_PASSES", "6");
            jail.set_env("SONGBOOK_DOCUMENT__KEY_TEMPLATE", "books/{{ short }}");
            let config = Config::load(Some(Path::new("songbook.yaml"))).unwrap();
            assert_eq!(config.engine.max_passes, 6);
            assert_eq!(config.document.key_template.as_deref(), Some("books/{{ short }}"));
            Ok(())
        });
    }

    #[test]
    fn test_s3_storage_from_json() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "songbook.json",
                r#"{"storage": {"type": "s3", "bucket": "songbooks", "region": "eu-central-1",
                    "key_id": "id", "key_secret": "secret"}}"#,
            )?;
            let config = Config::load(Some(Path::new("songbook.json"))).unwrap();
            match config.storage {
                StorageConfig::S3 { bucket, prefix, endpoint, .. } => {
                    assert_eq!(bucket, "songbooks");
                    assert!(prefix.is_none());
                    assert!(endpoint.is_none());
                },
                other => panic!("expected s3 storage, got {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|_jail| {
            let err = Config::load(Some(Path::new("nope.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::MissingFile(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("songbook.ini", "[engine]\n")?;
            let err = Config::load(Some(Path::new("songbook.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[test]
    fn test_malformed_value() {
        Jail::expect_with(|jail| {
            jail.create_file("songbook.toml", "[engine]\ntimeout_secs = \"soon\"\n")?;
            let err = Config::load(Some(Path::new("songbook.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load));
            Ok(())
        });
    }

    #[rstest]
    #[case::zero_timeout(|c: &mut Config| c.engine.timeout_secs = 0)]
    #[case::zero_passes(|c: &mut Config| c.engine.max_passes = 0)]
    #[case::relative_storage(|c: &mut Config| c.storage = StorageConfig::Local { path: PathBuf::from("published") })]
    #[case::empty_key_template(|c: &mut Config| c.document.key_template = Some(" ".to_string()))]
    fn test_validation_rejects(#[case] tweak: fn(&mut Config)) {
        let mut config = valid();
        tweak(&mut config);
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_validation_accepts() {
        assert!(valid().validate().is_ok());
    }
}
