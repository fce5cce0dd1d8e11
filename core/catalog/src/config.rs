use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::database::DB_FILE_NAME;

/// Directory under `$HOME` used when no workspace is configured.
pub const HOME_DIR_NAME: &str = ".labeled_files";
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("default workspace '{0}' is not listed under workspaces")]
    UnknownWorkspace(String),
}

/// User settings, read from JSON. Unknown keys are ignored and missing keys
/// take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the workspace opened when none is given
    pub default: String,
    /// Workspace name -> root directory holding its catalog
    pub workspaces: BTreeMap<String, PathBuf>,
    /// Leave tags implied by the active filters out of search results
    pub hide_search_tag_in_result: bool,
    /// Path prefix rewrites applied to added files, e.g. a mounted share
    pub path_mapping: BTreeMap<PathBuf, PathBuf>,
    pub tree_expand_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default: String::new(),
            workspaces: BTreeMap::new(),
            hide_search_tag_in_result: false,
            path_mapping: BTreeMap::new(),
            tree_expand_threshold: labeled_files_hierarchy::DEFAULT_EXPAND_THRESHOLD,
        }
    }
}

impl Config {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(
            "Loaded config from {} ({} workspaces)",
            path.display(),
            config.workspaces.len()
        );
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Root directory of the default workspace, if one is configured.
    pub fn default_workspace(&self) -> Result<Option<&Path>, ConfigError> {
        if self.default.is_empty() {
            return Ok(None);
        }
        self.workspaces
            .get(&self.default)
            .map(|root| Some(root.as_path()))
            .ok_or_else(|| ConfigError::UnknownWorkspace(self.default.clone()))
    }

    /// Catalog location implied by the config: inside the default workspace,
    /// else under `home`.
    pub fn database_path(&self, home: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(root) = self.default_workspace()? {
            return Ok(Some(root.join(DB_FILE_NAME)));
        }
        Ok(home.map(|home| home.join(HOME_DIR_NAME).join(DB_FILE_NAME)))
    }

    /// Rewrite `path` under the longest matching mapped prefix. Prefixes match
    /// whole components only.
    pub fn convert_path(&self, path: &Path) -> PathBuf {
        self.path_mapping
            .iter()
            .filter_map(|(from, to)| {
                path.strip_prefix(from)
                    .ok()
                    .map(|rest| (from.components().count(), to.join(rest)))
            })
            .max_by_key(|(depth, _)| *depth)
            .map(|(_, converted)| converted)
            .unwrap_or_else(|| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_keys_default() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.tree_expand_threshold, 10);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config = Config::from_json(
            r#"{
                "default": "home",
                "workspaces": {"home": "/srv/labels"},
                "hide_search_tag_in_result": true,
                "window_geometry": [0, 0, 800, 600]
            }"#,
        )
        .unwrap();

        assert_eq!(config.default, "home");
        assert!(config.hide_search_tag_in_result);
        assert_eq!(
            config.default_workspace().unwrap(),
            Some(Path::new("/srv/labels"))
        );
    }

    #[test]
    fn test_database_path_resolution() {
        let home = Path::new("/home/me");

        let config = Config::default();
        assert_eq!(
            config.database_path(Some(home)).unwrap(),
            Some(PathBuf::from("/home/me/.labeled_files/LABELED_FILES.sqlite3"))
        );
        assert_eq!(config.database_path(None).unwrap(), None);

        let config = Config::from_json(r#"{"default": "w", "workspaces": {"w": "/srv/w"}}"#).unwrap();
        assert_eq!(
            config.database_path(Some(home)).unwrap(),
            Some(PathBuf::from("/srv/w/LABELED_FILES.sqlite3"))
        );

        let config = Config::from_json(r#"{"default": "gone"}"#).unwrap();
        assert!(matches!(
            config.database_path(Some(home)),
            Err(ConfigError::UnknownWorkspace(name)) if name == "gone"
        ));
    }

    #[test]
    fn test_convert_path() {
        let config = Config::from_json(
            r#"{"path_mapping": {"/mnt/share": "/data", "/mnt/share/deep": "/fast"}}"#,
        )
        .unwrap();

        assert_eq!(
            config.convert_path(Path::new("/mnt/share/docs/a.txt")),
            PathBuf::from("/data/docs/a.txt")
        );
        assert_eq!(
            config.convert_path(Path::new("/mnt/share/deep/b.txt")),
            PathBuf::from("/fast/b.txt")
        );
        assert_eq!(
            config.convert_path(Path::new("/mnt/shared/c.txt")),
            PathBuf::from("/mnt/shared/c.txt")
        );
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            Config::load("/nonexistent/labeled_files/config.json"),
            Err(ConfigError::Read { .. })
        ));

        let mut temp = NamedTempFile::new().unwrap();
        write!(temp, "{{ not json").unwrap();
        assert!(matches!(
            Config::load(temp.path()),
            Err(ConfigError::Parse { .. })
        ));

        assert_eq!(
            Config::load_or_default("/nonexistent/labeled_files/config.json").unwrap(),
            Config::default()
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut temp = NamedTempFile::new().unwrap();
        write!(temp, r#"{{"tree_expand_threshold": 3}}"#).unwrap();
        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.tree_expand_threshold, 3);
    }
}
