//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/structmeta/structmeta.toml`
//! 3. Local config: `<store_dir>/.structmeta.toml`
//! 4. Environment variables: `STRUCTMETA_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::Paginator;

/// Page labelling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PaginationConfig {
    /// Labels for automatically created pages: `arabic`, `roman`, `uncounted` or `none`
    pub default_type: String,
    /// Physical division type that takes part in renumbering
    pub page_type: String,
    /// Separator between the two numbers of a double page
    pub separator: String,
    /// Label dummy pages as they are created
    pub automatic: bool,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_type: "arabic".into(),
            page_type: "page".into(),
            separator: " ".into(),
            automatic: true,
        }
    }
}

impl PaginationConfig {
    /// Paginator for the configured default, labelling the first page `first`.
    pub fn default_paginator(&self, first: u32) -> Paginator {
        Paginator::for_default(&self.default_type, first).separator(self.separator.clone())
    }

    fn merge(&self, overlay: &RawPaginationConfig) -> Self {
        Self {
            default_type: overlay
                .default_type
                .clone()
                .unwrap_or_else(|| self.default_type.clone()),
            page_type: overlay
                .page_type
                .clone()
                .unwrap_or_else(|| self.page_type.clone()),
            separator: overlay
                .separator
                .clone()
                .unwrap_or_else(|| self.separator.clone()),
            automatic: overlay.automatic.unwrap_or(self.automatic),
        }
    }
}

/// Raw pagination config; `None` means "not specified, inherit".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawPaginationConfig {
    pub default_type: Option<String>,
    pub page_type: Option<String>,
    pub separator: Option<String>,
    pub automatic: Option<bool>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub store_dir: Option<PathBuf>,
    pub lock_holder: Option<String>,
    pub ruleset: Option<PathBuf>,
    #[serde(default)]
    pub pagination: RawPaginationConfig,
}

/// Unified configuration for structmeta.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Root of the file-backed store (default: ~/.structmeta)
    pub store_dir: PathBuf,
    /// Name recorded when this process holds an edit lock
    pub lock_holder: String,
    /// Optional TOML ruleset with allowed child types and metadata keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ruleset: Option<PathBuf>,
    pub pagination: PaginationConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            lock_holder: default_lock_holder(),
            ruleset: None,
            pagination: PaginationConfig::default(),
        }
    }
}

/// Get the default store directory (~/.structmeta).
fn default_store_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".structmeta"))
        .unwrap_or_else(|| PathBuf::from("~/.structmeta"))
}

/// `user@hostname` of the current process.
fn default_lock_holder() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".into());
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".into());
    format!("{}@{}", user, host)
}

/// Get the XDG config directory for structmeta.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "structmeta").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("structmeta.toml"))
}

/// Get the path to the local config file in a store directory.
pub fn local_config_path(store_dir: &Path) -> PathBuf {
    store_dir.join(".structmeta.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|expanded| expanded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

impl Settings {
    /// Directory holding one folder per workpiece.
    pub fn workpieces_dir(&self) -> PathBuf {
        self.store_dir.join("workpieces")
    }

    /// Directory holding one media folder per workpiece.
    pub fn media_dir(&self) -> PathBuf {
        self.store_dir.join("media")
    }

    /// Directory holding advisory lock files.
    pub fn locks_dir(&self) -> PathBuf {
        self.store_dir.join("locks")
    }

    /// Expand `~`, `$VAR` and `${VAR}` in path-like fields.
    fn expand_paths(&mut self) {
        self.store_dir = PathBuf::from(expand(self.store_dir.to_string_lossy().as_ref()));
        self.ruleset = self
            .ruleset
            .as_ref()
            .map(|path| PathBuf::from(expand(path.to_string_lossy().as_ref())));
    }

    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            store_dir: overlay
                .store_dir
                .clone()
                .unwrap_or_else(|| self.store_dir.clone()),
            lock_holder: overlay
                .lock_holder
                .clone()
                .unwrap_or_else(|| self.lock_holder.clone()),
            ruleset: overlay.ruleset.clone().or_else(|| self.ruleset.clone()),
            pagination: self.pagination.merge(&overlay.pagination),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// `store_dir` (e.g. from the command line) selects the local config file
    /// and overrides every configured store directory.
    pub fn load(store_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.merge_with(&raw);
            }
        }

        let local_dir = store_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(expand(current.store_dir.to_string_lossy().as_ref())));
        let local_path = local_config_path(&local_dir);
        if local_path.exists() {
            let raw = load_raw_settings(&local_path)?;
            current = current.merge_with(&raw);
        }

        current = Self::apply_env_overrides(current)?;

        if let Some(dir) = store_dir {
            current.store_dir = dir.to_path_buf();
        }
        current.expand_paths();

        Ok(current)
    }

    /// Apply STRUCTMETA_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("STRUCTMETA").separator("__"))
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("store_dir") {
            settings.store_dir = PathBuf::from(val);
        }
        if let Ok(val) = config.get_string("lock_holder") {
            settings.lock_holder = val;
        }
        if let Ok(val) = config.get_string("ruleset") {
            settings.ruleset = Some(PathBuf::from(val));
        }
        if let Ok(val) = config.get_string("pagination.default_type") {
            settings.pagination.default_type = val;
        }
        if let Ok(val) = config.get_string("pagination.page_type") {
            settings.pagination.page_type = val;
        }
        if let Ok(val) = config.get_string("pagination.separator") {
            settings.pagination.separator = val;
        }
        if let Ok(val) = config.get_bool("pagination.automatic") {
            settings.pagination.automatic = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# structmeta configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/structmeta/structmeta.toml
#   Local:  <store_dir>/.structmeta.toml
#   Env:    STRUCTMETA_* environment variables, e.g. STRUCTMETA_PAGINATION__DEFAULT_TYPE=roman

# Root of the workpiece store (workpieces/, media/, locks/)
# store_dir = "~/.structmeta"

# Name recorded in edit locks (default: user@hostname)
# lock_holder = "scanner@digitization-01"

# Ruleset listing allowed child types and metadata keys per division type
# ruleset = "~/.structmeta/ruleset.toml"

[pagination]
# arabic | roman | uncounted | none
# default_type = "arabic"
# page_type = "page"
# separator = " "
# automatic = true
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_no_config_when_loading_then_uses_defaults() {
        let settings = Settings::load(None).expect("load defaults");
        assert!(!settings.lock_holder.is_empty());
        assert_eq!(settings.pagination.page_type, "page");
    }

    #[test]
    fn given_tilde_in_store_dir_when_expand_paths_then_expands_to_home() {
        let mut settings = Settings {
            store_dir: PathBuf::from("~/.structmeta"),
            ruleset: Some(PathBuf::from("$HOME/rules.toml")),
            ..Settings::default()
        };

        settings.expand_paths();

        let home = std::env::var("HOME").expect("HOME should be set");
        assert!(settings.store_dir.to_string_lossy().starts_with(&home));
        assert!(!settings.store_dir.to_string_lossy().contains('~'));
        assert!(settings
            .ruleset
            .as_ref()
            .is_some_and(|path| path.to_string_lossy().starts_with(&home)));
    }

    #[test]
    fn given_partial_overlay_when_merging_then_unspecified_fields_are_kept() {
        let base = Settings::default();
        let overlay = RawSettings {
            lock_holder: Some("archivist".into()),
            pagination: RawPaginationConfig {
                default_type: Some("roman".into()),
                ..RawPaginationConfig::default()
            },
            ..RawSettings::default()
        };

        let merged = base.merge_with(&overlay);

        assert_eq!(merged.lock_holder, "archivist");
        assert_eq!(merged.pagination.default_type, "roman");
        assert_eq!(merged.pagination.page_type, base.pagination.page_type);
        assert_eq!(merged.store_dir, base.store_dir);
    }

    #[test]
    fn given_template_when_parsed_then_is_valid_toml() {
        let raw: RawSettings = toml::from_str(&Settings::template()).expect("template parses");
        assert!(raw.store_dir.is_none());
    }
}
