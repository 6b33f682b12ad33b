//! I/O boundary traits for testability
//!
//! These traits abstract the collaborators of the structure engine (storage,
//! locking, media, ruleset), allowing services to be tested with the in-memory
//! implementations in [`crate::infrastructure::memory`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::domain::{Workpiece, WorkpieceSnapshot};

/// Loader/saver of structure models.
///
/// A locator names the persisted form; the store decides what it maps to.
pub trait WorkpieceStore: Send + Sync {
    fn load(&self, locator: &str) -> io::Result<Workpiece>;

    fn save(&self, workpiece: &Workpiece, locator: &str) -> io::Result<()>;

    fn exists(&self, locator: &str) -> bool;

    /// Moves the persisted form; fails if `to` already exists.
    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Keeps a copy of the current persisted form before it is overwritten.
    fn backup(&self, locator: &str) -> io::Result<()>;

    /// Deletes the persisted form and its backups; no-op when absent.
    fn remove(&self, locator: &str) -> io::Result<()>;

    /// All locators, sorted.
    fn list(&self) -> io::Result<Vec<String>>;
}

/// Result of trying to take an edit lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    HeldBy(String),
}

/// Advisory per-object edit lock.
pub trait LockService: Send + Sync {
    /// Current holder of the lock on `object_id`.
    fn is_locked(&self, object_id: &str) -> Option<String>;

    fn acquire(&self, object_id: &str, holder: &str) -> io::Result<LockOutcome>;

    fn release(&self, object_id: &str) -> io::Result<()>;
}

/// Media files of an object, addressed by the URIs stored in physical divisions.
pub trait MediaStore: Send + Sync {
    /// URIs of all media files of `object_id`, sorted.
    fn list(&self, object_id: &str) -> io::Result<Vec<String>>;

    /// Copies one file from one object's media to another's.
    fn copy(&self, from_object: &str, to_object: &str, uri: &str) -> io::Result<()>;

    /// Moves all media of an object; no-op when it has none.
    fn rename_object(&self, from_object: &str, to_object: &str) -> io::Result<()>;

    /// Deletes all media of an object; no-op when it has none.
    fn remove_object(&self, object_id: &str) -> io::Result<()>;
}

/// Allowed structure per division type; `None` means unrestricted.
pub trait Ruleset: Send + Sync {
    fn allowed_children(&self, kind: &str) -> Option<BTreeSet<String>>;

    fn allowed_metadata(&self, kind: &str) -> Option<BTreeSet<String>>;

    fn permits_child(&self, parent_kind: &str, child_kind: &str) -> bool {
        self.allowed_children(parent_kind)
            .map_or(true, |allowed| allowed.contains(child_kind))
    }

    fn permits_metadata(&self, kind: &str, key: &str) -> bool {
        self.allowed_metadata(kind)
            .map_or(true, |allowed| allowed.contains(key))
    }
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

fn invalid_data(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

/// Rejects names that would escape their base directory.
fn checked_relative(name: &str) -> io::Result<&Path> {
    let path = Path::new(name);
    let plain = !name.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if plain {
        Ok(path)
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid name: '{}'", name),
        ))
    }
}

/// Number of numbered backups kept per workpiece.
pub const BACKUP_COUNT: usize = 3;

/// File name of the persisted structure inside a workpiece folder.
pub const META_FILE: &str = "meta.toml";

/// Stores each workpiece as `<root>/<locator>/meta.toml`.
#[derive(Debug, Clone)]
pub struct TomlWorkpieceStore {
    root: PathBuf,
}

impl TomlWorkpieceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn folder(&self, locator: &str) -> io::Result<PathBuf> {
        Ok(self.root.join(checked_relative(locator)?))
    }

    fn meta_path(&self, locator: &str) -> io::Result<PathBuf> {
        Ok(self.folder(locator)?.join(META_FILE))
    }

    fn backup_path(meta: &Path, generation: usize) -> PathBuf {
        meta.with_extension(format!("toml.{}", generation))
    }
}

impl WorkpieceStore for TomlWorkpieceStore {
    #[instrument(level = "debug", skip(self))]
    fn load(&self, locator: &str) -> io::Result<Workpiece> {
        let content = fs::read_to_string(self.meta_path(locator)?)?;
        let snapshot: WorkpieceSnapshot = toml::from_str(&content).map_err(invalid_data)?;
        Workpiece::from_snapshot(&snapshot).map_err(invalid_data)
    }

    #[instrument(level = "debug", skip(self, workpiece), fields(id = workpiece.id()))]
    fn save(&self, workpiece: &Workpiece, locator: &str) -> io::Result<()> {
        let meta = self.meta_path(locator)?;
        if let Some(parent) = meta.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&workpiece.to_snapshot()).map_err(invalid_data)?;
        let staging = meta.with_extension("toml.tmp");
        fs::write(&staging, content)?;
        fs::rename(&staging, &meta)
    }

    fn exists(&self, locator: &str) -> bool {
        self.meta_path(locator).is_ok_and(|path| path.is_file())
    }

    #[instrument(level = "debug", skip(self))]
    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let source = self.folder(from)?;
        let target = self.folder(to)?;
        if target.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("workpiece '{}' already exists", to),
            ));
        }
        fs::rename(source, target)
    }

    fn backup(&self, locator: &str) -> io::Result<()> {
        let meta = self.meta_path(locator)?;
        if !meta.is_file() {
            return Ok(());
        }
        for generation in (1..BACKUP_COUNT).rev() {
            let older = Self::backup_path(&meta, generation);
            if older.exists() {
                fs::rename(&older, Self::backup_path(&meta, generation + 1))?;
            }
        }
        fs::copy(&meta, Self::backup_path(&meta, 1))?;
        debug!(path = %meta.display(), "backed up");
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn remove(&self, locator: &str) -> io::Result<()> {
        let folder = self.folder(locator)?;
        if folder.is_dir() {
            fs::remove_dir_all(folder)?;
        }
        Ok(())
    }

    fn list(&self) -> io::Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut locators = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().join(META_FILE).is_file() {
                locators.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        locators.sort();
        Ok(locators)
    }
}

/// Lock files `<root>/<object_id>.lock` containing the holder's name.
///
/// Creation is atomic (`create_new`), so two processes cannot both acquire.
#[derive(Debug, Clone)]
pub struct FsLockService {
    root: PathBuf,
}

impl FsLockService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn lock_path(&self, object_id: &str) -> io::Result<PathBuf> {
        checked_relative(object_id)?;
        Ok(self.root.join(format!("{}.lock", object_id)))
    }
}

impl LockService for FsLockService {
    fn is_locked(&self, object_id: &str) -> Option<String> {
        let path = self.lock_path(object_id).ok()?;
        fs::read_to_string(path)
            .ok()
            .map(|holder| holder.trim().to_string())
    }

    #[instrument(level = "debug", skip(self))]
    fn acquire(&self, object_id: &str, holder: &str) -> io::Result<LockOutcome> {
        let path = self.lock_path(object_id)?;
        fs::create_dir_all(&self.root)?;
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", holder)?;
                Ok(LockOutcome::Acquired)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let current = fs::read_to_string(&path).unwrap_or_default();
                Ok(LockOutcome::HeldBy(current.trim().to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn release(&self, object_id: &str) -> io::Result<()> {
        match fs::remove_file(self.lock_path(object_id)?) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Media under `<root>/<object_id>/<uri>`.
#[derive(Debug, Clone)]
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn object_dir(&self, object_id: &str) -> io::Result<PathBuf> {
        Ok(self.root.join(checked_relative(object_id)?))
    }
}

impl MediaStore for FsMediaStore {
    fn list(&self, object_id: &str) -> io::Result<Vec<String>> {
        let dir = self.object_dir(object_id)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut uris = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(relative) = pathdiff::diff_paths(entry.path(), &dir) {
                let uri = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                uris.push(uri);
            }
        }
        uris.sort();
        Ok(uris)
    }

    #[instrument(level = "debug", skip(self))]
    fn copy(&self, from_object: &str, to_object: &str, uri: &str) -> io::Result<()> {
        let relative = checked_relative(uri)?;
        let source = self.object_dir(from_object)?.join(relative);
        let target = self.object_dir(to_object)?.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, target).map(|_| ())
    }

    fn rename_object(&self, from_object: &str, to_object: &str) -> io::Result<()> {
        let source = self.object_dir(from_object)?;
        if !source.exists() {
            return Ok(());
        }
        let target = self.object_dir(to_object)?;
        if target.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("media of '{}' already exist", to_object),
            ));
        }
        fs::create_dir_all(&self.root)?;
        fs::rename(source, target)
    }

    #[instrument(level = "debug", skip(self))]
    fn remove_object(&self, object_id: &str) -> io::Result<()> {
        let dir = self.object_dir(object_id)?;
        if dir.is_dir() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Accepts every type, child and metadata key.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveRuleset;

impl Ruleset for PermissiveRuleset {
    fn allowed_children(&self, _kind: &str) -> Option<BTreeSet<String>> {
        None
    }

    fn allowed_metadata(&self, _kind: &str) -> Option<BTreeSet<String>> {
        None
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DivisionRule {
    #[serde(default)]
    children: Option<BTreeSet<String>>,
    #[serde(default)]
    metadata: Option<BTreeSet<String>>,
}

/// Ruleset read from TOML:
///
/// ```toml
/// [divisions.multivolume]
/// children = ["volume"]
/// metadata = ["TitleDocMain"]
/// ```
///
/// Types without an entry are unrestricted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlRuleset {
    #[serde(default)]
    divisions: BTreeMap<String, DivisionRule>,
}

impl TomlRuleset {
    pub fn from_toml_str(content: &str) -> io::Result<Self> {
        toml::from_str(content).map_err(invalid_data)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }
}

impl Ruleset for TomlRuleset {
    fn allowed_children(&self, kind: &str) -> Option<BTreeSet<String>> {
        self.divisions
            .get(kind)
            .and_then(|rule| rule.children.clone())
    }

    fn allowed_metadata(&self, kind: &str) -> Option<BTreeSet<String>> {
        self.divisions
            .get(kind)
            .and_then(|rule| rule.metadata.clone())
    }
}
