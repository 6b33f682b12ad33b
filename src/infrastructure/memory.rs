//! In-memory collaborators for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::sync::{Mutex, MutexGuard};

use crate::domain::{Workpiece, WorkpieceSnapshot};
use crate::infrastructure::traits::{LockOutcome, LockService, MediaStore, WorkpieceStore};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn not_found(what: &str, name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found: {}", what, name))
}

/// Keeps snapshots, so every load rebuilds the model like a real store does.
#[derive(Debug, Default)]
pub struct InMemoryWorkpieceStore {
    snapshots: Mutex<BTreeMap<String, WorkpieceSnapshot>>,
    backups: Mutex<BTreeMap<String, Vec<WorkpieceSnapshot>>>,
}

impl InMemoryWorkpieceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored snapshot, for assertions.
    pub fn snapshot(&self, locator: &str) -> Option<WorkpieceSnapshot> {
        guard(&self.snapshots).get(locator).cloned()
    }

    pub fn backup_count(&self, locator: &str) -> usize {
        guard(&self.backups).get(locator).map_or(0, Vec::len)
    }
}

impl WorkpieceStore for InMemoryWorkpieceStore {
    fn load(&self, locator: &str) -> io::Result<Workpiece> {
        let snapshot = self
            .snapshot(locator)
            .ok_or_else(|| not_found("workpiece", locator))?;
        Workpiece::from_snapshot(&snapshot)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }

    fn save(&self, workpiece: &Workpiece, locator: &str) -> io::Result<()> {
        guard(&self.snapshots).insert(locator.to_string(), workpiece.to_snapshot());
        Ok(())
    }

    fn exists(&self, locator: &str) -> bool {
        guard(&self.snapshots).contains_key(locator)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let mut snapshots = guard(&self.snapshots);
        if snapshots.contains_key(to) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("workpiece '{}' already exists", to),
            ));
        }
        let snapshot = snapshots
            .remove(from)
            .ok_or_else(|| not_found("workpiece", from))?;
        snapshots.insert(to.to_string(), snapshot);
        Ok(())
    }

    fn backup(&self, locator: &str) -> io::Result<()> {
        if let Some(snapshot) = self.snapshot(locator) {
            guard(&self.backups)
                .entry(locator.to_string())
                .or_default()
                .push(snapshot);
        }
        Ok(())
    }

    fn remove(&self, locator: &str) -> io::Result<()> {
        guard(&self.snapshots).remove(locator);
        guard(&self.backups).remove(locator);
        Ok(())
    }

    fn list(&self) -> io::Result<Vec<String>> {
        Ok(guard(&self.snapshots).keys().cloned().collect())
    }
}

/// Process-local lock table.
#[derive(Debug, Default)]
pub struct InMemoryLockService {
    holders: Mutex<HashMap<String, String>>,
}

impl InMemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockService for InMemoryLockService {
    fn is_locked(&self, object_id: &str) -> Option<String> {
        guard(&self.holders).get(object_id).cloned()
    }

    fn acquire(&self, object_id: &str, holder: &str) -> io::Result<LockOutcome> {
        let mut holders = guard(&self.holders);
        match holders.get(object_id) {
            Some(current) => Ok(LockOutcome::HeldBy(current.clone())),
            None => {
                holders.insert(object_id.to_string(), holder.to_string());
                Ok(LockOutcome::Acquired)
            }
        }
    }

    fn release(&self, object_id: &str) -> io::Result<()> {
        guard(&self.holders).remove(object_id);
        Ok(())
    }
}

/// Media as sets of URIs per object; copies are recorded, no bytes move.
#[derive(Debug, Default)]
pub struct InMemoryMediaStore {
    files: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, object_id: &str, uri: &str) {
        guard(&self.files)
            .entry(object_id.to_string())
            .or_default()
            .insert(uri.to_string());
    }
}

impl MediaStore for InMemoryMediaStore {
    fn list(&self, object_id: &str) -> io::Result<Vec<String>> {
        Ok(guard(&self.files)
            .get(object_id)
            .map(|uris| uris.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn copy(&self, from_object: &str, to_object: &str, uri: &str) -> io::Result<()> {
        let mut files = guard(&self.files);
        let present = files
            .get(from_object)
            .is_some_and(|uris| uris.contains(uri));
        if !present {
            return Err(not_found("media file", &format!("{}/{}", from_object, uri)));
        }
        files
            .entry(to_object.to_string())
            .or_default()
            .insert(uri.to_string());
        Ok(())
    }

    fn rename_object(&self, from_object: &str, to_object: &str) -> io::Result<()> {
        let mut files = guard(&self.files);
        if let Some(uris) = files.remove(from_object) {
            files.entry(to_object.to_string()).or_default().extend(uris);
        }
        Ok(())
    }

    fn remove_object(&self, object_id: &str) -> io::Result<()> {
        guard(&self.files).remove(object_id);
        Ok(())
    }
}
