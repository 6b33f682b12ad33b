//! Decomposition of stored workpieces into a parent and its children.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use itertools::Itertools;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::application::services::LockGuard;
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::decomposition::{self, Decomposition};
use crate::domain::{DomainError, ProcessingNote, Workpiece};
use crate::infrastructure::traits::{LockService, MediaStore, WorkpieceStore};

/// What one explode run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplodeOutcome {
    pub parent_id: String,
    pub original_id: String,
    pub child_ids: Vec<String>,
    pub media_copied: usize,
    pub dropped_views: usize,
}

/// Explodes stored workpieces.
pub struct ExplodeService {
    store: Arc<dyn WorkpieceStore>,
    locks: Arc<dyn LockService>,
    media: Arc<dyn MediaStore>,
    holder: String,
}

impl ExplodeService {
    pub fn new(
        store: Arc<dyn WorkpieceStore>,
        locks: Arc<dyn LockService>,
        media: Arc<dyn MediaStore>,
        holder: impl Into<String>,
    ) -> Self {
        Self {
            store,
            locks,
            media,
            holder: holder.into(),
        }
    }

    /// Splits workpiece `id` into one child per top-level logical division.
    ///
    /// The source is kept as `<id>_orig` and the parent takes over `id`.
    /// Fails with `ObjectLocked` while anyone holds the lock on `id`. A failing
    /// collaborator leaves the store and media as they were before the call.
    #[instrument(level = "debug", skip(self))]
    pub fn explode(&self, id: &str) -> ApplicationResult<ExplodeOutcome> {
        if let Some(holder) = self.locks.is_locked(id) {
            return Err(DomainError::ObjectLocked {
                id: id.to_string(),
                holder,
            }
            .into());
        }
        if !self.store.exists(id) {
            return Err(ApplicationError::WorkpieceNotFound(id.to_string()));
        }
        let lock = LockGuard::acquire(self.locks.clone(), id, &self.holder)?;
        let source = self.store.load(id).with_context("load workpiece", id)?;

        let original_id = decomposition::original_id(id);
        let child_ids = decomposition::child_ids(&source);
        let candidates: Vec<&String> = std::iter::once(&original_id).chain(&child_ids).collect();
        if let Some(duplicate) = candidates.iter().duplicates().next() {
            return Err(ApplicationError::WorkpieceExists(duplicate.to_string()));
        }
        for candidate in candidates {
            let has_media = !self
                .media
                .list(candidate)
                .with_context("list media", candidate)?
                .is_empty();
            if self.store.exists(candidate) || has_media {
                return Err(ApplicationError::WorkpieceExists(candidate.clone()));
            }
        }

        let note = ProcessingNote::software(format!(
            "Workpiece was exploded from {} created {}. Exploded on {}",
            id,
            source.creation_date().to_rfc3339_opts(SecondsFormat::Secs, true),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
        let result = decomposition::explode(&source, &note)?;
        let available: BTreeSet<String> = self
            .media
            .list(id)
            .with_context("list media", id)?
            .into_iter()
            .collect();

        let mut undo = Vec::new();
        let media_copied = match self.persist(id, &original_id, &result, &available, &mut undo) {
            Ok(copied) => copied,
            Err(e) => {
                self.roll_back(undo);
                return Err(e);
            }
        };

        lock.release()?;
        info!(
            id,
            children = result.children.len(),
            media_copied,
            dropped_views = result.dropped_views,
            "workpiece exploded"
        );
        Ok(ExplodeOutcome {
            parent_id: id.to_string(),
            original_id,
            child_ids,
            media_copied,
            dropped_views: result.dropped_views,
        })
    }

    /// Explodes several independent workpieces in parallel.
    ///
    /// Results are returned in the order of `ids`.
    pub fn explode_all(&self, ids: &[String]) -> Vec<(String, ApplicationResult<ExplodeOutcome>)> {
        ids.par_iter()
            .map(|id| (id.clone(), self.explode(id)))
            .collect()
    }

    /// Writes children, then moves the source aside and writes the parent.
    ///
    /// Every completed step pushes the action that reverts it onto `undo`.
    fn persist(
        &self,
        id: &str,
        original_id: &str,
        result: &Decomposition,
        available: &BTreeSet<String>,
        undo: &mut Vec<Undo>,
    ) -> ApplicationResult<usize> {
        let mut media_copied = 0;
        for child in &result.children {
            undo.push(Undo::RemoveWorkpiece(child.id().to_string()));
            self.store
                .save(child, child.id())
                .with_context("save child", child.id())?;
            undo.push(Undo::RemoveMedia(child.id().to_string()));
            media_copied += self.copy_media(id, child, available)?;
        }

        self.store
            .rename(id, original_id)
            .with_context("preserve original", id)?;
        undo.push(Undo::RenameWorkpiece {
            from: original_id.to_string(),
            to: id.to_string(),
        });
        undo.push(Undo::RemoveWorkpiece(id.to_string()));
        self.store
            .save(&result.parent, id)
            .with_context("save parent", id)?;

        self.media
            .rename_object(id, original_id)
            .with_context("preserve original media", id)?;
        undo.push(Undo::RenameMedia {
            from: original_id.to_string(),
            to: id.to_string(),
        });
        debug!(original = %original_id, "source preserved");
        undo.push(Undo::RemoveMedia(id.to_string()));
        media_copied += self.copy_media(original_id, &result.parent, available)?;
        Ok(media_copied)
    }

    /// Reverts completed steps, newest first; failures are logged and skipped.
    fn roll_back(&self, undo: Vec<Undo>) {
        for action in undo.into_iter().rev() {
            let reverted = match &action {
                Undo::RemoveWorkpiece(id) => self.store.remove(id),
                Undo::RemoveMedia(id) => self.media.remove_object(id),
                Undo::RenameWorkpiece { from, to } => self.store.rename(from, to),
                Undo::RenameMedia { from, to } => self.media.rename_object(from, to),
            };
            match reverted {
                Ok(()) => debug!(?action, "reverted"),
                Err(e) => warn!(?action, error = %e, "could not revert explode step"),
            }
        }
    }

    fn copy_media(
        &self,
        from: &str,
        target: &Workpiece,
        available: &BTreeSet<String>,
    ) -> ApplicationResult<usize> {
        let tree = target.physical();
        let mut copied = 0;
        for uri in tree
            .iter()
            .filter_map(|id| tree.get(id))
            .flat_map(|division| division.media_files().values())
        {
            if !available.contains(uri) {
                warn!(object = from, uri = %uri, "referenced media file missing, not copied");
                continue;
            }
            self.media
                .copy(from, target.id(), uri)
                .with_context("copy media", uri)?;
            copied += 1;
        }
        Ok(copied)
    }
}

/// Reverting action for one completed explode step.
#[derive(Debug)]
enum Undo {
    RemoveWorkpiece(String),
    RemoveMedia(String),
    RenameWorkpiece { from: String, to: String },
    RenameMedia { from: String, to: String },
}
