//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use tracing::debug;

use crate::application::services::{ExplodeService, LinkService, PaginationService, SessionService};
use crate::config::Settings;
use crate::infrastructure::traits::{
    FsLockService, FsMediaStore, LockService, MediaStore, PermissiveRuleset, Ruleset,
    TomlRuleset, TomlWorkpieceStore, WorkpieceStore,
};
use crate::infrastructure::{InfraError, InfraResult};

/// Container holding the collaborators every service is built from.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Persisted structure models
    pub store: Arc<dyn WorkpieceStore>,

    /// Advisory edit locks
    pub locks: Arc<dyn LockService>,

    /// Media files per workpiece
    pub media: Arc<dyn MediaStore>,

    /// Allowed child types and metadata keys
    pub ruleset: Arc<dyn Ruleset>,
}

impl ServiceContainer {
    /// Create a new service container with file-backed implementations below
    /// `settings.store_dir`.
    pub fn new(settings: Settings) -> InfraResult<Self> {
        let ruleset: Arc<dyn Ruleset> = match &settings.ruleset {
            Some(path) => {
                debug!(path = %path.display(), "loading ruleset");
                Arc::new(TomlRuleset::load(path).map_err(|e| {
                    InfraError::io(format!("load ruleset {}", path.display()), e)
                })?)
            }
            None => Arc::new(PermissiveRuleset),
        };
        let store = Arc::new(TomlWorkpieceStore::new(settings.workpieces_dir()));
        let locks = Arc::new(FsLockService::new(settings.locks_dir()));
        let media = Arc::new(FsMediaStore::new(settings.media_dir()));
        Ok(Self::with_deps(settings, store, locks, media, ruleset))
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        store: Arc<dyn WorkpieceStore>,
        locks: Arc<dyn LockService>,
        media: Arc<dyn MediaStore>,
        ruleset: Arc<dyn Ruleset>,
    ) -> Self {
        let settings = Arc::new(settings);

        Self {
            settings,
            store,
            locks,
            media,
            ruleset,
        }
    }

    pub fn sessions(&self) -> SessionService {
        SessionService::new(
            self.store.clone(),
            self.locks.clone(),
            self.settings.lock_holder.clone(),
        )
    }

    pub fn links(&self) -> LinkService {
        LinkService::new(self.sessions())
    }

    pub fn explode(&self) -> ExplodeService {
        ExplodeService::new(
            self.store.clone(),
            self.locks.clone(),
            self.media.clone(),
            self.settings.lock_holder.clone(),
        )
    }

    pub fn pagination(&self) -> PaginationService {
        PaginationService::new(
            self.sessions(),
            self.media.clone(),
            self.settings.pagination.clone(),
        )
    }
}
