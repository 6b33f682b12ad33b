//! Edit sessions: exclusive, explicitly persisted access to one workpiece.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::{DomainError, Workpiece};
use crate::infrastructure::traits::{LockOutcome, LockService, WorkpieceStore};

/// Holds the advisory lock on one object until released or dropped.
pub struct LockGuard {
    locks: Arc<dyn LockService>,
    object_id: String,
    released: bool,
}

impl LockGuard {
    /// Acquires the lock on `object_id` or reports who holds it.
    pub fn acquire(
        locks: Arc<dyn LockService>,
        object_id: &str,
        holder: &str,
    ) -> ApplicationResult<Self> {
        match locks
            .acquire(object_id, holder)
            .with_context("acquire lock", object_id)?
        {
            LockOutcome::Acquired => Ok(Self {
                locks,
                object_id: object_id.to_string(),
                released: false,
            }),
            LockOutcome::HeldBy(current) => Err(DomainError::ObjectLocked {
                id: object_id.to_string(),
                holder: current,
            }
            .into()),
        }
    }

    pub fn release(mut self) -> ApplicationResult<()> {
        self.released = true;
        self.locks
            .release(&self.object_id)
            .with_context("release lock", &self.object_id)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.locks.release(&self.object_id) {
                warn!(object = %self.object_id, "failed to release lock: {}", e);
            }
        }
    }
}

/// Opens and creates edit sessions.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn WorkpieceStore>,
    locks: Arc<dyn LockService>,
    holder: String,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn WorkpieceStore>,
        locks: Arc<dyn LockService>,
        holder: impl Into<String>,
    ) -> Self {
        Self {
            store,
            locks,
            holder: holder.into(),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Locks and loads an existing workpiece.
    #[instrument(level = "debug", skip(self))]
    pub fn open(&self, id: &str) -> ApplicationResult<EditSession> {
        if !self.store.exists(id) {
            return Err(ApplicationError::WorkpieceNotFound(id.to_string()));
        }
        let lock = LockGuard::acquire(self.locks.clone(), id, &self.holder)?;
        let workpiece = self.store.load(id).with_context("load workpiece", id)?;
        debug!(id, holder = %self.holder, "session opened");
        Ok(EditSession {
            workpiece,
            store: self.store.clone(),
            lock,
        })
    }

    /// Starts a session on a fresh workpiece; nothing is stored until `save`.
    #[instrument(level = "debug", skip(self))]
    pub fn create(&self, id: &str, root_type: &str) -> ApplicationResult<EditSession> {
        if self.store.exists(id) {
            return Err(ApplicationError::WorkpieceExists(id.to_string()));
        }
        let lock = LockGuard::acquire(self.locks.clone(), id, &self.holder)?;
        Ok(EditSession {
            workpiece: Workpiece::new(id, root_type),
            store: self.store.clone(),
            lock,
        })
    }
}

/// One workpiece under edit. There is no autosave: changes not saved before
/// the session ends are discarded.
pub struct EditSession {
    workpiece: Workpiece,
    store: Arc<dyn WorkpieceStore>,
    lock: LockGuard,
}

impl EditSession {
    pub fn id(&self) -> &str {
        self.workpiece.id()
    }

    pub fn workpiece(&self) -> &Workpiece {
        &self.workpiece
    }

    pub fn workpiece_mut(&mut self) -> &mut Workpiece {
        &mut self.workpiece
    }

    /// Backs up the stored form, then persists the current model.
    #[instrument(level = "debug", skip(self), fields(id = self.workpiece.id()))]
    pub fn save(&self) -> ApplicationResult<()> {
        let id = self.workpiece.id();
        self.store.backup(id).with_context("back up workpiece", id)?;
        self.store
            .save(&self.workpiece, id)
            .with_context("save workpiece", id)
    }

    /// Ends the session and releases the lock.
    pub fn close(self) -> ApplicationResult<()> {
        debug!(id = self.workpiece.id(), "session closed");
        self.lock.release()
    }
}
