//! Parent/child links between stored workpieces.

use tracing::{info, instrument};

use crate::application::services::SessionService;
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{editor, LogicalId};

/// Parses a comma separated child index path such as `"0,2,1"`.
///
/// Every index but the last addresses an existing division; the last is the
/// position among that division's children at which the link is inserted.
pub fn parse_insertion_position(position: &str) -> ApplicationResult<Vec<usize>> {
    let invalid = |reason: &str| ApplicationError::InvalidInsertionPosition {
        position: position.to_string(),
        reason: reason.to_string(),
    };
    if position.trim().is_empty() {
        return Err(invalid("empty"));
    }
    position
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| invalid("expected comma separated non-negative integers"))
        })
        .collect()
}

/// Adds and removes link divisions in stored parent workpieces.
pub struct LinkService {
    sessions: SessionService,
}

impl LinkService {
    pub fn new(sessions: SessionService) -> Self {
        Self { sessions }
    }

    /// Inserts a link to `child_id` into `parent_id` at `position`.
    #[instrument(level = "debug", skip(self))]
    pub fn add_link(
        &self,
        parent_id: &str,
        position: &str,
        child_id: &str,
    ) -> ApplicationResult<LogicalId> {
        let path = parse_insertion_position(position)?;
        let (&index, prefix) = path
            .split_last()
            .ok_or_else(|| ApplicationError::InvalidInsertionPosition {
                position: position.to_string(),
                reason: "empty".to_string(),
            })?;

        let mut session = self.sessions.open(parent_id)?;
        let parent = session
            .workpiece()
            .logical()
            .resolve_path(prefix)
            .ok_or_else(|| ApplicationError::InvalidInsertionPosition {
                position: position.to_string(),
                reason: "no division at this path".to_string(),
            })?;
        let count = session.workpiece().logical().child_count(parent);
        if index > count {
            return Err(ApplicationError::InvalidInsertionPosition {
                position: position.to_string(),
                reason: format!("index {} exceeds child count {}", index, count),
            });
        }
        let link = editor::add_link(session.workpiece_mut(), parent, Some(index), child_id)?;
        session.save()?;
        session.close()?;
        info!(parent = parent_id, child = child_id, "link added");
        Ok(link)
    }

    /// Removes the link to `child_id` from `parent_id`.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_link(&self, parent_id: &str, child_id: &str) -> ApplicationResult<()> {
        let mut session = self.sessions.open(parent_id)?;
        editor::remove_link(session.workpiece_mut(), child_id)?;
        session.save()?;
        session.close()?;
        info!(parent = parent_id, child = child_id, "link removed");
        Ok(())
    }
}
