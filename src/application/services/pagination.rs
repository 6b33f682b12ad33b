//! Page creation and labelling on stored workpieces.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::services::{EditSession, SessionService};
use crate::application::{ApplicationResult, IoResultExt};
use crate::config::PaginationConfig;
use crate::domain::division::LOCAL_MEDIA_USE;
use crate::domain::{editor, pagination, Division, PaginationScope, Paginator, Physical, View};
use crate::infrastructure::traits::MediaStore;

/// Pagination use cases; each call is one open, edit, save, close cycle.
pub struct PaginationService {
    sessions: SessionService,
    media: Arc<dyn MediaStore>,
    config: PaginationConfig,
}

impl PaginationService {
    pub fn new(
        sessions: SessionService,
        media: Arc<dyn MediaStore>,
        config: PaginationConfig,
    ) -> Self {
        Self {
            sessions,
            media,
            config,
        }
    }

    /// Adds a page for every media file of `id` that no physical division
    /// references yet, then renumbers all pages with the default labels.
    ///
    /// New pages are viewed by the logical root. Returns the number of pages
    /// created.
    #[instrument(level = "debug", skip(self))]
    pub fn create_pagination(&self, id: &str) -> ApplicationResult<usize> {
        let mut session = self.sessions.open(id)?;
        let created = self.attach_new_media(&mut session)?;
        let paginator = self.config.default_paginator(1);
        let total = pagination::renumber(session.workpiece_mut(), &self.config.page_type, paginator);
        session.save()?;
        session.close()?;
        info!(id, created, total, "pagination created");
        Ok(created)
    }

    fn attach_new_media(&self, session: &mut EditSession) -> ApplicationResult<usize> {
        let id = session.id().to_string();
        let workpiece = session.workpiece_mut();
        let tree = workpiece.physical();
        let referenced: BTreeSet<String> = tree
            .iter()
            .filter_map(|division| tree.get(division))
            .flat_map(|division| division.media_files().values().cloned())
            .collect();
        let fresh: Vec<String> = self
            .media
            .list(&id)
            .with_context("list media", &id)?
            .into_iter()
            .filter(|uri| !referenced.contains(uri))
            .collect();

        let root = workpiece.physical_root();
        let logical_root = workpiece.logical_root();
        for uri in &fresh {
            let division = Division::<Physical>::new(self.config.page_type.as_str())
                .with_order(u32::MAX)
                .with_media(LOCAL_MEDIA_USE, uri.as_str());
            let page = workpiece.physical_tree_mut().insert_child(root, None, division)?;
            editor::assign_view(workpiece, logical_root, View::on(page), None)?;
            debug!(uri = %uri, "attached media file");
        }
        Ok(fresh.len())
    }

    /// Relabels every page of `id` with `paginator`, resetting orders to `1..n`.
    #[instrument(level = "debug", skip(self, paginator))]
    pub fn renumber(&self, id: &str, paginator: Paginator) -> ApplicationResult<usize> {
        let mut session = self.sessions.open(id)?;
        let count = pagination::renumber(session.workpiece_mut(), &self.config.page_type, paginator);
        session.save()?;
        session.close()?;
        Ok(count)
    }

    /// Relabels the pages picked by 0-based `selection`.
    #[instrument(level = "debug", skip(self, paginator))]
    pub fn paginate(
        &self,
        id: &str,
        selection: &[usize],
        scope: PaginationScope,
        paginator: Paginator,
    ) -> ApplicationResult<usize> {
        let mut session = self.sessions.open(id)?;
        let count = pagination::paginate_selection(
            session.workpiece_mut(),
            &self.config.page_type,
            selection,
            scope,
            paginator,
        )?;
        session.save()?;
        session.close()?;
        Ok(count)
    }

    /// Appends `count` pages without media. They get bracketed labels
    /// continuing the page count when automatic labelling is configured.
    #[instrument(level = "debug", skip(self))]
    pub fn add_dummy_pages(&self, id: &str, count: usize) -> ApplicationResult<usize> {
        let mut session = self.sessions.open(id)?;
        let paginator = if self.config.automatic {
            let existing = editor::collect_all_physical_sorted_by_order(
                session.workpiece(),
                &self.config.page_type,
            )
            .len();
            let first = u32::try_from(existing + 1).unwrap_or(u32::MAX);
            Some(self.config.default_paginator(first).fictitious(true))
        } else {
            None
        };
        let created = pagination::add_dummy_pages(
            session.workpiece_mut(),
            count,
            &self.config.page_type,
            paginator,
        )?;
        session.save()?;
        session.close()?;
        Ok(created.len())
    }
}
