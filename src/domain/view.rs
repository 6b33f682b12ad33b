//! Views and the index that keeps them consistent with their back-references.

use std::collections::{BTreeSet, HashMap};

use crate::domain::arena::DivisionId;
use crate::domain::division::{Logical, Physical};

pub type LogicalId = DivisionId<Logical>;
pub type PhysicalId = DivisionId<Physical>;

/// Reference from a logical division's content to one physical division.
///
/// A view is a value: assigning the same physical division to two logical
/// divisions stores two views, never one shared instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct View {
    physical: PhysicalId,
}

impl View {
    pub fn on(physical: PhysicalId) -> Self {
        Self { physical }
    }

    pub fn physical(&self) -> PhysicalId {
        self.physical
    }
}

/// Ordered view lists per logical division plus the derived back-reference
/// sets per physical division.
///
/// Both maps change together in every mutator, so for each physical division
/// `p` the holder set equals the logical divisions owning a view onto `p`.
#[derive(Debug, Clone, Default)]
pub(crate) struct ViewIndex {
    views: HashMap<LogicalId, Vec<View>>,
    holders: HashMap<PhysicalId, BTreeSet<LogicalId>>,
}

impl ViewIndex {
    pub(crate) fn views(&self, logical: LogicalId) -> &[View] {
        self.views.get(&logical).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn holders(&self, physical: PhysicalId) -> impl Iterator<Item = LogicalId> + '_ {
        self.holders
            .get(&physical)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Inserts at `index` when in range, otherwise appends.
    pub(crate) fn insert(&mut self, logical: LogicalId, index: Option<usize>, view: View) {
        let list = self.views.entry(logical).or_default();
        match index {
            Some(i) if i < list.len() => list.insert(i, view),
            _ => list.push(view),
        }
        self.holders.entry(view.physical).or_default().insert(logical);
    }

    /// Removes the last (or first) occurrence of `view`; false if absent.
    pub(crate) fn remove(&mut self, logical: LogicalId, view: View, last: bool) -> bool {
        let Some(list) = self.views.get_mut(&logical) else {
            return false;
        };
        let position = if last {
            list.iter().rposition(|v| *v == view)
        } else {
            list.iter().position(|v| *v == view)
        };
        let Some(position) = position else {
            return false;
        };
        list.remove(position);
        let still_viewed = list.iter().any(|v| v.physical == view.physical);
        if list.is_empty() {
            self.views.remove(&logical);
        }
        if !still_viewed {
            self.forget_holder(view.physical, logical);
        }
        true
    }

    /// Removes every view of `logical` onto `physical`.
    pub(crate) fn remove_all_onto(&mut self, logical: LogicalId, physical: PhysicalId) {
        if let Some(list) = self.views.get_mut(&logical) {
            list.retain(|v| v.physical != physical);
            if list.is_empty() {
                self.views.remove(&logical);
            }
        }
        self.forget_holder(physical, logical);
    }

    /// Drops the whole view list of a logical division.
    pub(crate) fn drop_logical(&mut self, logical: LogicalId) {
        if let Some(list) = self.views.remove(&logical) {
            for view in list {
                self.forget_holder(view.physical, logical);
            }
        }
    }

    /// Drops every view onto a physical division; returns the former holders.
    pub(crate) fn drop_physical(&mut self, physical: PhysicalId) -> BTreeSet<LogicalId> {
        let holders = self.holders.remove(&physical).unwrap_or_default();
        for holder in &holders {
            if let Some(list) = self.views.get_mut(holder) {
                list.retain(|v| v.physical != physical);
                if list.is_empty() {
                    self.views.remove(holder);
                }
            }
        }
        holders
    }

    fn forget_holder(&mut self, physical: PhysicalId, logical: LogicalId) {
        if let Some(set) = self.holders.get_mut(&physical) {
            set.remove(&logical);
            if set.is_empty() {
                self.holders.remove(&physical);
            }
        }
    }

    /// Back-references recomputed from the view lists.
    pub(crate) fn derived_holders(&self) -> HashMap<PhysicalId, BTreeSet<LogicalId>> {
        let mut derived: HashMap<PhysicalId, BTreeSet<LogicalId>> = HashMap::new();
        for (&logical, list) in &self.views {
            for view in list {
                derived.entry(view.physical).or_default().insert(logical);
            }
        }
        derived
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.derived_holders() == self.holders
    }

    pub(crate) fn physicals(&self) -> impl Iterator<Item = PhysicalId> + '_ {
        self.holders.keys().copied()
    }
}
