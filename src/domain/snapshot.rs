//! Owned, serializable form of a [`Workpiece`].
//!
//! Snapshots are what collaborators persist. Views are stored by the
//! `div_id` of their physical division, so a snapshot is independent of
//! arena slots and two loads of the same document compare equal.

use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::domain::division::{Division, LinkedResource, Logical, MetadataEntry, Physical};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::view::{LogicalId, PhysicalId, View};
use crate::domain::workpiece::{ProcessingNote, Workpiece};

/// Current snapshot schema version.
pub const SNAPSHOT_SCHEMA_VERSION: u16 = 1;

fn default_schema_version() -> u16 {
    SNAPSHOT_SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkpieceSnapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    pub id: String,
    /// RFC 3339, UTC.
    pub creation_date: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edit_history: Vec<ProcessingNote>,
    pub physical: PhysicalSnapshot,
    pub logical: LogicalSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalSnapshot {
    #[serde(rename = "type")]
    pub kind: String,
    pub div_id: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_label: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub media_files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetadataEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PhysicalSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalSnapshot {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_label: Option<String>,
    /// `div_id`s of the viewed physical divisions, in view order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkedResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetadataEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LogicalSnapshot>,
}

impl WorkpieceSnapshot {
    /// Stable hash of the full structural content.
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DigestHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Hex SHA-256 over the structural content.
    pub fn fingerprint(&self) -> String {
        let mut hasher = DigestHasher::default();
        self.hash(&mut hasher);
        hex::encode(hasher.digest.finalize())
    }
}

/// Feeds `Hash` output into SHA-256 so the digest is independent of the
/// process-local `DefaultHasher` seed.
#[derive(Default)]
struct DigestHasher {
    digest: Sha256,
}

impl Hasher for DigestHasher {
    fn finish(&self) -> u64 {
        let digest = self.digest.clone().finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(head)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }
}

impl Workpiece {
    pub fn to_snapshot(&self) -> WorkpieceSnapshot {
        WorkpieceSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            id: self.id().to_string(),
            creation_date: self
                .creation_date()
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            edit_history: self.edit_history().to_vec(),
            physical: self.physical_snapshot(self.physical_root()),
            logical: self.logical_snapshot(self.logical_root()),
        }
    }

    fn physical_snapshot(&self, id: PhysicalId) -> PhysicalSnapshot {
        let tree = self.physical();
        let division = tree.get(id).cloned().unwrap_or_default();
        PhysicalSnapshot {
            kind: division.kind,
            div_id: division.payload.div_id,
            order: division.payload.order,
            label: division.label,
            order_label: division.order_label,
            media_files: division.payload.media_files,
            metadata: division.metadata,
            children: tree
                .children(id)
                .map(|child| self.physical_snapshot(child))
                .collect(),
        }
    }

    fn logical_snapshot(&self, id: LogicalId) -> LogicalSnapshot {
        let tree = self.logical();
        let division = tree.get(id).cloned().unwrap_or_default();
        LogicalSnapshot {
            kind: division.kind,
            label: division.label,
            order_label: division.order_label,
            views: self
                .views(id)
                .iter()
                .filter_map(|view| self.physical_division(view.physical()))
                .map(|physical| physical.div_id().to_string())
                .collect(),
            link: division.payload.link,
            metadata: division.metadata,
            children: tree
                .children(id)
                .map(|child| self.logical_snapshot(child))
                .collect(),
        }
    }

    /// Rebuilds a model, resolving views by `div_id`.
    #[instrument(level = "debug", skip(snapshot), fields(id = %snapshot.id))]
    pub fn from_snapshot(snapshot: &WorkpieceSnapshot) -> DomainResult<Self> {
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(DomainError::InvalidSnapshot(format!(
                "unsupported schema version {}",
                snapshot.schema_version
            )));
        }
        let creation_date = DateTime::parse_from_rfc3339(&snapshot.creation_date)
            .map(|date| date.with_timezone(&Utc))
            .map_err(|e| {
                DomainError::InvalidSnapshot(format!(
                    "creation date '{}': {}",
                    snapshot.creation_date, e
                ))
            })?;

        let mut workpiece = Workpiece::from_roots(
            snapshot.id.clone(),
            creation_date,
            logical_division(&snapshot.logical),
            physical_division(&snapshot.physical),
        );
        workpiece.extend_history(snapshot.edit_history.iter().cloned());

        let mut by_div_id: HashMap<String, PhysicalId> = HashMap::new();
        by_div_id.insert(snapshot.physical.div_id.clone(), workpiece.physical_root());
        let mut pending = vec![(workpiece.physical_root(), &snapshot.physical)];
        while let Some((parent, node)) = pending.pop() {
            for child in &node.children {
                let id = workpiece
                    .physical_tree_mut()
                    .insert_child(parent, None, physical_division(child))?;
                if by_div_id.insert(child.div_id.clone(), id).is_some() {
                    return Err(DomainError::InvalidSnapshot(format!(
                        "duplicate div_id '{}'",
                        child.div_id
                    )));
                }
                pending.push((id, child));
            }
        }

        let mut pending = vec![(workpiece.logical_root(), &snapshot.logical)];
        while let Some((id, node)) = pending.pop() {
            for div_id in &node.views {
                let physical = by_div_id
                    .get(div_id)
                    .copied()
                    .ok_or_else(|| DomainError::DanglingView(div_id.clone()))?;
                workpiece
                    .view_index_mut()
                    .insert(id, None, View::on(physical));
            }
            for child in &node.children {
                let child_id =
                    workpiece
                        .logical_tree_mut()
                        .insert_child(id, None, logical_division(child))?;
                pending.push((child_id, child));
            }
        }
        Ok(workpiece)
    }
}

fn logical_division(node: &LogicalSnapshot) -> Division<Logical> {
    let mut division = Division::<Logical>::new(node.kind.clone());
    division.label = node.label.clone();
    division.order_label = node.order_label.clone();
    division.metadata = node.metadata.clone();
    division.payload.link = node.link.clone();
    division
}

fn physical_division(node: &PhysicalSnapshot) -> Division<Physical> {
    let mut division = Division::<Physical>::new(node.kind.clone());
    division.label = node.label.clone();
    division.order_label = node.order_label.clone();
    division.metadata = node.metadata.clone();
    division.payload.order = node.order;
    division.payload.media_files = node.media_files.clone();
    division.payload.div_id = node.div_id.clone();
    division
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_rejects_unknown_view_target() {
        let workpiece = Workpiece::new("book", "monograph");
        let mut snapshot = workpiece.to_snapshot();
        snapshot.logical.views.push("PHYS_missing".into());

        let result = Workpiece::from_snapshot(&snapshot);

        assert_eq!(
            result.err(),
            Some(DomainError::DanglingView("PHYS_missing".into()))
        );
    }

    #[test]
    fn snapshot_rejects_other_schema_versions() {
        let mut snapshot = Workpiece::new("book", "monograph").to_snapshot();
        snapshot.schema_version = 99;
        assert!(matches!(
            Workpiece::from_snapshot(&snapshot),
            Err(DomainError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn fingerprint_is_stable_across_clones() {
        let snapshot = Workpiece::new("book", "monograph").to_snapshot();
        let copy = snapshot.clone();
        assert_eq!(snapshot.fingerprint(), copy.fingerprint());
        assert_eq!(snapshot.fingerprint().len(), 64);
    }
}
