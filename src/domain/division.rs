//! Division content: the data carried by one node of either hierarchy.
//!
//! The two hierarchies share the node shape ([`Division`]) and differ in the
//! payload selected by the [`Variant`] tag: logical divisions may link to an
//! external workpiece, physical divisions carry an order and media files.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Locator type used for links between workpieces managed by this engine.
pub const INTERNAL_LOCTYPE: &str = "structmeta";

/// URI prefix of internal links; the linked workpiece id follows it.
pub const INTERNAL_LINK_PREFIX: &str = "database://?workpiece.id=";

/// Everything after the prefix is the workpiece id, taken verbatim.
static INTERNAL_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?s)\A{}(.+)\z", regex::escape(INTERNAL_LINK_PREFIX)))
        .expect("internal link pattern")
});

/// Media variant `use` recorded for files found in an object's media folder.
pub const LOCAL_MEDIA_USE: &str = "LOCAL";

/// Tag type selecting the payload of a [`Division`].
///
/// Implemented only by [`Logical`] and [`Physical`]; trees and ids are generic
/// over it, so a logical id can never address the physical tree.
pub trait Variant:
    fmt::Debug + Clone + Copy + Default + PartialEq + Eq + Send + Sync + 'static
{
    /// Variant-specific part of a division.
    type Payload: fmt::Debug + Clone + Default + PartialEq + Send + Sync;

    /// Short name used in ids and log output.
    const NAME: &'static str;
}

/// Tag of the logical (content) hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Logical;

/// Tag of the physical (media) hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Physical;

impl Variant for Logical {
    type Payload = LogicalPart;
    const NAME: &'static str = "logical";
}

impl Variant for Physical {
    type Payload = PhysicalPart;
    const NAME: &'static str = "physical";
}

/// Key/value metadata entry, opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Reference from a logical division to another, externally stored workpiece.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedResource {
    pub loctype: String,
    pub uri: String,
}

impl LinkedResource {
    /// Link to a workpiece managed by this engine.
    pub fn internal(workpiece_id: &str) -> Self {
        Self {
            loctype: INTERNAL_LOCTYPE.to_string(),
            uri: format!("{}{}", INTERNAL_LINK_PREFIX, workpiece_id),
        }
    }

    /// Id of the linked workpiece, if the URI is an internal link.
    pub fn target_id(&self) -> Option<&str> {
        INTERNAL_LINK
            .captures(&self.uri)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Whether this link points at `workpiece_id`.
    pub fn points_at(&self, workpiece_id: &str) -> bool {
        self.target_id() == Some(workpiece_id)
    }
}

/// Payload of a logical division.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogicalPart {
    /// Present when this division stands in for another workpiece.
    pub link: Option<LinkedResource>,
}

/// Payload of a physical division.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalPart {
    /// Position among the physical divisions of the same level.
    pub order: u32,
    /// Media files by variant use, e.g. `LOCAL -> images/00000001.tif`.
    pub media_files: BTreeMap<String, String>,
    /// Stable identifier used by views in the persisted form.
    pub div_id: String,
}

impl Default for PhysicalPart {
    fn default() -> Self {
        Self {
            order: 0,
            media_files: BTreeMap::new(),
            div_id: new_div_id(),
        }
    }
}

/// Fresh physical division identifier.
pub fn new_div_id() -> String {
    format!("PHYS_{}", Uuid::new_v4().simple())
}

/// One node of a division tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Division<V: Variant> {
    /// Semantic type, validated by the ruleset (never by the engine).
    pub kind: String,
    pub label: Option<String>,
    pub order_label: Option<String>,
    pub metadata: Vec<MetadataEntry>,
    pub payload: V::Payload,
}

impl<V: Variant> Division<V> {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// First metadata value stored under `key`.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_str())
    }

    /// Equality of the fields shared by both variants.
    pub fn same_content<W: Variant>(&self, other: &Division<W>) -> bool {
        self.kind == other.kind
            && self.label == other.label
            && self.order_label == other.order_label
            && self.metadata == other.metadata
    }

    pub(crate) fn hash_content<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.label.hash(state);
        self.order_label.hash(state);
        self.metadata.hash(state);
    }
}

impl Division<Logical> {
    pub fn link(&self) -> Option<&LinkedResource> {
        self.payload.link.as_ref()
    }

    pub fn is_link(&self) -> bool {
        self.payload.link.is_some()
    }
}

impl Division<Physical> {
    pub fn order(&self) -> u32 {
        self.payload.order
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.payload.order = order;
        self
    }

    pub fn with_media(mut self, media_use: impl Into<String>, uri: impl Into<String>) -> Self {
        self.payload
            .media_files
            .insert(media_use.into(), uri.into());
        self
    }

    pub fn media_files(&self) -> &BTreeMap<String, String> {
        &self.payload.media_files
    }

    pub fn has_media(&self) -> bool {
        !self.payload.media_files.is_empty()
    }

    pub fn div_id(&self) -> &str {
        &self.payload.div_id
    }
}

impl fmt::Display for Division<Logical> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} \"{}\"", self.kind, label),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl fmt::Display for Division<Physical> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.payload.order)?;
        if let Some(order_label) = &self.order_label {
            write!(f, " : {}", order_label)?;
        }
        if !self.payload.media_files.is_empty() {
            let uses: Vec<&str> = self.payload.media_files.keys().map(String::as_str).collect();
            write!(f, " ({})", uses.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_link_round_trips_target_id() {
        let link = LinkedResource::internal("book_volume-2");
        assert_eq!(link.loctype, INTERNAL_LOCTYPE);
        assert_eq!(link.target_id(), Some("book_volume-2"));
        assert!(link.points_at("book_volume-2"));
        assert!(!link.points_at("book_volume"));
    }

    #[test]
    fn internal_link_keeps_target_id_opaque() {
        for id in ["vol&1", "a?b=c", "multi\nline", "x&workpiece.id=y"] {
            let link = LinkedResource::internal(id);
            assert_eq!(link.target_id(), Some(id));
        }
        let empty = LinkedResource::internal("");
        assert_eq!(empty.target_id(), None);
    }

    #[test]
    fn foreign_link_has_no_target() {
        let link = LinkedResource {
            loctype: "URL".into(),
            uri: "https://example.org/mets.xml".into(),
        };
        assert_eq!(link.target_id(), None);
    }

    #[test]
    fn physical_divisions_get_distinct_div_ids() {
        let a = Division::<Physical>::new("page");
        let b = Division::<Physical>::new("page");
        assert_ne!(a.div_id(), b.div_id());
        assert!(a.div_id().starts_with("PHYS_"));
    }
}
