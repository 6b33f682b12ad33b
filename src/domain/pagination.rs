//! Order labels and renumbering of physical divisions.

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use tracing::{debug, instrument};

use crate::domain::division::{Division, Physical};
use crate::domain::editor::collect_all_physical_sorted_by_order;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::view::PhysicalId;
use crate::domain::workpiece::Workpiece;

/// Label given to pages that carry no number.
pub const UNCOUNTED_LABEL: &str = " - ";

/// How a single counter value is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginatorType {
    Arabic,
    Roman,
    Uncounted,
    Freetext,
}

/// How images map onto counter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginatorMode {
    /// One number per image.
    #[default]
    Pages,
    /// Two numbers per image, joined by the separator.
    DoublePages,
    /// One number per leaf, i.e. every two images.
    Foliation,
    /// One number per leaf with `r`/`v` suffixes.
    RectoVersoFoliation,
}

impl FromStr for PaginatorType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arabic" => Ok(PaginatorType::Arabic),
            "roman" => Ok(PaginatorType::Roman),
            "uncounted" => Ok(PaginatorType::Uncounted),
            "freetext" | "text" => Ok(PaginatorType::Freetext),
            other => Err(DomainError::InvalidPagination(format!(
                "unknown pagination type '{}'",
                other
            ))),
        }
    }
}

impl FromStr for PaginatorMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pages" | "page" => Ok(PaginatorMode::Pages),
            "double-pages" | "columns" => Ok(PaginatorMode::DoublePages),
            "foliation" | "folio" => Ok(PaginatorMode::Foliation),
            "recto-verso" | "rectoverso" => Ok(PaginatorMode::RectoVersoFoliation),
            other => Err(DomainError::InvalidPagination(format!(
                "unknown pagination mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for PaginatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaginatorType::Arabic => "arabic",
            PaginatorType::Roman => "roman",
            PaginatorType::Uncounted => "uncounted",
            PaginatorType::Freetext => "freetext",
        };
        f.write_str(name)
    }
}

/// Roman numeral conversion.
pub struct RomanNumeral;

const ROMAN_DIGITS: [(u32, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

impl RomanNumeral {
    /// Values of 4000 and above repeat `M`; zero renders empty.
    pub fn format(value: u32, uppercase: bool) -> String {
        let mut remaining = value;
        let mut out = String::new();
        for (weight, digits) in ROMAN_DIGITS {
            while remaining >= weight {
                out.push_str(digits);
                remaining -= weight;
            }
        }
        if uppercase {
            out
        } else {
            out.to_ascii_lowercase()
        }
    }

    /// Parses canonical numerals in either case.
    pub fn parse(text: &str) -> Option<u32> {
        let upper = text.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return None;
        }
        let mut value = 0u32;
        let mut rest = upper.as_str();
        for (weight, digits) in ROMAN_DIGITS {
            while let Some(tail) = rest.strip_prefix(digits) {
                value = value.checked_add(weight)?;
                rest = tail;
            }
        }
        if rest.is_empty() && Self::format(value, true) == upper {
            Some(value)
        } else {
            None
        }
    }
}

/// Endless sequence of order labels.
#[derive(Debug, Clone)]
pub struct Paginator {
    kind: PaginatorType,
    mode: PaginatorMode,
    start: u32,
    uppercase: bool,
    text: String,
    fictitious: bool,
    separator: String,
    position: u32,
}

impl Paginator {
    /// Paginator counting from `start`, which is parsed according to `kind`.
    ///
    /// An empty start counts from one; free text repeats `start` verbatim.
    pub fn new(kind: PaginatorType, mode: PaginatorMode, start: &str) -> DomainResult<Self> {
        let trimmed = start.trim();
        let (value, uppercase) = match kind {
            PaginatorType::Arabic if trimmed.is_empty() => (1, true),
            PaginatorType::Arabic => (
                trimmed.parse::<u32>().map_err(|_| {
                    DomainError::InvalidPagination(format!("'{}' is not a number", start))
                })?,
                true,
            ),
            PaginatorType::Roman if trimmed.is_empty() => (1, true),
            PaginatorType::Roman => (
                RomanNumeral::parse(trimmed).ok_or_else(|| {
                    DomainError::InvalidPagination(format!("'{}' is not a roman numeral", start))
                })?,
                !trimmed.chars().any(|c| c.is_ascii_lowercase()),
            ),
            PaginatorType::Uncounted | PaginatorType::Freetext => (1, true),
        };
        Ok(Self {
            kind,
            mode,
            start: value,
            uppercase,
            text: start.to_string(),
            fictitious: false,
            separator: " ".to_string(),
            position: 0,
        })
    }

    /// Picks the type from the shape of `start`: digits count arabic,
    /// numerals count roman, anything else repeats as free text.
    pub fn infer(start: &str) -> Self {
        let kind = if start.trim().parse::<u32>().is_ok() {
            PaginatorType::Arabic
        } else if RomanNumeral::parse(start).is_some() {
            PaginatorType::Roman
        } else {
            PaginatorType::Freetext
        };
        Self::new(kind, PaginatorMode::Pages, start).unwrap_or_else(|_| Self::freetext(start))
    }

    fn freetext(text: &str) -> Self {
        Self {
            kind: PaginatorType::Freetext,
            mode: PaginatorMode::Pages,
            start: 1,
            uppercase: true,
            text: text.to_string(),
            fictitious: false,
            separator: " ".to_string(),
            position: 0,
        }
    }

    /// Paginator for a configured default (`arabic`, `roman`, `uncounted`),
    /// labelling the first image `first`. Anything else yields empty labels.
    pub fn for_default(default_type: &str, first: u32) -> Self {
        match default_type.parse::<PaginatorType>() {
            Ok(PaginatorType::Arabic) => Self {
                start: first,
                ..Self::freetext("").with_kind(PaginatorType::Arabic)
            },
            Ok(PaginatorType::Roman) => Self {
                start: first,
                ..Self::freetext("").with_kind(PaginatorType::Roman)
            },
            Ok(PaginatorType::Uncounted) => Self::freetext("").with_kind(PaginatorType::Uncounted),
            _ => Self::freetext(""),
        }
    }

    fn with_kind(mut self, kind: PaginatorType) -> Self {
        self.kind = kind;
        self
    }

    /// Wraps every label in square brackets.
    pub fn fictitious(mut self, fictitious: bool) -> Self {
        self.fictitious = fictitious;
        self
    }

    /// Separator between the two numbers of a double page.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn kind(&self) -> PaginatorType {
        self.kind
    }

    pub fn mode(&self) -> PaginatorMode {
        self.mode
    }

    fn render(&self, value: u32) -> String {
        match self.kind {
            PaginatorType::Arabic => value.to_string(),
            PaginatorType::Roman => RomanNumeral::format(value, self.uppercase),
            PaginatorType::Uncounted => UNCOUNTED_LABEL.to_string(),
            PaginatorType::Freetext => self.text.clone(),
        }
    }

    fn label_at(&self, position: u32) -> String {
        let label = match self.mode {
            PaginatorMode::Pages => self.render(self.start.saturating_add(position)),
            PaginatorMode::DoublePages => {
                let left = self.start.saturating_add(position.saturating_mul(2));
                format!(
                    "{}{}{}",
                    self.render(left),
                    self.separator,
                    self.render(left.saturating_add(1))
                )
            }
            PaginatorMode::Foliation => self.render(self.start.saturating_add(position / 2)),
            PaginatorMode::RectoVersoFoliation => {
                let side = if position % 2 == 0 { "r" } else { "v" };
                format!("{}{}", self.render(self.start.saturating_add(position / 2)), side)
            }
        };
        if self.fictitious {
            format!("[{}]", label)
        } else {
            label
        }
    }
}

impl Iterator for Paginator {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let label = self.label_at(self.position);
        self.position = self.position.saturating_add(1);
        Some(label)
    }
}

/// Which pages a selection-based pagination relabels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginationScope {
    /// The first selected page and every page after it.
    #[default]
    FromFirstSelected,
    /// Exactly the selected pages.
    SelectedOnly,
}

/// Assigns `order = 1..n` and consecutive labels to all pages of `page_type`.
///
/// Pages are taken in their current order; returns the number relabelled.
#[instrument(level = "debug", skip(workpiece, paginator))]
pub fn renumber(workpiece: &mut Workpiece, page_type: &str, paginator: Paginator) -> usize {
    let pages = collect_all_physical_sorted_by_order(workpiece, page_type);
    for ((position, id), label) in pages.iter().enumerate().zip(paginator) {
        if let Some(division) = workpiece.physical_division_mut(*id) {
            division.payload.order = u32::try_from(position + 1).unwrap_or(u32::MAX);
            division.order_label = Some(label);
        }
    }
    debug!(pages = pages.len(), "renumbered");
    pages.len()
}

/// Relabels pages picked by `selection`, 0-based positions in page order.
#[instrument(level = "debug", skip(workpiece, paginator))]
pub fn paginate_selection(
    workpiece: &mut Workpiece,
    page_type: &str,
    selection: &[usize],
    scope: PaginationScope,
    paginator: Paginator,
) -> DomainResult<usize> {
    let pages = collect_all_physical_sorted_by_order(workpiece, page_type);
    let Some(&first) = selection.iter().min() else {
        return Err(DomainError::InvalidPagination("no pages selected".to_string()));
    };
    if let Some(&out_of_range) = selection.iter().find(|&&i| i >= pages.len()) {
        return Err(DomainError::InvalidPagination(format!(
            "page {} selected but only {} pages exist",
            out_of_range + 1,
            pages.len()
        )));
    }
    let targets: Vec<PhysicalId> = match scope {
        PaginationScope::FromFirstSelected => pages[first..].to_vec(),
        PaginationScope::SelectedOnly => selection
            .iter()
            .copied()
            .sorted()
            .dedup()
            .map(|i| pages[i])
            .collect(),
    };
    for (id, label) in targets.iter().zip(paginator) {
        if let Some(division) = workpiece.physical_division_mut(*id) {
            division.order_label = Some(label);
        }
    }
    Ok(targets.len())
}

/// Appends `count` pages without media after the last page.
#[instrument(level = "debug", skip(workpiece, paginator))]
pub fn add_dummy_pages(
    workpiece: &mut Workpiece,
    count: usize,
    page_type: &str,
    paginator: Option<Paginator>,
) -> DomainResult<Vec<PhysicalId>> {
    let last_order = collect_all_physical_sorted_by_order(workpiece, page_type)
        .last()
        .and_then(|&id| workpiece.physical_division(id))
        .map_or(0, |division| division.order());
    let mut labels = paginator;
    let root = workpiece.physical_root();
    let mut created = Vec::with_capacity(count);
    for offset in 1..=count {
        let order = last_order.saturating_add(u32::try_from(offset).unwrap_or(u32::MAX));
        let mut division = Division::<Physical>::new(page_type).with_order(order);
        division.order_label = labels.as_mut().and_then(|paginator| paginator.next());
        created.push(workpiece.physical_tree_mut().insert_child(root, None, division)?);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roman_parse_rejects_non_canonical_forms() {
        assert_eq!(RomanNumeral::parse("xiv"), Some(14));
        assert_eq!(RomanNumeral::parse("MCMXCIX"), Some(1999));
        assert_eq!(RomanNumeral::parse("IIII"), None);
        assert_eq!(RomanNumeral::parse("chapter"), None);
    }

    #[test]
    fn infer_falls_back_to_free_text() {
        let labels: Vec<String> = Paginator::infer("Plate").take(2).collect();
        assert_eq!(labels, vec!["Plate", "Plate"]);
    }
}
