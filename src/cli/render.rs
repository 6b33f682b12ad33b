//! Tree rendering for `show`.

use termtree::Tree;

use crate::domain::{DivisionId, DivisionTree, LogicalId, PhysicalId, Variant, Workpiece};

/// Converts a division tree into a printable [`Tree`].
pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

/// Logical structure with link targets and view counts.
pub struct LogicalStructure<'a>(pub &'a Workpiece);

/// Physical structure with orders, labels and media uses.
pub struct PhysicalStructure<'a>(pub &'a Workpiece);

fn build<V: Variant>(
    tree: &DivisionTree<V>,
    id: DivisionId<V>,
    path: &mut Vec<usize>,
    line: &dyn Fn(DivisionId<V>) -> String,
) -> Tree<String> {
    let address = if path.is_empty() {
        "/".to_string()
    } else {
        path.iter().map(usize::to_string).collect::<Vec<_>>().join(",")
    };
    let mut node = Tree::new(format!("[{}] {}", address, line(id)));
    for (index, child) in tree.children(id).enumerate() {
        path.push(index);
        node.push(build(tree, child, path, line));
        path.pop();
    }
    node
}

impl TreeNodeConvert for LogicalStructure<'_> {
    fn to_tree_string(&self) -> Tree<String> {
        let workpiece = self.0;
        let tree = workpiece.logical();
        let line = |id: LogicalId| {
            let Some(division) = tree.get(id) else {
                return String::new();
            };
            let mut text = division.to_string();
            if let Some(target) = division.link().and_then(|link| link.target_id()) {
                text.push_str(&format!(" -> {}", target));
            }
            let views = workpiece.views(id).len();
            if views > 0 {
                text.push_str(&format!(" ({} pages)", views));
            }
            text
        };
        build(tree, tree.root(), &mut Vec::new(), &line)
    }
}

impl TreeNodeConvert for PhysicalStructure<'_> {
    fn to_tree_string(&self) -> Tree<String> {
        let tree = self.0.physical();
        let line = |id: PhysicalId| tree.get(id).map(ToString::to_string).unwrap_or_default();
        build(tree, tree.root(), &mut Vec::new(), &line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{editor, InsertionPosition};

    #[test]
    fn logical_rendering_shows_addresses() {
        let mut workpiece = Workpiece::new("book", "monograph");
        let root = workpiece.logical_root();
        editor::insert_structure("chapter", &mut workpiece, root, InsertionPosition::LastChildOfCurrent, &[])
            .unwrap();

        let rendered = LogicalStructure(&workpiece).to_tree_string().to_string();

        assert!(rendered.contains("[/] monograph"));
        assert!(rendered.contains("[0] chapter"));
    }
}
