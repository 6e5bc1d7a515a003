//! Contains pure functions for collecting nodes along each XPath axis.
//!
//! Every collector returns nodes in proximity order: document order for
//! forward axes, nearest-first for reverse axes.

use crate::ast::Axis;
use crate::datasource::{DataSourceNode, NodeType};

pub fn collect<'a, N: DataSourceNode<'a>>(axis: Axis, node: N) -> Vec<N> {
    match axis {
        Axis::Child => node.children().collect(),
        Axis::Attribute => node.attributes().collect(),
        Axis::SelfAxis => vec![node],
        Axis::Parent => node.parent().into_iter().collect(),
        Axis::Descendant => {
            let mut out = Vec::new();
            collect_descendants(node, &mut out);
            out
        }
        Axis::DescendantOrSelf => {
            let mut out = vec![node];
            collect_descendants(node, &mut out);
            out
        }
        Axis::Ancestor => ancestors(node, false),
        Axis::AncestorOrSelf => ancestors(node, true),
        Axis::FollowingSibling => siblings(node, true),
        Axis::PrecedingSibling => siblings(node, false),
    }
}

fn collect_descendants<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    for child in node.children() {
        out.push(child);
        collect_descendants(child, out);
    }
}

fn ancestors<'a, N: DataSourceNode<'a>>(node: N, include_self: bool) -> Vec<N> {
    let mut out = Vec::new();
    if include_self {
        out.push(node);
    }
    let mut current = node.parent();
    while let Some(p) = current {
        out.push(p);
        current = p.parent();
    }
    out
}

fn siblings<'a, N: DataSourceNode<'a>>(node: N, following: bool) -> Vec<N> {
    // Attributes have no siblings.
    if node.node_type() == NodeType::Attribute {
        return Vec::new();
    }
    let Some(parent) = node.parent() else {
        return Vec::new();
    };
    let all: Vec<N> = parent.children().collect();
    let Some(index) = all.iter().position(|&n| n == node) else {
        return Vec::new();
    };
    if following {
        all[index + 1..].to_vec()
    } else {
        all[..index].iter().rev().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::create_test_tree;

    fn ids<'a>(nodes: Vec<crate::datasource::tests::MockNode<'a>>) -> Vec<usize> {
        nodes.iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_forward_axes() {
        let tree = create_test_tree();
        let order = tree.node(1);
        assert_eq!(ids(collect(Axis::Child, order)), vec![3, 7, 8, 12]);
        assert_eq!(ids(collect(Axis::Attribute, order)), vec![2]);
        assert_eq!(ids(collect(Axis::Descendant, order)), vec![3, 6, 7, 8, 11, 12, 13]);
        assert_eq!(ids(collect(Axis::FollowingSibling, tree.node(7))), vec![8, 12]);
    }

    #[test]
    fn test_reverse_axes_are_nearest_first() {
        let tree = create_test_tree();
        assert_eq!(ids(collect(Axis::Ancestor, tree.node(6))), vec![3, 1, 0]);
        assert_eq!(ids(collect(Axis::AncestorOrSelf, tree.node(3))), vec![3, 1, 0]);
        assert_eq!(ids(collect(Axis::PrecedingSibling, tree.node(12))), vec![8, 7, 3]);
        assert!(collect(Axis::FollowingSibling, tree.node(4)).is_empty());
    }
}
