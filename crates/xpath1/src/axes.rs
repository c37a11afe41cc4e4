//! Contains pure functions for collecting nodes along each XPath axis.
//!
//! Every collector works from a single context node and returns its nodes in
//! axis order: document order for forward axes, reverse document order for
//! `ancestor`, `ancestor-or-self`, `preceding` and `preceding-sibling`.

use crate::ast::Axis;
use crate::datasource::{DataSourceNode, NodeType};

/// Collects the nodes on `axis` from `node`, in axis order.
pub fn collect<'a, N: DataSourceNode<'a>>(axis: Axis, node: N) -> Vec<N> {
    let mut results = Vec::new();
    match axis {
        Axis::Child => collect_child_nodes(node, &mut results),
        Axis::Descendant => collect_descendant_nodes(node, &mut results),
        Axis::DescendantOrSelf => {
            results.push(node);
            collect_descendant_nodes(node, &mut results);
        }
        Axis::Attribute => collect_attribute_nodes(node, &mut results),
        Axis::Namespace => collect_namespace_nodes(node, &mut results),
        Axis::Parent => results.extend(node.parent()),
        Axis::Ancestor => collect_ancestor_nodes(node, &mut results),
        Axis::AncestorOrSelf => {
            results.push(node);
            collect_ancestor_nodes(node, &mut results);
        }
        Axis::SelfAxis => results.push(node),
        Axis::FollowingSibling => collect_following_sibling_nodes(node, &mut results),
        Axis::PrecedingSibling => collect_preceding_sibling_nodes(node, &mut results),
        Axis::Following => collect_following_nodes(node, &mut results),
        Axis::Preceding => collect_preceding_nodes(node, &mut results),
    }
    results
}

fn is_attached_to_owner<'a, N: DataSourceNode<'a>>(node: N) -> bool {
    matches!(node.node_type(), NodeType::Attribute | NodeType::Namespace)
}

fn collect_child_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    results.extend(node.children());
}

fn collect_attribute_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    if node.node_type() == NodeType::Element {
        results.extend(node.attributes());
    }
}

fn collect_namespace_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    if node.node_type() == NodeType::Element {
        results.extend(node.namespace_nodes());
    }
}

/// Pre-order walk over the children of `node`; `node` itself is not included.
fn collect_descendant_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    let mut stack: Vec<N> = node.children().collect();
    stack.reverse();
    while let Some(current) = stack.pop() {
        results.push(current);
        let mut children: Vec<N> = current.children().collect();
        children.reverse();
        stack.extend(children);
    }
}

fn collect_ancestor_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    let mut current = node.parent();
    while let Some(p) = current {
        results.push(p);
        current = p.parent();
    }
}

fn collect_following_sibling_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    if is_attached_to_owner(node) {
        return;
    }
    if let Some(parent) = node.parent() {
        results.extend(parent.children().skip_while(|sibling| *sibling != node).skip(1));
    }
}

fn collect_preceding_sibling_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    if is_attached_to_owner(node) {
        return;
    }
    if let Some(parent) = node.parent() {
        let mut siblings: Vec<N> = parent
            .children()
            .take_while(|sibling| *sibling != node)
            .collect();
        siblings.reverse();
        results.extend(siblings);
    }
}

fn collect_following_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    // An attribute or namespace node precedes the content of its owner element.
    let mut current = node;
    if is_attached_to_owner(node) {
        match node.parent() {
            Some(owner) => {
                collect_descendant_nodes(owner, results);
                current = owner;
            }
            None => return,
        }
    }

    let mut chain = Some(current);
    while let Some(c) = chain {
        let parent = c.parent();
        if let Some(p) = parent {
            for sibling in p.children().skip_while(|s| *s != c).skip(1) {
                results.push(sibling);
                collect_descendant_nodes(sibling, results);
            }
        }
        chain = parent;
    }
}

fn collect_preceding_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    let mut current = node;
    if is_attached_to_owner(node) {
        match node.parent() {
            Some(owner) => current = owner,
            None => return,
        }
    }

    // Gather in document order, then flip. Ancestors are never included.
    let mut chain = Vec::new();
    let mut cursor = Some(current);
    while let Some(c) = cursor {
        chain.push(c);
        cursor = c.parent();
    }

    let mut forward = Vec::new();
    for c in chain.into_iter().rev() {
        if let Some(p) = c.parent() {
            for sibling in p.children().take_while(|s| *s != c) {
                forward.push(sibling);
                collect_descendant_nodes(sibling, &mut forward);
            }
        }
    }
    forward.reverse();
    results.extend(forward);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};

    fn ids(nodes: &[MockNode<'_>]) -> Vec<usize> {
        nodes.iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_collect_child() {
        let tree = create_test_tree();
        let root = tree.root();
        assert_eq!(ids(&collect(Axis::Child, root)), vec![1, 5, 6, 9, 10]);
        // Attributes are not children.
        assert_eq!(ids(&collect(Axis::Child, tree.node(1))), vec![4]);
    }

    #[test]
    fn test_collect_ancestor() {
        let tree = create_test_tree();
        let text = tree.node(8);
        assert_eq!(ids(&collect(Axis::Ancestor, text)), vec![7, 6, 0]);
        assert_eq!(ids(&collect(Axis::AncestorOrSelf, text)), vec![8, 7, 6, 0]);
        assert_eq!(ids(&collect(Axis::Parent, tree.node(2))), vec![1]);
        assert!(collect(Axis::Parent, tree.root()).is_empty());
    }

    #[test]
    fn test_collect_descendant_in_document_order() {
        let tree = create_test_tree();
        let root = tree.root();
        assert_eq!(
            ids(&collect(Axis::Descendant, root)),
            vec![1, 4, 5, 6, 7, 8, 9, 10, 12]
        );
        assert_eq!(
            ids(&collect(Axis::DescendantOrSelf, tree.node(6))),
            vec![6, 7, 8]
        );
    }

    #[test]
    fn test_collect_siblings() {
        let tree = create_test_tree();
        assert_eq!(
            ids(&collect(Axis::FollowingSibling, tree.node(1))),
            vec![5, 6, 9, 10]
        );
        // Reverse axis: nearest sibling first.
        assert_eq!(
            ids(&collect(Axis::PrecedingSibling, tree.node(10))),
            vec![9, 6, 5, 1]
        );
        assert!(collect(Axis::FollowingSibling, tree.node(2)).is_empty());
    }

    #[test]
    fn test_collect_following_preceding() {
        let tree = create_test_tree();
        // The following of "Hello" are its parent's following siblings and their descendants.
        assert_eq!(
            ids(&collect(Axis::Following, tree.node(4))),
            vec![5, 6, 7, 8, 9, 10, 12]
        );
        // The preceding of the div excludes its ancestors and comes back in reverse.
        assert_eq!(ids(&collect(Axis::Preceding, tree.node(6))), vec![5, 4, 1]);
        assert_eq!(
            ids(&collect(Axis::Preceding, tree.node(8))),
            vec![5, 4, 1]
        );
    }

    #[test]
    fn test_following_of_attribute_includes_owner_content() {
        let tree = create_test_tree();
        let attr = tree.node(2);
        let following = ids(&collect(Axis::Following, attr));
        assert_eq!(following[0], 4);
        assert!(collect(Axis::Preceding, attr).is_empty());
    }

    #[test]
    fn test_axis_direction_matches_is_reverse() {
        let tree = create_test_tree();
        let axes = [
            Axis::Ancestor,
            Axis::AncestorOrSelf,
            Axis::Child,
            Axis::Descendant,
            Axis::DescendantOrSelf,
            Axis::Following,
            Axis::FollowingSibling,
            Axis::Preceding,
            Axis::PrecedingSibling,
        ];
        for axis in axes {
            for node in [tree.node(6), tree.node(7), tree.node(10)] {
                let indexes: Vec<_> = collect(axis, node)
                    .iter()
                    .map(|n| n.document_order_index())
                    .collect();
                let ordered = if axis.is_reverse() {
                    indexes.windows(2).all(|w| w[0] > w[1])
                } else {
                    indexes.windows(2).all(|w| w[0] < w[1])
                };
                assert!(ordered, "{:?} from {}: {:?}", axis, node.id, indexes);
            }
        }
    }

    #[test]
    fn test_collect_attribute_and_namespace() {
        let tree = create_test_tree();
        assert_eq!(ids(&collect(Axis::Attribute, tree.node(1))), vec![2, 3]);
        assert!(collect(Axis::Attribute, tree.node(4)).is_empty());
        assert!(collect(Axis::Namespace, tree.node(1)).is_empty());
        assert_eq!(ids(&collect(Axis::SelfAxis, tree.node(5))), vec![5]);
    }
}
