//! Defines the capability set the engine requires from a navigable, read-only tree.
use std::hash::Hash;

/// A qualified name, consisting of an optional prefix and a local part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QName<'a> {
    pub prefix: Option<&'a str>,
    pub local_part: &'a str,
}

/// The type of a node in the data source tree, aligned with the XPath 1.0 data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Element,
    Attribute,
    Namespace,
    Text,
    Comment,
    ProcessingInstruction,
}

/// The contract a tree node must satisfy to be queried.
///
/// The engine is written exclusively against this trait and never mutates the
/// tree. Implementations are expected to be cheap `Copy` handles whose
/// equality and hash reflect node identity.
///
/// `'a` is the lifetime of the underlying tree.
pub trait DataSourceNode<'a>: std::fmt::Debug + Clone + Copy + PartialEq + Eq + Hash + 'a {
    /// The type of the node (Element, Text, Attribute, etc.).
    fn node_type(&self) -> NodeType;

    /// The qualified name of the node (e.g., `svg:rect`). Returns `None` for node
    /// types that do not have names, such as text or root nodes. For a processing-
    /// instruction, this is its target; for a namespace node, the local part is the
    /// prefix it binds (empty for the default namespace).
    fn name(&self) -> Option<QName<'a>>;

    /// The local part of the node's name, or the empty string for unnamed nodes.
    fn local_name(&self) -> &'a str {
        self.name().map(|q| q.local_part).unwrap_or("")
    }

    /// The namespace URI of an element or attribute name, if it has one.
    fn namespace_uri(&self) -> Option<&'a str>;

    /// The string value of the node, as defined by the XPath 1.0 `string()` function.
    /// - For an element or root, the concatenation of all descendant text nodes.
    /// - For a text node, its content; for an attribute, its value.
    /// - For a namespace node, the namespace URI it binds.
    /// - For a comment or processing instruction, its content.
    fn string_value(&self) -> String;

    /// The attribute nodes of this node, in document order. Empty for non-elements.
    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// The child nodes of this node, in document order.
    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// The in-scope namespace nodes of an element. Sources without namespace
    /// support can rely on the empty default.
    fn namespace_nodes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        Box::new(std::iter::empty())
    }

    /// The parent node. For attribute and namespace nodes this is the owning
    /// element. Returns `None` for the root and for detached subtrees.
    fn parent(&self) -> Option<Self>;

    /// A key that strictly increases in document order across every node of
    /// one document, attributes and namespace nodes included.
    fn document_order_index(&self) -> usize;

    /// The root node of the document this node belongs to, found by walking
    /// parent links. `None` when the topmost ancestor is not a root node.
    fn document_root(&self) -> Option<Self> {
        let mut top = *self;
        while let Some(parent) = top.parent() {
            top = parent;
        }
        (top.node_type() == NodeType::Root).then_some(top)
    }
}

/// Sorts a node list into document order and drops duplicate identities.
pub fn sort_document_order<'a, N: DataSourceNode<'a>>(nodes: &mut Vec<N>) {
    nodes.sort_by_key(|n| n.document_order_index());
    nodes.dedup();
}

/// The first node of a list in document order, whatever order the list is in.
pub fn first_in_document_order<'a, N: DataSourceNode<'a>>(nodes: &[N]) -> Option<N> {
    nodes.iter().copied().min_by_key(|n| n.document_order_index())
}

// Test utilities - publicly available for integration testing in downstream crates
pub mod tests {
    use super::*;
    use std::hash::Hasher;

    #[derive(Debug, Clone)]
    struct MockNodeData<'a> {
        node_type: NodeType,
        name: Option<QName<'a>>,
        namespace: Option<&'a str>,
        value: String,
        parent: Option<usize>,
        children: Vec<usize>,
        attributes: Vec<usize>,
        namespaces: Vec<usize>,
    }

    /// An in-memory tree assembled through [`MockTreeBuilder`].
    #[derive(Debug)]
    pub struct MockTree<'a> {
        nodes: Vec<MockNodeData<'a>>,
        order: Vec<usize>,
    }

    /// A node handle holding a reference to its tree, so that it can navigate itself.
    #[derive(Debug, Clone, Copy)]
    pub struct MockNode<'a> {
        pub id: usize,
        pub tree: &'a MockTree<'a>,
    }

    impl<'a> MockTree<'a> {
        pub fn node(&'a self, id: usize) -> MockNode<'a> {
            MockNode { id, tree: self }
        }

        pub fn root(&'a self) -> MockNode<'a> {
            self.node(0)
        }
    }

    impl<'a> PartialEq for MockNode<'a> {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }
    impl<'a> Eq for MockNode<'a> {}

    impl<'a> Hash for MockNode<'a> {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.id.hash(state);
        }
    }

    impl<'a> MockNode<'a> {
        fn data(&self) -> &'a MockNodeData<'a> {
            &self.tree.nodes[self.id]
        }
    }

    impl<'a> DataSourceNode<'a> for MockNode<'a> {
        fn node_type(&self) -> NodeType {
            self.data().node_type
        }

        fn name(&self) -> Option<QName<'a>> {
            self.data().name
        }

        fn namespace_uri(&self) -> Option<&'a str> {
            self.data().namespace
        }

        fn string_value(&self) -> String {
            match self.node_type() {
                NodeType::Root | NodeType::Element => {
                    let mut out = String::new();
                    let mut stack: Vec<MockNode<'a>> = self.children().collect();
                    stack.reverse();
                    while let Some(node) = stack.pop() {
                        if node.node_type() == NodeType::Text {
                            out.push_str(&node.data().value);
                        }
                        let mut kids: Vec<_> = node.children().collect();
                        kids.reverse();
                        stack.extend(kids);
                    }
                    out
                }
                _ => self.data().value.clone(),
            }
        }

        fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            Box::new(
                self.data()
                    .attributes
                    .iter()
                    .map(move |&id| MockNode { id, tree }),
            )
        }

        fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            Box::new(
                self.data()
                    .children
                    .iter()
                    .map(move |&id| MockNode { id, tree }),
            )
        }

        fn namespace_nodes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            Box::new(
                self.data()
                    .namespaces
                    .iter()
                    .map(move |&id| MockNode { id, tree }),
            )
        }

        fn parent(&self) -> Option<Self> {
            self.data().parent.map(|id| MockNode {
                id,
                tree: self.tree,
            })
        }

        fn document_order_index(&self) -> usize {
            self.tree.order[self.id]
        }
    }

    /// Assembles a [`MockTree`]. Node `0` is always the root; nodes may be added
    /// in any order and document order is computed by [`MockTreeBuilder::build`].
    #[derive(Debug)]
    pub struct MockTreeBuilder<'a> {
        nodes: Vec<MockNodeData<'a>>,
    }

    impl<'a> Default for MockTreeBuilder<'a> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<'a> MockTreeBuilder<'a> {
        pub fn new() -> Self {
            let root = MockNodeData {
                node_type: NodeType::Root,
                name: None,
                namespace: None,
                value: String::new(),
                parent: None,
                children: vec![],
                attributes: vec![],
                namespaces: vec![],
            };
            Self { nodes: vec![root] }
        }

        fn push(
            &mut self,
            node_type: NodeType,
            name: Option<QName<'a>>,
            namespace: Option<&'a str>,
            value: &str,
            parent: Option<usize>,
        ) -> usize {
            let id = self.nodes.len();
            self.nodes.push(MockNodeData {
                node_type,
                name,
                namespace,
                value: value.to_string(),
                parent,
                children: vec![],
                attributes: vec![],
                namespaces: vec![],
            });
            id
        }

        pub fn element(&mut self, parent: usize, local_part: &'a str) -> usize {
            self.qualified_element(parent, None, local_part, None)
        }

        pub fn qualified_element(
            &mut self,
            parent: usize,
            prefix: Option<&'a str>,
            local_part: &'a str,
            namespace: Option<&'a str>,
        ) -> usize {
            let name = Some(QName { prefix, local_part });
            let id = self.push(NodeType::Element, name, namespace, "", Some(parent));
            self.nodes[parent].children.push(id);
            id
        }

        /// An element with no parent at all, used to model detached subtrees.
        pub fn detached_element(&mut self, local_part: &'a str) -> usize {
            let name = Some(QName {
                prefix: None,
                local_part,
            });
            self.push(NodeType::Element, name, None, "", None)
        }

        pub fn attribute(&mut self, owner: usize, local_part: &'a str, value: &str) -> usize {
            self.qualified_attribute(owner, None, local_part, None, value)
        }

        pub fn qualified_attribute(
            &mut self,
            owner: usize,
            prefix: Option<&'a str>,
            local_part: &'a str,
            namespace: Option<&'a str>,
            value: &str,
        ) -> usize {
            let name = Some(QName { prefix, local_part });
            let id = self.push(NodeType::Attribute, name, namespace, value, Some(owner));
            self.nodes[owner].attributes.push(id);
            id
        }

        /// Binds `prefix` (empty for the default namespace) to `uri` on `owner`.
        pub fn namespace(&mut self, owner: usize, prefix: &'a str, uri: &str) -> usize {
            let name = Some(QName {
                prefix: None,
                local_part: prefix,
            });
            let id = self.push(NodeType::Namespace, name, None, uri, Some(owner));
            self.nodes[owner].namespaces.push(id);
            id
        }

        pub fn text(&mut self, parent: usize, value: &str) -> usize {
            let id = self.push(NodeType::Text, None, None, value, Some(parent));
            self.nodes[parent].children.push(id);
            id
        }

        pub fn comment(&mut self, parent: usize, value: &str) -> usize {
            let id = self.push(NodeType::Comment, None, None, value, Some(parent));
            self.nodes[parent].children.push(id);
            id
        }

        pub fn processing_instruction(
            &mut self,
            parent: usize,
            target: &'a str,
            value: &str,
        ) -> usize {
            let name = Some(QName {
                prefix: None,
                local_part: target,
            });
            let id = self.push(NodeType::ProcessingInstruction, name, None, value, Some(parent));
            self.nodes[parent].children.push(id);
            id
        }

        pub fn build(self) -> MockTree<'a> {
            let mut order = vec![0; self.nodes.len()];
            let mut next = 0;
            let tops: Vec<usize> = (0..self.nodes.len())
                .filter(|&id| self.nodes[id].parent.is_none())
                .collect();
            for top in tops {
                let mut stack = vec![top];
                while let Some(id) = stack.pop() {
                    order[id] = next;
                    next += 1;
                    let data = &self.nodes[id];
                    for &ns in &data.namespaces {
                        order[ns] = next;
                        next += 1;
                    }
                    for &attr in &data.attributes {
                        order[attr] = next;
                        next += 1;
                    }
                    stack.extend(data.children.iter().rev());
                }
            }
            MockTree {
                nodes: self.nodes,
                order,
            }
        }
    }

    /// Creates a small mock tree for testing:
    /// ```text
    /// <root>                                    <!-- id 0 -->
    ///   <para id="p1" xml:lang="en">Hello</para> <!-- id 1, attrs 2 & 3, text 4 -->
    ///   <!-- comment node -->                   <!-- id 5 -->
    ///   <div>                                   <!-- id 6 -->
    ///     <para>World</para>                    <!-- id 7, text 8 -->
    ///   </div>
    ///   <?pi-target pi-value?>                  <!-- id 9 -->
    ///   <para id="p3">42</para>                 <!-- id 10, attr 11, text 12 -->
    /// </root>
    /// ```
    /// Ids match document order apart from attributes, which follow their element.
    pub fn create_test_tree<'a>() -> MockTree<'a> {
        let mut b = MockTreeBuilder::new();
        let para1 = b.element(0, "para");
        b.attribute(para1, "id", "p1");
        b.qualified_attribute(
            para1,
            Some("xml"),
            "lang",
            Some("http://www.w3.org/XML/1998/namespace"),
            "en",
        );
        b.text(para1, "Hello");
        b.comment(0, " comment node ");
        let div = b.element(0, "div");
        let para2 = b.element(div, "para");
        b.text(para2, "World");
        b.processing_instruction(0, "pi-target", "pi-value");
        let para3 = b.element(0, "para");
        b.attribute(para3, "id", "p3");
        b.text(para3, "42");
        b.build()
    }
}
