// XML datasource implementation using roxmltree
use roxmltree::Node;
use std::fmt;
use std::hash::{Hash, Hasher};
use xselect_xpath1::{DataSourceNode, NodeType, QName};

/// Wrapper around roxmltree::Document providing data source capabilities
pub struct XmlDocument<'input> {
    doc: roxmltree::Document<'input>,
    /// Document-order index of every tree node, by node id. Each node is
    /// followed by one slot per namespace node and then one per attribute.
    order: Vec<usize>,
}

impl<'input> XmlDocument<'input> {
    pub fn parse(text: &'input str) -> Result<Self, roxmltree::Error> {
        let doc = roxmltree::Document::parse(text)?;
        let order = order_table(&doc);
        log::debug!("parsed XML document: {} tree node(s)", order.len());
        Ok(Self { doc, order })
    }

    pub fn root_node(&self) -> XmlNode<'_, 'input> {
        XmlNode::new(XmlNodeKind::Node(self.doc.root()), &self.order)
    }

    pub fn root_element(&self) -> XmlNode<'_, 'input> {
        XmlNode::new(XmlNodeKind::Node(self.doc.root_element()), &self.order)
    }
}

fn order_table(doc: &roxmltree::Document<'_>) -> Vec<usize> {
    let mut table = Vec::new();
    let mut next = 0;
    for node in doc.descendants() {
        let id = node.id().get_usize();
        if table.len() <= id {
            table.resize(id + 1, 0);
        }
        table[id] = next;
        next += 1;
        if node.is_element() {
            next += node.namespaces().count() + node.attributes().len();
        }
    }
    table
}

/// The prefix an element was written with, read back from the source text.
/// roxmltree only keeps the resolved namespace, and one URI may be bound to
/// several prefixes at once.
fn element_prefix<'input>(node: Node<'_, 'input>) -> Option<&'input str> {
    let text = node.document().input_text();
    let tag = text.get(node.range())?.strip_prefix('<')?;
    let end = tag
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(tag.len());
    tag[..end].split_once(':').map(|(prefix, _)| prefix)
}

/// What an [`XmlNode`] points at. roxmltree keeps attributes and namespaces
/// as data on elements, so those two kinds are addressed by their owning
/// element and an index.
#[derive(Debug, Clone, Copy)]
enum XmlNodeKind<'a, 'input> {
    /// A tree node: root, element, text, comment or processing instruction.
    Node(Node<'a, 'input>),
    Attribute {
        parent: Node<'a, 'input>,
        index: usize,
    },
    /// An in-scope namespace binding of an element.
    Namespace {
        parent: Node<'a, 'input>,
        index: usize,
    },
}

/// A node of the XPath data model over a roxmltree document.
#[derive(Clone, Copy)]
pub struct XmlNode<'a, 'input> {
    kind: XmlNodeKind<'a, 'input>,
    order: &'a [usize],
}

impl<'a, 'input> XmlNode<'a, 'input> {
    fn new(kind: XmlNodeKind<'a, 'input>, order: &'a [usize]) -> Self {
        Self { kind, order }
    }

    fn with_kind(&self, kind: XmlNodeKind<'a, 'input>) -> Self {
        Self::new(kind, self.order)
    }

    fn attribute(&self) -> Option<roxmltree::Attribute<'a, 'input>> {
        match self.kind {
            XmlNodeKind::Attribute { parent, index } => parent.attributes().nth(index),
            _ => None,
        }
    }

    fn namespace(&self) -> Option<&'a roxmltree::Namespace<'input>> {
        match self.kind {
            XmlNodeKind::Namespace { parent, index } => parent.namespaces().nth(index),
            _ => None,
        }
    }

    fn tree_index(&self, node: Node<'a, 'input>) -> usize {
        self.order
            .get(node.id().get_usize())
            .copied()
            .unwrap_or_default()
    }
}

impl fmt::Debug for XmlNode<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.kind, f)
    }
}

impl<'a, 'input> PartialEq for XmlNode<'a, 'input> {
    fn eq(&self, other: &Self) -> bool {
        match (self.kind, other.kind) {
            (XmlNodeKind::Node(a), XmlNodeKind::Node(b)) => a.id() == b.id(),
            (
                XmlNodeKind::Attribute {
                    parent: p1,
                    index: i1,
                },
                XmlNodeKind::Attribute {
                    parent: p2,
                    index: i2,
                },
            )
            | (
                XmlNodeKind::Namespace {
                    parent: p1,
                    index: i1,
                },
                XmlNodeKind::Namespace {
                    parent: p2,
                    index: i2,
                },
            ) => p1.id() == p2.id() && i1 == i2,
            _ => false,
        }
    }
}

impl<'a, 'input> Eq for XmlNode<'a, 'input> {}

impl<'a, 'input> Hash for XmlNode<'a, 'input> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.kind {
            XmlNodeKind::Node(node) => {
                0u8.hash(state);
                node.id().hash(state);
            }
            XmlNodeKind::Attribute { parent, index } => {
                1u8.hash(state);
                parent.id().hash(state);
                index.hash(state);
            }
            XmlNodeKind::Namespace { parent, index } => {
                2u8.hash(state);
                parent.id().hash(state);
                index.hash(state);
            }
        }
    }
}

impl<'a> DataSourceNode<'a> for XmlNode<'a, 'a> {
    fn node_type(&self) -> NodeType {
        match self.kind {
            XmlNodeKind::Node(node) => match node.node_type() {
                roxmltree::NodeType::Root => NodeType::Root,
                roxmltree::NodeType::Element => NodeType::Element,
                roxmltree::NodeType::Text => NodeType::Text,
                roxmltree::NodeType::Comment => NodeType::Comment,
                roxmltree::NodeType::PI => NodeType::ProcessingInstruction,
            },
            XmlNodeKind::Attribute { .. } => NodeType::Attribute,
            XmlNodeKind::Namespace { .. } => NodeType::Namespace,
        }
    }

    fn name(&self) -> Option<QName<'a>> {
        match self.kind {
            XmlNodeKind::Node(node) => {
                if node.is_element() {
                    Some(QName {
                        prefix: element_prefix(node),
                        local_part: node.tag_name().name(),
                    })
                } else if node.is_pi() {
                    node.pi().map(|pi| QName {
                        prefix: None,
                        local_part: pi.target,
                    })
                } else {
                    None
                }
            }
            // Unprefixed attributes have no namespace, so a namespaced one
            // was written with a named binding of its URI.
            XmlNodeKind::Attribute { parent, .. } => self.attribute().map(|attr| {
                let prefix = attr.namespace().and_then(|uri| {
                    parent
                        .namespaces()
                        .filter(|ns| ns.uri() == uri)
                        .find_map(|ns| ns.name())
                });
                QName {
                    prefix,
                    local_part: attr.name(),
                }
            }),
            XmlNodeKind::Namespace { .. } => self.namespace().map(|ns| QName {
                prefix: None,
                local_part: ns.name().unwrap_or(""),
            }),
        }
    }

    fn namespace_uri(&self) -> Option<&'a str> {
        match self.kind {
            XmlNodeKind::Node(node) if node.is_element() => node.tag_name().namespace(),
            XmlNodeKind::Attribute { .. } => self.attribute().and_then(|attr| attr.namespace()),
            _ => None,
        }
    }

    fn string_value(&self) -> String {
        match self.kind {
            XmlNodeKind::Node(node) => match node.node_type() {
                roxmltree::NodeType::Root | roxmltree::NodeType::Element => node
                    .descendants()
                    .filter(|n| n.is_text())
                    .filter_map(|n| n.text())
                    .collect(),
                roxmltree::NodeType::Text | roxmltree::NodeType::Comment => {
                    node.text().unwrap_or("").to_string()
                }
                roxmltree::NodeType::PI => node
                    .pi()
                    .and_then(|pi| pi.value)
                    .unwrap_or("")
                    .to_string(),
            },
            XmlNodeKind::Attribute { .. } => self
                .attribute()
                .map(|attr| attr.value().to_string())
                .unwrap_or_default(),
            XmlNodeKind::Namespace { .. } => self
                .namespace()
                .map(|ns| ns.uri().to_string())
                .unwrap_or_default(),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self.kind {
            XmlNodeKind::Node(parent) if parent.is_element() => {
                let order = self.order;
                Box::new((0..parent.attributes().len()).map(move |index| {
                    XmlNode::new(XmlNodeKind::Attribute { parent, index }, order)
                }))
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self.kind {
            XmlNodeKind::Node(node) => {
                let order = self.order;
                Box::new(
                    node.children()
                        .map(move |child| XmlNode::new(XmlNodeKind::Node(child), order)),
                )
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    fn namespace_nodes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self.kind {
            XmlNodeKind::Node(parent) if parent.is_element() => {
                let order = self.order;
                Box::new((0..parent.namespaces().count()).map(move |index| {
                    XmlNode::new(XmlNodeKind::Namespace { parent, index }, order)
                }))
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    fn parent(&self) -> Option<Self> {
        match self.kind {
            XmlNodeKind::Node(node) => node
                .parent()
                .map(|parent| self.with_kind(XmlNodeKind::Node(parent))),
            XmlNodeKind::Attribute { parent, .. } | XmlNodeKind::Namespace { parent, .. } => {
                Some(self.with_kind(XmlNodeKind::Node(parent)))
            }
        }
    }

    fn document_order_index(&self) -> usize {
        match self.kind {
            XmlNodeKind::Node(node) => self.tree_index(node),
            XmlNodeKind::Namespace { parent, index } => self.tree_index(parent) + 1 + index,
            XmlNodeKind::Attribute { parent, index } => {
                self.tree_index(parent) + 1 + parent.namespaces().count() + index
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_named<'a>(node: XmlNode<'a, 'a>, name: &str) -> XmlNode<'a, 'a> {
        node.children()
            .find(|n| n.name().map(|q| q.local_part == name).unwrap_or(false))
            .unwrap()
    }

    #[test]
    fn test_xml_node_attributes() {
        let xml = r#"<root><item id="123" status="active">Text</item></root>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let item = child_named(child_named(doc.root_node(), "root"), "item");

        let attrs: Vec<_> = item.attributes().collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].node_type(), NodeType::Attribute);
        assert_eq!(attrs[0].name().unwrap().local_part, "id");
        assert_eq!(attrs[0].string_value(), "123");
        assert_eq!(attrs[1].name().unwrap().local_part, "status");
        assert_eq!(attrs[1].string_value(), "active");
        assert_eq!(attrs[0].parent(), Some(item));
        assert!(attrs[0].children().next().is_none());
    }

    #[test]
    fn test_node_kinds_and_string_values() {
        let xml = "<?style sheet?><doc>a<!--note--><b>c</b></doc>";
        let doc = XmlDocument::parse(xml).unwrap();
        let root = doc.root_node();
        assert_eq!(root.node_type(), NodeType::Root);

        let kids: Vec<_> = root.children().collect();
        assert_eq!(kids[0].node_type(), NodeType::ProcessingInstruction);
        assert_eq!(kids[0].local_name(), "style");
        assert_eq!(kids[0].string_value(), "sheet");

        let element = doc.root_element();
        let types: Vec<_> = element.children().map(|n| n.node_type()).collect();
        assert_eq!(
            types,
            vec![NodeType::Text, NodeType::Comment, NodeType::Element]
        );
        // Comments do not contribute to an element's string-value.
        assert_eq!(element.string_value(), "ac");
        assert_eq!(root.string_value(), "ac");
    }

    #[test]
    fn test_namespaces_and_prefixes() {
        let xml = r#"<doc xmlns="urn:default" xmlns:s="urn:shapes"><s:rect s:w="3" h="4"/></doc>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let element = doc.root_element();
        assert_eq!(element.name().unwrap().prefix, None);
        assert_eq!(element.namespace_uri(), Some("urn:default"));

        let rect = element.children().next().unwrap();
        let name = rect.name().unwrap();
        assert_eq!((name.prefix, name.local_part), (Some("s"), "rect"));
        assert_eq!(rect.namespace_uri(), Some("urn:shapes"));

        let attrs: Vec<_> = rect.attributes().collect();
        assert_eq!(attrs[0].name().unwrap().prefix, Some("s"));
        assert_eq!(attrs[1].namespace_uri(), None);

        let bindings: Vec<_> = element
            .namespace_nodes()
            .map(|ns| (ns.local_name().to_string(), ns.string_value()))
            .collect();
        assert!(bindings.contains(&("s".to_string(), "urn:shapes".to_string())));
        assert!(bindings.contains(&(String::new(), "urn:default".to_string())));
    }

    #[test]
    fn test_element_keeps_its_written_prefix() {
        let xml = r#"<doc xmlns="urn:a" xmlns:p="urn:a"><x/><p:y p:k="1"/><p:z>t</p:z></doc>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let names: Vec<_> = doc
            .root_element()
            .children()
            .map(|n| n.name().unwrap())
            .map(|q| (q.prefix, q.local_part))
            .collect();
        assert_eq!(
            names,
            vec![(None, "x"), (Some("p"), "y"), (Some("p"), "z")]
        );
        assert_eq!(doc.root_element().name().unwrap().prefix, None);

        let y = doc.root_element().children().nth(1).unwrap();
        let attr = y.attributes().next().unwrap();
        assert_eq!(attr.name().unwrap().prefix, Some("p"));
    }

    #[test]
    fn test_document_order_index_is_strictly_increasing() {
        let xml = r#"<a xmlns:p="urn:p" x="1" y="2"><b z="3">t</b><c/></a>"#;
        let doc = XmlDocument::parse(xml).unwrap();

        let mut walk = Vec::new();
        let mut stack = vec![doc.root_node()];
        while let Some(node) = stack.pop() {
            walk.push(node);
            walk.extend(node.namespace_nodes());
            walk.extend(node.attributes());
            let mut kids: Vec<_> = node.children().collect();
            kids.reverse();
            stack.extend(kids);
        }

        let indexes: Vec<_> = walk.iter().map(|n| n.document_order_index()).collect();
        assert!(indexes.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(walk[0].document_root(), Some(doc.root_node()));
    }

    #[test]
    fn test_document_order_index_is_dense() {
        // Indexes stay small however large the document grows.
        let items = "<i n=\"1\"/>".repeat(5000);
        let xml = format!("<list>{}</list>", items);
        let doc = XmlDocument::parse(&xml).unwrap();

        let indexes: Vec<_> = doc
            .root_element()
            .children()
            .map(|n| n.document_order_index())
            .collect();
        assert_eq!(indexes.len(), 5000);
        // Each item takes its own slot, its namespace nodes and one attribute.
        let first = doc.root_element().children().next().unwrap();
        let step = 2 + first.namespace_nodes().count();
        assert!(indexes.windows(2).all(|w| w[1] == w[0] + step));
        let last_attr = doc
            .root_element()
            .children()
            .last()
            .and_then(|n| n.attributes().next())
            .unwrap();
        assert!(last_attr.document_order_index() < 5000 * (step + 1));
    }
}
