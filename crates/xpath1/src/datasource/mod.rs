//! The read-only tree model the evaluator navigates.
use std::hash::Hash;

/// A qualified name, consisting of an optional prefix and a local part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QName<'a> {
    pub prefix: Option<&'a str>,
    pub local_part: &'a str,
}

/// Node kinds of the XPath 1.0 data model. Namespace nodes are not modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

/// A handle to one node of a navigable tree.
///
/// Handles are small `Copy` values; `Ord` must follow document order so that
/// node-sets can be sorted and de-duplicated. `'a` is the lifetime of the
/// underlying document.
pub trait DataSourceNode<'a>:
    std::fmt::Debug + Clone + Copy + PartialEq + Eq + Hash + PartialOrd + Ord
{
    fn node_type(&self) -> NodeType;

    /// Element and attribute names, or the target of a processing instruction.
    fn name(&self) -> Option<QName<'a>>;

    /// The XPath string-value: concatenated descendant text for elements and
    /// the root, the literal value for every other kind.
    fn string_value(&self) -> String;

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// `None` only for the root. Attributes report their owner element.
    fn parent(&self) -> Option<Self>;
}

// Test utilities - publicly available for integration testing in downstream crates
pub mod tests {
    use super::*;

    #[derive(Debug)]
    struct MockNodeData {
        node_type: NodeType,
        prefix: Option<&'static str>,
        name: Option<&'static str>,
        text: String,
        parent: Option<usize>,
        children: Vec<usize>,
        attributes: Vec<usize>,
    }

    /// An arena-backed tree. Node ids are allocated in document order, which
    /// makes `Ord` on [`MockNode`] a plain id comparison.
    #[derive(Debug, Default)]
    pub struct MockTree {
        nodes: Vec<MockNodeData>,
    }

    #[derive(Debug, Clone, Copy)]
    pub struct MockNode<'a> {
        pub id: usize,
        pub tree: &'a MockTree,
    }

    impl PartialEq for MockNode<'_> {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }
    impl Eq for MockNode<'_> {}
    impl PartialOrd for MockNode<'_> {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for MockNode<'_> {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            self.id.cmp(&other.id)
        }
    }
    impl Hash for MockNode<'_> {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            self.id.hash(state);
        }
    }

    impl MockTree {
        pub fn new() -> Self {
            let mut tree = MockTree::default();
            tree.push(NodeType::Root, None, String::new(), None);
            tree
        }

        pub fn root(&self) -> MockNode<'_> {
            MockNode { id: 0, tree: self }
        }

        pub fn node(&self, id: usize) -> MockNode<'_> {
            MockNode { id, tree: self }
        }

        fn push(
            &mut self,
            node_type: NodeType,
            name: Option<&'static str>,
            text: String,
            parent: Option<usize>,
        ) -> usize {
            let (prefix, name) = match name.and_then(|n| n.split_once(':')) {
                Some((p, l)) => (Some(p), Some(l)),
                None => (None, name),
            };
            let id = self.nodes.len();
            self.nodes.push(MockNodeData {
                node_type,
                prefix,
                name,
                text,
                parent,
                children: Vec::new(),
                attributes: Vec::new(),
            });
            id
        }

        /// Appends an element under `parent` and returns its id.
        pub fn element(&mut self, parent: usize, name: &'static str) -> usize {
            let id = self.push(NodeType::Element, Some(name), String::new(), Some(parent));
            self.nodes[parent].children.push(id);
            id
        }

        pub fn attribute(&mut self, owner: usize, name: &'static str, value: &str) -> usize {
            let id = self.push(NodeType::Attribute, Some(name), value.to_string(), Some(owner));
            self.nodes[owner].attributes.push(id);
            id
        }

        pub fn text(&mut self, parent: usize, value: &str) -> usize {
            let id = self.push(NodeType::Text, None, value.to_string(), Some(parent));
            self.nodes[parent].children.push(id);
            id
        }

        pub fn comment(&mut self, parent: usize, value: &str) -> usize {
            let id = self.push(NodeType::Comment, None, value.to_string(), Some(parent));
            self.nodes[parent].children.push(id);
            id
        }

        fn collect_text(&self, id: usize, out: &mut String) {
            for &child in &self.nodes[id].children {
                match self.nodes[child].node_type {
                    NodeType::Text => out.push_str(&self.nodes[child].text),
                    NodeType::Element => self.collect_text(child, out),
                    _ => {}
                }
            }
        }
    }

    impl<'a> DataSourceNode<'a> for MockNode<'a> {
        fn node_type(&self) -> NodeType {
            self.tree.nodes[self.id].node_type
        }

        fn name(&self) -> Option<QName<'a>> {
            let data = &self.tree.nodes[self.id];
            data.name.map(|local_part| QName { prefix: data.prefix, local_part })
        }

        fn string_value(&self) -> String {
            match self.node_type() {
                NodeType::Root | NodeType::Element => {
                    let mut out = String::new();
                    self.tree.collect_text(self.id, &mut out);
                    out
                }
                _ => self.tree.nodes[self.id].text.clone(),
            }
        }

        fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            Box::new(tree.nodes[self.id].attributes.iter().map(move |&id| MockNode { id, tree }))
        }

        fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            Box::new(tree.nodes[self.id].children.iter().map(move |&id| MockNode { id, tree }))
        }

        fn parent(&self) -> Option<Self> {
            self.tree.nodes[self.id].parent.map(|id| MockNode { id, tree: self.tree })
        }
    }

    /// Builds:
    /// ```text
    /// <order id="o1">
    ///   <item sku="a" qty="2">Apple</item>
    ///   <!-- note -->
    ///   <item sku="b" qty="5">Banana</item>
    ///   <total>7</total>
    /// </order>
    /// ```
    pub fn create_test_tree() -> MockTree {
        let mut tree = MockTree::new();
        let order = tree.element(0, "order");
        tree.attribute(order, "id", "o1");
        let apple = tree.element(order, "item");
        tree.attribute(apple, "sku", "a");
        tree.attribute(apple, "qty", "2");
        tree.text(apple, "Apple");
        tree.comment(order, " note ");
        let banana = tree.element(order, "item");
        tree.attribute(banana, "sku", "b");
        tree.attribute(banana, "qty", "5");
        tree.text(banana, "Banana");
        let total = tree.element(order, "total");
        tree.text(total, "7");
        tree
    }

}
