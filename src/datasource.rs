//! The input document that path expressions in a template are evaluated
//! against, backed by `roxmltree`.
use crate::error::SqlXmlError;
use crate::events::{Attribute, EventSink, XmlName, XmlWriterSink};
use roxmltree::Node;
use sqlxml_xpath1::{DataSourceNode, NodeType, QName};
use std::hash::{Hash, Hasher};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Wrapper around roxmltree::Document providing data source capabilities
pub struct XmlDocument<'input> {
    doc: roxmltree::Document<'input>,
}

impl<'input> XmlDocument<'input> {
    pub fn parse(text: &'input str) -> Result<Self, SqlXmlError> {
        let doc = roxmltree::Document::parse(text)?;
        Ok(Self { doc })
    }

    pub fn root_node(&self) -> XmlNode<'_, 'input> {
        XmlNode::Element(self.doc.root())
    }
}

/// Either a tree node or an attribute. roxmltree keeps attributes as data on
/// their element, so they are addressed by owner and index.
#[derive(Debug, Clone, Copy)]
pub enum XmlNode<'a, 'input> {
    Element(Node<'a, 'input>),
    Attribute {
        parent: Node<'a, 'input>,
        index: usize,
    },
}

impl<'a, 'input> XmlNode<'a, 'input> {
    pub fn inner(&self) -> Option<Node<'a, 'input>> {
        match self {
            XmlNode::Element(node) => Some(*node),
            XmlNode::Attribute { .. } => None,
        }
    }
}

impl PartialEq for XmlNode<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (XmlNode::Element(a), XmlNode::Element(b)) => a.id() == b.id(),
            (
                XmlNode::Attribute {
                    parent: p1,
                    index: i1,
                },
                XmlNode::Attribute {
                    parent: p2,
                    index: i2,
                },
            ) => p1.id() == p2.id() && i1 == i2,
            _ => false,
        }
    }
}

impl Eq for XmlNode<'_, '_> {}

impl PartialOrd for XmlNode<'_, '_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for XmlNode<'_, '_> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (XmlNode::Element(a), XmlNode::Element(b)) => a.id().get().cmp(&b.id().get()),
            (
                XmlNode::Attribute {
                    parent: p1,
                    index: i1,
                },
                XmlNode::Attribute {
                    parent: p2,
                    index: i2,
                },
            ) => p1.id().get().cmp(&p2.id().get()).then(i1.cmp(i2)),
            // An element precedes its own attributes.
            (XmlNode::Element(e), XmlNode::Attribute { parent, .. }) => {
                if e.id() == parent.id() {
                    Ordering::Less
                } else {
                    e.id().get().cmp(&parent.id().get())
                }
            }
            (XmlNode::Attribute { parent, .. }, XmlNode::Element(e)) => {
                if parent.id() == e.id() {
                    Ordering::Greater
                } else {
                    parent.id().get().cmp(&e.id().get())
                }
            }
        }
    }
}

impl Hash for XmlNode<'_, '_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            XmlNode::Element(node) => {
                0u8.hash(state);
                node.id().hash(state);
            }
            XmlNode::Attribute { parent, index } => {
                1u8.hash(state);
                parent.id().hash(state);
                index.hash(state);
            }
        }
    }
}

impl<'a> DataSourceNode<'a> for XmlNode<'a, 'a> {
    fn node_type(&self) -> NodeType {
        match self {
            XmlNode::Element(node) => {
                if node.is_root() {
                    NodeType::Root
                } else if node.is_text() {
                    NodeType::Text
                } else if node.is_comment() {
                    NodeType::Comment
                } else if node.is_pi() {
                    NodeType::ProcessingInstruction
                } else {
                    NodeType::Element
                }
            }
            XmlNode::Attribute { .. } => NodeType::Attribute,
        }
    }

    fn name(&self) -> Option<QName<'a>> {
        match self {
            XmlNode::Element(node) if node.is_element() => Some(QName {
                prefix: None,
                local_part: node.tag_name().name(),
            }),
            XmlNode::Element(node) => node.pi().map(|pi| QName {
                prefix: None,
                local_part: pi.target,
            }),
            XmlNode::Attribute { parent, index } => {
                parent.attributes().nth(*index).map(|attr| QName {
                    prefix: (attr.namespace() == Some(XML_NAMESPACE)).then_some("xml"),
                    local_part: attr.name(),
                })
            }
        }
    }

    fn string_value(&self) -> String {
        match self {
            XmlNode::Element(node) => {
                if node.is_element() || node.is_root() {
                    node.descendants()
                        .filter(|n| n.is_text())
                        .filter_map(|n| n.text())
                        .collect()
                } else if node.is_pi() {
                    node.pi()
                        .and_then(|pi| pi.value)
                        .unwrap_or_default()
                        .to_string()
                } else {
                    node.text().unwrap_or_default().to_string()
                }
            }
            XmlNode::Attribute { parent, index } => parent
                .attributes()
                .nth(*index)
                .map(|attr| attr.value().to_string())
                .unwrap_or_default(),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Element(node) => {
                let parent = *node;
                let count = node.attributes().len();
                Box::new((0..count).map(move |index| XmlNode::Attribute { parent, index }))
            }
            XmlNode::Attribute { .. } => Box::new(std::iter::empty()),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Element(node) => Box::new(node.children().map(XmlNode::Element)),
            XmlNode::Attribute { .. } => Box::new(std::iter::empty()),
        }
    }

    fn parent(&self) -> Option<Self> {
        match self {
            XmlNode::Element(node) => node.parent().map(XmlNode::Element),
            XmlNode::Attribute { parent, .. } => Some(XmlNode::Element(*parent)),
        }
    }
}

fn qualified_name(node: Node<'_, '_>, namespace: Option<&str>, local: &str) -> String {
    match namespace.and_then(|ns| node.lookup_prefix(ns)) {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, local),
        _ => local.to_string(),
    }
}

/// Namespaces in scope on `node` that its parent element does not already
/// declare. For the first copied element every in-scope namespace counts.
fn new_namespaces<'n>(node: Node<'n, '_>, top: bool) -> Vec<(&'n str, &'n str)> {
    let parent = node.parent().filter(|p| p.is_element() && !top);
    node.namespaces()
        .filter(|ns| ns.name() != Some("xml"))
        .filter(|ns| {
            parent.is_none_or(|p| {
                !p.namespaces()
                    .any(|pns| pns.name() == ns.name() && pns.uri() == ns.uri())
            })
        })
        .map(|ns| (ns.name().unwrap_or(""), ns.uri()))
        .collect()
}

fn copy_tree(node: Node<'_, '_>, top: bool, sink: &mut dyn EventSink) -> Result<(), SqlXmlError> {
    if node.is_root() {
        for child in node.children() {
            copy_tree(child, true, sink)?;
        }
    } else if node.is_element() {
        let declared = new_namespaces(node, top);
        for (prefix, uri) in &declared {
            sink.start_prefix_mapping(prefix, uri)?;
        }
        let tag = node.tag_name();
        let name = XmlName::new(
            tag.namespace(),
            &qualified_name(node, tag.namespace(), tag.name()),
        );
        let attributes: Vec<Attribute> = node
            .attributes()
            .map(|a| Attribute {
                name: XmlName::new(a.namespace(), &qualified_name(node, a.namespace(), a.name())),
                value: a.value().to_string(),
            })
            .collect();
        sink.start_element(&name, &attributes)?;
        for child in node.children() {
            copy_tree(child, false, sink)?;
        }
        sink.end_element(&name)?;
        for (prefix, _) in declared.iter().rev() {
            sink.end_prefix_mapping(prefix)?;
        }
    } else if node.is_text() {
        sink.characters(node.text().unwrap_or_default())?;
    } else if let Some(pi) = node.pi() {
        sink.processing_instruction(pi.target, pi.value.unwrap_or_default())?;
    }
    // Comments are not copied.
    Ok(())
}

/// Writes the selected nodes to `sink` as events. Attribute nodes contribute
/// their value as text.
pub fn copy_nodes(nodes: &[XmlNode<'_, '_>], sink: &mut dyn EventSink) -> Result<(), SqlXmlError> {
    for node in nodes {
        match node {
            XmlNode::Element(n) => copy_tree(*n, true, sink)?,
            XmlNode::Attribute { parent, index } => {
                if let Some(attr) = parent.attributes().nth(*index) {
                    sink.characters(attr.value())?;
                }
            }
        }
    }
    Ok(())
}

/// Serialises the selected nodes as XML text.
pub fn serialize_nodes(nodes: &[XmlNode<'_, '_>]) -> Result<String, SqlXmlError> {
    let mut writer = XmlWriterSink::new(Vec::new());
    copy_nodes(nodes, &mut writer)?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| SqlXmlError::Output(format!("serialised XML is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventBuffer};

    fn child<'a>(node: XmlNode<'a, 'a>, name: &str) -> XmlNode<'a, 'a> {
        node.children()
            .find(|n| n.name().is_some_and(|q| q.local_part == name))
            .unwrap()
    }

    #[test]
    fn test_xml_node_attributes() {
        let doc = XmlDocument::parse(r#"<root><item id="123" status="active">Text</item></root>"#)
            .unwrap();
        let item = child(child(doc.root_node(), "root"), "item");

        let attrs: Vec<_> = item.attributes().collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].node_type(), NodeType::Attribute);
        assert_eq!(attrs[0].name().unwrap().local_part, "id");
        assert_eq!(attrs[1].string_value(), "active");
        assert_eq!(attrs[0].parent(), Some(item));
        assert!(item < attrs[0]);
    }

    #[test]
    fn test_copy_drops_comments_and_keeps_namespaces() {
        let doc = XmlDocument::parse(
            r#"<a:order xmlns:a="urn:a" n="1"><!-- c --><a:line>x</a:line><?pi data?></a:order>"#,
        )
        .unwrap();
        let order = child(doc.root_node(), "order");
        let mut out = EventBuffer::new();
        copy_nodes(&[order], &mut out).unwrap();
        let events: Vec<&Event> = out.events().collect();
        assert_eq!(
            events[0],
            &Event::StartPrefixMapping {
                prefix: "a".into(),
                uri: "urn:a".into()
            }
        );
        assert!(matches!(events[1], Event::StartElement { name, .. } if name.qualified == "a:order"));
        assert!(matches!(events[2], Event::StartElement { name, .. } if name.qualified == "a:line"));
        assert_eq!(events.len(), 8);
    }

    #[test]
    fn test_serialize_nodes() {
        let doc = XmlDocument::parse(r#"<r><p id="1">a &amp; b</p><p id="2"/></r>"#).unwrap();
        let r = child(doc.root_node(), "r");
        let ps: Vec<_> = r.children().collect();
        assert_eq!(
            serialize_nodes(&ps).unwrap(),
            r#"<p id="1">a &amp; b</p><p id="2"></p>"#
        );
    }
}
