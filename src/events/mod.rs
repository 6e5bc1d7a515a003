//! The XML event model shared by the template reader, the dispatcher and
//! every output sink.

mod buffer;
mod writer;

pub use buffer::EventBuffer;
pub use writer::XmlWriterSink;

use crate::error::SqlXmlError;

/// An element or attribute name as written (`prefix:local`), together with
/// the namespace URI its prefix resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XmlName {
    pub namespace: Option<String>,
    pub qualified: String,
}

impl XmlName {
    pub fn new(namespace: Option<&str>, qualified: &str) -> Self {
        XmlName {
            namespace: namespace.map(str::to_string),
            qualified: qualified.to_string(),
        }
    }

    /// A name in no namespace.
    pub fn local(name: &str) -> Self {
        XmlName::new(None, name)
    }

    pub fn local_name(&self) -> &str {
        self.qualified
            .split_once(':')
            .map_or(self.qualified.as_str(), |(_, l)| l)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.qualified.split_once(':').map(|(p, _)| p)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: XmlName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: &str, value: &str) -> Self {
        Attribute {
            name: XmlName::local(name),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartDocument,
    EndDocument,
    StartPrefixMapping { prefix: String, uri: String },
    EndPrefixMapping { prefix: String },
    StartElement { name: XmlName, attributes: Vec<Attribute> },
    EndElement { name: XmlName },
    Characters(String),
    ProcessingInstruction { target: String, data: String },
}

impl Event {
    pub fn send_to(&self, sink: &mut dyn EventSink) -> Result<(), SqlXmlError> {
        match self {
            Event::StartDocument => sink.start_document(),
            Event::EndDocument => sink.end_document(),
            Event::StartPrefixMapping { prefix, uri } => sink.start_prefix_mapping(prefix, uri),
            Event::EndPrefixMapping { prefix } => sink.end_prefix_mapping(prefix),
            Event::StartElement { name, attributes } => sink.start_element(name, attributes),
            Event::EndElement { name } => sink.end_element(name),
            Event::Characters(text) => sink.characters(text),
            Event::ProcessingInstruction { target, data } => {
                sink.processing_instruction(target, data)
            }
        }
    }
}

/// A consumer of XML events. Object safe so that the active output can be
/// swapped at runtime.
pub trait EventSink {
    fn start_document(&mut self) -> Result<(), SqlXmlError> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), SqlXmlError> {
        Ok(())
    }

    /// Announces a namespace declaration for the next start element.
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<(), SqlXmlError>;

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<(), SqlXmlError>;

    fn start_element(&mut self, name: &XmlName, attributes: &[Attribute]) -> Result<(), SqlXmlError>;

    fn end_element(&mut self, name: &XmlName) -> Result<(), SqlXmlError>;

    fn characters(&mut self, text: &str) -> Result<(), SqlXmlError>;

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), SqlXmlError>;
}

/// Discards everything it receives.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn start_prefix_mapping(&mut self, _prefix: &str, _uri: &str) -> Result<(), SqlXmlError> {
        Ok(())
    }
    fn end_prefix_mapping(&mut self, _prefix: &str) -> Result<(), SqlXmlError> {
        Ok(())
    }
    fn start_element(&mut self, _name: &XmlName, _attributes: &[Attribute]) -> Result<(), SqlXmlError> {
        Ok(())
    }
    fn end_element(&mut self, _name: &XmlName) -> Result<(), SqlXmlError> {
        Ok(())
    }
    fn characters(&mut self, _text: &str) -> Result<(), SqlXmlError> {
        Ok(())
    }
    fn processing_instruction(&mut self, _target: &str, _data: &str) -> Result<(), SqlXmlError> {
        Ok(())
    }
}

/// Emits `<name>text</name>` with no attributes.
pub fn emit_text_element(sink: &mut dyn EventSink, name: &XmlName, text: &str) -> Result<(), SqlXmlError> {
    sink.start_element(name, &[])?;
    if !text.is_empty() {
        sink.characters(text)?;
    }
    sink.end_element(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_parts() {
        let name = XmlName::new(Some("urn:x"), "x:row");
        assert_eq!(name.local_name(), "row");
        assert_eq!(name.prefix(), Some("x"));
        assert_eq!(XmlName::local("row").prefix(), None);
    }
}
