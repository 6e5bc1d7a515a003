use super::{Attribute, EventSink, XmlName};
use crate::error::SqlXmlError;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event as XmlEvent};
use std::io::Write;

/// Serialises events as XML text. Prefix mappings announced before a start
/// element become `xmlns` attributes on that element. Any other prefix an
/// element or attribute uses is declared on the element unless an open
/// ancestor already binds it to the same URI.
pub struct XmlWriterSink<W: Write> {
    writer: Writer<W>,
    pending_namespaces: Vec<(String, String)>,
    /// Mappings announced and not yet ended, innermost last.
    in_scope: Vec<(String, String)>,
    /// Declarations written on each open output element.
    open: Vec<Vec<(String, String)>>,
    declaration: bool,
}

impl<W: Write> XmlWriterSink<W> {
    pub fn new(inner: W) -> Self {
        XmlWriterSink {
            writer: Writer::new(inner),
            pending_namespaces: Vec::new(),
            in_scope: Vec::new(),
            open: Vec::new(),
            declaration: false,
        }
    }

    /// Writes an `<?xml version="1.0" encoding="UTF-8"?>` declaration on
    /// start-document.
    pub fn with_declaration(mut self) -> Self {
        self.declaration = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    /// The URI the output currently binds `prefix` to. The empty prefix
    /// starts out bound to no namespace.
    fn declared(&self, prefix: &str) -> Option<&str> {
        self.open
            .iter()
            .rev()
            .flat_map(|decls| decls.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
            .or(if prefix.is_empty() { Some("") } else { None })
    }

    /// The binding a name needs in the output, if any.
    fn required(&self, name: &XmlName, is_attribute: bool) -> Option<(String, String)> {
        let prefix = name.prefix().unwrap_or("");
        if prefix == "xml" || prefix == "xmlns" || (is_attribute && prefix.is_empty()) {
            return None;
        }
        let uri = match &name.namespace {
            Some(uri) => uri.clone(),
            None if prefix.is_empty() => String::new(),
            None => self
                .in_scope
                .iter()
                .rev()
                .find(|(p, _)| p == prefix)
                .map(|(_, uri)| uri.clone())?,
        };
        Some((prefix.to_string(), uri))
    }

    fn write(&mut self, event: XmlEvent<'_>) -> Result<(), SqlXmlError> {
        self.writer
            .write_event(event)
            .map_err(|e| SqlXmlError::Output(e.to_string()))
    }
}

impl<W: Write> EventSink for XmlWriterSink<W> {
    fn start_document(&mut self) -> Result<(), SqlXmlError> {
        if self.declaration {
            self.write(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), SqlXmlError> {
        self.writer
            .get_mut()
            .flush()
            .map_err(|e| SqlXmlError::Output(e.to_string()))
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<(), SqlXmlError> {
        self.pending_namespaces
            .push((prefix.to_string(), uri.to_string()));
        self.in_scope.push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<(), SqlXmlError> {
        if let Some(i) = self.in_scope.iter().rposition(|(p, _)| p == prefix) {
            self.in_scope.remove(i);
        }
        if let Some(i) = self.pending_namespaces.iter().rposition(|(p, _)| p == prefix) {
            self.pending_namespaces.remove(i);
        }
        Ok(())
    }

    fn start_element(&mut self, name: &XmlName, attributes: &[Attribute]) -> Result<(), SqlXmlError> {
        let mut declarations: Vec<(String, String)> = self.pending_namespaces.drain(..).collect();
        let used = std::iter::once(self.required(name, false))
            .chain(attributes.iter().map(|a| self.required(&a.name, true)))
            .flatten()
            .collect::<Vec<_>>();
        for (prefix, uri) in used {
            if declarations.iter().any(|(p, _)| *p == prefix) {
                continue;
            }
            if self.declared(&prefix) != Some(uri.as_str()) {
                declarations.push((prefix, uri));
            }
        }

        let mut start = BytesStart::new(name.qualified.as_str());
        for (prefix, uri) in &declarations {
            let key = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{}", prefix)
            };
            start.push_attribute((key.as_str(), uri.as_str()));
        }
        for attr in attributes {
            start.push_attribute((attr.name.qualified.as_str(), attr.value.as_str()));
        }
        self.open.push(declarations);
        self.write(XmlEvent::Start(start))
    }

    fn end_element(&mut self, name: &XmlName) -> Result<(), SqlXmlError> {
        self.open.pop();
        self.write(XmlEvent::End(BytesEnd::new(name.qualified.as_str())))
    }

    fn characters(&mut self, text: &str) -> Result<(), SqlXmlError> {
        self.write(XmlEvent::Text(BytesText::new(text)))
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), SqlXmlError> {
        let content = if data.is_empty() {
            target.to_string()
        } else {
            format!("{} {}", target, data)
        };
        self.write(XmlEvent::PI(BytesPI::new(content)))
    }
}
