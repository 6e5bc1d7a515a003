//! Reads template text into a replayable event buffer.

use crate::error::{Location, SqlXmlError};
use crate::events::{Attribute, Event, EventBuffer, XmlName};
use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::name::{PrefixDeclaration, ResolveResult};
use std::sync::Arc;

/// A parsed template, ready to be run any number of times.
#[derive(Debug, Clone)]
pub struct Template {
    events: EventBuffer,
}

impl Template {
    pub fn parse(source: &str, system_id: &str) -> Result<Self, SqlXmlError> {
        Ok(Template {
            events: read_template(source, system_id)?,
        })
    }

    pub fn events(&self) -> &EventBuffer {
        &self.events
    }
}

/// Maps byte offsets to 1-based line and column numbers.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        LineIndex { line_starts }
    }

    fn position(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }
}

struct OpenElement {
    name: XmlName,
    declared: Vec<String>,
}

/// Parses `source` into events. Namespace declarations become prefix
/// mapping events around their element; comments, the XML declaration and
/// text outside the document element are dropped.
pub fn read_template(source: &str, system_id: &str) -> Result<EventBuffer, SqlXmlError> {
    let system_id: Arc<str> = Arc::from(system_id);
    let lines = LineIndex::new(source);
    let mut reader = NsReader::from_str(source);
    reader.config_mut().expand_empty_elements = true;

    let mut buffer = EventBuffer::anchored(Location::new(system_id.clone(), 1, 1));
    let mut stack: Vec<OpenElement> = Vec::new();
    buffer.record(Event::StartDocument, Location::new(system_id.clone(), 1, 1));

    loop {
        let offset = reader.buffer_position() as usize;
        let (line, col) = lines.position(offset.min(source.len()));
        let location = Location::new(system_id.clone(), line, col);

        let (resolved, event) = reader.read_resolved_event()?;
        let namespace = match resolved {
            ResolveResult::Bound(ns) => Some(std::str::from_utf8(ns.0)?.to_string()),
            ResolveResult::Unbound => None,
            ResolveResult::Unknown(prefix) => {
                return Err(SqlXmlError::Structure(format!(
                    "undeclared namespace prefix '{}'",
                    String::from_utf8_lossy(&prefix)
                ))
                .located(&location));
            }
        };

        match event {
            XmlEvent::Start(e) => {
                let open = start_element(&reader, &e, namespace, &location, &mut buffer)?;
                stack.push(open);
            }
            XmlEvent::Empty(e) => {
                let open = start_element(&reader, &e, namespace, &location, &mut buffer)?;
                end_element(open, &location, &mut buffer);
            }
            XmlEvent::End(_) => {
                let open = stack.pop().ok_or_else(|| {
                    SqlXmlError::Structure("unbalanced end tag".to_string()).located(&location)
                })?;
                end_element(open, &location, &mut buffer);
            }
            XmlEvent::Text(e) => {
                if !stack.is_empty() {
                    buffer.record(Event::Characters(e.unescape()?.into_owned()), location);
                }
            }
            XmlEvent::CData(e) => {
                if !stack.is_empty() {
                    let bytes = e.into_inner();
                    buffer.record(
                        Event::Characters(std::str::from_utf8(&bytes)?.to_string()),
                        location,
                    );
                }
            }
            XmlEvent::PI(e) => {
                let target = std::str::from_utf8(e.target())?.to_string();
                let data = std::str::from_utf8(e.content())?.trim().to_string();
                buffer.record(Event::ProcessingInstruction { target, data }, location);
            }
            XmlEvent::Eof => break,
            // Comments, declarations and doctypes carry nothing to execute.
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SqlXmlError::Structure("unexpected end of template".to_string()));
    }
    let end = lines.position(source.len());
    buffer.record(Event::EndDocument, Location::new(system_id, end.0, end.1));
    Ok(buffer)
}

fn start_element(
    reader: &NsReader<&[u8]>,
    e: &BytesStart<'_>,
    namespace: Option<String>,
    location: &Location,
    buffer: &mut EventBuffer,
) -> Result<OpenElement, SqlXmlError> {
    let mut declared = Vec::new();
    let mut attributes = Vec::new();

    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?.into_owned();
        match attr.key.as_namespace_binding() {
            Some(PrefixDeclaration::Default) => {
                buffer.record(
                    Event::StartPrefixMapping {
                        prefix: String::new(),
                        uri: value,
                    },
                    location.clone(),
                );
                declared.push(String::new());
            }
            Some(PrefixDeclaration::Named(prefix)) => {
                let prefix = std::str::from_utf8(prefix)?.to_string();
                buffer.record(
                    Event::StartPrefixMapping {
                        prefix: prefix.clone(),
                        uri: value,
                    },
                    location.clone(),
                );
                declared.push(prefix);
            }
            None => {
                let qualified = std::str::from_utf8(attr.key.as_ref())?;
                // Unprefixed attributes are in no namespace.
                let attr_ns = match attr.key.prefix() {
                    Some(_) => match reader.resolve_attribute(attr.key).0 {
                        ResolveResult::Bound(ns) => Some(std::str::from_utf8(ns.0)?.to_string()),
                        ResolveResult::Unbound => None,
                        ResolveResult::Unknown(prefix) => {
                            return Err(SqlXmlError::Structure(format!(
                                "undeclared namespace prefix '{}'",
                                String::from_utf8_lossy(&prefix)
                            ))
                            .located(location));
                        }
                    },
                    None => None,
                };
                attributes.push(Attribute {
                    name: XmlName::new(attr_ns.as_deref(), qualified),
                    value,
                });
            }
        }
    }

    let name = XmlName {
        namespace,
        qualified: std::str::from_utf8(e.name().as_ref())?.to_string(),
    };
    buffer.record(
        Event::StartElement {
            name: name.clone(),
            attributes,
        },
        location.clone(),
    );
    Ok(OpenElement { name, declared })
}

fn end_element(open: OpenElement, location: &Location, buffer: &mut EventBuffer) {
    buffer.record(Event::EndElement { name: open.name }, location.clone());
    for prefix in open.declared.into_iter().rev() {
        buffer.record(Event::EndPrefixMapping { prefix }, location.clone());
    }
}

/// Parses stored XML text (a column value) into the events of its content,
/// without document events.
pub fn read_fragment(text: &str) -> Result<EventBuffer, SqlXmlError> {
    let body = strip_declaration(text);
    let wrapped = format!("<fragment>{}</fragment>", body);
    let events = read_template(&wrapped, "fragment")?;

    let mut content = EventBuffer::new();
    let total = events.len();
    // Skip start-document, the wrapper start and end, and end-document.
    for (i, (event, location)) in events.iter().enumerate() {
        if i >= 2 && i + 2 < total {
            content.record(event.clone(), location.clone());
        }
    }
    Ok(content)
}

fn strip_declaration(text: &str) -> &str {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return &trimmed[end + 2..];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(source: &str) -> Vec<Event> {
        read_template(source, "t.xml").unwrap().events().cloned().collect()
    }

    #[test]
    fn test_prefix_mappings_wrap_their_element() {
        let got = events(r#"<r xmlns:s="urn:s"><s:q a="1"/></r>"#);
        assert_eq!(got[0], Event::StartDocument);
        assert_eq!(
            got[1],
            Event::StartPrefixMapping {
                prefix: "s".into(),
                uri: "urn:s".into()
            }
        );
        assert!(matches!(&got[2], Event::StartElement { name, .. } if name.qualified == "r"));
        match &got[3] {
            Event::StartElement { name, attributes } => {
                assert_eq!(name.namespace.as_deref(), Some("urn:s"));
                assert_eq!(name.local_name(), "q");
                assert_eq!(attributes, &vec![Attribute::new("a", "1")]);
            }
            other => panic!("Expected start element, got {:?}", other),
        }
        assert!(matches!(&got[4], Event::EndElement { name } if name.qualified == "s:q"));
        assert!(matches!(&got[5], Event::EndElement { name } if name.qualified == "r"));
        assert_eq!(got[6], Event::EndPrefixMapping { prefix: "s".into() });
        assert_eq!(got[7], Event::EndDocument);
    }

    #[test]
    fn test_text_entities_and_cdata() {
        let got = events("<r>a &amp; b<![CDATA[<c>]]><!-- dropped --></r>");
        let text: Vec<&str> = got
            .iter()
            .filter_map(|e| match e {
                Event::Characters(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, vec!["a & b", "<c>"]);
    }

    #[test]
    fn test_locations_track_lines() {
        let buffer = read_template("<r>\n  <x/>\n</r>", "t.xml").unwrap();
        let (_, location) = buffer
            .iter()
            .find(|(e, _)| matches!(e, Event::StartElement { name, .. } if name.qualified == "x"))
            .unwrap();
        assert_eq!((location.line, location.col), (2, 3));
        assert_eq!(&*location.system_id, "t.xml");
    }

    #[test]
    fn test_undeclared_prefix_is_rejected() {
        let err = read_template("<r><q:x/></r>", "t.xml").unwrap_err();
        assert!(matches!(err.root(), SqlXmlError::Structure(_)));
        assert!(err.location().is_some());
    }

    #[test]
    fn test_read_fragment() {
        let fragment = read_fragment(r#"<?xml version="1.0"?><a>1</a><b/>"#).unwrap();
        let got: Vec<Event> = fragment.events().cloned().collect();
        assert_eq!(got.len(), 5);
        assert!(matches!(&got[0], Event::StartElement { name, .. } if name.qualified == "a"));
        assert!(matches!(&got[4], Event::EndElement { name } if name.qualified == "b"));
    }
}
