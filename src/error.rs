use crate::session::SessionError;
use sqlxml_xpath1::XPathError;
use std::sync::Arc;
use thiserror::Error;

/// A position in a template, used to tag errors raised by directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub system_id: Arc<str>,
    pub line: usize,
    pub col: usize,
}

impl Location {
    pub fn new(system_id: Arc<str>, line: usize, col: usize) -> Self {
        Location {
            system_id,
            line,
            col,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Location {
            system_id: Arc::from("unknown"),
            line: 0,
            col: 0,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.system_id, self.line, self.col)
    }
}

#[derive(Error, Debug)]
pub enum SqlXmlError {
    #[error("XML parsing error: {0}")]
    XmlParse(#[from] roxmltree::Error),

    #[error("Quick-XML error: {0}")]
    QuickXml(#[from] quick_xml::Error),

    #[error("XPath evaluation error: {0}")]
    XPath(#[from] XPathError),

    /// Missing mandatory attribute or content, bad nesting, undeclared prefix.
    #[error("Template structure error: {0}")]
    Structure(String),

    /// A path expression could not be evaluated to the value a directive needs.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// A parameter type is not valid for its binding mode.
    #[error("Binding error: {0}")]
    Binding(String),

    #[error("Error executing statement '{statement}': {source}")]
    Execution {
        statement: String,
        #[source]
        source: SessionError,
    },

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{location}: {source}")]
    Located {
        location: Location,
        #[source]
        source: Box<SqlXmlError>,
    },
}

impl SqlXmlError {
    /// Tags the error with a template location unless it already carries one.
    pub fn located(self, location: &Location) -> Self {
        match self {
            SqlXmlError::Located { .. } => self,
            other => SqlXmlError::Located {
                location: location.clone(),
                source: Box::new(other),
            },
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            SqlXmlError::Located { location, .. } => Some(location),
            _ => None,
        }
    }

    /// The error without its location wrapper.
    pub fn root(&self) -> &SqlXmlError {
        match self {
            SqlXmlError::Located { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for SqlXmlError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        SqlXmlError::QuickXml(quick_xml::Error::InvalidAttr(e))
    }
}

impl From<std::str::Utf8Error> for SqlXmlError {
    fn from(e: std::str::Utf8Error) -> Self {
        SqlXmlError::Structure(format!("template is not valid UTF-8: {}", e))
    }
}

impl From<serde_json::Error> for SqlXmlError {
    fn from(e: serde_json::Error) -> Self {
        SqlXmlError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_is_applied_once() {
        let outer = Location::new(Arc::from("outer.xml"), 9, 9);
        let inner = Location::new(Arc::from("t.xml"), 3, 14);
        let err = SqlXmlError::Structure("missing text".into())
            .located(&inner)
            .located(&outer);
        assert_eq!(err.location(), Some(&inner));
        assert!(matches!(err.root(), SqlXmlError::Structure(_)));
        assert_eq!(
            err.to_string(),
            "t.xml:3:14: Template structure error: missing text"
        );
    }
}
