//! The directive vocabulary. Each element name maps to a handler type through
//! static registration tables; a fresh handler is built for every occurrence.

pub mod columns;
pub mod connection;
pub mod literals;
pub mod parameter;
pub mod result_set;
pub mod row_iterator;
pub mod statement;

use crate::context::ExecutionContext;
use crate::error::{Location, SqlXmlError};
use crate::events::{Attribute, EventBuffer, XmlName};
use columns::{ColumnGetter, Exclude, GetColumn, GetColumnMeta, GetColumns, UpdateCount};
use connection::{Config, Connection, Datasource, Execute};
use literals::{AttributeDirective, CopyOf, ForEach, Text, ValueOf};
use parameter::ParameterSpec;
use result_set::{NoResults, ResultSet};
use row_iterator::{ColumnIterator, RowIterator};
use statement::{Statement, StatementBuilder};

/// The namespace every directive element lives in.
pub const SQL_NAMESPACE_URI: &str = "http://orbeon.org/oxf/xml/sql";

/// What the dispatcher does with a directive's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Body events are processed live: literal content goes to the output,
    /// nested directives run.
    Forward,
    /// Body events are recorded and handed to `end` for later replay.
    Buffer,
    /// Characters and child directives are fed to the directive itself.
    /// Anything else in the body is an error.
    Consume,
}

/// The start tag of a directive, as seen by its handler.
pub struct Element<'e> {
    pub name: &'e XmlName,
    pub attributes: &'e [Attribute],
    pub location: &'e Location,
    /// The parent directive consumes this element's result instead of
    /// letting it reach the output.
    pub consumed: bool,
}

impl Element<'_> {
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace.is_none() && a.name.qualified == local)
            .map(|a| a.value.as_str())
    }

    pub fn required(&self, local: &str) -> Result<&str, SqlXmlError> {
        self.attr(local).ok_or_else(|| {
            SqlXmlError::Structure(format!(
                "missing mandatory attribute '{}' on <{}>",
                local, self.name.qualified
            ))
        })
    }

    /// Parses an `ancestor` attribute. Absent means the innermost level;
    /// present values must be 1 or more.
    pub fn ancestor_level(&self) -> Result<usize, SqlXmlError> {
        match self.attr("ancestor") {
            None => Ok(0),
            Some(text) => match text.trim().parse::<usize>() {
                Ok(n) if n >= 1 => Ok(n),
                _ => Err(SqlXmlError::Structure(format!(
                    "invalid ancestor level '{}': must be an integer of 1 or more",
                    text
                ))),
            },
        }
    }

    pub fn flag(&self, local: &str) -> bool {
        matches!(self.attr(local), Some("true" | "yes" | "1"))
    }
}

/// What a finished child directive hands to its consuming parent.
#[derive(Debug)]
pub enum ChildOutput {
    Parameter(ParameterSpec),
    Statement(StatementBuilder),
    Getter(ColumnGetter),
    Exclude(String),
}

impl ChildOutput {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            ChildOutput::Parameter(_) => "parameter",
            ChildOutput::Statement(_) => "sql",
            ChildOutput::Getter(_) => "column getter",
            ChildOutput::Exclude(_) => "exclude",
        }
    }
}

pub trait Directive {
    fn start(&mut self, ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError>;

    /// Character content of a consumed body.
    fn characters(&mut self, _ctx: &mut ExecutionContext<'_>, _text: &str) -> Result<(), SqlXmlError> {
        Ok(())
    }

    /// Result of a child directive of a consumed body.
    fn accept(&mut self, _ctx: &mut ExecutionContext<'_>, child: ChildOutput) -> Result<(), SqlXmlError> {
        Err(SqlXmlError::Structure(format!(
            "a {} is not allowed here",
            child.kind()
        )))
    }

    /// `body` is the recorded body when `start` asked for buffering.
    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError>;

    /// Directives valid only directly inside this one.
    fn children(&self) -> &'static [Registration] {
        &[]
    }
}

pub type Factory = fn(&str) -> Box<dyn Directive>;

pub struct Registration {
    pub name: &'static str,
    pub create: Factory,
}

const fn register(name: &'static str, create: Factory) -> Registration {
    Registration { name, create }
}

/// Directives valid anywhere.
pub static GLOBAL: &[Registration] = &[
    register("config", |_| Box::new(Config)),
    register("connection", |_| Box::new(Connection::default())),
    register("datasource", |_| Box::new(Datasource::default())),
    register("execute", |_| Box::new(Execute)),
    register("query", Statement::create),
    register("update", Statement::create),
    register("call", Statement::create),
    register("result-set", |_| Box::new(ResultSet::default())),
    register("no-results", |_| Box::new(NoResults)),
    register("row-iterator", |_| Box::new(RowIterator)),
    register("column-iterator", |_| Box::new(ColumnIterator)),
    register("for-each", |_| Box::new(ForEach::default())),
    register("get-column", GetColumn::create),
    register("get-column-value", GetColumn::create),
    register("get-string", GetColumn::create),
    register("get-int", GetColumn::create),
    register("get-integer", GetColumn::create),
    register("get-double", GetColumn::create),
    register("get-float", GetColumn::create),
    register("get-decimal", GetColumn::create),
    register("get-boolean", GetColumn::create),
    register("get-date", GetColumn::create),
    register("get-timestamp", GetColumn::create),
    register("get-base64binary", GetColumn::create),
    register("get-xml", GetColumn::create),
    register("get-columns", |_| Box::new(GetColumns::default())),
    register("get-column-name", GetColumnMeta::create),
    register("get-column-index", GetColumnMeta::create),
    register("get-column-type", GetColumnMeta::create),
    register("update-count", |_| Box::new(UpdateCount)),
    register("value-of", |_| Box::new(ValueOf::default())),
    register("copy-of", |_| Box::new(CopyOf::default())),
    register("text", |_| Box::new(Text::default())),
    register("attribute", |_| Box::new(AttributeDirective)),
];

/// Children of `query`, `update`, `call` and `sql`.
pub static STATEMENT_CHILDREN: &[Registration] = &[
    register("sql", |_| Box::new(statement::SqlText::default())),
    register("parameter", |_| Box::new(parameter::Parameter::default())),
    register("param", |_| Box::new(parameter::Parameter::default())),
];

/// Children of `get-columns`.
pub static GET_COLUMNS_CHILDREN: &[Registration] = &[register("exclude", |_| Box::new(Exclude::default()))];

/// Structural children recognised inside a row iterator body.
pub static ROW_CHILDREN: &[Registration] = &[
    register("group", |_| Box::new(row_iterator::Group::default())),
    register("member", |_| Box::new(row_iterator::Member::default())),
];

pub fn find(table: &'static [Registration], name: &str) -> Option<&'static Registration> {
    table.iter().find(|r| r.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_registration_names_are_unique() {
        let mut seen = HashSet::new();
        for table in [GLOBAL, STATEMENT_CHILDREN, GET_COLUMNS_CHILDREN, ROW_CHILDREN] {
            for r in table {
                assert!(seen.insert(r.name), "duplicate directive '{}'", r.name);
            }
        }
        assert!(find(GLOBAL, "row-iterator").is_some());
        assert!(find(GLOBAL, "group").is_none());
    }

    #[test]
    fn test_element_attributes() {
        let name = XmlName::new(Some(SQL_NAMESPACE_URI), "sql:get-column");
        let attributes = vec![
            Attribute::new("column", "id"),
            Attribute::new("ancestor", "0"),
            Attribute {
                name: XmlName::new(Some("urn:x"), "x:column"),
                value: "other".into(),
            },
        ];
        let location = Location::new(Arc::from("t.xml"), 1, 1);
        let element = Element {
            name: &name,
            attributes: &attributes,
            location: &location,
            consumed: false,
        };
        assert_eq!(element.attr("column"), Some("id"));
        assert!(element.required("type").is_err());
        assert!(matches!(
            element.ancestor_level(),
            Err(SqlXmlError::Structure(_))
        ));
    }
}
