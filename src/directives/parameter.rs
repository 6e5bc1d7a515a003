//! `parameter` / `param`: one bound or substituted statement parameter, and
//! the rules turning it into values at execution time.

use super::columns::ColumnGetter;
use super::{BodyMode, ChildOutput, Directive, Element};
use crate::context::ExecutionContext;
use crate::datasource::serialize_nodes;
use crate::error::{Location, SqlXmlError};
use crate::events::EventBuffer;
use crate::session::{BoundParameter, Direction, SqlValue, StorageHint};
use crate::types::{LogicalType, convert, parse_boolean, parse_date, parse_date_time, parse_integer, value_text};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sqlxml_xpath1::{DataSourceNode, XPathValue};
use std::path::PathBuf;

/// Where a parameter's value comes from.
#[derive(Debug, Clone)]
pub enum ParameterSource {
    Select(String),
    Literal(String),
    Column(ColumnGetter),
}

#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub logical: LogicalType,
    pub storage: StorageHint,
    pub direction: Direction,
    pub source: Option<ParameterSource>,
    pub separator: Option<String>,
    /// Splice the value into the statement text instead of binding it.
    pub replace: bool,
    pub null_if: Option<String>,
    /// Byte offset in the statement text this parameter was declared at.
    pub offset: usize,
    pub location: Location,
}

impl ParameterSpec {
    pub fn from_element(element: &Element<'_>) -> Result<Self, SqlXmlError> {
        let type_name = element.required("type")?;
        let logical = LogicalType::parse(type_name)
            .ok_or_else(|| SqlXmlError::Structure(format!("unknown parameter type '{}'", type_name)))?;
        let storage = match element.attr("sql-type").map(str::to_ascii_lowercase).as_deref() {
            Some("clob") => StorageHint::Clob,
            Some("blob") => StorageHint::Blob,
            _ => StorageHint::Default,
        };
        let direction = match element.attr("direction").map(str::to_ascii_lowercase).as_deref() {
            None | Some("in") => Direction::In,
            Some("out") => Direction::Out,
            Some("inout") => Direction::InOut,
            Some(other) => {
                return Err(SqlXmlError::Structure(format!(
                    "invalid parameter direction '{}'",
                    other
                )));
            }
        };
        let source = match (element.attr("select"), element.attr("value")) {
            (Some(_), Some(_)) => {
                return Err(SqlXmlError::Structure(
                    "a parameter takes either 'select' or 'value', not both".to_string(),
                ));
            }
            (Some(select), None) => Some(ParameterSource::Select(select.to_string())),
            (None, Some(value)) => Some(ParameterSource::Literal(value.to_string())),
            (None, None) => None,
        };
        let replace = element.flag("replace");
        if replace && !matches!(logical, LogicalType::Integer | LogicalType::LiteralString) {
            return Err(SqlXmlError::Binding(format!(
                "type {} cannot be used with replace; use xs:int or odt:literalString",
                logical
            )));
        }
        Ok(ParameterSpec {
            logical,
            storage,
            direction,
            source,
            separator: element.attr("separator").map(str::to_string),
            replace,
            null_if: element
                .attr("null-if")
                .or_else(|| element.attr("null"))
                .map(str::to_string),
            offset: 0,
            location: element.location.clone(),
        })
    }

    /// Binds no placeholder of its own; its text is produced at build time.
    pub fn is_spliced(&self) -> bool {
        self.replace || self.separator.is_some()
    }

    fn source(&self) -> Result<&ParameterSource, SqlXmlError> {
        self.source.as_ref().ok_or_else(|| {
            SqlXmlError::Structure("a parameter needs a 'select', a 'value' or a column getter".to_string())
        })
    }

    fn is_forced_null(&self, ctx: &mut ExecutionContext<'_>) -> Result<bool, SqlXmlError> {
        match &self.null_if {
            Some(expr) => ctx.evaluate_bool(expr),
            None => Ok(false),
        }
    }

    fn bound(&self, value: SqlValue) -> BoundParameter {
        BoundParameter {
            value,
            direction: self.direction,
            storage: self.storage,
        }
    }

    /// Resolves the single value bound at this parameter's placeholder.
    pub fn resolve_bound(&self, ctx: &mut ExecutionContext<'_>) -> Result<BoundParameter, SqlXmlError> {
        if self.is_forced_null(ctx)? {
            return Ok(self.bound(SqlValue::Null));
        }
        let value = match self.source()? {
            ParameterSource::Literal(text) => self.typed(text)?,
            ParameterSource::Column(getter) => {
                let (_, value) = getter.read(ctx)?;
                convert(&value, self.logical)?
            }
            ParameterSource::Select(expr) => match ctx.evaluate(expr)? {
                XPathValue::NodeSet(nodes) if nodes.is_empty() => SqlValue::Null,
                XPathValue::NodeSet(nodes) if self.logical == LogicalType::XmlFragment => {
                    SqlValue::Xml(serialize_nodes(&nodes)?)
                }
                other => self.typed(&other.to_string())?,
            },
        };
        Ok(self.bound(value))
    }

    /// Resolves the item sequence of a `replace` or `separator` parameter as
    /// text, one entry per selected item. `None` entries are SQL NULLs.
    pub fn resolve_items(&self, ctx: &mut ExecutionContext<'_>) -> Result<Vec<Option<String>>, SqlXmlError> {
        if self.is_forced_null(ctx)? {
            return Ok(vec![None]);
        }
        let items = match self.source()? {
            ParameterSource::Literal(text) => vec![Some(text.clone())],
            ParameterSource::Column(getter) => {
                let (_, value) = getter.read(ctx)?;
                vec![value_text(&value)]
            }
            ParameterSource::Select(expr) => match ctx.evaluate(expr)? {
                XPathValue::NodeSet(nodes) => nodes
                    .iter()
                    .map(|n| Some(n.string_value()))
                    .collect(),
                other => vec![Some(other.to_string())],
            },
        };
        Ok(items)
    }

    /// Formats one item for splicing into statement text.
    pub fn replacement_text(&self, item: Option<&str>) -> Result<String, SqlXmlError> {
        let text = item.ok_or_else(|| {
            SqlXmlError::Resolution("a replaced parameter resolved to a null value".to_string())
        })?;
        match self.logical {
            LogicalType::Integer => parse_integer(text)
                .map(|i| i.to_string())
                .ok_or_else(|| SqlXmlError::Conversion(format!("'{}' is not an integer", text))),
            LogicalType::LiteralString => Ok(text.to_string()),
            other => Err(SqlXmlError::Binding(format!(
                "type {} cannot be used with replace",
                other
            ))),
        }
    }

    /// Binds one item of a `separator` parameter.
    pub fn bind_item(&self, item: Option<&str>) -> Result<BoundParameter, SqlXmlError> {
        let value = match item {
            None => SqlValue::Null,
            Some(text) => self.typed(text)?,
        };
        Ok(self.bound(value))
    }

    /// Converts path-expression text to the declared type.
    fn typed(&self, text: &str) -> Result<SqlValue, SqlXmlError> {
        let invalid = || SqlXmlError::Conversion(format!("'{}' is not a valid {}", text, self.logical));
        let value = match self.logical {
            LogicalType::String | LogicalType::LiteralString => SqlValue::Text(text.to_string()),
            LogicalType::Clob => SqlValue::Clob(text.to_string()),
            LogicalType::XmlFragment => SqlValue::Xml(text.to_string()),
            LogicalType::Integer => SqlValue::Integer(parse_integer(text).ok_or_else(invalid)?),
            LogicalType::Decimal => {
                let trimmed = text.trim();
                trimmed.parse::<f64>().map_err(|_| invalid())?;
                SqlValue::Decimal(trimmed.to_string())
            }
            LogicalType::Double => SqlValue::Double(text.trim().parse::<f64>().map_err(|_| invalid())?),
            LogicalType::Boolean => SqlValue::Boolean(parse_boolean(text).ok_or_else(invalid)?),
            LogicalType::Date => SqlValue::Date(parse_date(text).ok_or_else(invalid)?),
            LogicalType::DateTime => SqlValue::Timestamp(parse_date_time(text).ok_or_else(invalid)?),
            LogicalType::Base64Binary => {
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                SqlValue::Blob(STANDARD.decode(compact).map_err(|_| invalid())?)
            }
            LogicalType::AnyUri => SqlValue::Blob(read_uri(text.trim())?),
        };
        Ok(value)
    }
}

/// Reads the bytes a `file:` URI or plain path refers to.
fn read_uri(uri: &str) -> Result<Vec<u8>, SqlXmlError> {
    let path = match url::Url::parse(uri) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| SqlXmlError::Resolution(format!("'{}' is not a local file", uri)))?,
        Ok(url) => {
            return Err(SqlXmlError::Resolution(format!(
                "unsupported URI scheme '{}' in '{}'",
                url.scheme(),
                uri
            )));
        }
        Err(_) => PathBuf::from(uri),
    };
    std::fs::read(&path)
        .map_err(|e| SqlXmlError::Resolution(format!("cannot read '{}': {}", path.display(), e)))
}

/// The `parameter` directive. Its body may hold one column getter.
#[derive(Default)]
pub struct Parameter {
    spec: Option<ParameterSpec>,
}

impl Directive for Parameter {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        if !element.consumed {
            return Err(SqlXmlError::Structure(
                "a parameter must appear inside a statement".to_string(),
            ));
        }
        self.spec = Some(ParameterSpec::from_element(element)?);
        Ok(BodyMode::Consume)
    }

    fn accept(&mut self, _ctx: &mut ExecutionContext<'_>, child: ChildOutput) -> Result<(), SqlXmlError> {
        let spec = self
            .spec
            .as_mut()
            .ok_or_else(|| SqlXmlError::Structure("parameter was not started".to_string()))?;
        match child {
            ChildOutput::Getter(getter) if spec.source.is_none() => {
                spec.source = Some(ParameterSource::Column(getter));
                Ok(())
            }
            ChildOutput::Getter(_) => Err(SqlXmlError::Structure(
                "a parameter has at most one value source".to_string(),
            )),
            other => Err(SqlXmlError::Structure(format!(
                "a {} is not allowed inside a parameter",
                other.kind()
            ))),
        }
    }

    fn end(
        self: Box<Self>,
        _ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let spec = self
            .spec
            .ok_or_else(|| SqlXmlError::Structure("parameter was not started".to_string()))?;
        if spec.source.is_none() {
            return Err(SqlXmlError::Structure(
                "a parameter needs a 'select', a 'value' or a column getter".to_string(),
            ));
        }
        Ok(Some(ChildOutput::Parameter(spec)))
    }
}
