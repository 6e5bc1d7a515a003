//! Column getters: single columns, whole rows, column metadata and update
//! counts.

use super::{BodyMode, ChildOutput, Directive, Element, GET_COLUMNS_CHILDREN, Registration};
use crate::context::ExecutionContext;
use crate::error::SqlXmlError;
use crate::events::{EventBuffer, XmlName};
use crate::session::{ResultCursor, SqlValue};
use crate::types::{LogicalType, convert, default_logical_type, emit_value, legacy_getter_type, resolve_column_type};
use log::warn;

/// How a getter names its column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnRef {
    Name(String),
    /// 1-based position.
    Index(usize),
    /// The column selected by the enclosing `column-iterator`.
    Current,
}

impl ColumnRef {
    fn from_element(element: &Element<'_>) -> Result<Self, SqlXmlError> {
        if let Some(name) = element.attr("column").or_else(|| element.attr("column-name")) {
            return Ok(ColumnRef::Name(name.to_string()));
        }
        match element.attr("column-index") {
            Some(text) => match text.trim().parse::<usize>() {
                Ok(i) if i >= 1 => Ok(ColumnRef::Index(i)),
                _ => Err(SqlXmlError::Structure(format!(
                    "invalid column index '{}': must be an integer of 1 or more",
                    text
                ))),
            },
            None => Ok(ColumnRef::Current),
        }
    }

    fn resolve(&self, ctx: &ExecutionContext<'_>, cursor: &dyn ResultCursor) -> Result<usize, SqlXmlError> {
        match self {
            ColumnRef::Name(name) => cursor
                .column_index(name)
                .ok_or_else(|| SqlXmlError::Resolution(format!("unknown column '{}'", name))),
            ColumnRef::Index(i) if *i <= cursor.columns().len() => Ok(i - 1),
            ColumnRef::Index(i) => Err(SqlXmlError::Resolution(format!(
                "column index {} is out of range ({} columns)",
                i,
                cursor.columns().len()
            ))),
            ColumnRef::Current => ctx.current_column().ok_or_else(|| {
                SqlXmlError::Structure("no column given and no column-iterator is active".to_string())
            }),
        }
    }
}

/// Reads one column of one open cursor.
#[derive(Debug, Clone)]
pub struct ColumnGetter {
    pub column: ColumnRef,
    pub level: usize,
    pub requested: Option<LogicalType>,
    /// Legacy getters convert the stored value instead of checking the
    /// column's native type.
    pub legacy: bool,
}

impl ColumnGetter {
    pub fn from_element(element: &Element<'_>, legacy: Option<LogicalType>) -> Result<Self, SqlXmlError> {
        let requested = match (legacy, element.attr("type")) {
            (Some(t), _) => Some(t),
            (None, Some(name)) => Some(
                LogicalType::parse(name)
                    .ok_or_else(|| SqlXmlError::Structure(format!("unknown column type '{}'", name)))?,
            ),
            (None, None) => None,
        };
        Ok(ColumnGetter {
            column: ColumnRef::from_element(element)?,
            level: element.ancestor_level()?,
            requested,
            legacy: legacy.is_some(),
        })
    }

    /// The value of the column in the current row, with the type it
    /// projects as.
    pub fn read(&self, ctx: &ExecutionContext<'_>) -> Result<(LogicalType, SqlValue), SqlXmlError> {
        let cursor = ctx.cursor(self.level)?;
        let index = self.column.resolve(ctx, cursor)?;
        let value = cursor.value(index).map_err(|e| ctx.session_error(e))?;
        match self.requested {
            Some(logical) if self.legacy => Ok((logical, convert(value, logical)?)),
            requested => {
                let native = &cursor.columns()[index].native;
                let logical = resolve_column_type(native, requested)?;
                Ok((logical, value.clone()))
            }
        }
    }
}

/// `get-column`, `get-column-value` and the legacy `get-*` getters.
pub struct GetColumn {
    legacy: Option<LogicalType>,
    getter: Option<ColumnGetter>,
    consumed: bool,
}

impl GetColumn {
    pub fn create(name: &str) -> Box<dyn Directive> {
        Box::new(GetColumn {
            legacy: legacy_getter_type(name),
            getter: None,
            consumed: false,
        })
    }
}

impl Directive for GetColumn {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        self.getter = Some(ColumnGetter::from_element(element, self.legacy)?);
        self.consumed = element.consumed;
        Ok(BodyMode::Consume)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let GetColumn { getter, consumed, .. } = *self;
        let getter = getter.ok_or_else(|| SqlXmlError::Structure("column getter was not started".to_string()))?;
        if consumed {
            return Ok(Some(ChildOutput::Getter(getter)));
        }
        let (logical, value) = getter.read(ctx)?;
        emit_value(ctx.output(), logical, &value)?;
        Ok(None)
    }
}

/// Turns `ORDER_ID` into `order-id`.
fn xml_name(column: &str) -> String {
    column.to_lowercase().replace('_', "-")
}

/// `get-columns`: one element per column of the current row.
#[derive(Default)]
pub struct GetColumns {
    level: usize,
    xml_format: bool,
    prefix: Option<String>,
    all_elements: bool,
    excluded: Vec<String>,
}

impl Directive for GetColumns {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        self.level = element.ancestor_level()?;
        self.xml_format = match element.attr("format") {
            None => false,
            Some("xml") => true,
            Some(other) => {
                return Err(SqlXmlError::Structure(format!(
                    "unknown column name format '{}'",
                    other
                )));
            }
        };
        self.prefix = element.attr("prefix").map(str::to_string);
        self.all_elements = element.flag("all-elements");
        Ok(BodyMode::Consume)
    }

    fn accept(&mut self, _ctx: &mut ExecutionContext<'_>, child: ChildOutput) -> Result<(), SqlXmlError> {
        match child {
            ChildOutput::Exclude(name) => {
                self.excluded.push(name);
                Ok(())
            }
            other => Err(SqlXmlError::Structure(format!(
                "a {} is not allowed inside get-columns",
                other.kind()
            ))),
        }
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let namespace = match &self.prefix {
            None => None,
            Some(prefix) => Some(
                ctx.lookup_namespace(prefix)
                    .ok_or_else(|| SqlXmlError::Structure(format!("undeclared namespace prefix '{}'", prefix)))?
                    .to_string(),
            ),
        };

        let mut columns = Vec::new();
        {
            let cursor = ctx.cursor(self.level)?;
            for (index, meta) in cursor.columns().iter().enumerate() {
                if self.excluded.iter().any(|x| x.eq_ignore_ascii_case(&meta.name)) {
                    continue;
                }
                let value = cursor.value(index).map_err(|e| ctx.session_error(e))?;
                if value.is_null() && !self.all_elements {
                    continue;
                }
                let local = if self.xml_format {
                    xml_name(&meta.name)
                } else {
                    meta.name.clone()
                };
                columns.push((local, default_logical_type(&meta.native), value.clone()));
            }
        }

        for (local, logical, value) in columns {
            let qualified = match &self.prefix {
                Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, local),
                _ => local,
            };
            let name = XmlName::new(namespace.as_deref(), &qualified);
            let out = ctx.output();
            out.start_element(&name, &[])?;
            emit_value(out, logical, &value)?;
            out.end_element(&name)?;
        }
        Ok(None)
    }

    fn children(&self) -> &'static [Registration] {
        GET_COLUMNS_CHILDREN
    }
}

/// `exclude`: names one column `get-columns` skips.
#[derive(Default)]
pub struct Exclude {
    name: String,
}

impl Directive for Exclude {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        if !element.consumed {
            return Err(SqlXmlError::Structure("exclude must appear inside get-columns".to_string()));
        }
        Ok(BodyMode::Consume)
    }

    fn characters(&mut self, _ctx: &mut ExecutionContext<'_>, text: &str) -> Result<(), SqlXmlError> {
        self.name.push_str(text);
        Ok(())
    }

    fn end(
        self: Box<Self>,
        _ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(SqlXmlError::Structure("exclude needs a column name".to_string()));
        }
        Ok(Some(ChildOutput::Exclude(name.to_string())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Meta {
    Name,
    Index,
    Type,
}

/// `get-column-name`, `get-column-index` and `get-column-type`.
pub struct GetColumnMeta {
    meta: Meta,
    column: ColumnRef,
    level: usize,
}

impl GetColumnMeta {
    pub fn create(name: &str) -> Box<dyn Directive> {
        let meta = match name {
            "get-column-index" => Meta::Index,
            "get-column-type" => Meta::Type,
            _ => Meta::Name,
        };
        Box::new(GetColumnMeta {
            meta,
            column: ColumnRef::Current,
            level: 0,
        })
    }
}

impl Directive for GetColumnMeta {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        self.column = ColumnRef::from_element(element)?;
        self.level = element.ancestor_level()?;
        Ok(BodyMode::Consume)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        let text = {
            let cursor = ctx.cursor(self.level)?;
            let index = self.column.resolve(ctx, cursor)?;
            let meta = &cursor.columns()[index];
            match self.meta {
                Meta::Name => meta.name.clone(),
                Meta::Index => (index + 1).to_string(),
                Meta::Type => meta.native.name().to_string(),
            }
        };
        ctx.output().characters(&text)?;
        Ok(None)
    }
}

/// `update-count`: the rows touched by the last statement in scope.
pub struct UpdateCount;

impl Directive for UpdateCount {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, _element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        Ok(BodyMode::Consume)
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        match ctx.last_update_count() {
            Some(count) => ctx.output().characters(&count.to_string())?,
            None => warn!("update-count used where no update count is available"),
        }
        Ok(None)
    }
}
