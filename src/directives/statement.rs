//! `query`, `update`, `call` and `sql`: statement text assembly and execution.

use super::parameter::ParameterSpec;
use super::{BodyMode, ChildOutput, Directive, Element, STATEMENT_CHILDREN};
use crate::context::ExecutionContext;
use crate::error::SqlXmlError;
use crate::events::EventBuffer;
use crate::session::{BoundParameter, StatementKind};
use log::debug;

const PLACEHOLDER: &str = " ? ";

/// Statement text with parameter markers recorded at byte offsets.
///
/// A plain bound parameter leaves a placeholder at its offset. Parameters
/// that splice text (`replace`) or expand to several placeholders
/// (`separator`) leave nothing, and are expanded by [`StatementBuilder::build`].
#[derive(Debug, Default, Clone)]
pub struct StatementBuilder {
    text: String,
    parameters: Vec<ParameterSpec>,
}

/// A statement ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    pub sql: String,
    pub parameters: Vec<BoundParameter>,
}

impl StatementBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub fn add_parameter(&mut self, mut spec: ParameterSpec) {
        spec.offset = self.text.len();
        if !spec.is_spliced() {
            self.text.push_str(PLACEHOLDER);
        }
        self.parameters.push(spec);
    }

    /// Appends a nested `sql` fragment at the current position.
    pub fn merge(&mut self, fragment: StatementBuilder) {
        let base = self.text.len();
        self.text.push_str(&fragment.text);
        self.parameters
            .extend(fragment.parameters.into_iter().map(|mut p| {
                p.offset += base;
                p
            }));
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.parameters.iter().all(|p| !p.is_spliced())
    }

    /// Resolves every parameter against the current context, in declaration
    /// order, and produces the final text and positional bind values.
    pub fn build(&self, ctx: &mut ExecutionContext<'_>) -> Result<PreparedStatement, SqlXmlError> {
        let mut sql = String::with_capacity(self.text.len());
        let mut parameters = Vec::new();
        let mut copied = 0;
        for spec in &self.parameters {
            sql.push_str(&self.text[copied..spec.offset]);
            copied = spec.offset;
            let resolved = if spec.replace {
                spec.resolve_items(ctx).and_then(|items| {
                    if items.is_empty() {
                        return Err(SqlXmlError::Resolution(
                            "a replaced parameter selected no value".to_string(),
                        ));
                    }
                    let parts = items
                        .iter()
                        .map(|item| spec.replacement_text(item.as_deref()))
                        .collect::<Result<Vec<_>, _>>()?;
                    sql.push_str(&parts.join(spec.separator.as_deref().unwrap_or("")));
                    Ok(())
                })
            } else if let Some(separator) = &spec.separator {
                spec.resolve_items(ctx).and_then(|items| {
                    let mut placeholders = Vec::with_capacity(items.len());
                    for item in &items {
                        parameters.push(spec.bind_item(item.as_deref())?);
                        placeholders.push(PLACEHOLDER);
                    }
                    sql.push_str(&placeholders.join(separator));
                    Ok(())
                })
            } else {
                spec.resolve_bound(ctx).map(|bound| parameters.push(bound))
            };
            resolved.map_err(|e| e.located(&spec.location))?;
        }
        sql.push_str(&self.text[copied..]);
        Ok(PreparedStatement { sql, parameters })
    }
}

/// `query`, `update` and `call`.
pub struct Statement {
    kind: StatementKind,
    builder: StatementBuilder,
    debug: bool,
    select: Option<String>,
}

impl Statement {
    pub fn create(name: &str) -> Box<dyn Directive> {
        let kind = match name {
            "update" => StatementKind::Update,
            "call" => StatementKind::Call,
            _ => StatementKind::Query,
        };
        Box::new(Statement {
            kind,
            builder: StatementBuilder::new(),
            debug: false,
            select: None,
        })
    }

    fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<Option<i64>, SqlXmlError> {
        let prepared = self.builder.build(ctx)?;
        let mut results = ctx.execute(&prepared.sql, &prepared.parameters, self.kind, self.debug)?;
        let count = if results.has_cursor() {
            None
        } else {
            results.update_count().map_err(|e| ctx.session_error(e))?
        };
        results.close();
        Ok(count)
    }
}

impl Directive for Statement {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        self.debug = element.flag("debug");
        self.select = element.attr("select").map(str::to_string);
        if self.select.is_some() && self.kind != StatementKind::Update {
            return Err(SqlXmlError::Structure(format!(
                "'select' is only allowed on update, not on <{}>",
                element.name.qualified
            )));
        }
        Ok(BodyMode::Consume)
    }

    fn characters(&mut self, _ctx: &mut ExecutionContext<'_>, text: &str) -> Result<(), SqlXmlError> {
        self.builder.push_text(text);
        Ok(())
    }

    fn accept(&mut self, _ctx: &mut ExecutionContext<'_>, child: ChildOutput) -> Result<(), SqlXmlError> {
        match child {
            ChildOutput::Parameter(spec) => self.builder.add_parameter(spec),
            ChildOutput::Statement(fragment) => self.builder.merge(fragment),
            other => {
                return Err(SqlXmlError::Structure(format!(
                    "a {} is not allowed inside a statement",
                    other.kind()
                )));
            }
        }
        Ok(())
    }

    fn end(
        self: Box<Self>,
        ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        if self.builder.is_blank() {
            return Err(SqlXmlError::Structure("missing statement text".to_string()));
        }
        match &self.select {
            None => {
                let prepared = self.builder.build(ctx)?;
                let results = ctx.execute(&prepared.sql, &prepared.parameters, self.kind, self.debug)?;
                ctx.set_results(results)?;
            }
            Some(select) => {
                // One execution per selected node, with that node as context.
                let nodes = ctx.evaluate_nodes(select)?;
                let mut total = 0;
                for node in nodes {
                    let mut scope = ctx.scope();
                    scope.push_frame(node);
                    total += self.run(&mut scope)?.unwrap_or(0);
                }
                debug!("Batch update touched {} rows", total);
                ctx.set_last_update_count(Some(total));
            }
        }
        Ok(None)
    }

    fn children(&self) -> &'static [super::Registration] {
        STATEMENT_CHILDREN
    }
}

/// `sql`: a statement text fragment merged into its parent statement.
#[derive(Default)]
pub struct SqlText {
    builder: StatementBuilder,
}

impl Directive for SqlText {
    fn start(&mut self, _ctx: &mut ExecutionContext<'_>, element: &Element<'_>) -> Result<BodyMode, SqlXmlError> {
        if !element.consumed {
            return Err(SqlXmlError::Structure(
                "<sql> must appear inside a statement".to_string(),
            ));
        }
        Ok(BodyMode::Consume)
    }

    fn characters(&mut self, _ctx: &mut ExecutionContext<'_>, text: &str) -> Result<(), SqlXmlError> {
        self.builder.push_text(text);
        Ok(())
    }

    fn accept(&mut self, _ctx: &mut ExecutionContext<'_>, child: ChildOutput) -> Result<(), SqlXmlError> {
        match child {
            ChildOutput::Parameter(spec) => self.builder.add_parameter(spec),
            ChildOutput::Statement(fragment) => self.builder.merge(fragment),
            other => {
                return Err(SqlXmlError::Structure(format!(
                    "a {} is not allowed inside <sql>",
                    other.kind()
                )));
            }
        }
        Ok(())
    }

    fn end(
        self: Box<Self>,
        _ctx: &mut ExecutionContext<'_>,
        _body: Option<EventBuffer>,
    ) -> Result<Option<ChildOutput>, SqlXmlError> {
        Ok(Some(ChildOutput::Statement(self.builder)))
    }

    fn children(&self) -> &'static [super::Registration] {
        STATEMENT_CHILDREN
    }
}
