//! Per-execution state shared by every directive: source-node and cursor
//! frames, path-expression bindings, the output stack, namespace bindings and
//! the database sessions.

use crate::config::InterpreterConfig;
use crate::datasource::XmlNode;
use crate::directives::SQL_NAMESPACE_URI;
use crate::directives::row_iterator::GroupingState;
use crate::error::SqlXmlError;
use crate::events::{EventBuffer, EventSink, NullSink};
use crate::session::{
    BoundParameter, ResultCursor, Session, SessionError, SessionProvider, StatementKind,
    StatementResults,
};
use crate::types::value_text;
use log::{debug, info};
use sqlxml_xpath1::engine::evaluate as evaluate_expression;
use sqlxml_xpath1::{
    Bindings, EvaluationContext, Expression, FunctionName, XPathError, XPathValue, parse_expression,
};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

/// A path-expression value over the input document.
pub type Value<'a> = XPathValue<XmlNode<'a, 'a>>;

/// Where output goes while an entry is on top of the output stack.
#[derive(Debug)]
pub enum OutputTarget {
    /// Recorded for later replay.
    Buffer(EventBuffer),
    /// Dropped.
    Discard,
    /// Routed to whatever the stack resolved to when it held this many
    /// entries.
    Inherit(usize),
}

/// One level of source-node and statement state. Dropping a frame closes its
/// statement results.
pub struct Frame<'a> {
    node: XmlNode<'a, 'a>,
    results: Option<Box<dyn StatementResults>>,
    column: Option<usize>,
    produced_rows: bool,
    last_update_count: Option<i64>,
}

impl<'a> Frame<'a> {
    fn new(node: XmlNode<'a, 'a>) -> Self {
        Frame {
            node,
            results: None,
            column: None,
            produced_rows: false,
            last_update_count: None,
        }
    }

    fn has_cursor(&self) -> bool {
        self.results.as_ref().is_some_and(|r| r.has_cursor())
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        if let Some(results) = self.results.as_mut() {
            results.close();
        }
    }
}

/// Stack heights captured before a directive runs, to restore on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextMark {
    frames: usize,
    scopes: usize,
    outputs: usize,
    namespaces: usize,
    sessions: usize,
    groupings: usize,
}

pub struct ExecutionContext<'a> {
    root: XmlNode<'a, 'a>,
    config: &'a InterpreterConfig,
    provider: &'a mut dyn SessionProvider,
    sink: &'a mut dyn EventSink,
    null: NullSink,
    default_session: Option<Box<dyn Session>>,
    sessions: Vec<Box<dyn Session>>,
    frames: Vec<Frame<'a>>,
    scopes: Vec<HashMap<String, Value<'a>>>,
    outputs: Vec<OutputTarget>,
    namespaces: Vec<(String, String)>,
    pub(crate) groupings: Vec<GroupingState>,
    expressions: HashMap<String, Rc<Expression>>,
    /// Text of the most recent statement, for errors raised while reading
    /// its results.
    last_statement: String,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        root: XmlNode<'a, 'a>,
        config: &'a InterpreterConfig,
        provider: &'a mut dyn SessionProvider,
        sink: &'a mut dyn EventSink,
    ) -> Self {
        ExecutionContext {
            root,
            config,
            provider,
            sink,
            null: NullSink,
            default_session: None,
            sessions: Vec::new(),
            frames: vec![Frame::new(root)],
            scopes: Vec::new(),
            outputs: Vec::new(),
            namespaces: Vec::new(),
            groupings: Vec::new(),
            expressions: HashMap::new(),
            last_statement: String::new(),
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        self.config
    }

    pub fn mark(&self) -> ContextMark {
        ContextMark {
            frames: self.frames.len(),
            scopes: self.scopes.len(),
            outputs: self.outputs.len(),
            namespaces: self.namespaces.len(),
            sessions: self.sessions.len(),
            groupings: self.groupings.len(),
        }
    }

    /// Pops everything pushed since `mark` was taken. The base frame stays.
    pub fn restore(&mut self, mark: &ContextMark) {
        self.groupings.truncate(mark.groupings);
        self.frames.truncate(mark.frames.max(1));
        self.scopes.truncate(mark.scopes);
        self.outputs.truncate(mark.outputs);
        self.namespaces.truncate(mark.namespaces);
        self.sessions.truncate(mark.sessions);
    }

    /// A guard that restores the current state when dropped.
    pub fn scope(&mut self) -> ContextScope<'_, 'a> {
        let mark = self.mark();
        ContextScope { ctx: self, mark }
    }

    // --- frames -------------------------------------------------------

    pub fn push_frame(&mut self, node: XmlNode<'a, 'a>) {
        self.frames.push(Frame::new(node));
    }

    /// Pushes a frame that makes column `index` of the innermost cursor the
    /// current column.
    pub fn push_column_frame(&mut self, index: usize) {
        let mut frame = Frame::new(self.current_node());
        frame.column = Some(index);
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn current_node(&self) -> XmlNode<'a, 'a> {
        self.frames.last().map_or(self.root, |f| f.node)
    }

    pub fn root(&self) -> XmlNode<'a, 'a> {
        self.root
    }

    fn top_frame(&mut self) -> &mut Frame<'a> {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Stores the results of a statement on the innermost frame, closing the
    /// results it replaces.
    pub fn set_results(&mut self, mut results: Box<dyn StatementResults>) -> Result<(), SqlXmlError> {
        let update_count = if results.has_cursor() {
            None
        } else {
            results.update_count().map_err(|e| self.session_error(e))?
        };
        let frame = self.top_frame();
        if let Some(mut previous) = frame.results.replace(results) {
            previous.close();
        }
        frame.produced_rows = false;
        frame.last_update_count = update_count;
        Ok(())
    }

    /// The innermost frame holding statement results.
    fn results_frame(&self) -> Option<usize> {
        self.frames.iter().rposition(|f| f.results.is_some())
    }

    /// The results of the innermost statement still in scope.
    pub fn results_mut(&mut self) -> Result<&mut (dyn StatementResults + 'static), SqlXmlError> {
        let i = self
            .results_frame()
            .ok_or_else(|| SqlXmlError::Structure("no statement has been executed in this scope".into()))?;
        self.frames[i]
            .results
            .as_deref_mut()
            .ok_or_else(|| SqlXmlError::Structure("no statement has been executed in this scope".into()))
    }

    pub fn has_results(&self) -> bool {
        self.results_frame().is_some()
    }

    pub fn mark_rows_produced(&mut self) {
        if let Some(i) = self.results_frame() {
            self.frames[i].produced_rows = true;
        }
    }

    /// Whether the innermost statement's results replayed a body for a
    /// non-empty cursor.
    pub fn produced_rows(&self) -> bool {
        self.results_frame()
            .is_some_and(|i| self.frames[i].produced_rows)
    }

    pub fn last_update_count(&self) -> Option<i64> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.results.is_some() || f.last_update_count.is_some())
            .and_then(|f| f.last_update_count)
    }

    pub fn set_last_update_count(&mut self, count: Option<i64>) {
        self.top_frame().last_update_count = count;
    }

    fn cursor_frame(&self, level: usize) -> Result<usize, SqlXmlError> {
        self.frames
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, f)| f.has_cursor())
            .nth(level)
            .map(|(i, _)| i)
            .ok_or_else(|| SqlXmlError::Resolution(format!("no open cursor at ancestor level {}", level)))
    }

    /// The cursor `level` steps outward from the innermost open one.
    pub fn cursor(&self, level: usize) -> Result<&dyn ResultCursor, SqlXmlError> {
        let i = self.cursor_frame(level)?;
        self.frames[i]
            .results
            .as_ref()
            .and_then(|r| r.cursor())
            .ok_or_else(|| SqlXmlError::Resolution(format!("no open cursor at ancestor level {}", level)))
    }

    pub fn cursor_mut(&mut self, level: usize) -> Result<&mut dyn ResultCursor, SqlXmlError> {
        let i = self.cursor_frame(level)?;
        self.frames[i]
            .results
            .as_mut()
            .and_then(|r| r.cursor_mut())
            .ok_or_else(|| SqlXmlError::Resolution(format!("no open cursor at ancestor level {}", level)))
    }

    /// The column selected by the innermost `column-iterator`.
    pub fn current_column(&self) -> Option<usize> {
        self.frames.iter().rev().find_map(|f| f.column)
    }

    // --- bindings -----------------------------------------------------

    pub fn push_scope(&mut self, bindings: HashMap<String, Value<'a>>) {
        self.scopes.push(bindings);
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn binding(&self, name: &str) -> Option<&Value<'a>> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    // --- output -------------------------------------------------------

    fn resolve_output(&self, mut len: usize) -> Option<usize> {
        while len > 0 {
            match self.outputs[len - 1] {
                OutputTarget::Inherit(depth) if depth < len => len = depth,
                OutputTarget::Inherit(_) => return None,
                _ => return Some(len - 1),
            }
        }
        None
    }

    /// The sink output currently goes to.
    pub fn output(&mut self) -> &mut dyn EventSink {
        match self.resolve_output(self.outputs.len()) {
            None => &mut *self.sink as &mut dyn EventSink,
            Some(i) => match &mut self.outputs[i] {
                OutputTarget::Buffer(buffer) => buffer as &mut dyn EventSink,
                _ => &mut self.null as &mut dyn EventSink,
            },
        }
    }

    pub fn push_output(&mut self, target: OutputTarget) {
        self.outputs.push(target);
    }

    pub fn pop_output(&mut self) -> Option<OutputTarget> {
        self.outputs.pop()
    }

    pub fn output_depth(&self) -> usize {
        self.outputs.len()
    }

    // --- namespaces ---------------------------------------------------

    pub fn push_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespaces.push((prefix.to_string(), uri.to_string()));
    }

    pub fn pop_namespace(&mut self, prefix: &str) {
        if let Some(i) = self.namespaces.iter().rposition(|(p, _)| p == prefix) {
            self.namespaces.remove(i);
        }
    }

    pub fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    // --- sessions -----------------------------------------------------

    pub fn open_session(&mut self, datasource: &str) -> Result<(), SqlXmlError> {
        let session = self.provider.open(datasource).map_err(|e| SqlXmlError::Execution {
            statement: format!("open datasource '{}'", datasource),
            source: e,
        })?;
        debug!("Bound datasource '{}'", datasource);
        self.sessions.push(session);
        Ok(())
    }

    pub fn session_depth(&self) -> usize {
        self.sessions.len()
    }

    pub fn release_sessions(&mut self, depth: usize) {
        self.sessions.truncate(depth);
    }

    fn session_mut(&mut self) -> Result<&mut (dyn Session + 'static), SessionError> {
        if let Some(session) = self.sessions.last_mut() {
            return Ok(session.as_mut());
        }
        if self.default_session.is_none() {
            let name = self
                .config
                .default_datasource
                .as_deref()
                .ok_or(SessionError::NoSession)?;
            self.default_session = Some(self.provider.open(name)?);
        }
        self.default_session
            .as_deref_mut()
            .ok_or(SessionError::NoSession)
    }

    /// Runs a statement on the innermost session.
    pub fn execute(
        &mut self,
        sql: &str,
        parameters: &[BoundParameter],
        kind: StatementKind,
        debug_statement: bool,
    ) -> Result<Box<dyn StatementResults>, SqlXmlError> {
        if debug_statement || self.config.log_statements {
            info!("Executing {:?} '{}' with {:?}", kind, sql, parameters);
        } else {
            debug!("Executing {:?} '{}' ({} parameters)", kind, sql, parameters.len());
        }
        self.last_statement = sql.to_string();
        let session = self.session_mut().map_err(|e| execution_error(sql, e))?;
        session
            .execute(sql, parameters, kind)
            .map_err(|e| execution_error(sql, e))
    }

    /// Wraps a failure reading results, naming the last statement run.
    pub fn session_error(&self, source: SessionError) -> SqlXmlError {
        execution_error(&self.last_statement, source)
    }

    // --- path expressions ---------------------------------------------

    fn compile(&mut self, expr: &str) -> Result<Rc<Expression>, SqlXmlError> {
        if let Some(compiled) = self.expressions.get(expr) {
            return Ok(compiled.clone());
        }
        let compiled = Rc::new(parse_expression(expr)?);
        self.expressions.insert(expr.to_string(), compiled.clone());
        Ok(compiled)
    }

    /// Evaluates `expr` with the current node as context.
    pub fn evaluate(&mut self, expr: &str) -> Result<Value<'a>, SqlXmlError> {
        let compiled = self.compile(expr)?;
        let e_ctx = EvaluationContext::new(self.current_node(), self.root, &*self, self.config.strict);
        Ok(evaluate_expression(&compiled, &e_ctx)?)
    }

    pub fn evaluate_string(&mut self, expr: &str) -> Result<String, SqlXmlError> {
        Ok(self.evaluate(expr)?.to_string())
    }

    pub fn evaluate_bool(&mut self, expr: &str) -> Result<bool, SqlXmlError> {
        Ok(self.evaluate(expr)?.to_bool())
    }

    pub fn evaluate_nodes(&mut self, expr: &str) -> Result<Vec<XmlNode<'a, 'a>>, SqlXmlError> {
        match self.evaluate(expr)? {
            XPathValue::NodeSet(nodes) => Ok(nodes),
            other => Err(SqlXmlError::Resolution(format!(
                "'{}' must select nodes, got '{}'",
                expr, other
            ))),
        }
    }

    fn column_text(&self, column: &str, level: usize) -> Result<String, SqlXmlError> {
        let cursor = self.cursor(level)?;
        let index = cursor
            .column_index(column)
            .ok_or_else(|| SqlXmlError::Resolution(format!("unknown column '{}'", column)))?;
        let value = cursor.value(index).map_err(|e| self.session_error(e))?;
        Ok(value_text(value).unwrap_or_default())
    }
}

fn execution_error(statement: &str, source: SessionError) -> SqlXmlError {
    SqlXmlError::Execution {
        statement: statement.to_string(),
        source,
    }
}

fn function_error(name: &FunctionName, message: impl Into<String>) -> XPathError {
    XPathError::FunctionError {
        function: name.to_string(),
        message: message.into(),
    }
}

/// Exposes scoped bindings as `$variables`, and the `current()`,
/// `position()`, `row-position()` and `get-column()` extensions under the
/// directive namespace.
impl<'a> Bindings<'a, XmlNode<'a, 'a>> for ExecutionContext<'a> {
    fn variable(&self, name: &str) -> Option<Value<'a>> {
        self.binding(name).cloned()
    }

    fn call_extension(&self, name: &FunctionName, args: Vec<Value<'a>>) -> Result<Value<'a>, XPathError> {
        let Some(prefix) = name.prefix.as_deref() else {
            return Err(XPathError::UnknownFunction(name.to_string()));
        };
        let uri = self
            .lookup_namespace(prefix)
            .ok_or_else(|| function_error(name, format!("undeclared namespace prefix '{}'", prefix)))?;
        if uri != SQL_NAMESPACE_URI {
            return Err(XPathError::UnknownFunction(name.to_string()));
        }
        match name.local.as_str() {
            "current" | "position" | "row-position" => {
                if !args.is_empty() {
                    return Err(function_error(name, "takes no arguments"));
                }
                self.binding(&name.local)
                    .cloned()
                    .ok_or_else(|| function_error(name, "not inside an iteration"))
            }
            "get-column" => {
                let level = match args.len() {
                    1 => 0,
                    2 => {
                        let n = args[1].to_number();
                        if !(n >= 1.0) {
                            return Err(function_error(name, "level must be 1 or more"));
                        }
                        n as usize
                    }
                    got => {
                        return Err(function_error(name, format!("expected 1 or 2 arguments, got {}", got)));
                    }
                };
                let column = args[0].to_string();
                self.column_text(&column, level)
                    .map(XPathValue::String)
                    .map_err(|e| function_error(name, e.to_string()))
            }
            _ => Err(XPathError::UnknownFunction(name.to_string())),
        }
    }
}

/// Restores the context to the state it had when the scope was opened.
pub struct ContextScope<'c, 'a> {
    ctx: &'c mut ExecutionContext<'a>,
    mark: ContextMark,
}

impl<'a> Deref for ContextScope<'_, 'a> {
    type Target = ExecutionContext<'a>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for ContextScope<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for ContextScope<'_, '_> {
    fn drop(&mut self) {
        self.ctx.restore(&self.mark);
    }
}
