//! A scripted engine that answers statements from pre-registered results.

use super::{
    BoundParameter, CallTrace, ColumnMeta, MaterializedResults, ResultCursor, ResultItem,
    Session, SessionError, SessionProvider, SqlValue, StatementKind, StatementResults,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A cursor over rows held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCursor {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<SqlValue>>,
    position: usize,
}

impl MemoryCursor {
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        MemoryCursor {
            columns,
            rows: Vec::new(),
            position: 0,
        }
    }

    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn push_row(&mut self, values: Vec<SqlValue>) {
        self.rows.push(values);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ResultCursor for MemoryCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn advance(&mut self) -> Result<bool, SessionError> {
        if self.position <= self.rows.len() {
            self.position += 1;
        }
        Ok(self.position <= self.rows.len())
    }

    fn row_number(&self) -> usize {
        if self.position <= self.rows.len() {
            self.position
        } else {
            0
        }
    }

    fn value(&self, index: usize) -> Result<&SqlValue, SessionError> {
        let row = self.row_number();
        if row == 0 {
            return Err(SessionError::Engine("cursor is not on a row".to_string()));
        }
        self.rows[row - 1].get(index).ok_or_else(|| {
            SessionError::Engine(format!(
                "column index {} out of range ({} columns)",
                index + 1,
                self.columns.len()
            ))
        })
    }
}

/// One statement as the engine received it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub datasource: String,
    pub statement: String,
    pub parameters: Vec<BoundParameter>,
    pub kind: StatementKind,
}

enum Response {
    Results(Vec<ResultItem>),
    Failure(String),
}

#[derive(Default)]
struct MemoryState {
    datasources: Vec<String>,
    responses: HashMap<String, Response>,
    executions: Vec<ExecutedStatement>,
    trace: CallTrace,
    sessions_opened: usize,
}

/// Statements are matched on their text with whitespace runs collapsed.
fn statement_key(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// An in-memory engine.
///
/// Queries must be scripted with [`MemoryProvider::respond`]; unscripted
/// updates and calls report an update count of 0. Every execution and every
/// call made on the returned results is recorded for inspection.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_datasource(self, name: &str) -> Self {
        self.state.borrow_mut().datasources.push(name.to_string());
        self
    }

    /// Scripts the results returned whenever `sql` is executed.
    pub fn respond(&self, sql: &str, items: Vec<ResultItem>) {
        self.state
            .borrow_mut()
            .responses
            .insert(statement_key(sql), Response::Results(items));
    }

    /// Makes every execution of `sql` fail with an engine error.
    pub fn fail(&self, sql: &str, message: &str) {
        self.state
            .borrow_mut()
            .responses
            .insert(statement_key(sql), Response::Failure(message.to_string()));
    }

    pub fn executions(&self) -> Vec<ExecutedStatement> {
        self.state.borrow().executions.clone()
    }

    pub fn trace(&self) -> Vec<String> {
        self.state.borrow().trace.borrow().clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.borrow().sessions_opened
    }

    /// Number of results handed out and not closed yet.
    pub fn open_results(&self) -> usize {
        let state = self.state.borrow();
        let closed = state.trace.borrow().iter().filter(|e| *e == "close").count();
        state.executions.len() - closed
    }
}

impl SessionProvider for MemoryProvider {
    fn open(&mut self, datasource: &str) -> Result<Box<dyn Session>, SessionError> {
        let mut state = self.state.borrow_mut();
        if !state.datasources.iter().any(|d| d == datasource) {
            return Err(SessionError::UnknownDatasource(datasource.to_string()));
        }
        state.sessions_opened += 1;
        log::debug!("Opened in-memory session on '{}'", datasource);
        Ok(Box::new(MemorySession {
            datasource: datasource.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct MemorySession {
    datasource: String,
    state: Rc<RefCell<MemoryState>>,
}

impl Session for MemorySession {
    fn datasource(&self) -> &str {
        &self.datasource
    }

    fn execute(
        &mut self,
        sql: &str,
        parameters: &[BoundParameter],
        kind: StatementKind,
    ) -> Result<Box<dyn StatementResults>, SessionError> {
        let mut state = self.state.borrow_mut();
        let items = match state.responses.get(&statement_key(sql)) {
            Some(Response::Results(items)) => items.clone(),
            Some(Response::Failure(message)) => return Err(SessionError::Engine(message.clone())),
            None if kind == StatementKind::Query => {
                return Err(SessionError::Engine(format!(
                    "no scripted result for '{}'",
                    sql
                )));
            }
            None => vec![ResultItem::UpdateCount(0)],
        };
        state.executions.push(ExecutedStatement {
            datasource: self.datasource.clone(),
            statement: sql.to_string(),
            parameters: parameters.to_vec(),
            kind,
        });
        let results = MaterializedResults::new(items).traced(state.trace.clone());
        Ok(Box::new(results))
    }
}
