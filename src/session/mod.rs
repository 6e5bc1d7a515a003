//! The database collaborator, seen through a small JDBC-like surface.
//!
//! The interpreter only ever talks to these traits. Two engines ship with the
//! crate: a scripted in-memory engine used by tests and by callers who want to
//! dry-run a template, and a SQLite engine behind the `sqlite` feature.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{ExecutedStatement, MemoryCursor, MemoryProvider};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteProvider;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Unknown datasource '{0}'")]
    UnknownDatasource(String),

    #[error("Database engine error: {0}")]
    Engine(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("No datasource is bound to this execution")]
    NoSession,
}

/// Column type codes reported by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeType {
    Char,
    Varchar,
    LongVarchar,
    Clob,
    Integer,
    BigInt,
    SmallInt,
    Numeric,
    Decimal,
    Real,
    Double,
    Boolean,
    Date,
    Time,
    Timestamp,
    Binary,
    Blob,
    Xml,
    Other(String),
}

impl NativeType {
    /// Maps a declared column type (`VARCHAR(20)`, `integer`, `DOUBLE
    /// PRECISION`, ...) to a type code. Size and precision suffixes are ignored.
    pub fn from_declared(declared: &str) -> NativeType {
        let base = declared
            .split('(')
            .next()
            .unwrap_or(declared)
            .trim()
            .to_ascii_uppercase();
        match base.as_str() {
            "CHAR" | "CHARACTER" | "NCHAR" => NativeType::Char,
            "VARCHAR" | "NVARCHAR" | "VARCHAR2" | "TEXT" | "CHARACTER VARYING" => {
                NativeType::Varchar
            }
            "LONGVARCHAR" | "LONG VARCHAR" | "MEDIUMTEXT" | "LONGTEXT" => NativeType::LongVarchar,
            "CLOB" | "NCLOB" => NativeType::Clob,
            "INT" | "INTEGER" | "MEDIUMINT" => NativeType::Integer,
            "BIGINT" | "INT8" => NativeType::BigInt,
            "SMALLINT" | "TINYINT" | "INT2" => NativeType::SmallInt,
            "NUMERIC" | "NUMBER" => NativeType::Numeric,
            "DECIMAL" | "DEC" => NativeType::Decimal,
            "REAL" | "FLOAT4" => NativeType::Real,
            "DOUBLE" | "DOUBLE PRECISION" | "FLOAT" | "FLOAT8" => NativeType::Double,
            "BOOLEAN" | "BOOL" | "BIT" => NativeType::Boolean,
            "DATE" => NativeType::Date,
            "TIME" => NativeType::Time,
            "TIMESTAMP" | "DATETIME" => NativeType::Timestamp,
            "BINARY" | "VARBINARY" => NativeType::Binary,
            "BLOB" | "LONGBLOB" | "BYTEA" => NativeType::Blob,
            "XML" | "XMLTYPE" => NativeType::Xml,
            _ => NativeType::Other(base),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NativeType::Char => "CHAR",
            NativeType::Varchar => "VARCHAR",
            NativeType::LongVarchar => "LONGVARCHAR",
            NativeType::Clob => "CLOB",
            NativeType::Integer => "INTEGER",
            NativeType::BigInt => "BIGINT",
            NativeType::SmallInt => "SMALLINT",
            NativeType::Numeric => "NUMERIC",
            NativeType::Decimal => "DECIMAL",
            NativeType::Real => "REAL",
            NativeType::Double => "DOUBLE",
            NativeType::Boolean => "BOOLEAN",
            NativeType::Date => "DATE",
            NativeType::Time => "TIME",
            NativeType::Timestamp => "TIMESTAMP",
            NativeType::Binary => "BINARY",
            NativeType::Blob => "BLOB",
            NativeType::Xml => "XML",
            NativeType::Other(name) => name,
        }
    }
}

/// One value read from, or bound to, a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    /// Exact numerics are kept in their textual form.
    Decimal(String),
    Double(f64),
    Boolean(bool),
    Text(String),
    Clob(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Xml(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub native: NativeType,
}

impl ColumnMeta {
    pub fn new(name: &str, native: NativeType) -> Self {
        ColumnMeta {
            name: name.to_string(),
            native,
        }
    }
}

/// How a null or large value should be typed when bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageHint {
    #[default]
    Default,
    Clob,
    Blob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub value: SqlValue,
    pub direction: Direction,
    pub storage: StorageHint,
}

impl BoundParameter {
    pub fn new(value: SqlValue) -> Self {
        BoundParameter {
            value,
            direction: Direction::In,
            storage: StorageHint::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Update,
    Call,
}

/// Opens sessions by datasource name.
pub trait SessionProvider {
    fn open(&mut self, datasource: &str) -> Result<Box<dyn Session>, SessionError>;
}

pub trait Session {
    fn datasource(&self) -> &str;

    /// Runs `sql` with `?` placeholders bound positionally from `parameters`.
    fn execute(
        &mut self,
        sql: &str,
        parameters: &[BoundParameter],
        kind: StatementKind,
    ) -> Result<Box<dyn StatementResults>, SessionError>;
}

/// The sequence of results one statement produced, walked one at a time.
pub trait StatementResults {
    /// The current result is a cursor.
    fn has_cursor(&self) -> bool;

    fn cursor(&self) -> Option<&dyn ResultCursor>;

    fn cursor_mut(&mut self) -> Option<&mut dyn ResultCursor>;

    /// Moves to the next result. Returns `true` when it is a cursor.
    fn more_results(&mut self) -> Result<bool, SessionError>;

    /// The current result's update count; `None` when it is a cursor or when
    /// there are no more results.
    fn update_count(&mut self) -> Result<Option<i64>, SessionError>;

    fn close(&mut self);
}

/// A forward-only row cursor.
pub trait ResultCursor {
    fn columns(&self) -> &[ColumnMeta];

    /// Moves to the next row. Returns `false` once past the last row.
    fn advance(&mut self) -> Result<bool, SessionError>;

    /// 1-based number of the current row; 0 before the first row and after
    /// the last.
    fn row_number(&self) -> usize;

    /// The value of the column at 0-based `index` in the current row.
    fn value(&self, index: usize) -> Result<&SqlValue, SessionError>;

    /// Case-insensitive lookup of a column by name.
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns()
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone)]
pub enum ResultItem {
    Cursor(MemoryCursor),
    UpdateCount(i64),
}

/// Shared trace of calls made on statement results, in call order.
pub type CallTrace = Rc<RefCell<Vec<String>>>;

/// Statement results held fully in memory.
#[derive(Debug)]
pub struct MaterializedResults {
    current: Option<ResultItem>,
    pending: VecDeque<ResultItem>,
    trace: Option<CallTrace>,
    closed: bool,
}

impl MaterializedResults {
    pub fn new(items: Vec<ResultItem>) -> Self {
        let mut pending: VecDeque<ResultItem> = items.into();
        let current = pending.pop_front();
        MaterializedResults {
            current,
            pending,
            trace: None,
            closed: false,
        }
    }

    pub fn traced(mut self, trace: CallTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    fn record(&self, entry: String) {
        if let Some(trace) = &self.trace {
            trace.borrow_mut().push(entry);
        }
    }
}

impl StatementResults for MaterializedResults {
    fn has_cursor(&self) -> bool {
        matches!(self.current, Some(ResultItem::Cursor(_)))
    }

    fn cursor(&self) -> Option<&dyn ResultCursor> {
        match &self.current {
            Some(ResultItem::Cursor(c)) => Some(c as &dyn ResultCursor),
            _ => None,
        }
    }

    fn cursor_mut(&mut self) -> Option<&mut dyn ResultCursor> {
        match &mut self.current {
            Some(ResultItem::Cursor(c)) => Some(c as &mut dyn ResultCursor),
            _ => None,
        }
    }

    fn more_results(&mut self) -> Result<bool, SessionError> {
        if self.closed {
            return Err(SessionError::Engine("results are closed".to_string()));
        }
        self.current = self.pending.pop_front();
        let more = self.has_cursor();
        self.record(format!("more_results -> {}", more));
        Ok(more)
    }

    fn update_count(&mut self) -> Result<Option<i64>, SessionError> {
        if self.closed {
            return Err(SessionError::Engine("results are closed".to_string()));
        }
        let count = match self.current {
            Some(ResultItem::UpdateCount(n)) => Some(n),
            _ => None,
        };
        self.record(format!("update_count -> {:?}", count));
        Ok(count)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.current = None;
            self.pending.clear();
            self.record("close".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor() -> MemoryCursor {
        MemoryCursor::new(vec![ColumnMeta::new("id", NativeType::Integer)])
            .row(vec![SqlValue::Integer(1)])
    }

    #[test]
    fn test_declared_types() {
        assert_eq!(NativeType::from_declared("varchar(20)"), NativeType::Varchar);
        assert_eq!(NativeType::from_declared("DECIMAL(10, 2)"), NativeType::Decimal);
        assert_eq!(NativeType::from_declared("datetime"), NativeType::Timestamp);
        assert_eq!(
            NativeType::from_declared("geometry"),
            NativeType::Other("GEOMETRY".into())
        );
        assert_eq!(NativeType::Other("GEOMETRY".into()).name(), "GEOMETRY");
    }

    #[test]
    fn test_results_walk_like_jdbc() {
        let trace: CallTrace = Rc::default();
        let mut results = MaterializedResults::new(vec![
            ResultItem::UpdateCount(2),
            ResultItem::Cursor(cursor()),
        ])
        .traced(trace.clone());

        assert!(!results.has_cursor());
        assert_eq!(results.update_count().unwrap(), Some(2));
        assert!(results.more_results().unwrap());
        assert_eq!(results.update_count().unwrap(), None);
        assert_eq!(results.cursor().map(|c| c.columns().len()), Some(1));
        assert!(!results.more_results().unwrap());
        assert_eq!(results.update_count().unwrap(), None);
        results.close();
        results.close();

        assert_eq!(
            *trace.borrow(),
            vec![
                "update_count -> Some(2)",
                "more_results -> true",
                "update_count -> None",
                "more_results -> false",
                "update_count -> None",
                "close",
            ]
        );
    }

    #[test]
    fn test_column_lookup_ignores_case() {
        let c = cursor();
        assert_eq!(c.column_index("ID"), Some(0));
        assert_eq!(c.column_index("name"), None);
    }
}
