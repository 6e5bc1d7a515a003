//! SQLite sessions through `rusqlite`. Results are read eagerly into memory
//! cursors.

use super::{
    BoundParameter, ColumnMeta, Direction, MaterializedResults, MemoryCursor, NativeType,
    ResultItem, Session, SessionError, SessionProvider, SqlValue, StatementKind,
    StatementResults,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

impl From<rusqlite::Error> for SessionError {
    fn from(e: rusqlite::Error) -> Self {
        SessionError::Engine(e.to_string())
    }
}

/// Named SQLite connections.
#[derive(Default)]
pub struct SqliteProvider {
    connections: HashMap<String, Rc<Connection>>,
}

impl SqliteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_path(mut self, name: &str, path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let conn = Connection::open(path)?;
        self.connections.insert(name.to_string(), Rc::new(conn));
        Ok(self)
    }

    pub fn open_in_memory(mut self, name: &str) -> Result<Self, SessionError> {
        let conn = Connection::open_in_memory()?;
        self.connections.insert(name.to_string(), Rc::new(conn));
        Ok(self)
    }

    pub fn with_connection(mut self, name: &str, conn: Connection) -> Self {
        self.connections.insert(name.to_string(), Rc::new(conn));
        self
    }

    pub fn connection(&self, name: &str) -> Option<&Connection> {
        self.connections.get(name).map(|c| c.as_ref())
    }
}

impl SessionProvider for SqliteProvider {
    fn open(&mut self, datasource: &str) -> Result<Box<dyn Session>, SessionError> {
        let conn = self
            .connections
            .get(datasource)
            .cloned()
            .ok_or_else(|| SessionError::UnknownDatasource(datasource.to_string()))?;
        Ok(Box::new(SqliteSession {
            datasource: datasource.to_string(),
            conn,
        }))
    }
}

struct SqliteSession {
    datasource: String,
    conn: Rc<Connection>,
}

impl Session for SqliteSession {
    fn datasource(&self) -> &str {
        &self.datasource
    }

    fn execute(
        &mut self,
        sql: &str,
        parameters: &[BoundParameter],
        _kind: StatementKind,
    ) -> Result<Box<dyn StatementResults>, SessionError> {
        let values = parameters
            .iter()
            .map(to_sqlite)
            .collect::<Result<Vec<_>, _>>()?;
        let mut stmt = self.conn.prepare_cached(sql)?;

        if stmt.column_count() == 0 {
            let changed = stmt.execute(params_from_iter(values))?;
            return Ok(Box::new(MaterializedResults::new(vec![
                ResultItem::UpdateCount(changed as i64),
            ])));
        }

        let declared: Vec<(String, Option<NativeType>)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(NativeType::from_declared)))
            .collect();

        let mut raw_rows: Vec<Vec<Value>> = Vec::new();
        let mut rows = stmt.query(params_from_iter(values))?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(declared.len());
            for i in 0..declared.len() {
                values.push(Value::from(row.get_ref(i)?));
            }
            raw_rows.push(values);
        }

        // Expression columns have no declared type; use the storage class of
        // the first row instead.
        let columns: Vec<ColumnMeta> = declared
            .into_iter()
            .enumerate()
            .map(|(i, (name, native))| {
                let native = native.unwrap_or_else(|| {
                    raw_rows
                        .first()
                        .map_or(NativeType::Varchar, |r| storage_class(&r[i]))
                });
                ColumnMeta { name, native }
            })
            .collect();

        let mut cursor = MemoryCursor::new(columns.clone());
        for raw in raw_rows {
            let row = raw
                .into_iter()
                .zip(&columns)
                .map(|(v, c)| from_sqlite(v, &c.native))
                .collect();
            cursor.push_row(row);
        }
        Ok(Box::new(MaterializedResults::new(vec![ResultItem::Cursor(
            cursor,
        )])))
    }
}

fn storage_class(value: &Value) -> NativeType {
    match value {
        Value::Integer(_) => NativeType::BigInt,
        Value::Real(_) => NativeType::Double,
        Value::Blob(_) => NativeType::Blob,
        Value::Null | Value::Text(_) => NativeType::Varchar,
    }
}

fn to_sqlite(param: &BoundParameter) -> Result<Value, SessionError> {
    if param.direction != Direction::In {
        return Err(SessionError::Unsupported(
            "SQLite has no output parameters".to_string(),
        ));
    }
    Ok(match &param.value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Decimal(s) => match s.parse::<i64>() {
            Ok(i) => Value::Integer(i),
            Err(_) => s.parse::<f64>().map_or(Value::Text(s.clone()), Value::Real),
        },
        SqlValue::Double(f) => Value::Real(*f),
        SqlValue::Boolean(b) => Value::Integer(i64::from(*b)),
        SqlValue::Text(s) | SqlValue::Clob(s) | SqlValue::Xml(s) => Value::Text(s.clone()),
        SqlValue::Blob(b) => Value::Blob(b.clone()),
        SqlValue::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => Value::Text(t.format("%H:%M:%S%.f").to_string()),
        SqlValue::Timestamp(ts) => Value::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
    })
}

/// Interprets a stored value according to its column's declared type. Text
/// that does not parse as the declared temporal type stays text.
fn from_sqlite(value: Value, native: &NativeType) -> SqlValue {
    match (value, native) {
        (Value::Null, _) => SqlValue::Null,
        (Value::Integer(i), NativeType::Boolean) => SqlValue::Boolean(i != 0),
        (Value::Integer(i), NativeType::Decimal | NativeType::Numeric) => {
            SqlValue::Decimal(i.to_string())
        }
        (Value::Real(f), NativeType::Decimal | NativeType::Numeric) => {
            SqlValue::Decimal(f.to_string())
        }
        (Value::Integer(i), NativeType::Real | NativeType::Double) => SqlValue::Double(i as f64),
        (Value::Integer(i), _) => SqlValue::Integer(i),
        (Value::Real(f), _) => SqlValue::Double(f),
        (Value::Blob(b), _) => SqlValue::Blob(b),
        (Value::Text(s), NativeType::Date) => match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
            Ok(d) => SqlValue::Date(d),
            Err(_) => SqlValue::Text(s),
        },
        (Value::Text(s), NativeType::Time) => match NaiveTime::parse_from_str(&s, "%H:%M:%S%.f") {
            Ok(t) => SqlValue::Time(t),
            Err(_) => SqlValue::Text(s),
        },
        (Value::Text(s), NativeType::Timestamp) => match parse_timestamp(&s) {
            Some(ts) => SqlValue::Timestamp(ts),
            None => SqlValue::Text(s),
        },
        (Value::Text(s), NativeType::Clob) => SqlValue::Clob(s),
        (Value::Text(s), NativeType::Xml) => SqlValue::Xml(s),
        (Value::Text(s), NativeType::Decimal | NativeType::Numeric) => SqlValue::Decimal(s),
        (Value::Text(s), _) => SqlValue::Text(s),
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> SqliteProvider {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER, placed DATE, total DECIMAL(8,2), note TEXT);
             INSERT INTO orders VALUES (1, '2024-03-01', 12.5, 'first');
             INSERT INTO orders VALUES (2, '2024-03-02', 7, NULL);",
        )
        .unwrap();
        SqliteProvider::new().with_connection("main", conn)
    }

    #[test]
    fn test_query_materialises_declared_types() {
        let mut provider = provider();
        let mut session = provider.open("main").unwrap();
        let mut results = session
            .execute(
                "SELECT id, placed, total, note, id * 2 AS twice FROM orders WHERE id = ?",
                &[BoundParameter::new(SqlValue::Integer(1))],
                StatementKind::Query,
            )
            .unwrap();

        let cursor = results.cursor_mut().unwrap();
        let natives: Vec<NativeType> = cursor.columns().iter().map(|c| c.native.clone()).collect();
        assert_eq!(
            natives,
            vec![
                NativeType::Integer,
                NativeType::Date,
                NativeType::Decimal,
                NativeType::Varchar,
                NativeType::BigInt,
            ]
        );
        assert!(cursor.advance().unwrap());
        assert_eq!(
            cursor.value(1).unwrap(),
            &SqlValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(cursor.value(2).unwrap(), &SqlValue::Decimal("12.5".into()));
        assert_eq!(cursor.value(4).unwrap(), &SqlValue::Integer(2));
        assert!(!cursor.advance().unwrap());
    }

    #[test]
    fn test_update_reports_changed_rows() {
        let mut provider = provider();
        let mut session = provider.open("main").unwrap();
        let mut results = session
            .execute(
                "UPDATE orders SET note = ?",
                &[BoundParameter::new(SqlValue::Text("x".into()))],
                StatementKind::Update,
            )
            .unwrap();
        assert!(!results.has_cursor());
        assert_eq!(results.update_count().unwrap(), Some(2));
    }

    #[test]
    fn test_out_parameters_are_rejected() {
        let mut provider = provider();
        let mut session = provider.open("main").unwrap();
        let mut param = BoundParameter::new(SqlValue::Null);
        param.direction = Direction::Out;
        let err = session
            .execute("SELECT ?", &[param], StatementKind::Call)
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::Unsupported(_)));
    }
}
