#![allow(dead_code)]

use sqlxml::session::{ColumnMeta, MemoryCursor, NativeType};
use sqlxml::{Interpreter, InterpreterConfig, MemoryProvider, SqlValue, SqlXmlError};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const SQL_NS: &str = "http://orbeon.org/oxf/xml/sql";

/// Wraps template content in a root element declaring the `sql` prefix.
pub fn template(body: &str) -> String {
    format!(r#"<r xmlns:sql="{}">{}</r>"#, SQL_NS, body)
}

/// The content of the root element written by [`template`].
pub fn body_of(output: &str) -> &str {
    let start = output.find('>').map(|i| i + 1).unwrap_or(0);
    let end = output.rfind("</r>").unwrap_or(output.len());
    &output[start..end]
}

/// A provider with the `db` datasource, scripted by the caller.
pub fn provider() -> MemoryProvider {
    MemoryProvider::new().with_datasource("db")
}

pub fn interpreter() -> Interpreter {
    Interpreter::new(InterpreterConfig::default().with_default_datasource("db"))
}

/// Runs `body` wrapped by [`template`] and returns the root element's content.
pub fn run(body: &str, data: &str, provider: &mut MemoryProvider) -> Result<String, SqlXmlError> {
    let output = interpreter().run_to_string(&template(body), data, provider)?;
    Ok(body_of(&output).to_string())
}

/// Builds a cursor from `(name, type)` columns and rows of values.
pub fn cursor(columns: &[(&str, NativeType)], rows: Vec<Vec<SqlValue>>) -> MemoryCursor {
    let meta = columns
        .iter()
        .map(|(name, native)| ColumnMeta::new(name, native.clone()))
        .collect();
    let mut cursor = MemoryCursor::new(meta);
    for row in rows {
        cursor.push_row(row);
    }
    cursor
}

pub fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

pub fn int(i: i64) -> SqlValue {
    SqlValue::Integer(i)
}
