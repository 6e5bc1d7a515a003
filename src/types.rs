//! Logical value types and how column values are projected as text.

use crate::error::SqlXmlError;
use crate::events::EventSink;
use crate::session::{NativeType, SqlValue};
use crate::template::read_fragment;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{NaiveDate, NaiveDateTime};
use sqlxml_xpath1::engine::number_to_string;

/// The interpreter's own value kinds, independent of any engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    String,
    Integer,
    Decimal,
    Double,
    Boolean,
    Date,
    DateTime,
    Base64Binary,
    Clob,
    XmlFragment,
    /// Raw text spliced into a statement.
    LiteralString,
    AnyUri,
}

impl LogicalType {
    /// Parses a type name with or without its `xs:`/`odt:` prefix, e.g.
    /// `xs:int`, `dateTime`, `odt:xmlFragment` or `xml-fragment`.
    pub fn parse(name: &str) -> Option<LogicalType> {
        let local = name.rsplit(':').next().unwrap_or(name);
        let key: String = local
            .chars()
            .filter(|c| *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        let t = match key.as_str() {
            "string" => LogicalType::String,
            "int" | "integer" | "long" | "short" => LogicalType::Integer,
            "decimal" => LogicalType::Decimal,
            "double" | "float" => LogicalType::Double,
            "boolean" => LogicalType::Boolean,
            "date" => LogicalType::Date,
            "datetime" | "timestamp" => LogicalType::DateTime,
            "base64binary" => LogicalType::Base64Binary,
            "clob" => LogicalType::Clob,
            "xmlfragment" => LogicalType::XmlFragment,
            "literalstring" => LogicalType::LiteralString,
            "anyuri" => LogicalType::AnyUri,
            _ => return None,
        };
        Some(t)
    }

    pub fn name(&self) -> &'static str {
        match self {
            LogicalType::String => "xs:string",
            LogicalType::Integer => "xs:int",
            LogicalType::Decimal => "xs:decimal",
            LogicalType::Double => "xs:double",
            LogicalType::Boolean => "xs:boolean",
            LogicalType::Date => "xs:date",
            LogicalType::DateTime => "xs:dateTime",
            LogicalType::Base64Binary => "xs:base64Binary",
            LogicalType::Clob => "odt:clob",
            LogicalType::XmlFragment => "odt:xmlFragment",
            LogicalType::LiteralString => "odt:literalString",
            LogicalType::AnyUri => "xs:anyURI",
        }
    }
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The logical type a column of `native` type projects as by default.
pub fn default_logical_type(native: &NativeType) -> LogicalType {
    match native {
        NativeType::Char | NativeType::Varchar | NativeType::LongVarchar => LogicalType::String,
        NativeType::Clob => LogicalType::Clob,
        NativeType::Integer | NativeType::BigInt | NativeType::SmallInt => LogicalType::Integer,
        NativeType::Numeric | NativeType::Decimal => LogicalType::Decimal,
        NativeType::Real | NativeType::Double => LogicalType::Double,
        NativeType::Boolean => LogicalType::Boolean,
        NativeType::Date => LogicalType::Date,
        NativeType::Time => LogicalType::String,
        NativeType::Timestamp => LogicalType::DateTime,
        NativeType::Binary | NativeType::Blob => LogicalType::Base64Binary,
        NativeType::Xml => LogicalType::XmlFragment,
        NativeType::Other(_) => LogicalType::String,
    }
}

/// Checks a requested type against the column's default. Textual columns may
/// additionally be read as XML fragments.
pub fn resolve_column_type(
    native: &NativeType,
    requested: Option<LogicalType>,
) -> Result<LogicalType, SqlXmlError> {
    let default = default_logical_type(native);
    match requested {
        None => Ok(default),
        Some(t) if t == default => Ok(t),
        Some(LogicalType::XmlFragment)
            if matches!(
                default,
                LogicalType::String | LogicalType::Clob | LogicalType::XmlFragment
            ) =>
        {
            Ok(LogicalType::XmlFragment)
        }
        Some(t) => Err(SqlXmlError::Resolution(format!(
            "type {} does not match column type {} (expected {})",
            t,
            native.name(),
            default
        ))),
    }
}

/// The legacy `get-*` directives and the type each one reads.
pub static LEGACY_GETTERS: &[(&str, LogicalType)] = &[
    ("get-string", LogicalType::String),
    ("get-int", LogicalType::Integer),
    ("get-integer", LogicalType::Integer),
    ("get-double", LogicalType::Double),
    ("get-float", LogicalType::Double),
    ("get-decimal", LogicalType::Decimal),
    ("get-boolean", LogicalType::Boolean),
    ("get-date", LogicalType::Date),
    ("get-timestamp", LogicalType::DateTime),
    ("get-base64binary", LogicalType::Base64Binary),
    ("get-xml", LogicalType::XmlFragment),
];

pub fn legacy_getter_type(name: &str) -> Option<LogicalType> {
    LEGACY_GETTERS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, t)| *t)
}

pub fn format_double(f: f64) -> String {
    number_to_string(f)
}

/// Canonical text of a value, `None` for SQL NULL.
pub fn value_text(value: &SqlValue) -> Option<String> {
    let text = match value {
        SqlValue::Null => return None,
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Decimal(s) => s.clone(),
        SqlValue::Double(f) => format_double(*f),
        SqlValue::Boolean(b) => b.to_string(),
        SqlValue::Text(s) | SqlValue::Clob(s) | SqlValue::Xml(s) => s.clone(),
        SqlValue::Blob(b) => STANDARD.encode(b),
        SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        SqlValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
        SqlValue::Timestamp(ts) => ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
    };
    Some(text)
}

const BASE64_CHUNK: usize = 3 * 1024;

/// Writes a value to `sink` as `logical`. NULL writes nothing.
pub fn emit_value(
    sink: &mut dyn EventSink,
    logical: LogicalType,
    value: &SqlValue,
) -> Result<(), SqlXmlError> {
    match (logical, value) {
        (_, SqlValue::Null) => Ok(()),
        (LogicalType::XmlFragment, SqlValue::Text(s) | SqlValue::Clob(s) | SqlValue::Xml(s)) => {
            read_fragment(s)?.replay(sink)
        }
        (_, SqlValue::Blob(bytes)) => {
            for chunk in bytes.chunks(BASE64_CHUNK) {
                sink.characters(&STANDARD.encode(chunk))?;
            }
            Ok(())
        }
        (_, other) => match value_text(other) {
            Some(text) if !text.is_empty() => sink.characters(&text),
            _ => Ok(()),
        },
    }
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

pub fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    .or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

pub fn parse_boolean(text: &str) -> Option<bool> {
    match text.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Parses integer text, accepting a zero fraction such as `7.0`.
pub fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>().ok().or_else(|| {
        let f = text.parse::<f64>().ok()?;
        (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
    })
}

fn conversion_error(value: &SqlValue, logical: LogicalType) -> SqlXmlError {
    SqlXmlError::Conversion(format!("cannot convert {:?} to {}", value, logical))
}

/// Coerces a stored value to `logical`, as the legacy getters do.
pub fn convert(value: &SqlValue, logical: LogicalType) -> Result<SqlValue, SqlXmlError> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    let text = || value_text(value).unwrap_or_default();
    let converted = match logical {
        LogicalType::String | LogicalType::LiteralString | LogicalType::AnyUri => {
            SqlValue::Text(text())
        }
        LogicalType::Clob => SqlValue::Clob(text()),
        LogicalType::XmlFragment => SqlValue::Xml(text()),
        LogicalType::Integer => match value {
            SqlValue::Integer(i) => SqlValue::Integer(*i),
            SqlValue::Boolean(b) => SqlValue::Integer(i64::from(*b)),
            SqlValue::Double(f) if f.fract() == 0.0 => SqlValue::Integer(*f as i64),
            SqlValue::Decimal(s) | SqlValue::Text(s) | SqlValue::Clob(s) => {
                SqlValue::Integer(parse_integer(s).ok_or_else(|| conversion_error(value, logical))?)
            }
            _ => return Err(conversion_error(value, logical)),
        },
        LogicalType::Decimal => match value {
            SqlValue::Integer(_) | SqlValue::Double(_) | SqlValue::Decimal(_) => {
                SqlValue::Decimal(text())
            }
            SqlValue::Text(s) | SqlValue::Clob(s) if s.trim().parse::<f64>().is_ok() => {
                SqlValue::Decimal(s.trim().to_string())
            }
            _ => return Err(conversion_error(value, logical)),
        },
        LogicalType::Double => match value {
            SqlValue::Integer(i) => SqlValue::Double(*i as f64),
            SqlValue::Double(f) => SqlValue::Double(*f),
            SqlValue::Decimal(s) | SqlValue::Text(s) | SqlValue::Clob(s) => SqlValue::Double(
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| conversion_error(value, logical))?,
            ),
            _ => return Err(conversion_error(value, logical)),
        },
        LogicalType::Boolean => match value {
            SqlValue::Boolean(b) => SqlValue::Boolean(*b),
            SqlValue::Integer(i) => SqlValue::Boolean(*i != 0),
            SqlValue::Text(s) | SqlValue::Decimal(s) => {
                SqlValue::Boolean(parse_boolean(s).ok_or_else(|| conversion_error(value, logical))?)
            }
            _ => return Err(conversion_error(value, logical)),
        },
        LogicalType::Date => match value {
            SqlValue::Date(d) => SqlValue::Date(*d),
            SqlValue::Timestamp(ts) => SqlValue::Date(ts.date()),
            SqlValue::Text(s) => {
                SqlValue::Date(parse_date(s).ok_or_else(|| conversion_error(value, logical))?)
            }
            _ => return Err(conversion_error(value, logical)),
        },
        LogicalType::DateTime => match value {
            SqlValue::Timestamp(ts) => SqlValue::Timestamp(*ts),
            SqlValue::Date(d) => SqlValue::Timestamp(
                d.and_hms_opt(0, 0, 0)
                    .ok_or_else(|| conversion_error(value, logical))?,
            ),
            SqlValue::Text(s) => SqlValue::Timestamp(
                parse_date_time(s).ok_or_else(|| conversion_error(value, logical))?,
            ),
            _ => return Err(conversion_error(value, logical)),
        },
        LogicalType::Base64Binary => match value {
            SqlValue::Blob(b) => SqlValue::Blob(b.clone()),
            SqlValue::Text(s) | SqlValue::Clob(s) | SqlValue::Xml(s) => {
                SqlValue::Blob(s.as_bytes().to_vec())
            }
            _ => return Err(conversion_error(value, logical)),
        },
    };
    Ok(converted)
}
