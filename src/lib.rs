//! An XML template interpreter with embedded SQL directives.
//!
//! Templates mix literal XML with elements in the
//! `http://orbeon.org/oxf/xml/sql` namespace. The interpreter walks the
//! template once, runs the statements those elements describe against a
//! database session, and streams the literal content interleaved with the
//! query results as XML events.
//!
//! ```no_run
//! use sqlxml::{Interpreter, InterpreterConfig, MemoryProvider};
//!
//! let template = r#"<rows xmlns:sql="http://orbeon.org/oxf/xml/sql">
//!   <sql:execute>
//!     <sql:query>SELECT name FROM t</sql:query>
//!     <sql:result-set><sql:row-iterator>
//!       <row><sql:get-column column="name"/></row>
//!     </sql:row-iterator></sql:result-set>
//!   </sql:execute>
//! </rows>"#;
//! let interpreter = Interpreter::new(InterpreterConfig::default().with_default_datasource("db"));
//! let mut provider = MemoryProvider::new().with_datasource("db");
//! let xml = interpreter.run_to_string(template, "<data/>", &mut provider)?;
//! # Ok::<(), sqlxml::SqlXmlError>(())
//! ```

pub mod config;
pub mod context;
pub mod datasource;
pub mod directives;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod interpreter;
pub mod session;
pub mod template;
pub mod types;

pub use config::InterpreterConfig;
pub use datasource::{XmlDocument, XmlNode};
pub use error::{Location, SqlXmlError};
pub use events::{Event, EventBuffer, EventSink, NullSink, XmlName, XmlWriterSink};
pub use interpreter::Interpreter;
pub use session::{
    MemoryProvider, ResultItem, Session, SessionError, SessionProvider, SqlValue, StatementKind,
};
#[cfg(feature = "sqlite")]
pub use session::SqliteProvider;
pub use template::Template;
pub use types::LogicalType;
