//! An XPath 1.0 evaluator written against an abstract node model.
//!
//! The evaluator knows nothing about where nodes come from: callers implement
//! [`DataSourceNode`] for their tree and [`Bindings`] for the variables and
//! prefixed extension functions visible to an expression.

pub mod ast;
pub mod axes;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod functions;
pub mod operators;
pub mod parser;

pub use ast::{Axis, BinaryOperator, Expression, FunctionName, LocationPath, NodeTest, Step};
pub use datasource::{DataSourceNode, NodeType, QName};
pub use engine::{Bindings, EvaluationContext, NoBindings, XPathValue, evaluate};

// Re-export test utilities for integration testing in downstream crates
pub use datasource::tests;
pub use error::XPathError;
pub use parser::parse_expression;
