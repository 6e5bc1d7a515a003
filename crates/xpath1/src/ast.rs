//! Syntax tree for parsed XPath 1.0 expressions.

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(String),
    Number(f64),
    LocationPath(LocationPath),
    Variable(String),
    FunctionCall {
        name: FunctionName,
        args: Vec<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    Negate(Box<Expression>),
}

/// A possibly prefixed function name. Unprefixed names address the core
/// library; prefixed names are resolved by the caller's bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionName {
    pub prefix: Option<String>,
    pub local: String,
}

impl FunctionName {
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once(':') {
            Some((prefix, local)) => FunctionName {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            },
            None => FunctionName {
                prefix: None,
                local: qualified.to_string(),
            },
        }
    }
}

impl std::fmt::Display for FunctionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{}:{}", p, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Union,
}

/// `/a/b`, `item[@sku='a']`, or `$var/item` (a path with a filter start).
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    pub start_point: Option<Box<Expression>>,
    /// Starts at the document root. Ignored when `start_point` is set.
    pub is_absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    /// Reverse axes number their nodes from the context node outwards.
    pub fn is_reverse(self) -> bool {
        matches!(self, Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `foo` or `ns:foo`; only the local part is compared.
    Name(String),
    Wildcard,
    Text,
    Comment,
    ProcessingInstruction,
    AnyNode,
}
