//! The evaluation engine for executing a parsed XPath AST against a generic `DataSourceNode`.

use super::ast::{BinaryOperator, Expression, FunctionName, LocationPath, NodeTest, Step};
use super::{axes, functions, operators};
use crate::ast::Axis;
use crate::datasource::{DataSourceNode, NodeType};
use crate::error::XPathError;
use std::fmt;

/// Represents the possible result types of an XPath expression evaluation.
#[derive(Debug, Clone)]
pub enum XPathValue<N> {
    /// Always sorted in document order without duplicates.
    NodeSet(Vec<N>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl<'a, N: DataSourceNode<'a>> XPathValue<N> {
    /// Coerces the XPath value to a boolean as per XPath 1.0 rules.
    pub fn to_bool(&self) -> bool {
        match self {
            XPathValue::NodeSet(nodes) => !nodes.is_empty(),
            XPathValue::String(s) => !s.is_empty(),
            XPathValue::Number(n) => *n != 0.0 && !n.is_nan(),
            XPathValue::Boolean(b) => *b,
        }
    }

    /// Coerces the XPath value to a number as per XPath 1.0 rules.
    pub fn to_number(&self) -> f64 {
        match self {
            XPathValue::Number(n) => *n,
            XPathValue::String(s) => string_to_number(s),
            XPathValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            XPathValue::NodeSet(nodes) => nodes
                .first()
                .map(|n| string_to_number(&n.string_value()))
                .unwrap_or(f64::NAN),
        }
    }
}

impl<'a, N: DataSourceNode<'a>> fmt::Display for XPathValue<N> {
    /// Coerces the XPath value to a string as per XPath 1.0 rules.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XPathValue::NodeSet(nodes) => write!(
                f,
                "{}",
                nodes.first().map(|n| n.string_value()).unwrap_or_default()
            ),
            XPathValue::String(s) => write!(f, "{}", s),
            XPathValue::Number(n) => write!(f, "{}", number_to_string(*n)),
            XPathValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// XPath `number()` applied to a string. Only plain decimal notation is
/// accepted; anything else, including exponents, is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    let digits = t.strip_prefix('-').unwrap_or(t);
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return f64::NAN,
        }
    }
    if !seen_digit {
        return f64::NAN;
    }
    t.parse().unwrap_or(f64::NAN)
}

/// XPath `string()` applied to a number.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

/// Supplies what an expression can see beyond the tree itself: `$variables`
/// and functions outside the core library.
pub trait Bindings<'a, N: DataSourceNode<'a>> {
    fn variable(&self, name: &str) -> Option<XPathValue<N>>;

    /// Called for prefixed names and for unprefixed names the core library
    /// does not define.
    fn call_extension(
        &self,
        name: &FunctionName,
        _args: Vec<XPathValue<N>>,
    ) -> Result<XPathValue<N>, XPathError> {
        Err(XPathError::UnknownFunction(name.to_string()))
    }
}

/// Bindings with no variables and no extension functions.
pub struct NoBindings;

impl<'a, N: DataSourceNode<'a>> Bindings<'a, N> for NoBindings {
    fn variable(&self, _name: &str) -> Option<XPathValue<N>> {
        None
    }
}

/// A container for all state needed during expression evaluation.
/// `'a` is the lifetime of the underlying data source.
/// `'d` is the lifetime of the evaluation context itself.
pub struct EvaluationContext<'a, 'd, N: DataSourceNode<'a>> {
    pub context_node: N,
    pub root_node: N,
    pub position: usize, // 1-based index
    pub size: usize,
    pub bindings: &'d dyn Bindings<'a, N>,
    /// Unknown variables are errors instead of empty strings.
    pub strict: bool,
}

impl<'a, 'd, N: DataSourceNode<'a>> EvaluationContext<'a, 'd, N> {
    pub fn new(context_node: N, root_node: N, bindings: &'d dyn Bindings<'a, N>, strict: bool) -> Self {
        Self {
            context_node,
            root_node,
            position: 1,
            size: 1,
            bindings,
            strict,
        }
    }

    fn with_focus(&self, context_node: N, position: usize, size: usize) -> Self {
        Self {
            context_node,
            root_node: self.root_node,
            position,
            size,
            bindings: self.bindings,
            strict: self.strict,
        }
    }
}

/// Evaluates a compiled expression and returns a concrete `XPathValue`.
pub fn evaluate<'a, N>(
    expr: &Expression,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    match expr {
        Expression::Literal(s) => Ok(XPathValue::String(s.clone())),
        Expression::Number(n) => Ok(XPathValue::Number(*n)),
        Expression::LocationPath(path) => {
            let nodes = evaluate_location_path(path, e_ctx)?;
            Ok(XPathValue::NodeSet(nodes))
        }
        Expression::Variable(name) => match e_ctx.bindings.variable(name) {
            Some(value) => Ok(value),
            None if e_ctx.strict => Err(XPathError::UnknownVariable(name.clone())),
            None => Ok(XPathValue::String(String::new())),
        },
        Expression::FunctionCall { name, args } => {
            let mut evaluated_args = Vec::with_capacity(args.len());
            for arg in args {
                evaluated_args.push(evaluate(arg, e_ctx)?);
            }
            if name.prefix.is_none() && functions::is_core_function(&name.local) {
                functions::evaluate_function(&name.local, evaluated_args, e_ctx)
            } else {
                e_ctx.bindings.call_extension(name, evaluated_args)
            }
        }
        Expression::BinaryOp { left, op, right } => {
            // `and`/`or` do not evaluate their right operand when the left
            // one decides the result.
            match op {
                BinaryOperator::Or => {
                    let l = evaluate(left, e_ctx)?.to_bool();
                    Ok(XPathValue::Boolean(l || evaluate(right, e_ctx)?.to_bool()))
                }
                BinaryOperator::And => {
                    let l = evaluate(left, e_ctx)?.to_bool();
                    Ok(XPathValue::Boolean(l && evaluate(right, e_ctx)?.to_bool()))
                }
                _ => {
                    let left_val = evaluate(left, e_ctx)?;
                    let right_val = evaluate(right, e_ctx)?;
                    operators::evaluate(*op, left_val, right_val)
                }
            }
        }
        Expression::Negate(inner) => Ok(XPathValue::Number(-evaluate(inner, e_ctx)?.to_number())),
    }
}

fn evaluate_location_path<'a, N>(
    path: &LocationPath,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let initial_context = if let Some(start_expr) = &path.start_point {
        match evaluate(start_expr, e_ctx)? {
            XPathValue::NodeSet(nodes) => nodes,
            other => {
                return Err(XPathError::TypeError(format!(
                    "cannot apply a path step to the non-node-set value '{}'",
                    other
                )));
            }
        }
    } else if path.is_absolute {
        vec![e_ctx.root_node]
    } else {
        vec![e_ctx.context_node]
    };

    let mut current_nodes = initial_context;
    for step in &path.steps {
        current_nodes = evaluate_step(step, &current_nodes, e_ctx)?;
    }
    Ok(current_nodes)
}

/// Evaluates one step for every node of the input set. Predicates see
/// positions along the axis for each context node separately; the combined
/// result is returned in document order.
fn evaluate_step<'a, N>(
    step: &Step,
    context_nodes: &[N],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut result = Vec::new();
    for &node in context_nodes {
        let candidates: Vec<N> = axes::collect(step.axis, node)
            .into_iter()
            .filter(|n| matches_node_test(n, &step.node_test, step.axis))
            .collect();
        result.extend(apply_predicates(candidates, &step.predicates, e_ctx)?);
    }
    if context_nodes.len() > 1 || step.axis.is_reverse() {
        result.sort();
        result.dedup();
    }
    Ok(result)
}

fn matches_node_test<'a, N: DataSourceNode<'a>>(node: &N, test: &NodeTest, axis: Axis) -> bool {
    let principal = if axis == Axis::Attribute {
        NodeType::Attribute
    } else {
        NodeType::Element
    };
    match test {
        NodeTest::Wildcard => node.node_type() == principal,
        NodeTest::Name(name) => {
            let local = name.split_once(':').map_or(name.as_str(), |(_, l)| l);
            node.node_type() == principal && node.name().is_some_and(|q| q.local_part == local)
        }
        NodeTest::Text => node.node_type() == NodeType::Text,
        NodeTest::Comment => node.node_type() == NodeType::Comment,
        NodeTest::ProcessingInstruction => node.node_type() == NodeType::ProcessingInstruction,
        NodeTest::AnyNode => true,
    }
}

fn apply_predicates<'a, N>(
    nodes: Vec<N>,
    predicates: &[Expression],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut final_nodes = nodes;
    for predicate in predicates {
        let context_size = final_nodes.len();
        let mut kept = Vec::with_capacity(context_size);
        for (i, node) in final_nodes.iter().enumerate() {
            let predicate_ctx = e_ctx.with_focus(*node, i + 1, context_size);
            let keep = match evaluate(predicate, &predicate_ctx)? {
                XPathValue::Number(n) => n == (i + 1) as f64,
                other => other.to_bool(),
            };
            if keep {
                kept.push(*node);
            }
        }
        final_nodes = kept;
    }
    Ok(final_nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, MockTree, create_test_tree};
    use crate::parser::parse_expression;
    use std::collections::HashMap;

    struct MapBindings<'a> {
        vars: HashMap<String, XPathValue<MockNode<'a>>>,
    }

    impl<'a> Bindings<'a, MockNode<'a>> for MapBindings<'a> {
        fn variable(&self, name: &str) -> Option<XPathValue<MockNode<'a>>> {
            self.vars.get(name).cloned()
        }

        fn call_extension(
            &self,
            name: &FunctionName,
            args: Vec<XPathValue<MockNode<'a>>>,
        ) -> Result<XPathValue<MockNode<'a>>, XPathError> {
            match (name.prefix.as_deref(), name.local.as_str()) {
                (Some("t"), "twice") => Ok(XPathValue::Number(args[0].to_number() * 2.0)),
                _ => Err(XPathError::UnknownFunction(name.to_string())),
            }
        }
    }

    fn eval<'a>(tree: &'a MockTree, expr: &str) -> Result<XPathValue<MockNode<'a>>, XPathError> {
        let root = tree.root();
        let expr = parse_expression(expr)?;
        evaluate(&expr, &EvaluationContext::new(root, root, &NoBindings, false))
    }

    fn ids(value: XPathValue<MockNode<'_>>) -> Vec<usize> {
        match value {
            XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.id).collect(),
            other => panic!("Expected a NodeSet, got {:?}", other),
        }
    }

    #[test]
    fn test_child_and_attribute_paths() {
        let tree = create_test_tree();
        assert_eq!(ids(eval(&tree, "/order/item").unwrap()), vec![3, 8]);
        assert_eq!(ids(eval(&tree, "order/item/@sku").unwrap()), vec![4, 9]);
        assert_eq!(eval(&tree, "string(/order/@id)").unwrap().to_string(), "o1");
    }

    #[test]
    fn test_predicate_by_attribute() {
        let tree = create_test_tree();
        let result = eval(&tree, "/order/item[@sku='b']").unwrap();
        assert_eq!(ids(result), vec![8]);
    }

    #[test]
    fn test_predicate_by_position() {
        let tree = create_test_tree();
        assert_eq!(ids(eval(&tree, "/order/item[2]").unwrap()), vec![8]);
        assert_eq!(ids(eval(&tree, "/order/item[position()=1]").unwrap()), vec![3]);
        assert_eq!(ids(eval(&tree, "/order/item[last()]").unwrap()), vec![8]);
    }

    #[test]
    fn test_reverse_axis_positions_and_document_order() {
        let tree = create_test_tree();
        // The nearest preceding sibling element of <total> is the second item.
        let result = eval(&tree, "/order/total/preceding-sibling::item[1]").unwrap();
        assert_eq!(ids(result), vec![8]);
        let result = eval(&tree, "//text()/ancestor::*").unwrap();
        assert_eq!(ids(result), vec![1, 3, 8, 12]);
    }

    #[test]
    fn test_descendants_and_parent() {
        let tree = create_test_tree();
        assert_eq!(ids(eval(&tree, "//item").unwrap()), vec![3, 8]);
        assert_eq!(ids(eval(&tree, "//@qty/..").unwrap()), vec![3, 8]);
        assert_eq!(ids(eval(&tree, "/order/comment()").unwrap()), vec![7]);
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        let tree = create_test_tree();
        assert_eq!(eval(&tree, "sum(//@qty) * 2").unwrap().to_number(), 14.0);
        assert!(eval(&tree, "/order/total = 7").unwrap().to_bool());
        assert!(eval(&tree, "//@qty > 4").unwrap().to_bool());
        assert!(!eval(&tree, "//@qty > 5").unwrap().to_bool());
        assert_eq!(eval(&tree, "7 mod 3").unwrap().to_number(), 1.0);
        assert_eq!(eval(&tree, "-(1 - 1)").unwrap().to_string(), "0");
    }

    #[test]
    fn test_short_circuit_skips_failing_operand() {
        let tree = create_test_tree();
        assert!(eval(&tree, "true() or t:missing()").unwrap().to_bool());
        assert!(!eval(&tree, "false() and t:missing()").unwrap().to_bool());
        assert!(matches!(
            eval(&tree, "t:missing()"),
            Err(XPathError::UnknownFunction(_))
        ));
    }

    #[test]
    fn test_variables_and_extensions() {
        let tree = create_test_tree();
        let root = tree.root();
        let mut vars = HashMap::new();
        vars.insert("item".to_string(), XPathValue::NodeSet(vec![tree.node(3)]));
        let bindings = MapBindings { vars };
        let ctx = EvaluationContext::new(root, root, &bindings, true);

        let expr = parse_expression("$item/text()").unwrap();
        assert_eq!(evaluate(&expr, &ctx).unwrap().to_string(), "Apple");

        let expr = parse_expression("t:twice($item/@qty)").unwrap();
        assert_eq!(evaluate(&expr, &ctx).unwrap().to_number(), 4.0);

        let expr = parse_expression("$missing").unwrap();
        assert_eq!(
            evaluate(&expr, &ctx).unwrap_err(),
            XPathError::UnknownVariable("missing".into())
        );
    }

    #[test]
    fn test_path_from_non_node_set_is_an_error() {
        let tree = create_test_tree();
        assert!(matches!(eval(&tree, "'x'/a"), Err(XPathError::TypeError(_))));
    }

    #[test]
    fn test_number_conversions() {
        assert_eq!(string_to_number(" 12.5 "), 12.5);
        assert!(string_to_number("1e3").is_nan());
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("").is_nan());
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.25), "0.25");
        assert_eq!(number_to_string(f64::NAN), "NaN");
    }
}
