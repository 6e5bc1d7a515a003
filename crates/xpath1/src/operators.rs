//! Binary operators other than the short-circuiting `and`/`or`.

use super::ast::BinaryOperator;
use super::engine::XPathValue;
use crate::datasource::DataSourceNode;
use crate::error::XPathError;

pub fn evaluate<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, XPathError> {
    match op {
        BinaryOperator::Union => union(left, right),
        BinaryOperator::Plus => arithmetic(&left, &right, |a, b| a + b),
        BinaryOperator::Minus => arithmetic(&left, &right, |a, b| a - b),
        BinaryOperator::Multiply => arithmetic(&left, &right, |a, b| a * b),
        BinaryOperator::Divide => arithmetic(&left, &right, |a, b| a / b),
        BinaryOperator::Modulo => arithmetic(&left, &right, |a, b| a % b),
        BinaryOperator::Or => Ok(XPathValue::Boolean(left.to_bool() || right.to_bool())),
        BinaryOperator::And => Ok(XPathValue::Boolean(left.to_bool() && right.to_bool())),
        _ => Ok(XPathValue::Boolean(compare(op, &left, &right))),
    }
}

fn arithmetic<'a, N: DataSourceNode<'a>>(
    left: &XPathValue<N>,
    right: &XPathValue<N>,
    f: impl Fn(f64, f64) -> f64,
) -> Result<XPathValue<N>, XPathError> {
    Ok(XPathValue::Number(f(left.to_number(), right.to_number())))
}

fn union<'a, N: DataSourceNode<'a>>(
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, XPathError> {
    match (left, right) {
        (XPathValue::NodeSet(mut l), XPathValue::NodeSet(r)) => {
            l.extend(r);
            l.sort();
            l.dedup();
            Ok(XPathValue::NodeSet(l))
        }
        (l, r) => Err(XPathError::TypeError(format!(
            "union operands must be node-sets, got '{}' and '{}'",
            l, r
        ))),
    }
}

/// Comparison with the XPath 1.0 node-set rules: a comparison involving a
/// node-set holds if it holds for at least one member.
fn compare<'a, N: DataSourceNode<'a>>(op: BinaryOperator, left: &XPathValue<N>, right: &XPathValue<N>) -> bool {
    match (left, right) {
        (XPathValue::NodeSet(l), XPathValue::NodeSet(r)) => {
            let right_values: Vec<String> = r.iter().map(|n| n.string_value()).collect();
            l.iter().any(|a| {
                let a = XPathValue::<N>::String(a.string_value());
                right_values
                    .iter()
                    .any(|b| compare_scalars(op, &a, &XPathValue::String(b.clone())))
            })
        }
        (XPathValue::NodeSet(_), XPathValue::Boolean(_)) | (XPathValue::Boolean(_), XPathValue::NodeSet(_)) => {
            compare_scalars(
                op,
                &XPathValue::<N>::Boolean(left.to_bool()),
                &XPathValue::Boolean(right.to_bool()),
            )
        }
        (XPathValue::NodeSet(l), other) => l
            .iter()
            .any(|n| compare_scalars(op, &XPathValue::String(n.string_value()), other)),
        (other, XPathValue::NodeSet(r)) => r
            .iter()
            .any(|n| compare_scalars(op, other, &XPathValue::String(n.string_value()))),
        _ => compare_scalars(op, left, right),
    }
}

fn compare_scalars<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: &XPathValue<N>,
    right: &XPathValue<N>,
) -> bool {
    match op {
        BinaryOperator::Equals | BinaryOperator::NotEquals => {
            let equal = match (left, right) {
                (XPathValue::Boolean(_), _) | (_, XPathValue::Boolean(_)) => {
                    left.to_bool() == right.to_bool()
                }
                (XPathValue::Number(_), _) | (_, XPathValue::Number(_)) => {
                    left.to_number() == right.to_number()
                }
                _ => left.to_string() == right.to_string(),
            };
            if op == BinaryOperator::Equals {
                equal
            } else {
                // NaN is unequal to everything, itself included.
                !equal
            }
        }
        BinaryOperator::LessThan => left.to_number() < right.to_number(),
        BinaryOperator::LessThanOrEqual => left.to_number() <= right.to_number(),
        BinaryOperator::GreaterThan => left.to_number() > right.to_number(),
        BinaryOperator::GreaterThanOrEqual => left.to_number() >= right.to_number(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};

    #[test]
    fn test_node_set_comparisons_are_existential() {
        let tree = create_test_tree();
        let quantities: Vec<MockNode> = vec![tree.node(5), tree.node(10)];
        let qty = XPathValue::NodeSet(quantities);

        let eq = evaluate(BinaryOperator::Equals, qty.clone(), XPathValue::Number(5.0)).unwrap();
        assert!(eq.to_bool());
        let ne = evaluate(BinaryOperator::NotEquals, qty.clone(), XPathValue::Number(5.0)).unwrap();
        assert!(ne.to_bool());
        let lt = evaluate(BinaryOperator::LessThan, XPathValue::Number(1.0), qty.clone()).unwrap();
        assert!(lt.to_bool());
        let empty = XPathValue::NodeSet(Vec::<MockNode>::new());
        let eq = evaluate(BinaryOperator::Equals, empty, XPathValue::Boolean(false)).unwrap();
        assert!(eq.to_bool());
    }

    #[test]
    fn test_scalar_equality_coercion() {
        let eq = evaluate::<MockNode>(
            BinaryOperator::Equals,
            XPathValue::String("1.0".into()),
            XPathValue::Number(1.0),
        )
        .unwrap();
        assert!(eq.to_bool());
        let eq = evaluate::<MockNode>(
            BinaryOperator::Equals,
            XPathValue::String("1.0".into()),
            XPathValue::String("1".into()),
        )
        .unwrap();
        assert!(!eq.to_bool());
    }

    #[test]
    fn test_union_sorts_and_dedups() {
        let tree = create_test_tree();
        let l = XPathValue::NodeSet(vec![tree.node(8), tree.node(3)]);
        let r = XPathValue::NodeSet(vec![tree.node(3), tree.node(1)]);
        let XPathValue::NodeSet(nodes) = evaluate(BinaryOperator::Union, l, r).unwrap() else {
            panic!("Expected a NodeSet");
        };
        let ids: Vec<usize> = nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 3, 8]);
        assert!(evaluate(BinaryOperator::Union, XPathValue::Number(1.0), XPathValue::<MockNode>::NodeSet(vec![])).is_err());
    }
}
