//! The XPath 1.0 core function library.

use super::engine::{EvaluationContext, XPathValue, string_to_number};
use crate::datasource::DataSourceNode;
use crate::error::XPathError;

const CORE_FUNCTIONS: &[&str] = &[
    "string",
    "concat",
    "starts-with",
    "contains",
    "substring-before",
    "substring-after",
    "substring",
    "string-length",
    "normalize-space",
    "translate",
    "not",
    "true",
    "false",
    "boolean",
    "number",
    "sum",
    "floor",
    "ceiling",
    "round",
    "count",
    "position",
    "last",
    "name",
    "local-name",
];

pub fn is_core_function(name: &str) -> bool {
    CORE_FUNCTIONS.contains(&name)
}

/// Dispatches a function call to the correct implementation.
pub fn evaluate_function<'a, 'd, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, XPathError> {
    let argc = args.len();
    match name {
        // Node-set
        "position" => no_args(name, argc).map(|_| XPathValue::Number(e_ctx.position as f64)),
        "last" => no_args(name, argc).map(|_| XPathValue::Number(e_ctx.size as f64)),
        "count" => {
            let nodes = single_node_set(name, args)?;
            Ok(XPathValue::Number(nodes.len() as f64))
        }
        "name" | "local-name" => {
            let node = match optional_arg(name, args)? {
                None => Some(e_ctx.context_node),
                Some(XPathValue::NodeSet(nodes)) => nodes.first().copied(),
                Some(other) => return Err(not_a_node_set(name, &other)),
            };
            let text = node.and_then(|n| n.name()).map(|q| match q.prefix {
                Some(prefix) if name == "name" => format!("{}:{}", prefix, q.local_part),
                _ => q.local_part.to_string(),
            });
            Ok(XPathValue::String(text.unwrap_or_default()))
        }

        // String
        "string" => {
            let s = context_string(name, args, e_ctx)?;
            Ok(XPathValue::String(s))
        }
        "concat" => {
            if argc < 2 {
                return Err(XPathError::arity(name, "at least 2", argc));
            }
            Ok(XPathValue::String(args.iter().map(|a| a.to_string()).collect()))
        }
        "starts-with" => {
            let [a, b] = two_strings(name, args)?;
            Ok(XPathValue::Boolean(a.starts_with(&b)))
        }
        "contains" => {
            let [a, b] = two_strings(name, args)?;
            Ok(XPathValue::Boolean(a.contains(&b)))
        }
        "substring-before" => {
            let [a, b] = two_strings(name, args)?;
            let before = a.find(&b).map(|i| a[..i].to_string());
            Ok(XPathValue::String(before.unwrap_or_default()))
        }
        "substring-after" => {
            let [a, b] = two_strings(name, args)?;
            let after = a.find(&b).map(|i| a[i + b.len()..].to_string());
            Ok(XPathValue::String(after.unwrap_or_default()))
        }
        "substring" => func_substring(args),
        "string-length" => {
            let s = context_string(name, args, e_ctx)?;
            Ok(XPathValue::Number(s.chars().count() as f64))
        }
        "normalize-space" => {
            let s = context_string(name, args, e_ctx)?;
            Ok(XPathValue::String(
                s.split_whitespace().collect::<Vec<_>>().join(" "),
            ))
        }
        "translate" => func_translate(args),

        // Boolean
        "not" => {
            let value = single_arg(name, args)?;
            Ok(XPathValue::Boolean(!value.to_bool()))
        }
        "true" => no_args(name, argc).map(|_| XPathValue::Boolean(true)),
        "false" => no_args(name, argc).map(|_| XPathValue::Boolean(false)),
        "boolean" => {
            let value = single_arg(name, args)?;
            Ok(XPathValue::Boolean(value.to_bool()))
        }

        // Number
        "number" => {
            let n = match optional_arg(name, args)? {
                Some(value) => value.to_number(),
                None => string_to_number(&e_ctx.context_node.string_value()),
            };
            Ok(XPathValue::Number(n))
        }
        "sum" => {
            let nodes = single_node_set(name, args)?;
            let total = nodes
                .iter()
                .map(|n| string_to_number(&n.string_value()))
                .sum();
            Ok(XPathValue::Number(total))
        }
        "floor" => single_arg(name, args).map(|v| XPathValue::Number(v.to_number().floor())),
        "ceiling" => single_arg(name, args).map(|v| XPathValue::Number(v.to_number().ceil())),
        "round" => single_arg(name, args).map(|v| XPathValue::Number(xpath_round(v.to_number()))),

        _ => Err(XPathError::UnknownFunction(name.to_string())),
    }
}

fn no_args(name: &str, argc: usize) -> Result<(), XPathError> {
    if argc == 0 {
        Ok(())
    } else {
        Err(XPathError::arity(name, "0", argc))
    }
}

fn single_arg<N>(name: &str, args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, XPathError> {
    let argc = args.len();
    match <[XPathValue<N>; 1]>::try_from(args) {
        Ok([value]) => Ok(value),
        Err(_) => Err(XPathError::arity(name, "1", argc)),
    }
}

fn optional_arg<N>(name: &str, args: Vec<XPathValue<N>>) -> Result<Option<XPathValue<N>>, XPathError> {
    if args.len() > 1 {
        return Err(XPathError::arity(name, "0 or 1", args.len()));
    }
    Ok(args.into_iter().next())
}

fn single_node_set<'a, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
) -> Result<Vec<N>, XPathError> {
    match single_arg(name, args)? {
        XPathValue::NodeSet(nodes) => Ok(nodes),
        other => Err(not_a_node_set(name, &other)),
    }
}

fn not_a_node_set<'a, N: DataSourceNode<'a>>(name: &str, value: &XPathValue<N>) -> XPathError {
    XPathError::TypeError(format!(
        "{}() expects a node-set, got '{}'",
        name, value
    ))
}

fn two_strings<'a, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
) -> Result<[String; 2], XPathError> {
    if args.len() != 2 {
        return Err(XPathError::arity(name, "2", args.len()));
    }
    Ok([args[0].to_string(), args[1].to_string()])
}

/// The string-value of the single argument, or of the context node.
fn context_string<'a, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<String, XPathError> {
    Ok(match optional_arg(name, args)? {
        Some(value) => value.to_string(),
        None => e_ctx.context_node.string_value(),
    })
}

fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

fn func_substring<'a, N: DataSourceNode<'a>>(args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, XPathError> {
    if !(2..=3).contains(&args.len()) {
        return Err(XPathError::arity("substring", "2 or 3", args.len()));
    }
    let s = args[0].to_string();
    let start = xpath_round(args[1].to_number());
    let end = match args.get(2) {
        Some(len) => start + xpath_round(len.to_number()),
        None => f64::INFINITY,
    };
    // Positions are 1-based; NaN bounds select nothing.
    let result = s
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let pos = (*i + 1) as f64;
            pos >= start && pos < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(XPathValue::String(result))
}

fn func_translate<'a, N: DataSourceNode<'a>>(args: Vec<XPathValue<N>>) -> Result<XPathValue<N>, XPathError> {
    if args.len() != 3 {
        return Err(XPathError::arity("translate", "3", args.len()));
    }
    let s = args[0].to_string();
    let from: Vec<char> = args[1].to_string().chars().collect();
    let to: Vec<char> = args[2].to_string().chars().collect();
    let result = s
        .chars()
        .filter_map(|c| match from.iter().position(|&f| f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect();
    Ok(XPathValue::String(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};
    use crate::engine::{NoBindings, evaluate};
    use crate::parser::parse_expression;

    fn eval_str(expr: &str) -> String {
        let tree = create_test_tree();
        let item = tree.node(3);
        let ctx: EvaluationContext<'_, '_, MockNode<'_>> =
            EvaluationContext::new(item, tree.root(), &NoBindings, false);
        let expr = parse_expression(expr).unwrap();
        evaluate(&expr, &ctx).unwrap().to_string()
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(eval_str("concat('a', @sku, 'c')"), "aac");
        assert_eq!(eval_str("substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(eval_str("substring('12345', 0, 3)"), "12");
        assert_eq!(eval_str("substring('12345', 2)"), "2345");
        assert_eq!(eval_str("substring-before('1999/04/01', '/')"), "1999");
        assert_eq!(eval_str("substring-after('1999/04/01', '/')"), "04/01");
        assert_eq!(eval_str("normalize-space('  a   b ')"), "a b");
        assert_eq!(eval_str("translate('--aaa--', 'abc-', 'ABC')"), "AAA");
        assert_eq!(eval_str("string-length()"), "5");
        assert_eq!(eval_str("contains(., 'ppl')"), "true");
    }

    #[test]
    fn test_node_functions() {
        assert_eq!(eval_str("name()"), "item");
        assert_eq!(eval_str("local-name(..)"), "order");
        assert_eq!(eval_str("count(../item)"), "2");
        assert_eq!(eval_str("sum(../item/@qty)"), "7");
    }

    #[test]
    fn test_number_functions() {
        assert_eq!(eval_str("round(2.5)"), "3");
        assert_eq!(eval_str("round(-2.5)"), "-2");
        assert_eq!(eval_str("floor(2.7)"), "2");
        assert_eq!(eval_str("ceiling(2.1)"), "3");
        assert_eq!(eval_str("number('abc')"), "NaN");
        assert_eq!(eval_str("number(@qty) + 1"), "3");
    }

    #[test]
    fn test_arity_is_checked() {
        let tree = create_test_tree();
        let root = tree.root();
        let ctx = EvaluationContext::new(root, root, &NoBindings, false);
        let expr = parse_expression("not()").unwrap();
        assert!(matches!(
            evaluate(&expr, &ctx),
            Err(XPathError::FunctionError { .. })
        ));
        let expr = parse_expression("count('x')").unwrap();
        assert!(matches!(evaluate(&expr, &ctx), Err(XPathError::TypeError(_))));
    }
}
