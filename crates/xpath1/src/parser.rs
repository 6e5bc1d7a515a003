//! A `nom` parser for XPath 1.0 expressions.
//!
//! Precedence, loosest first: `or`, `and`, equality, relational, additive,
//! multiplicative, unary minus, union, path.

use super::ast::*;
use crate::error::XPathError;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace0},
    combinator::{map, map_res, opt, recognize},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
};

type NomError<'a> = nom::error::Error<&'a str>;

pub fn parse_expression(input: &str) -> Result<Expression, XPathError> {
    match expression(input.trim()) {
        Ok(("", expr)) => Ok(expr),
        Ok((rem, _)) => Err(XPathError::XPathParse(
            input.to_string(),
            format!("unexpected input at '{}'", rem),
        )),
        Err(e) => Err(XPathError::XPathParse(input.to_string(), e.to_string())),
    }
}

fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Matches a word operator (`or`, `div`, ...) only when it is not the prefix
/// of a longer name.
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let (rest, matched) = tag::<&str, &str, NomError<'a>>(word)(input)?;
        if rest.starts_with(is_name_char) {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        }
        Ok((rest, matched))
    }
}

/// Parses `operand (operator operand)*` into a left-associative tree.
fn binary_chain<'a>(
    input: &'a str,
    operand: fn(&'a str) -> IResult<&'a str, Expression>,
    operator: fn(&'a str) -> IResult<&'a str, BinaryOperator>,
) -> IResult<&'a str, Expression> {
    let (mut input, mut left) = operand(input)?;
    loop {
        match pair(ws(operator), operand).parse(input) {
            Ok((rest, (op, right))) => {
                left = Expression::BinaryOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                };
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, left)),
            Err(e) => return Err(e),
        }
    }
}

fn expression(input: &str) -> IResult<&str, Expression> {
    binary_chain(input, and_expr, or_op)
}

fn and_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(input, equality_expr, and_op)
}

fn equality_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(input, relational_expr, equality_op)
}

fn relational_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(input, additive_expr, relational_op)
}

fn additive_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(input, multiplicative_expr, additive_op)
}

fn multiplicative_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(input, unary_expr, multiplicative_op)
}

fn union_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(input, path_expr, union_op)
}

fn or_op(input: &str) -> IResult<&str, BinaryOperator> {
    map(keyword("or"), |_| BinaryOperator::Or).parse(input)
}

fn and_op(input: &str) -> IResult<&str, BinaryOperator> {
    map(keyword("and"), |_| BinaryOperator::And).parse(input)
}

fn equality_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        map(tag("!="), |_| BinaryOperator::NotEquals),
        map(tag("="), |_| BinaryOperator::Equals),
    ))
    .parse(input)
}

fn relational_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        map(alt((tag("<="), tag("&lt;="))), |_| BinaryOperator::LessThanOrEqual),
        map(alt((tag(">="), tag("&gt;="))), |_| BinaryOperator::GreaterThanOrEqual),
        map(alt((tag("<"), tag("&lt;"))), |_| BinaryOperator::LessThan),
        map(alt((tag(">"), tag("&gt;"))), |_| BinaryOperator::GreaterThan),
    ))
    .parse(input)
}

fn additive_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        map(char('+'), |_| BinaryOperator::Plus),
        map(char('-'), |_| BinaryOperator::Minus),
    ))
    .parse(input)
}

fn multiplicative_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        map(char('*'), |_| BinaryOperator::Multiply),
        map(keyword("div"), |_| BinaryOperator::Divide),
        map(keyword("mod"), |_| BinaryOperator::Modulo),
    ))
    .parse(input)
}

fn union_op(input: &str) -> IResult<&str, BinaryOperator> {
    map(char('|'), |_| BinaryOperator::Union).parse(input)
}

fn unary_expr(input: &str) -> IResult<&str, Expression> {
    if let Ok((rest, _)) = ws(char::<&str, NomError<'_>>('-')).parse(input) {
        let (rest, inner) = unary_expr(rest)?;
        return Ok((rest, Expression::Negate(Box::new(inner))));
    }
    union_expr(input)
}

/// A filter expression or a location path, optionally continued by further
/// `/` or `//` steps.
fn path_expr(input: &str) -> IResult<&str, Expression> {
    let (i, start) = alt((filter_expr, map(location_path, Expression::LocationPath))).parse(input)?;
    let (i, remainder) = many0(pair(alt((tag("//"), tag("/"))), step)).parse(i)?;
    if remainder.is_empty() {
        return Ok((i, start));
    }

    let (start_point, is_absolute, mut steps) = match start {
        Expression::LocationPath(lp) => (lp.start_point, lp.is_absolute, lp.steps),
        other => (Some(Box::new(other)), false, Vec::new()),
    };
    for (separator, next) in remainder {
        if separator == "//" {
            steps.push(descendant_or_self_step());
        }
        steps.push(next);
    }
    Ok((
        i,
        Expression::LocationPath(LocationPath {
            start_point,
            is_absolute,
            steps,
        }),
    ))
}

/// A primary expression with optional predicates, as in `(a | b)[1]`.
fn filter_expr(input: &str) -> IResult<&str, Expression> {
    let (i, primary) = primary_expr(input)?;
    let (i, predicates) = many0(predicate).parse(i)?;
    if predicates.is_empty() {
        return Ok((i, primary));
    }
    Ok((
        i,
        Expression::LocationPath(LocationPath {
            start_point: Some(Box::new(primary)),
            is_absolute: false,
            steps: vec![Step {
                axis: Axis::SelfAxis,
                node_test: NodeTest::AnyNode,
                predicates,
            }],
        }),
    ))
}

fn primary_expr(input: &str) -> IResult<&str, Expression> {
    ws(alt((
        variable_reference,
        number,
        map(string_literal, Expression::Literal),
        function_call,
        delimited(ws(char('(')), expression, ws(char(')'))),
    )))
    .parse(input)
}

fn number(input: &str) -> IResult<&str, Expression> {
    map_res(
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        |s: &str| s.parse::<f64>().map(Expression::Number),
    )
    .parse(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
        )),
        |s: &str| s.to_string(),
    )
    .parse(input)
}

fn variable_reference(input: &str) -> IResult<&str, Expression> {
    map(preceded(char('$'), q_name), Expression::Variable).parse(input)
}

fn nc_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(is_name_char),
    ))
    .parse(input)
}

fn q_name(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(nc_name, opt(pair(char(':'), nc_name)))),
        |s: &str| s.to_string(),
    )
    .parse(input)
}

fn node_type_test(input: &str) -> IResult<&str, NodeTest> {
    map(
        terminated(
            alt((
                tag("text"),
                tag("node"),
                tag("comment"),
                tag("processing-instruction"),
            )),
            pair(ws(char('(')), char(')')),
        ),
        |kind: &str| match kind {
            "text" => NodeTest::Text,
            "comment" => NodeTest::Comment,
            "processing-instruction" => NodeTest::ProcessingInstruction,
            _ => NodeTest::AnyNode,
        },
    )
    .parse(input)
}

fn node_test(input: &str) -> IResult<&str, NodeTest> {
    alt((
        map(char('*'), |_| NodeTest::Wildcard),
        node_type_test,
        map(q_name, NodeTest::Name),
    ))
    .parse(input)
}

fn axis(input: &str) -> IResult<&str, Axis> {
    terminated(
        alt((
            map(tag("ancestor-or-self"), |_| Axis::AncestorOrSelf),
            map(tag("ancestor"), |_| Axis::Ancestor),
            map(tag("attribute"), |_| Axis::Attribute),
            map(tag("child"), |_| Axis::Child),
            map(tag("descendant-or-self"), |_| Axis::DescendantOrSelf),
            map(tag("descendant"), |_| Axis::Descendant),
            map(tag("following-sibling"), |_| Axis::FollowingSibling),
            map(tag("parent"), |_| Axis::Parent),
            map(tag("preceding-sibling"), |_| Axis::PrecedingSibling),
            map(tag("self"), |_| Axis::SelfAxis),
        )),
        tag("::"),
    )
    .parse(input)
}

fn predicate(input: &str) -> IResult<&str, Expression> {
    delimited(ws(char('[')), expression, ws(char(']'))).parse(input)
}

fn descendant_or_self_step() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        node_test: NodeTest::AnyNode,
        predicates: Vec::new(),
    }
}

fn step(input: &str) -> IResult<&str, Step> {
    let (i, (axis, node_test)) = alt((
        map(tag(".."), |_| (Axis::Parent, NodeTest::AnyNode)),
        map(tag("."), |_| (Axis::SelfAxis, NodeTest::AnyNode)),
        map(preceded(char('@'), node_test), |t| (Axis::Attribute, t)),
        map(pair(opt(axis), node_test), |(a, t)| (a.unwrap_or(Axis::Child), t)),
    ))
    .parse(input)?;
    let (i, predicates) = many0(predicate).parse(i)?;
    Ok((
        i,
        Step {
            axis,
            node_test,
            predicates,
        },
    ))
}

/// The first step of a path that does not begin with a filter expression.
/// Subsequent steps are handled by [`path_expr`].
fn location_path(input: &str) -> IResult<&str, LocationPath> {
    if let Ok((rest, _)) = tag::<&str, &str, NomError<'_>>("//")(input) {
        let (rest, first) = step(rest)?;
        return Ok((
            rest,
            LocationPath {
                start_point: None,
                is_absolute: true,
                steps: vec![descendant_or_self_step(), first],
            },
        ));
    }
    if let Ok((rest, _)) = tag::<&str, &str, NomError<'_>>("/")(input) {
        return Ok(match step(rest) {
            Ok((rest, first)) => (
                rest,
                LocationPath {
                    start_point: None,
                    is_absolute: true,
                    steps: vec![first],
                },
            ),
            Err(_) => (
                rest,
                LocationPath {
                    start_point: None,
                    is_absolute: true,
                    steps: Vec::new(),
                },
            ),
        });
    }
    let (rest, first) = step(input)?;
    Ok((
        rest,
        LocationPath {
            start_point: None,
            is_absolute: false,
            steps: vec![first],
        },
    ))
}

fn function_call(input: &str) -> IResult<&str, Expression> {
    let (i, name) = q_name(input)?;
    // Node-type tests look like calls but belong to the step grammar.
    if matches!(
        name.as_str(),
        "text" | "node" | "comment" | "processing-instruction"
    ) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (i, args) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), expression),
        ws(char(')')),
    )
    .parse(i)?;
    Ok((
        i,
        Expression::FunctionCall {
            name: FunctionName::parse(&name),
            args,
        },
    ))
}
