//! Implements the XPath 1.0 binary operators and the number conversions they rely on.

use crate::ast::BinaryOperator;
use crate::datasource::DataSourceNode;
use crate::engine::XPathValue;
use crate::error::EvaluationError;
use nom::{
    IResult, Parser,
    branch::alt,
    character::complete::{char, digit0, digit1},
    combinator::{all_consuming, opt, recognize},
};
use std::collections::HashSet;

/// XML whitespace: space, tab, carriage return and line feed.
pub fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn xpath_number(input: &str) -> IResult<&str, &str> {
    recognize((
        opt(char('-')),
        alt((
            recognize((digit1, opt((char('.'), digit0)))),
            recognize((char('.'), digit1)),
        )),
    ))
    .parse(input)
}

/// Converts a string to a number following the XPath `number()` lexical rules:
/// an optional minus sign and a decimal number, surrounded by optional XML
/// whitespace. Anything else is `NaN`.
pub fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(is_xml_whitespace);
    // nom only checks the lexical form; the whole trimmed text is the number.
    match all_consuming(xpath_number).parse(trimmed) {
        Ok(_) => trimmed.parse().unwrap_or(f64::NAN),
        Err(_) => f64::NAN,
    }
}

/// Formats a number the way XPath's `string()` does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        // Covers negative zero as well.
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

/// Evaluates a binary operator whose operands have already been computed.
/// `and`/`or` are accepted here too, but the engine short-circuits them first.
pub fn evaluate<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, EvaluationError> {
    let value = match op {
        BinaryOperator::Or => XPathValue::Boolean(left.to_bool() || right.to_bool()),
        BinaryOperator::And => XPathValue::Boolean(left.to_bool() && right.to_bool()),
        BinaryOperator::Equals
        | BinaryOperator::NotEquals
        | BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => XPathValue::Boolean(compare(op, &left, &right)),
        BinaryOperator::Plus => XPathValue::Number(left.to_number() + right.to_number()),
        BinaryOperator::Minus => XPathValue::Number(left.to_number() - right.to_number()),
        BinaryOperator::Multiply => XPathValue::Number(left.to_number() * right.to_number()),
        BinaryOperator::Divide => XPathValue::Number(left.to_number() / right.to_number()),
        // Truncating remainder, sign follows the dividend.
        BinaryOperator::Modulo => XPathValue::Number(left.to_number() % right.to_number()),
        BinaryOperator::Union => union(left, right)?,
    };
    Ok(value)
}

fn union<'a, N: DataSourceNode<'a>>(
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, EvaluationError> {
    match (left, right) {
        (XPathValue::NodeSet(l), XPathValue::NodeSet(r)) => {
            let mut seen = HashSet::with_capacity(l.len() + r.len());
            let nodes = l.into_iter().chain(r).filter(|n| seen.insert(*n)).collect();
            Ok(XPathValue::NodeSet(nodes))
        }
        (l, r) => Err(EvaluationError::Type(format!(
            "union operands must be node-sets, got {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

/// A non-node-set operand of a comparison.
enum Scalar {
    String(String),
    Number(f64),
    Boolean(bool),
}

impl Scalar {
    fn from_value<'a, N: DataSourceNode<'a>>(value: &XPathValue<N>) -> Self {
        match value {
            XPathValue::String(s) => Scalar::String(s.clone()),
            XPathValue::Number(n) => Scalar::Number(*n),
            XPathValue::Boolean(b) => Scalar::Boolean(*b),
            XPathValue::NodeSet(nodes) => Scalar::Boolean(!nodes.is_empty()),
        }
    }

    fn to_bool(&self) -> bool {
        match self {
            Scalar::String(s) => !s.is_empty(),
            Scalar::Number(n) => *n != 0.0 && !n.is_nan(),
            Scalar::Boolean(b) => *b,
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Scalar::String(s) => parse_number(s),
            Scalar::Number(n) => *n,
            Scalar::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn to_text(&self) -> String {
        match self {
            Scalar::String(s) => s.clone(),
            Scalar::Number(n) => format_number(*n),
            Scalar::Boolean(b) => b.to_string(),
        }
    }
}

fn compare_scalars(op: BinaryOperator, left: &Scalar, right: &Scalar) -> bool {
    match op {
        BinaryOperator::Equals | BinaryOperator::NotEquals => {
            let negate = op == BinaryOperator::NotEquals;
            match (left, right) {
                (Scalar::Boolean(_), _) | (_, Scalar::Boolean(_)) => {
                    (left.to_bool() == right.to_bool()) != negate
                }
                (Scalar::Number(_), _) | (_, Scalar::Number(_)) => {
                    let (l, r) = (left.to_number(), right.to_number());
                    if negate { l != r } else { l == r }
                }
                _ => (left.to_text() == right.to_text()) != negate,
            }
        }
        _ => {
            let (l, r) = (left.to_number(), right.to_number());
            match op {
                BinaryOperator::LessThan => l < r,
                BinaryOperator::LessThanOrEqual => l <= r,
                BinaryOperator::GreaterThan => l > r,
                BinaryOperator::GreaterThanOrEqual => l >= r,
                _ => false,
            }
        }
    }
}

/// XPath 1.0 comparison. Node-sets compare existentially over the
/// string-values of their members, except against a boolean, where the
/// node-set is converted to a boolean first.
fn compare<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: &XPathValue<N>,
    right: &XPathValue<N>,
) -> bool {
    match (left, right) {
        (XPathValue::NodeSet(l), XPathValue::NodeSet(r)) => {
            let right_values: Vec<Scalar> = r
                .iter()
                .map(|n| Scalar::String(n.string_value()))
                .collect();
            l.iter().any(|a| {
                let a = Scalar::String(a.string_value());
                right_values.iter().any(|b| compare_scalars(op, &a, b))
            })
        }
        (XPathValue::NodeSet(_), XPathValue::Boolean(_))
        | (XPathValue::Boolean(_), XPathValue::NodeSet(_)) => compare_scalars(
            op,
            &Scalar::from_value(left),
            &Scalar::from_value(right),
        ),
        (XPathValue::NodeSet(l), other) => {
            let other = Scalar::from_value(other);
            l.iter()
                .any(|n| compare_scalars(op, &Scalar::String(n.string_value()), &other))
        }
        (other, XPathValue::NodeSet(r)) => {
            let other = Scalar::from_value(other);
            r.iter()
                .any(|n| compare_scalars(op, &other, &Scalar::String(n.string_value())))
        }
        _ => compare_scalars(op, &Scalar::from_value(left), &Scalar::from_value(right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};

    type Value<'a> = XPathValue<MockNode<'a>>;

    fn eval<'a>(op: BinaryOperator, left: Value<'a>, right: Value<'a>) -> Value<'a> {
        evaluate(op, left, right).unwrap()
    }

    #[test]
    fn test_parse_number_lexical_rules() {
        assert_eq!(parse_number("42"), 42.0);
        assert_eq!(parse_number("  -1.5\n"), -1.5);
        assert_eq!(parse_number(".5"), 0.5);
        assert_eq!(parse_number("5."), 5.0);
        assert!(parse_number("").is_nan());
        assert!(parse_number("+1").is_nan());
        assert!(parse_number("1e3").is_nan());
        assert!(parse_number("- 1").is_nan());
        assert!(parse_number("Infinity").is_nan());
        assert_eq!(parse_number("2.25"), 2.25);
        assert_eq!(parse_number("-.75"), -0.75);
        assert_eq!(parse_number("\t10.125 "), 10.125);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(7.0), "7");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(1e21), "1000000000000000000000");
    }

    #[test]
    fn test_arithmetic_is_ieee() {
        let n = |v: f64| Value::Number(v);
        assert_eq!(
            eval(BinaryOperator::Divide, n(1.0), n(0.0)).to_number(),
            f64::INFINITY
        );
        assert!(
            eval(BinaryOperator::Divide, n(0.0), n(0.0))
                .to_number()
                .is_nan()
        );
        assert_eq!(eval(BinaryOperator::Modulo, n(5.0), n(2.0)).to_number(), 1.0);
        assert_eq!(
            eval(BinaryOperator::Modulo, n(-5.0), n(2.0)).to_number(),
            -1.0
        );
        assert_eq!(
            eval(BinaryOperator::Plus, Value::String("2".into()), Value::Boolean(true))
                .to_number(),
            3.0
        );
    }

    #[test]
    fn test_scalar_equality_coercion() {
        // Boolean wins over number, number over string.
        assert!(
            eval(
                BinaryOperator::Equals,
                Value::Boolean(true),
                Value::String("x".into())
            )
            .to_bool()
        );
        assert!(
            eval(
                BinaryOperator::Equals,
                Value::Number(1.0),
                Value::String(" 1 ".into())
            )
            .to_bool()
        );
        assert!(
            !eval(
                BinaryOperator::Equals,
                Value::String("1".into()),
                Value::String("1.0".into())
            )
            .to_bool()
        );
        assert!(
            eval(
                BinaryOperator::NotEquals,
                Value::Number(f64::NAN),
                Value::Number(f64::NAN)
            )
            .to_bool()
        );
    }

    #[test]
    fn test_node_set_comparisons_are_existential() {
        let tree = create_test_tree();
        // para elements with string-values "Hello" and "42".
        let paras = || Value::NodeSet(vec![tree.node(1), tree.node(10)]);

        assert!(eval(BinaryOperator::Equals, paras(), Value::Number(42.0)).to_bool());
        assert!(eval(BinaryOperator::Equals, Value::String("Hello".into()), paras()).to_bool());
        // Both `=` and `!=` can hold for the same node-set.
        assert!(eval(BinaryOperator::NotEquals, paras(), Value::String("Hello".into())).to_bool());
        assert!(eval(BinaryOperator::GreaterThan, paras(), Value::Number(41.0)).to_bool());
        assert!(eval(BinaryOperator::LessThan, Value::Number(41.0), paras()).to_bool());
        assert!(!eval(BinaryOperator::LessThan, paras(), Value::Number(41.0)).to_bool());

        let empty = Value::NodeSet(vec![]);
        assert!(!eval(BinaryOperator::Equals, empty.clone(), Value::String("".into())).to_bool());
        assert!(eval(BinaryOperator::Equals, empty, Value::Boolean(false)).to_bool());

        let divs = Value::NodeSet(vec![tree.node(6)]);
        assert!(!eval(BinaryOperator::Equals, paras(), divs.clone()).to_bool());
        let world = Value::NodeSet(vec![tree.node(7)]);
        assert!(eval(BinaryOperator::Equals, divs, world).to_bool());
    }

    #[test]
    fn test_union_dedups_and_requires_node_sets() {
        let tree = create_test_tree();
        let a = Value::NodeSet(vec![tree.node(1), tree.node(6)]);
        let b = Value::NodeSet(vec![tree.node(6), tree.node(10)]);
        let XPathValue::NodeSet(nodes) = eval(BinaryOperator::Union, a, b) else {
            panic!("Expected NodeSet");
        };
        assert_eq!(nodes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 6, 10]);

        assert!(matches!(
            evaluate(
                BinaryOperator::Union,
                Value::NodeSet(vec![]),
                Value::Number(1.0)
            ),
            Err(EvaluationError::Type(_))
        ));
    }
}
