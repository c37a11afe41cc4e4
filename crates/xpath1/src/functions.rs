//! Defines the registry and built-in implementations for XPath 1.0 functions.

use super::engine::{EvaluationContext, XPathValue};
use crate::ast::Axis;
use crate::axes;
use crate::datasource::{DataSourceNode, NodeType, first_in_document_order, sort_document_order};
use crate::error::{EvaluationError, FunctionError};
use crate::operators::{is_xml_whitespace, parse_number};
use std::collections::{HashMap, HashSet};

/// A caller-supplied function. It receives the evaluated arguments only.
pub type ExtensionFunction<N> =
    Box<dyn Fn(Vec<XPathValue<N>>) -> Result<XPathValue<N>, FunctionError>>;

/// The names of the XPath 1.0 core function library, always available.
pub const CORE_FUNCTIONS: &[&str] = &[
    // Node-set
    "last",
    "position",
    "count",
    "id",
    "local-name",
    "namespace-uri",
    "name",
    // String
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
    // Boolean
    "boolean",
    "not",
    "true",
    "false",
    "lang",
    // Number
    "number",
    "sum",
    "floor",
    "ceiling",
    "round",
];

/// The function table consulted by `FunctionCall` evaluation. Registered
/// extension functions are looked up first and may shadow core functions.
pub struct FunctionRegistry<N> {
    extensions: HashMap<String, ExtensionFunction<N>>,
}

impl<N> FunctionRegistry<N> {
    pub fn new() -> Self {
        Self {
            extensions: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(Vec<XPathValue<N>>) -> Result<XPathValue<N>, FunctionError> + 'static,
    {
        self.extensions.insert(name.into(), Box::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionFunction<N>> {
        self.extensions.get(name)
    }

    /// True if `name` resolves to an extension or a core function.
    pub fn contains(&self, name: &str) -> bool {
        self.extensions.contains_key(name) || CORE_FUNCTIONS.contains(&name)
    }
}

impl<N> Default for FunctionRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Calls `name` with already-evaluated arguments.
pub fn call<'a, 'd, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, EvaluationError> {
    let result = match e_ctx.functions.get(name) {
        Some(extension) => extension(args),
        None => match evaluate_core_function(name, args, e_ctx) {
            Some(result) => result,
            None => return Err(EvaluationError::UnknownFunction(name.to_string())),
        },
    };
    result.map_err(|source| EvaluationError::Function {
        function: name.to_string(),
        source,
    })
}

/// Dispatches a core function call. `None` if `name` is not a core function.
fn evaluate_core_function<'a, 'd, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Option<Result<XPathValue<N>, FunctionError>> {
    let result = match name {
        // Node-set
        "last" => func_last(args, e_ctx),
        "position" => func_position(args, e_ctx),
        "count" => func_count(args),
        "id" => func_id(args, e_ctx),
        "local-name" => func_local_name(args, e_ctx),
        "namespace-uri" => func_namespace_uri(args, e_ctx),
        "name" => func_name(args, e_ctx),

        // String
        "string" => func_string(args, e_ctx),
        "concat" => func_concat(args),
        "starts-with" => func_starts_with(args),
        "contains" => func_contains(args),
        "substring-before" => func_substring_before(args),
        "substring-after" => func_substring_after(args),
        "substring" => func_substring(args),
        "string-length" => func_string_length(args, e_ctx),
        "normalize-space" => func_normalize_space(args, e_ctx),
        "translate" => func_translate(args),

        // Boolean
        "boolean" => func_boolean(args),
        "not" => func_not(args),
        "true" => func_true(args),
        "false" => func_false(args),
        "lang" => func_lang(args, e_ctx),

        // Number
        "number" => func_number(args, e_ctx),
        "sum" => func_sum(args),
        "floor" => func_floor(args),
        "ceiling" => func_ceiling(args),
        "round" => func_round(args),

        _ => return None,
    };
    Some(result)
}

// --- Argument helpers ---

fn check_arity<N>(
    args: &[XPathValue<N>],
    min: usize,
    max: Option<usize>,
) -> Result<(), FunctionError> {
    let found = args.len();
    if found >= min && max.is_none_or(|max| found <= max) {
        return Ok(());
    }
    let expected = match max {
        Some(max) if max == min => min.to_string(),
        Some(max) if max == min + 1 => format!("{} or {}", min, max),
        Some(max) => format!("{} to {}", min, max),
        None => format!("at least {}", min),
    };
    Err(FunctionError::Arity { expected, found })
}

fn node_set_arg<'a, N: DataSourceNode<'a>>(
    value: XPathValue<N>,
    function: &str,
) -> Result<Vec<N>, FunctionError> {
    match value {
        XPathValue::NodeSet(nodes) => Ok(nodes),
        v => Err(FunctionError::Type(format!(
            "{}() argument must be a node-set, got {}",
            function,
            v.type_name()
        ))),
    }
}

/// The optional node argument of `name()` and friends: the context node when
/// absent, otherwise the first node of the set in document order.
fn optional_node_arg<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
    function: &str,
) -> Result<Option<N>, FunctionError> {
    check_arity(&args, 0, Some(1))?;
    if args.is_empty() {
        return Ok(Some(e_ctx.context_node));
    }
    let nodes = node_set_arg(args.remove(0), function)?;
    Ok(first_in_document_order(&nodes))
}

fn optional_string_arg<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<String, FunctionError> {
    check_arity(&args, 0, Some(1))?;
    Ok(if args.is_empty() {
        e_ctx.context_node.string_value()
    } else {
        args.remove(0).to_string()
    })
}

fn two_strings<'a, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<(String, String), FunctionError> {
    check_arity(&args, 2, Some(2))?;
    let s2 = args.remove(1).to_string();
    let s1 = args.remove(0).to_string();
    Ok((s1, s2))
}

fn one_number<'a, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<f64, FunctionError> {
    check_arity(&args, 1, Some(1))?;
    Ok(args.remove(0).to_number())
}

/// XPath `round()`: the closest integer, halves towards positive infinity.
/// NaN, infinities and zeros come back unchanged; values in `[-0.5, 0)` give `-0`.
pub fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() || n == 0.0 {
        return n;
    }
    let floor = n.floor();
    let rounded = if n - floor >= 0.5 { floor + 1.0 } else { floor };
    if rounded == 0.0 && n < 0.0 {
        -0.0
    } else {
        rounded
    }
}

// --- Node-Set Functions ---

fn func_last<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 0, Some(0))?;
    Ok(XPathValue::Number(e_ctx.context_size as f64))
}

fn func_position<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 0, Some(0))?;
    Ok(XPathValue::Number(e_ctx.context_position as f64))
}

fn func_count<'a, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 1, Some(1))?;
    let nodes = node_set_arg(args.remove(0), "count")?;
    Ok(XPathValue::Number(nodes.len() as f64))
}

fn func_id<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 1, Some(1))?;

    let id_string = match args.remove(0) {
        XPathValue::NodeSet(nodes) => nodes
            .iter()
            .map(|n| n.string_value())
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    };
    let ids_to_find: HashSet<&str> = id_string
        .split(is_xml_whitespace)
        .filter(|s| !s.is_empty())
        .collect();
    let Some(root) = e_ctx.context_node.document_root() else {
        return Ok(XPathValue::NodeSet(vec![]));
    };
    if ids_to_find.is_empty() {
        return Ok(XPathValue::NodeSet(vec![]));
    }

    let mut results: Vec<N> = axes::collect(Axis::Descendant, root)
        .into_iter()
        .filter(|node| node.node_type() == NodeType::Element)
        .filter(|node| {
            node.attributes().any(|attr| {
                let is_id_attr = attr.name().is_some_and(|q| {
                    (q.prefix.is_none() || q.prefix == Some("xml")) && q.local_part == "id"
                });
                is_id_attr && ids_to_find.contains(attr.string_value().as_str())
            })
        })
        .collect();

    sort_document_order(&mut results);
    Ok(XPathValue::NodeSet(results))
}

fn func_local_name<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, FunctionError> {
    let node = optional_node_arg(args, e_ctx, "local-name")?;
    let name = node.map(|n| n.local_name().to_string()).unwrap_or_default();
    Ok(XPathValue::String(name))
}

fn func_namespace_uri<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, FunctionError> {
    let node = optional_node_arg(args, e_ctx, "namespace-uri")?;
    let uri = node
        .and_then(|n| n.namespace_uri())
        .unwrap_or_default()
        .to_string();
    Ok(XPathValue::String(uri))
}

fn func_name<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, FunctionError> {
    let node = optional_node_arg(args, e_ctx, "name")?;
    let name = node
        .and_then(|n| {
            n.name().map(|q| {
                if let Some(prefix) = q.prefix {
                    format!("{}:{}", prefix, q.local_part)
                } else {
                    q.local_part.to_string()
                }
            })
        })
        .unwrap_or_default();
    Ok(XPathValue::String(name))
}

// --- String Functions ---

fn func_string<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, FunctionError> {
    Ok(XPathValue::String(optional_string_arg(args, e_ctx)?))
}

fn func_concat<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 2, None)?;
    let result = args.iter().map(|v| v.to_string()).collect::<String>();
    Ok(XPathValue::String(result))
}

fn func_starts_with<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    let (s1, s2) = two_strings(args)?;
    Ok(XPathValue::Boolean(s1.starts_with(&s2)))
}

fn func_contains<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    let (s1, s2) = two_strings(args)?;
    Ok(XPathValue::Boolean(s1.contains(&s2)))
}

fn func_substring_before<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    let (s1, s2) = two_strings(args)?;
    let before = s1.find(&s2).map(|index| &s1[..index]).unwrap_or("");
    Ok(XPathValue::String(before.to_string()))
}

fn func_substring_after<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    let (s1, s2) = two_strings(args)?;
    let after = s1
        .find(&s2)
        .map(|index| &s1[index + s2.len()..])
        .unwrap_or("");
    Ok(XPathValue::String(after.to_string()))
}

fn func_substring<'a, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 2, Some(3))?;
    let length_val = if args.len() == 3 {
        Some(args.remove(2).to_number())
    } else {
        None
    };
    let start_val = args.remove(1).to_number();
    let s = args.remove(0).to_string();

    // Characters at positions p with first <= p < first + length. Comparisons
    // involving NaN are false, so a NaN bound selects nothing.
    let first = xpath_round(start_val);
    let last = match length_val {
        Some(l) => first + xpath_round(l),
        None => f64::INFINITY,
    };

    let result = s
        .chars()
        .enumerate()
        .filter_map(|(i, c)| {
            let pos = (i + 1) as f64; // XPath positions are 1-based
            (pos >= first && pos < last).then_some(c)
        })
        .collect::<String>();
    Ok(XPathValue::String(result))
}

fn func_string_length<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, FunctionError> {
    let s = optional_string_arg(args, e_ctx)?;
    Ok(XPathValue::Number(s.chars().count() as f64))
}

fn func_normalize_space<'a, 'd, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, FunctionError> {
    let s = optional_string_arg(args, e_ctx)?;
    let normalized = s
        .split(is_xml_whitespace)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Ok(XPathValue::String(normalized))
}

fn func_translate<'a, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 3, Some(3))?;
    let to_str: Vec<char> = args.remove(2).to_string().chars().collect();
    let from_str: Vec<char> = args.remove(1).to_string().chars().collect();
    let source_str = args.remove(0).to_string();
    let result = source_str
        .chars()
        .filter_map(|c| match from_str.iter().position(|&fc| fc == c) {
            Some(pos) => to_str.get(pos).copied(),
            None => Some(c),
        })
        .collect::<String>();
    Ok(XPathValue::String(result))
}

// --- Boolean Functions ---

fn func_boolean<'a, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 1, Some(1))?;
    Ok(XPathValue::Boolean(args.remove(0).to_bool()))
}

fn func_not<'a, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 1, Some(1))?;
    Ok(XPathValue::Boolean(!args.remove(0).to_bool()))
}

fn func_true<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 0, Some(0))?;
    Ok(XPathValue::Boolean(true))
}

fn func_false<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 0, Some(0))?;
    Ok(XPathValue::Boolean(false))
}

fn func_lang<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 1, Some(1))?;
    let test_lang = args.remove(0).to_string().to_lowercase();

    let mut current = Some(e_ctx.context_node);
    while let Some(node) = current {
        let lang_attr = node.attributes().find(|attr| {
            attr.name()
                .is_some_and(|q| q.prefix == Some("xml") && q.local_part == "lang")
        });
        if let Some(attr) = lang_attr {
            // The nearest xml:lang decides; "en" also matches "en-GB".
            let node_lang = attr.string_value().to_lowercase();
            let matches = node_lang == test_lang
                || node_lang
                    .strip_prefix(&test_lang)
                    .is_some_and(|rest| rest.starts_with('-'));
            return Ok(XPathValue::Boolean(matches));
        }
        current = node.parent();
    }
    Ok(XPathValue::Boolean(false))
}

// --- Number Functions ---

fn func_number<'a, 'd, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, 'd, N>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 0, Some(1))?;
    let n = if args.is_empty() {
        parse_number(&e_ctx.context_node.string_value())
    } else {
        args.remove(0).to_number()
    };
    Ok(XPathValue::Number(n))
}

fn func_sum<'a, N: DataSourceNode<'a>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    check_arity(&args, 1, Some(1))?;
    let nodes = node_set_arg(args.remove(0), "sum")?;
    let sum = nodes
        .iter()
        .map(|node| parse_number(&node.string_value()))
        .sum();
    Ok(XPathValue::Number(sum))
}

fn func_floor<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    Ok(XPathValue::Number(one_number(args)?.floor()))
}

fn func_ceiling<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    Ok(XPathValue::Number(one_number(args)?.ceil()))
}

fn func_round<'a, N: DataSourceNode<'a>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, FunctionError> {
    Ok(XPathValue::Number(xpath_round(one_number(args)?)))
}
