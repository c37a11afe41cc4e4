//! The evaluation engine for executing a built XPath AST against a generic `DataSourceNode`.

use super::ast::{AxisStep, BinaryOperator, Expression, NodeTest, NodeTypeTest, Predicate, UnaryOperator};
use super::functions::{self, FunctionRegistry};
use super::{axes, operators};
use crate::datasource::{DataSourceNode, NodeType, first_in_document_order};
use crate::error::EvaluationError;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Represents the possible result types of an XPath expression evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue<N> {
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
            XPathValue::String(s) => operators::parse_number(s),
            XPathValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            XPathValue::NodeSet(nodes) => first_in_document_order(nodes)
                .map(|n| operators::parse_number(&n.string_value()))
                .unwrap_or(f64::NAN),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            XPathValue::NodeSet(_) => "node-set",
            XPathValue::String(_) => "string",
            XPathValue::Number(_) => "number",
            XPathValue::Boolean(_) => "boolean",
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
                first_in_document_order(nodes)
                    .map(|n| n.string_value())
                    .unwrap_or_default()
            ),
            XPathValue::String(s) => write!(f, "{}", s),
            XPathValue::Number(n) => write!(f, "{}", operators::format_number(*n)),
            XPathValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Counts axis candidates enumerated during one evaluation.
#[derive(Debug, Default)]
pub struct VisitBudget {
    limit: Option<usize>,
    visited: Cell<usize>,
}

impl VisitBudget {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            visited: Cell::new(0),
        }
    }

    pub fn charge(&self, count: usize) -> Result<(), EvaluationError> {
        let visited = self.visited.get().saturating_add(count);
        self.visited.set(visited);
        match self.limit {
            Some(budget) if visited > budget => Err(EvaluationError::BudgetExhausted { budget }),
            _ => Ok(()),
        }
    }

    pub fn visited(&self) -> usize {
        self.visited.get()
    }
}

/// A container for all state needed during expression evaluation.
/// `'a` is the lifetime of the underlying data source.
/// `'d` is the lifetime of the evaluation context itself.
pub struct EvaluationContext<'a, 'd, N: DataSourceNode<'a>> {
    pub context_node: N,
    pub context_position: usize, // 1-based index
    pub context_size: usize,
    pub variables: &'d HashMap<String, XPathValue<N>>,
    pub functions: &'d FunctionRegistry<N>,
    /// The node whose in-scope namespaces resolve QName prefixes. Fixed for
    /// the whole evaluation, unlike `context_node`.
    pub namespace_node: N,
    pub budget: &'d VisitBudget,
    _marker: PhantomData<&'a ()>,
}

impl<'a, 'd, N: DataSourceNode<'a>> EvaluationContext<'a, 'd, N> {
    pub fn new(
        context_node: N,
        functions: &'d FunctionRegistry<N>,
        variables: &'d HashMap<String, XPathValue<N>>,
        budget: &'d VisitBudget,
    ) -> Self {
        Self {
            context_node,
            context_position: 1,
            context_size: 1,
            variables,
            functions,
            namespace_node: context_node,
            budget,
            _marker: PhantomData,
        }
    }

    /// The same context focused on another node.
    pub fn with_focus(&self, context_node: N, context_position: usize, context_size: usize) -> Self {
        Self {
            context_node,
            context_position,
            context_size,
            variables: self.variables,
            functions: self.functions,
            namespace_node: self.namespace_node,
            budget: self.budget,
            _marker: PhantomData,
        }
    }

    /// Resolves a namespace prefix against the namespace context node and its ancestors.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<String, EvaluationError> {
        if prefix == "xml" {
            return Ok(XML_NAMESPACE.to_string());
        }
        let mut current = Some(self.namespace_node);
        while let Some(node) = current {
            if node.node_type() == NodeType::Element
                && let Some(ns) = node.namespace_nodes().find(|ns| ns.local_name() == prefix)
            {
                return Ok(ns.string_value());
            }
            current = node.parent();
        }
        Err(EvaluationError::UnresolvedPrefix(prefix.to_string()))
    }
}

/// Evaluates a built expression and returns a concrete `XPathValue`.
pub fn evaluate<'a, N>(
    expr: &Expression,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, EvaluationError>
where
    N: DataSourceNode<'a> + 'a,
{
    match expr {
        Expression::Literal(s) => Ok(XPathValue::String(s.clone())),
        Expression::Number(n) => Ok(XPathValue::Number(*n)),
        Expression::Boolean(b) => Ok(XPathValue::Boolean(*b)),
        Expression::Variable(name) => e_ctx
            .variables
            .get(name)
            .cloned()
            .ok_or_else(|| EvaluationError::UnboundVariable(name.clone())),
        Expression::FunctionCall { name, args } => {
            if !e_ctx.functions.contains(name) {
                return Err(EvaluationError::UnknownFunction(name.clone()));
            }
            let mut evaluated_args = Vec::with_capacity(args.len());
            for arg in args {
                evaluated_args.push(evaluate(arg, e_ctx)?);
            }
            functions::call(name, evaluated_args, e_ctx)
        }
        Expression::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => {
                if !evaluate(left, e_ctx)?.to_bool() {
                    return Ok(XPathValue::Boolean(false));
                }
                Ok(XPathValue::Boolean(evaluate(right, e_ctx)?.to_bool()))
            }
            BinaryOperator::Or => {
                if evaluate(left, e_ctx)?.to_bool() {
                    return Ok(XPathValue::Boolean(true));
                }
                Ok(XPathValue::Boolean(evaluate(right, e_ctx)?.to_bool()))
            }
            _ => {
                let left_val = evaluate(left, e_ctx)?;
                let right_val = evaluate(right, e_ctx)?;
                operators::evaluate(*op, left_val, right_val)
            }
        },
        Expression::UnaryOp { op, expr } => {
            let val = evaluate(expr, e_ctx)?;
            match op {
                UnaryOperator::Minus => Ok(XPathValue::Number(-val.to_number())),
            }
        }
        Expression::Axis(step) => {
            let nodes = evaluate_axis_step(step, e_ctx.context_node, e_ctx)?;
            Ok(XPathValue::NodeSet(nodes))
        }
        Expression::Step(children) => evaluate_step(children, e_ctx).map(XPathValue::NodeSet),
        Expression::RootStep => e_ctx
            .context_node
            .document_root()
            .map(|root| XPathValue::NodeSet(vec![root]))
            .ok_or(EvaluationError::DetachedNode),
    }
}

fn expect_node_set<N>(value: XPathValue<N>) -> Result<Vec<N>, EvaluationError> {
    match value {
        XPathValue::NodeSet(nodes) => Ok(nodes),
        XPathValue::String(_) => Err(EvaluationError::Type(
            "path step produced a string, not a node-set".to_string(),
        )),
        XPathValue::Number(_) => Err(EvaluationError::Type(
            "path step produced a number, not a node-set".to_string(),
        )),
        XPathValue::Boolean(_) => Err(EvaluationError::Type(
            "path step produced a boolean, not a node-set".to_string(),
        )),
    }
}

/// Threads node-sets through a `/`-chain. Each child after the first runs once
/// per node of the previous result; the union keeps first-seen order.
fn evaluate_step<'a, N>(
    children: &[Expression],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, EvaluationError>
where
    N: DataSourceNode<'a> + 'a,
{
    let Some((first, rest)) = children.split_first() else {
        return Ok(vec![]);
    };
    let mut current = expect_node_set(evaluate(first, e_ctx)?)?;

    for child in rest {
        let size = current.len();
        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for (i, node) in current.into_iter().enumerate() {
            let focus = e_ctx.with_focus(node, i + 1, size);
            let produced = match child {
                // Avoid re-wrapping the common case in an XPathValue.
                Expression::Axis(step) => evaluate_axis_step(step, node, &focus)?,
                other => expect_node_set(evaluate(other, &focus)?)?,
            };
            next.extend(produced.into_iter().filter(|n| seen.insert(*n)));
        }
        current = next;
    }
    Ok(current)
}

/// Evaluates a single location step from one context node by chaining axis
/// collection, node testing, and predicate application.
fn evaluate_axis_step<'a, N>(
    step: &AxisStep,
    node: N,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, EvaluationError>
where
    N: DataSourceNode<'a> + 'a,
{
    let candidates = axes::collect(step.axis, node);
    e_ctx.budget.charge(candidates.len())?;
    log::trace!(
        "axis {:?} produced {} candidate(s)",
        step.axis,
        candidates.len()
    );

    let tested = filter_by_node_test(candidates, step, e_ctx)?;
    apply_predicates(tested, &step.predicates, e_ctx)
}

/// Stage 2: Filters a set of nodes based on the step's `NodeTest`.
fn filter_by_node_test<'a, N>(
    nodes: Vec<N>,
    step: &AxisStep,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, EvaluationError>
where
    N: DataSourceNode<'a> + 'a,
{
    let principal = step.axis.principal_node_type();
    let filtered = match &step.node_test {
        NodeTest::Any => nodes
            .into_iter()
            .filter(|n| n.node_type() == principal)
            .collect(),
        NodeTest::Name(name) => nodes
            .into_iter()
            .filter(|n| n.node_type() == principal && n.local_name() == name.as_str())
            .collect(),
        NodeTest::QName { prefix, local } => {
            let uri = e_ctx.resolve_prefix(prefix)?;
            nodes
                .into_iter()
                .filter(|n| {
                    n.node_type() == principal
                        && n.namespace_uri() == Some(uri.as_str())
                        && local.as_deref().is_none_or(|l| n.local_name() == l)
                })
                .collect()
        }
        NodeTest::NodeType(test) => nodes
            .into_iter()
            .filter(|n| match test {
                NodeTypeTest::Node => true,
                NodeTypeTest::Text => n.node_type() == NodeType::Text,
                NodeTypeTest::Comment => n.node_type() == NodeType::Comment,
                NodeTypeTest::ProcessingInstruction(target) => {
                    n.node_type() == NodeType::ProcessingInstruction
                        && target.as_deref().is_none_or(|t| n.local_name() == t)
                }
            })
            .collect(),
    };
    Ok(filtered)
}

/// Stage 3: Filters a set of nodes by applying a series of predicates. The
/// incoming order is axis order, so `position()` counts in axis direction.
fn apply_predicates<'a, N>(
    nodes: Vec<N>,
    predicates: &[Predicate],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, EvaluationError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut final_nodes = nodes;
    for predicate in predicates {
        let context_size = final_nodes.len();
        let mut predicate_results = Vec::with_capacity(context_size);
        for (i, node) in final_nodes.into_iter().enumerate() {
            let predicate_e_ctx = e_ctx.with_focus(node, i + 1, context_size);
            let keep = match evaluate(&predicate.expr, &predicate_e_ctx)? {
                XPathValue::Number(n) => functions::xpath_round(n) == (i + 1) as f64,
                other => other.to_bool(),
            };
            if keep {
                predicate_results.push(node);
            }
        }
        final_nodes = predicate_results;
    }
    Ok(final_nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::XPathConfig;
    use crate::datasource::tests::{MockNode, MockTree, MockTreeBuilder, create_test_tree};
    use crate::parser::parse_expression;

    struct TestSetup<'a> {
        tree: &'a MockTree<'a>,
        funcs: FunctionRegistry<MockNode<'a>>,
        vars: HashMap<String, XPathValue<MockNode<'a>>>,
        budget: VisitBudget,
    }

    impl<'a> TestSetup<'a> {
        fn new(tree: &'a MockTree<'a>) -> Self {
            TestSetup {
                tree,
                funcs: FunctionRegistry::default(),
                vars: HashMap::new(),
                budget: VisitBudget::default(),
            }
        }

        fn context<'s>(&'s self, node_id: usize) -> EvaluationContext<'a, 's, MockNode<'a>> {
            EvaluationContext::new(self.tree.node(node_id), &self.funcs, &self.vars, &self.budget)
        }

        fn eval(&self, node_id: usize, expr: &str) -> Result<XPathValue<MockNode<'a>>, EvaluationError> {
            let expr = parse_expression(expr, &XPathConfig::default()).unwrap();
            evaluate(&expr, &self.context(node_id))
        }

        fn ids(&self, node_id: usize, expr: &str) -> Vec<usize> {
            match self.eval(node_id, expr).unwrap() {
                XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.id).collect(),
                other => panic!("Expected a NodeSet, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_value_coercions() {
        let tree = create_test_tree();
        let para = tree.node(1);
        let number = tree.node(10);

        let set = XPathValue::NodeSet(vec![number, para]);
        // First node in document order, not first in the list.
        assert_eq!(set.to_string(), "Hello");
        assert!(set.to_number().is_nan());
        assert_eq!(XPathValue::NodeSet(vec![number]).to_number(), 42.0);
        assert!(XPathValue::<MockNode>::NodeSet(vec![]).to_number().is_nan());
        assert_eq!(XPathValue::<MockNode>::Number(-0.0).to_string(), "0");
        assert_eq!(XPathValue::<MockNode>::Number(2.5).to_string(), "2.5");
        assert_eq!(XPathValue::<MockNode>::Boolean(false).to_string(), "false");
        assert!(!XPathValue::<MockNode>::Number(f64::NAN).to_bool());
        assert!(XPathValue::<MockNode>::String("false".into()).to_bool());
    }

    #[test]
    fn test_predicate_by_attribute() {
        let tree = create_test_tree();
        let setup = TestSetup::new(&tree);
        assert_eq!(setup.ids(0, "child::para[@id='p1']"), vec![1]);
        assert_eq!(setup.ids(0, "para[@id]"), vec![1, 10]);
    }

    #[test]
    fn test_predicate_by_position() {
        let tree = create_test_tree();
        let setup = TestSetup::new(&tree);
        assert_eq!(setup.ids(0, "child::para[1]"), vec![1]);
        assert_eq!(setup.ids(0, "child::para[position()=2]"), vec![10]);
        assert_eq!(setup.ids(0, "para[last()]"), vec![10]);
        // Numeric predicates are rounded before comparing.
        assert_eq!(setup.ids(0, "para[1.6]"), vec![10]);
        assert!(setup.ids(0, "para[0]").is_empty());
        assert!(setup.ids(0, "para[3]").is_empty());
    }

    #[test]
    fn test_predicates_apply_in_sequence() {
        let tree = create_test_tree();
        let setup = TestSetup::new(&tree);
        // Positions are re-derived after each predicate.
        assert_eq!(setup.ids(0, "*[self::para][2]"), vec![10]);
        assert_eq!(setup.ids(0, "*[2][self::para]"), Vec::<usize>::new());
    }

    #[test]
    fn test_reverse_axis_positions() {
        let tree = create_test_tree();
        let setup = TestSetup::new(&tree);
        assert_eq!(setup.ids(8, "ancestor::*[1]"), vec![7]);
        assert_eq!(setup.ids(8, "ancestor::node()[last()]"), vec![0]);
        assert_eq!(setup.ids(10, "preceding-sibling::*[1]"), vec![6]);
    }

    #[test]
    fn test_step_threading() {
        let tree = create_test_tree();
        let setup = TestSetup::new(&tree);
        assert_eq!(setup.ids(0, "div/para/text()"), vec![8]);
        assert_eq!(setup.ids(7, "/para"), vec![1, 10]);
        assert_eq!(setup.ids(4, ".."), vec![1]);
        // Position inside a later step is per context node, and the chain
        // keeps first-seen order rather than document order.
        assert_eq!(setup.ids(0, "//para/text()[1]"), vec![4, 12, 8]);
        assert!(matches!(
            setup.eval(0, "'a'/para"),
            Err(EvaluationError::Type(_))
        ));
    }

    #[test]
    fn test_node_type_tests() {
        let tree = create_test_tree();
        let setup = TestSetup::new(&tree);
        assert_eq!(setup.ids(0, "comment()"), vec![5]);
        assert_eq!(setup.ids(0, "processing-instruction()"), vec![9]);
        assert_eq!(setup.ids(0, "processing-instruction('pi-target')"), vec![9]);
        assert!(setup.ids(0, "processing-instruction('other')").is_empty());
        assert_eq!(setup.ids(1, "@*"), vec![2, 3]);
        assert_eq!(setup.ids(1, "node()"), vec![4]);
    }

    #[test]
    fn test_variable_evaluation() {
        let tree = create_test_tree();
        let mut setup = TestSetup::new(&tree);
        setup.vars.insert(
            "myVar".to_string(),
            XPathValue::String("test-value".to_string()),
        );
        assert_eq!(setup.eval(0, "$myVar").unwrap().to_string(), "test-value");
        assert_eq!(
            setup.eval(0, "$missing"),
            Err(EvaluationError::UnboundVariable("missing".to_string()))
        );
    }

    #[test]
    fn test_path_from_variable_node_set() {
        let tree = create_test_tree();
        let mut setup = TestSetup::new(&tree);
        setup
            .vars
            .insert("para_node".to_string(), XPathValue::NodeSet(vec![tree.node(1)]));
        assert_eq!(setup.ids(0, "$para_node/text()"), vec![4]);
    }

    #[test]
    fn test_boolean_operators_short_circuit() {
        let tree = create_test_tree();
        let setup = TestSetup::new(&tree);
        assert_eq!(
            setup.eval(0, "false() and no-such-function()"),
            Ok(XPathValue::Boolean(false))
        );
        assert_eq!(
            setup.eval(0, "true() or $unbound"),
            Ok(XPathValue::Boolean(true))
        );
        assert_eq!(
            setup.eval(0, "true() and no-such-function()"),
            Err(EvaluationError::UnknownFunction("no-such-function".into()))
        );
    }

    #[test]
    fn test_unknown_function_reported_before_arguments() {
        let tree = create_test_tree();
        let setup = TestSetup::new(&tree);
        assert_eq!(
            setup.eval(0, "no-such-function($unbound)"),
            Err(EvaluationError::UnknownFunction("no-such-function".into()))
        );
    }

    #[test]
    fn test_decimal_strings_convert_to_numbers() {
        let tree = create_test_tree();
        let setup = TestSetup::new(&tree);
        assert_eq!(setup.eval(0, "number('1.5')"), Ok(XPathValue::Number(1.5)));
        assert_eq!(setup.eval(0, "'0.75' * 4"), Ok(XPathValue::Number(3.0)));
        assert_eq!(setup.eval(0, "'1.5' = 1.5"), Ok(XPathValue::Boolean(true)));
        assert_eq!(setup.eval(0, "' 2.5 ' + 0.25"), Ok(XPathValue::Number(2.75)));
    }

    #[test]
    fn test_qualified_name_tests() {
        let mut b = MockTreeBuilder::new();
        let doc = b.element(0, "doc");
        b.namespace(doc, "s", "urn:shapes");
        let rect = b.qualified_element(doc, Some("s"), "rect", Some("urn:shapes"));
        b.qualified_attribute(rect, Some("s"), "w", Some("urn:shapes"), "3");
        b.element(doc, "rect");
        b.qualified_element(doc, Some("s"), "circle", Some("urn:shapes"));
        let tree = b.build();
        let setup = TestSetup::new(&tree);

        assert_eq!(setup.ids(doc, "s:rect"), vec![rect]);
        assert_eq!(setup.ids(doc, "s:*").len(), 2);
        // An unprefixed name test ignores namespaces.
        assert_eq!(setup.ids(doc, "rect").len(), 2);
        assert_eq!(setup.ids(doc, "s:rect/@s:w").len(), 1);
        assert_eq!(
            setup.eval(doc, "q:rect"),
            Err(EvaluationError::UnresolvedPrefix("q".into()))
        );
        // Prefixes resolve against the starting context node, not the predicate's focus.
        assert_eq!(
            setup.eval(0, "doc[s:rect]"),
            Err(EvaluationError::UnresolvedPrefix("s".into()))
        );
    }

    #[test]
    fn test_xml_prefix_is_always_bound() {
        let tree = create_test_tree();
        let setup = TestSetup::new(&tree);
        assert_eq!(setup.ids(1, "@xml:lang"), vec![3]);
    }

    #[test]
    fn test_root_step_on_detached_node() {
        let mut b = MockTreeBuilder::new();
        let loose = b.detached_element("loose");
        let tree = b.build();
        let setup = TestSetup::new(&tree);
        assert_eq!(setup.eval(loose, "/"), Err(EvaluationError::DetachedNode));
    }

    #[test]
    fn test_visit_budget() {
        let tree = create_test_tree();
        let mut setup = TestSetup::new(&tree);
        setup.budget = VisitBudget::new(Some(5));
        assert!(setup.eval(0, "para").is_ok());
        assert_eq!(setup.budget.visited(), 5);
        assert_eq!(
            setup.eval(0, "//node()"),
            Err(EvaluationError::BudgetExhausted { budget: 5 })
        );
    }
}
