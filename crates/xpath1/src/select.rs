//! The public entry point: expression string in, XPath value out.

use crate::ast::Expression;
use crate::config::XPathConfig;
use crate::datasource::{DataSourceNode, sort_document_order};
use crate::engine::{EvaluationContext, VisitBudget, XPathValue, evaluate};
use crate::error::{EvaluationError, XPathError};
use crate::functions::FunctionRegistry;
use crate::lexer::tokenize;
use crate::parser::{self, build};
use std::collections::HashMap;

/// Evaluates `expression` against `context_node` with the default [`XPathConfig`].
///
/// A node-set result is returned in document order without duplicates.
pub fn select<'a, N>(
    context_node: N,
    expression: &str,
    version: f64,
    variables: &HashMap<String, XPathValue<N>>,
    functions: &FunctionRegistry<N>,
) -> Result<XPathValue<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    select_with_config(
        context_node,
        expression,
        version,
        variables,
        functions,
        &XPathConfig::default(),
    )
}

/// Like [`select`], with explicit limits.
pub fn select_with_config<'a, N>(
    context_node: N,
    expression: &str,
    version: f64,
    variables: &HashMap<String, XPathValue<N>>,
    functions: &FunctionRegistry<N>,
    config: &XPathConfig,
) -> Result<XPathValue<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    if version != 1.0 {
        return Err(XPathError::UnsupportedVersion(version));
    }
    if context_node.document_root().is_none() {
        return Err(EvaluationError::DetachedNode.into());
    }

    let tokens = tokenize(expression)?;
    log::debug!("'{}': {} token(s)", expression, tokens.len());
    let expr = build(&tokens, config)?;

    let budget = VisitBudget::new(config.node_visit_budget);
    let e_ctx = EvaluationContext::new(context_node, functions, variables, &budget);
    let mut value = evaluate(&expr, &e_ctx)?;

    if let XPathValue::NodeSet(nodes) = &mut value {
        sort_document_order(nodes);
        log::debug!(
            "'{}': node-set of {} node(s), {} candidate(s) visited",
            expression,
            nodes.len(),
            budget.visited()
        );
    } else {
        log::debug!("'{}': {}", expression, value.type_name());
    }
    Ok(value)
}

/// Tokenizes and builds `expression` without evaluating it.
pub fn parse_expression(expression: &str, config: &XPathConfig) -> Result<Expression, XPathError> {
    Ok(parser::parse_expression(expression, config)?)
}
