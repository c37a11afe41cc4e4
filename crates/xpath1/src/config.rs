/// Limits applied to a single `select` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XPathConfig {
    /// The deepest nesting the expression builder accepts. Parentheses,
    /// predicates and function arguments each add a level, as does every
    /// operator in a chain such as `1 + 2 + 3` or `--1`. Evaluation recurses
    /// along the same structure, so this also bounds the evaluator's stack
    /// usage.
    ///
    /// Defaults to `128`.
    pub max_nesting_depth: usize,
    /// The maximum number of axis candidates evaluation may enumerate before
    /// giving up with `EvaluationError::BudgetExhausted`. `None` disables the
    /// check.
    ///
    /// Defaults to `None`.
    pub node_visit_budget: Option<usize>,
}

impl Default for XPathConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 128,
            node_visit_budget: None,
        }
    }
}

impl XPathConfig {
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth.max(1);
        self
    }

    pub fn with_node_visit_budget(mut self, budget: usize) -> Self {
        self.node_visit_budget = Some(budget);
        self
    }
}
