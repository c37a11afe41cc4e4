use thiserror::Error;

/// Errors raised while tokenizing or building an expression. Nothing is
/// evaluated once one of these has been produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntaxError {
    #[error("Unterminated string literal starting at position {position}")]
    UnterminatedLiteral { position: usize },

    #[error("Unbalanced parentheses or brackets at position {position}")]
    UnbalancedGrouping { position: usize },

    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },

    #[error("Malformed number '{text}' at position {position}")]
    MalformedNumber { text: String, position: usize },

    #[error("Unknown axis '{0}'")]
    UnknownAxis(String),

    #[error("Predicate at position {position} does not follow an axis step")]
    PredicateWithoutAxis { position: usize },

    #[error("Unexpected token '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },

    #[error("Incomplete expression at position {position}")]
    IncompleteExpression { position: usize },

    #[error("Expression nesting exceeds the maximum depth of {max_depth}")]
    NestingTooDeep { max_depth: usize },
}

/// Errors returned by core and extension functions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FunctionError {
    #[error("expected {expected} argument(s), got {found}")]
    Arity { expected: String, found: usize },

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Failed(String),
}

impl FunctionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors raised while evaluating a built expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{function}' error: {source}")]
    Function {
        function: String,
        #[source]
        source: FunctionError,
    },

    #[error("Namespace prefix '{0}' is not bound")]
    UnresolvedPrefix(String),

    #[error("Variable '${0}' not found")]
    UnboundVariable(String),

    #[error("Context node is not attached to a document")]
    DetachedNode,

    #[error("Type error: {0}")]
    Type(String),

    #[error("Node visit budget of {budget} exhausted")]
    BudgetExhausted { budget: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XPathError {
    #[error("XPath syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("XPath evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Unsupported XPath version {0}, only 1.0 is implemented")]
    UnsupportedVersion(f64),
}
