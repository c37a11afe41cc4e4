pub mod ast;
pub mod axes;
pub mod config;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod functions;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod select;

pub use ast::{Axis, AxisStep, BinaryOperator, Expression, NodeTest, NodeTypeTest, Predicate};
pub use config::XPathConfig;
pub use datasource::{DataSourceNode, NodeType, QName};
pub use engine::{EvaluationContext, XPathValue, evaluate};
pub use functions::FunctionRegistry;
pub use select::{parse_expression, select, select_with_config};

// Re-export test utilities for integration testing in downstream crates
pub use datasource::tests;
pub use error::{EvaluationError, FunctionError, SyntaxError, XPathError};
