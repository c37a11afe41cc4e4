//! XPath 1.0 node selection over generic ordered trees.
//!
//! The engine lives in `xselect-xpath1` and is re-exported here. The [`xml`]
//! module adapts `roxmltree` documents to the engine's [`DataSourceNode`] trait.
//!
//! ```
//! use std::collections::HashMap;
//! use xselect::xml::XmlDocument;
//! use xselect::{FunctionRegistry, select};
//!
//! let doc = XmlDocument::parse("<list><item/><item/></list>").unwrap();
//! let count = select(
//!     doc.root_node(),
//!     "count(//item)",
//!     1.0,
//!     &HashMap::new(),
//!     &FunctionRegistry::default(),
//! )
//! .unwrap();
//! assert_eq!(count.to_number(), 2.0);
//! ```

pub mod xml;

pub use xselect_xpath1::{
    Axis, AxisStep, BinaryOperator, DataSourceNode, EvaluationError, Expression, FunctionError,
    FunctionRegistry, NodeTest, NodeType, NodeTypeTest, Predicate, QName, SyntaxError,
    XPathConfig, XPathError, XPathValue, parse_expression, select, select_with_config,
};
pub use xml::{XmlDocument, XmlNode};
