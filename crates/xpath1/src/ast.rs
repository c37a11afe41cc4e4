//! Defines the Abstract Syntax Tree (AST) for XPath 1.0 expressions.

use crate::datasource::NodeType;

/// The top-level expression that can be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(String),
    Number(f64),
    Boolean(bool),
    Variable(String),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    /// A single `axis::node-test[predicates]` location step.
    Axis(AxisStep),
    /// A `/`-separated chain. Each child after the first is evaluated once per
    /// node produced by the child before it.
    Step(Vec<Expression>),
    /// Anchors an absolute path at the document root.
    RootStep,
}

/// A unary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
}

/// A binary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    Or,
    And,
    // Equality
    Equals,
    NotEquals,
    // Relational
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Additive
    Plus,
    Minus,
    // Multiplicative
    Multiply,
    Divide,
    Modulo,
    // Set
    Union,
}

impl BinaryOperator {
    /// Binding strength for precedence climbing; higher binds tighter.
    /// Union is handled below unary minus and never climbs.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Equals | BinaryOperator::NotEquals => 3,
            BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqual => 4,
            BinaryOperator::Plus | BinaryOperator::Minus => 5,
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 6,
            BinaryOperator::Union => 8,
        }
    }
}

/// One location step: exactly one node test and any number of predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisStep {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Predicate>,
}

/// A bracketed filter on an axis step.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub expr: Expression,
}

/// The axis of movement from the context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    Namespace,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    pub fn from_name(name: &str) -> Option<Self> {
        let axis = match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "attribute" => Axis::Attribute,
            "namespace" => Axis::Namespace,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "self" => Axis::SelfAxis,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            _ => return None,
        };
        Some(axis)
    }

    /// Reverse axes enumerate in reverse document order.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }

    /// The node type a `*` or bare name test selects on this axis.
    pub fn principal_node_type(self) -> NodeType {
        match self {
            Axis::Attribute => NodeType::Attribute,
            Axis::Namespace => NodeType::Namespace,
            _ => NodeType::Element,
        }
    }
}

/// A test to apply to nodes on a given axis to see if they should be included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `*`: any node of the axis's principal type.
    Any,
    /// An unprefixed name; matches the local name regardless of namespace.
    Name(String),
    /// A prefixed name (`svg:rect`) or prefixed wildcard (`svg:*`, `local` is `None`).
    QName {
        prefix: String,
        local: Option<String>,
    },
    /// A node type test (e.g., `text()`, `node()`).
    NodeType(NodeTypeTest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTypeTest {
    Text,
    Node,
    Comment,
    /// `processing-instruction()` with an optional target literal.
    ProcessingInstruction(Option<String>),
}

impl NodeTypeTest {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "text" => Some(NodeTypeTest::Text),
            "node" => Some(NodeTypeTest::Node),
            "comment" => Some(NodeTypeTest::Comment),
            "processing-instruction" => Some(NodeTypeTest::ProcessingInstruction(None)),
            _ => None,
        }
    }
}
