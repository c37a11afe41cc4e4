//! Builds an `Expression` tree from the token stream produced by the lexer.
//!
//! Location paths are parsed by recursive descent and binary operators by
//! precedence climbing. Whether `*`, `-` or an operator keyword is an operator
//! or part of an operand falls out of the grammar position it appears in.

use super::ast::*;
use crate::config::XPathConfig;
use crate::error::SyntaxError;
use crate::lexer::{Token, TokenKind, tokenize};

/// Tokenizes and builds `input` in one go.
pub fn parse_expression(input: &str, config: &XPathConfig) -> Result<Expression, SyntaxError> {
    let tokens = tokenize(input)?;
    build(&tokens, config)
}

pub fn build(tokens: &[Token], config: &XPathConfig) -> Result<Expression, SyntaxError> {
    let mut builder = ExpressionBuilder {
        tokens,
        pos: 0,
        depth: 0,
        max_depth: config.max_nesting_depth,
    };
    let expr = builder.parse_expr()?;
    if let Some(token) = builder.peek() {
        return Err(SyntaxError::IncompleteExpression {
            position: token.position,
        });
    }
    log::trace!("built expression: {:?}", expr);
    Ok(expr)
}

struct ExpressionBuilder<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'t> ExpressionBuilder<'t> {
    // --- Token access ---

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + offset)
    }

    fn check(&self, kind: TokenKind, text: &str) -> bool {
        self.peek().is_some_and(|t| t.is(kind, text))
    }

    fn check_at(&self, offset: usize, kind: TokenKind, text: &str) -> bool {
        self.peek_at(offset).is_some_and(|t| t.is(kind, text))
    }

    fn eat(&mut self, kind: TokenKind, text: &str) -> bool {
        if self.check(kind, text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn advance(&mut self) -> Result<&'t Token, SyntaxError> {
        let token = self.peek().ok_or_else(|| self.incomplete())?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind, text: &str) -> Result<(), SyntaxError> {
        match self.peek() {
            Some(t) if t.is(kind, text) => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(unexpected(t)),
            None => Err(self.incomplete()),
        }
    }

    fn incomplete(&self) -> SyntaxError {
        let position = self
            .tokens
            .last()
            .map(|t| t.position + t.text.len())
            .unwrap_or(0);
        SyntaxError::IncompleteExpression { position }
    }

    // --- Expressions ---

    fn parse_expr(&mut self) -> Result<Expression, SyntaxError> {
        self.enter()?;
        let expr = self.parse_binary(1);
        self.depth -= 1;
        expr
    }

    /// Descends one level into the tree being built. Operator chains count as
    /// well as brackets, since the evaluator recurses through both.
    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(SyntaxError::NestingTooDeep {
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }

    /// The binary operator at the current token, if the token is in operator position.
    fn binary_operator(&self) -> Option<BinaryOperator> {
        let token = self.peek()?;
        let op = match (token.kind, token.text.as_str()) {
            (TokenKind::Identifier, "or") => BinaryOperator::Or,
            (TokenKind::Identifier, "and") => BinaryOperator::And,
            (TokenKind::Identifier, "div") => BinaryOperator::Divide,
            (TokenKind::Identifier, "mod") => BinaryOperator::Modulo,
            (TokenKind::Operator, "=") => BinaryOperator::Equals,
            (TokenKind::Operator, "!=") => BinaryOperator::NotEquals,
            (TokenKind::Operator, "<") => BinaryOperator::LessThan,
            (TokenKind::Operator, "<=") => BinaryOperator::LessThanOrEqual,
            (TokenKind::Operator, ">") => BinaryOperator::GreaterThan,
            (TokenKind::Operator, ">=") => BinaryOperator::GreaterThanOrEqual,
            (TokenKind::Operator, "+") => BinaryOperator::Plus,
            (TokenKind::Operator, "-") => BinaryOperator::Minus,
            (TokenKind::Operator, "*") => BinaryOperator::Multiply,
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expression, SyntaxError> {
        let mut left = self.parse_unary()?;
        let mut chained = 0;
        while let Some(op) = self.binary_operator() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;
            self.enter()?;
            chained += 1;
            let right = self.parse_binary(precedence + 1)?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, SyntaxError> {
        let mut negations = 0;
        while self.eat(TokenKind::Operator, "-") {
            self.enter()?;
            negations += 1;
        }
        let mut expr = self.parse_union()?;
        self.depth -= negations;
        for _ in 0..negations {
            expr = Expression::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(expr),
            };
        }
        Ok(expr)
    }

    fn parse_union(&mut self) -> Result<Expression, SyntaxError> {
        let mut left = self.parse_path()?;
        let mut chained = 0;
        while self.eat(TokenKind::Operator, "|") {
            self.enter()?;
            chained += 1;
            let right = self.parse_path()?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::Union,
                right: Box::new(right),
            };
        }
        self.depth -= chained;
        Ok(left)
    }

    // --- Paths ---

    fn parse_path(&mut self) -> Result<Expression, SyntaxError> {
        if self.peek().is_none() {
            return Err(self.incomplete());
        }

        let mut children = Vec::new();
        if self.eat(TokenKind::Operator, "/") {
            children.push(Expression::RootStep);
            if self.at_step_start() {
                self.parse_relative_steps(&mut children)?;
            }
        } else if self.at_step_start() {
            self.parse_relative_steps(&mut children)?;
        } else {
            children.push(self.parse_primary()?);
            if let Some(token) = self.peek()
                && token.is(TokenKind::Punctuation, "[")
            {
                return Err(SyntaxError::PredicateWithoutAxis {
                    position: token.position,
                });
            }
            if self.eat(TokenKind::Operator, "/") {
                self.parse_relative_steps(&mut children)?;
            }
        }

        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            Expression::Step(children)
        })
    }

    fn parse_relative_steps(&mut self, children: &mut Vec<Expression>) -> Result<(), SyntaxError> {
        children.push(self.parse_step()?);
        while self.eat(TokenKind::Operator, "/") {
            children.push(self.parse_step()?);
        }
        Ok(())
    }

    /// True when the current token, in operand position, begins an axis step.
    fn at_step_start(&self) -> bool {
        let Some(token) = self.peek() else {
            return false;
        };
        match token.kind {
            TokenKind::Operator => token.text == "*",
            TokenKind::Identifier => {
                if self.check_at(1, TokenKind::Operator, "::") {
                    return true;
                }
                if self.check_at(1, TokenKind::Punctuation, ":") {
                    // `prefix:name(` is a prefixed function call, anything else a QName test.
                    let prefixed_call = self
                        .peek_at(2)
                        .is_some_and(|t| t.kind == TokenKind::Identifier)
                        && self.check_at(3, TokenKind::Punctuation, "(");
                    return !prefixed_call;
                }
                if self.check_at(1, TokenKind::Punctuation, "(") {
                    return NodeTypeTest::from_keyword(&token.text).is_some();
                }
                !matches!(token.text.as_str(), "true" | "false" | "Infinity" | "NaN")
            }
            _ => false,
        }
    }

    fn parse_step(&mut self) -> Result<Expression, SyntaxError> {
        let axis = match (self.peek(), self.check_at(1, TokenKind::Operator, "::")) {
            (Some(token), true) if token.kind == TokenKind::Identifier => {
                let axis = Axis::from_name(&token.text)
                    .ok_or_else(|| SyntaxError::UnknownAxis(token.text.clone()))?;
                self.pos += 2;
                axis
            }
            _ => Axis::Child,
        };
        let node_test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Expression::Axis(AxisStep {
            axis,
            node_test,
            predicates,
        }))
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, SyntaxError> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::Operator if token.text == "*" => Ok(NodeTest::Any),
            TokenKind::Identifier => {
                if self.check(TokenKind::Punctuation, "(")
                    && let Some(test) = NodeTypeTest::from_keyword(&token.text)
                {
                    return self.parse_node_type_test(test);
                }
                if self.eat(TokenKind::Punctuation, ":") {
                    let local = self.advance()?;
                    return match local.kind {
                        TokenKind::Operator if local.text == "*" => Ok(NodeTest::QName {
                            prefix: token.text.clone(),
                            local: None,
                        }),
                        TokenKind::Identifier => Ok(NodeTest::QName {
                            prefix: token.text.clone(),
                            local: Some(local.text.clone()),
                        }),
                        _ => Err(unexpected(local)),
                    };
                }
                Ok(NodeTest::Name(token.text.clone()))
            }
            _ => Err(unexpected(token)),
        }
    }

    fn parse_node_type_test(&mut self, test: NodeTypeTest) -> Result<NodeTest, SyntaxError> {
        self.expect(TokenKind::Punctuation, "(")?;
        let test = match test {
            NodeTypeTest::ProcessingInstruction(_) => match self.peek() {
                Some(t) if t.kind == TokenKind::Literal => {
                    self.pos += 1;
                    NodeTypeTest::ProcessingInstruction(Some(t.text.clone()))
                }
                _ => NodeTypeTest::ProcessingInstruction(None),
            },
            other => other,
        };
        self.expect(TokenKind::Punctuation, ")")?;
        Ok(NodeTest::NodeType(test))
    }

    fn parse_predicates(&mut self) -> Result<Vec<Predicate>, SyntaxError> {
        let mut predicates = Vec::new();
        while self.eat(TokenKind::Punctuation, "[") {
            let expr = self.parse_expr()?;
            self.expect(TokenKind::Punctuation, "]")?;
            predicates.push(Predicate { expr });
        }
        Ok(predicates)
    }

    // --- Primary expressions ---

    fn parse_primary(&mut self) -> Result<Expression, SyntaxError> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::Literal => Ok(Expression::Literal(token.text.clone())),
            TokenKind::Number => token.text.parse().map(Expression::Number).map_err(|_| {
                SyntaxError::MalformedNumber {
                    text: token.text.clone(),
                    position: token.position,
                }
            }),
            TokenKind::Punctuation => match token.text.as_str() {
                "$" => {
                    let name = self.parse_qualified_name()?;
                    Ok(Expression::Variable(name))
                }
                "(" => {
                    let expr = self.parse_expr()?;
                    self.expect(TokenKind::Punctuation, ")")?;
                    Ok(expr)
                }
                "[" => Err(SyntaxError::PredicateWithoutAxis {
                    position: token.position,
                }),
                _ => Err(unexpected(token)),
            },
            TokenKind::Identifier => {
                self.pos -= 1;
                let name = self.parse_qualified_name()?;
                if self.check(TokenKind::Punctuation, "(") {
                    return self.parse_function_call(name);
                }
                match name.as_str() {
                    "true" => Ok(Expression::Boolean(true)),
                    "false" => Ok(Expression::Boolean(false)),
                    "Infinity" => Ok(Expression::Number(f64::INFINITY)),
                    "NaN" => Ok(Expression::Number(f64::NAN)),
                    _ => Err(unexpected(token)),
                }
            }
            TokenKind::Operator => Err(unexpected(token)),
        }
    }

    /// `NCName` or `NCName ':' NCName`, returned as written.
    fn parse_qualified_name(&mut self) -> Result<String, SyntaxError> {
        let first = self.advance()?;
        if first.kind != TokenKind::Identifier {
            return Err(unexpected(first));
        }
        if self.check(TokenKind::Punctuation, ":")
            && self
                .peek_at(1)
                .is_some_and(|t| t.kind == TokenKind::Identifier)
        {
            self.pos += 1;
            let local = self.advance()?;
            return Ok(format!("{}:{}", first.text, local.text));
        }
        Ok(first.text.clone())
    }

    fn parse_function_call(&mut self, name: String) -> Result<Expression, SyntaxError> {
        self.expect(TokenKind::Punctuation, "(")?;
        let mut args = Vec::new();
        if !self.eat(TokenKind::Punctuation, ")") {
            args.push(self.parse_expr()?);
            while self.eat(TokenKind::Punctuation, ",") {
                args.push(self.parse_expr()?);
            }
            self.expect(TokenKind::Punctuation, ")")?;
        }
        Ok(Expression::FunctionCall { name, args })
    }
}

fn unexpected(token: &Token) -> SyntaxError {
    SyntaxError::UnexpectedToken {
        token: token.text.clone(),
        position: token.position,
    }
}
