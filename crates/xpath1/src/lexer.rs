//! Turns an XPath 1.0 expression string into a flat token stream.
//!
//! Abbreviated syntax is expanded here, so the builder only ever sees the
//! canonical forms: `.` becomes `self::node()`, `..` becomes `parent::node()`,
//! `//` becomes `/descendant-or-self::node()/` and `@` becomes `attribute::`.

use crate::error::SyntaxError;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, one_of},
    combinator::{map, recognize},
    sequence::pair,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Literal,
    Number,
    Operator,
    Punctuation,
}

/// A single lexical token. `position` is the byte offset of the lexeme the
/// token came from; tokens produced by abbreviation expansion share it.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: usize,
}

impl Token {
    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }
}

/// Raw lexemes recognised before expansion.
enum Lexeme<'s> {
    Number(&'s str),
    Name(&'s str),
    Operator(&'s str),
    Punctuation(&'s str),
    Dot,
    DotDot,
    DoubleSlash,
    At,
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn name(input: &str) -> IResult<&str, &str> {
    recognize(pair(take_while1(is_name_start), take_while(is_name_char))).parse(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((digit1, recognize(pair(char('.'), digit1)))),
        take_while(|c: char| c.is_ascii_digit() || c == '.'),
    ))
    .parse(input)
}

fn lexeme(input: &str) -> IResult<&str, Lexeme<'_>> {
    alt((
        map(number, Lexeme::Number),
        map(tag(".."), |_| Lexeme::DotDot),
        map(char('.'), |_| Lexeme::Dot),
        map(tag("//"), |_| Lexeme::DoubleSlash),
        map(char('@'), |_| Lexeme::At),
        map(name, Lexeme::Name),
        map(
            alt((tag("::"), tag("!="), tag("<="), tag(">="))),
            Lexeme::Operator,
        ),
        map(recognize(one_of("/|+-*=<>")), Lexeme::Operator),
        map(recognize(one_of("()[],:$")), Lexeme::Punctuation),
    ))
    .parse(input)
}

/// Accumulates tokens and checks that groupings nest properly as they are emitted.
#[derive(Default)]
struct TokenSink {
    tokens: Vec<Token>,
    open: Vec<(char, usize)>,
}

impl TokenSink {
    fn push(&mut self, kind: TokenKind, text: &str, position: usize) -> Result<(), SyntaxError> {
        if kind == TokenKind::Punctuation {
            match text {
                "(" => self.open.push(('(', position)),
                "[" => self.open.push(('[', position)),
                ")" | "]" => {
                    let expected = if text == ")" { '(' } else { '[' };
                    match self.open.pop() {
                        Some((opener, _)) if opener == expected => {}
                        _ => return Err(SyntaxError::UnbalancedGrouping { position }),
                    }
                }
                _ => {}
            }
        }
        self.tokens.push(Token {
            kind,
            text: text.to_string(),
            position,
        });
        Ok(())
    }

    /// Emits `axis :: node ( )`.
    fn push_node_step(&mut self, axis: &str, position: usize) -> Result<(), SyntaxError> {
        self.push(TokenKind::Identifier, axis, position)?;
        self.push(TokenKind::Operator, "::", position)?;
        self.push(TokenKind::Identifier, "node", position)?;
        self.push(TokenKind::Punctuation, "(", position)?;
        self.push(TokenKind::Punctuation, ")", position)
    }

    fn finish(self, end: usize) -> Result<Vec<Token>, SyntaxError> {
        match self.open.last() {
            Some(_) => Err(SyntaxError::UnbalancedGrouping { position: end }),
            None => Ok(self.tokens),
        }
    }
}

/// Reads a quoted literal starting at `input`. A backslash directly before the
/// delimiting quote escapes it.
fn string_literal(input: &str, position: usize) -> Result<(String, &str), SyntaxError> {
    let mut chars = input.char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err(SyntaxError::UnterminatedLiteral { position });
    };
    let mut value = String::new();
    let mut escaped = false;
    for (offset, c) in chars {
        if escaped {
            if c != quote {
                value.push('\\');
            }
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((value, &input[offset + c.len_utf8()..]));
        } else {
            value.push(c);
        }
    }
    Err(SyntaxError::UnterminatedLiteral { position })
}

pub fn tokenize(expression: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut sink = TokenSink::default();
    let mut rest = expression;

    loop {
        if let Ok((remaining, _)) = multispace0::<&str, nom::error::Error<&str>>(rest) {
            rest = remaining;
        }
        let position = expression.len() - rest.len();
        let Some(first) = rest.chars().next() else {
            break;
        };

        if first == '"' || first == '\'' {
            let (value, remaining) = string_literal(rest, position)?;
            sink.push(TokenKind::Literal, &value, position)?;
            rest = remaining;
            continue;
        }

        let (remaining, lexeme) = lexeme(rest).map_err(|_| SyntaxError::UnexpectedCharacter {
            character: first,
            position,
        })?;
        rest = remaining;

        match lexeme {
            Lexeme::Number(text) => {
                if text.matches('.').count() > 1 {
                    return Err(SyntaxError::MalformedNumber {
                        text: text.to_string(),
                        position,
                    });
                }
                sink.push(TokenKind::Number, text, position)?;
            }
            Lexeme::Name(text) => sink.push(TokenKind::Identifier, text, position)?,
            Lexeme::Operator(text) => sink.push(TokenKind::Operator, text, position)?,
            Lexeme::Punctuation(text) => sink.push(TokenKind::Punctuation, text, position)?,
            Lexeme::Dot => sink.push_node_step("self", position)?,
            Lexeme::DotDot => sink.push_node_step("parent", position)?,
            Lexeme::DoubleSlash => {
                sink.push(TokenKind::Operator, "/", position)?;
                sink.push_node_step("descendant-or-self", position)?;
                sink.push(TokenKind::Operator, "/", position)?;
            }
            Lexeme::At => {
                sink.push(TokenKind::Identifier, "attribute", position)?;
                sink.push(TokenKind::Operator, "::", position)?;
            }
        }
    }

    let tokens = sink.finish(expression.len())?;
    log::trace!("tokenized '{}' into {} tokens", expression, tokens.len());
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(expression: &str) -> Vec<String> {
        tokenize(expression)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn test_abbreviations_expand_to_canonical_tokens() {
        assert_eq!(texts("."), vec!["self", "::", "node", "(", ")"]);
        assert_eq!(texts(".."), vec!["parent", "::", "node", "(", ")"]);
        assert_eq!(texts("@id"), vec!["attribute", "::", "id"]);
        assert_eq!(
            texts("//a"),
            vec!["/", "descendant-or-self", "::", "node", "(", ")", "/", "a"]
        );
    }

    #[test]
    fn test_multi_character_operators() {
        assert_eq!(texts("a!=b"), vec!["a", "!=", "b"]);
        assert_eq!(texts("1<=2>=3"), vec!["1", "<=", "2", ">=", "3"]);
        assert_eq!(texts("child::x"), vec!["child", "::", "x"]);
        assert_eq!(texts("svg:rect"), vec!["svg", ":", "rect"]);
    }

    #[test]
    fn test_numbers_and_sign() {
        let tokens = tokenize("-1.5 + .25").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Operator);
        assert_eq!(tokens[1].kind, TokenKind::Number);
        assert_eq!(tokens[1].text, "1.5");
        assert_eq!(tokens[3].text, ".25");
        assert!(matches!(
            tokenize("1.2.3"),
            Err(SyntaxError::MalformedNumber { .. })
        ));
    }

    #[test]
    fn test_names_keep_hyphens() {
        assert_eq!(
            texts("following-sibling::my-elem"),
            vec!["following-sibling", "::", "my-elem"]
        );
        assert_eq!(texts("5 - 2"), vec!["5", "-", "2"]);
    }

    #[test]
    fn test_string_literals() {
        let tokens = tokenize(r#"'a b' "c'd" 'it\'s'"#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Literal);
        assert_eq!(tokens[0].text, "a b");
        assert_eq!(tokens[1].text, "c'd");
        assert_eq!(tokens[2].text, "it's");
        assert_eq!(
            tokenize("'open"),
            Err(SyntaxError::UnterminatedLiteral { position: 0 })
        );
    }

    #[test]
    fn test_unbalanced_grouping() {
        assert!(matches!(
            tokenize("count(a"),
            Err(SyntaxError::UnbalancedGrouping { .. })
        ));
        assert!(matches!(
            tokenize("a]"),
            Err(SyntaxError::UnbalancedGrouping { position: 1 })
        ));
        assert!(matches!(
            tokenize("a[(1])"),
            Err(SyntaxError::UnbalancedGrouping { .. })
        ));
        assert!(tokenize("a[(1)]").is_ok());
    }

    #[test]
    fn test_unexpected_character() {
        assert_eq!(
            tokenize("a # b"),
            Err(SyntaxError::UnexpectedCharacter {
                character: '#',
                position: 2
            })
        );
    }
}
