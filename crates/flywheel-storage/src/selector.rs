// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Label-selector expressions parsed into requirements.
//!
//! The grammar is the familiar label-selector language: requirements
//! joined by commas form a conjunction.
//!
//! ```text
//! env=prod, tier in (web,api), !legacy, replicas>3
//! ```
//!
//! Supported operators: `=`, `==`, `!=`, `in (…)`, `notin (…)`, `>`,
//! `<`, bare `key` (exists) and `!key` (does not exist). An empty
//! `in ()` set is accepted by the grammar and rejected later by the
//! query compiler.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// A selector parse failure, pointing at the offending position.
#[derive(Debug, Error)]
#[error("unable to parse selector at position {position}: {message}")]
pub struct ParseError {
    /// Byte offset of the failure in the selector string.
    pub position: usize,
    /// What went wrong.
    pub message: String,
}

/// A requirement operator, carried verbatim to the query compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Equals,
    /// `==`
    DoubleEquals,
    /// `!=`
    NotEquals,
    /// `in (…)`
    In,
    /// `notin (…)`
    NotIn,
    /// `>`
    GreaterThan,
    /// `<`
    LessThan,
    /// bare key
    Exists,
    /// `!key`
    DoesNotExist,
}

impl Operator {
    /// The operator's selector spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::DoubleEquals => "==",
            Self::NotEquals => "!=",
            Self::In => "in",
            Self::NotIn => "notin",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::Exists => "exists",
            Self::DoesNotExist => "!",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(key, operator, values)` clause of a selector conjunction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl Requirement {
    /// Build a requirement, checking the operator's value arity.
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        values: impl IntoIterator<Item = String>,
    ) -> Result<Self, ParseError> {
        let key = key.into();
        let values: BTreeSet<String> = values.into_iter().collect();
        let arity_err = |message: &str| ParseError {
            position: 0,
            message: format!("{message} for operator '{operator}'"),
        };
        match operator {
            Operator::Equals
            | Operator::DoubleEquals
            | Operator::NotEquals
            | Operator::GreaterThan
            | Operator::LessThan => {
                if values.len() != 1 {
                    return Err(arity_err("exactly one value is required"));
                }
            }
            Operator::Exists | Operator::DoesNotExist => {
                if !values.is_empty() {
                    return Err(arity_err("values are not allowed"));
                }
            }
            Operator::In | Operator::NotIn => {}
        }
        Ok(Self {
            key,
            operator,
            values,
        })
    }

    /// The column name this requirement addresses.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The requirement operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The ordered value set.
    pub fn values(&self) -> &BTreeSet<String> {
        &self.values
    }

    /// Sample one value from the set, if any.
    pub fn pop_any(&self) -> Option<&str> {
        self.values.iter().next().map(String::as_str)
    }

    /// Enumerate all values in deterministic order.
    pub fn list(&self) -> Vec<&str> {
        self.values.iter().map(String::as_str).collect()
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::In | Operator::NotIn => {
                let values: Vec<&str> = self.list();
                write!(f, "{} {} ({})", self.key, self.operator, values.join(","))
            }
            _ => write!(
                f,
                "{}{}{}",
                self.key,
                self.operator,
                self.pop_any().unwrap_or("")
            ),
        }
    }
}

/// Render a requirement list back into selector syntax.
pub fn to_selector_string(requirements: &[Requirement]) -> String {
    requirements
        .iter()
        .map(Requirement::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Identifier(String),
    In,
    NotIn,
    Equals,
    DoubleEquals,
    NotEquals,
    GreaterThan,
    LessThan,
    Bang,
    OpenParen,
    CloseParen,
    Comma,
    End,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Identifier(s) => format!("'{s}'"),
            Token::In => "'in'".to_string(),
            Token::NotIn => "'notin'".to_string(),
            Token::Equals => "'='".to_string(),
            Token::DoubleEquals => "'=='".to_string(),
            Token::NotEquals => "'!='".to_string(),
            Token::GreaterThan => "'>'".to_string(),
            Token::LessThan => "'<'".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::OpenParen => "'('".to_string(),
            Token::CloseParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::End => "end of selector".to_string(),
        }
    }
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn next_token(&mut self) -> Result<(usize, Token), ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        if self.pos >= self.input.len() {
            return Ok((start, Token::End));
        }
        let ch = self.input[self.pos];
        let token = match ch {
            b'(' => {
                self.pos += 1;
                Token::OpenParen
            }
            b')' => {
                self.pos += 1;
                Token::CloseParen
            }
            b',' => {
                self.pos += 1;
                Token::Comma
            }
            b'>' => {
                self.pos += 1;
                Token::GreaterThan
            }
            b'<' => {
                self.pos += 1;
                Token::LessThan
            }
            b'=' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Token::DoubleEquals
                } else {
                    Token::Equals
                }
            }
            b'!' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Token::NotEquals
                } else {
                    Token::Bang
                }
            }
            _ => {
                while self.pos < self.input.len() && !is_special(self.input[self.pos]) {
                    self.pos += 1;
                }
                let word = std::str::from_utf8(&self.input[start..self.pos])
                    .map_err(|_| ParseError {
                        position: start,
                        message: "selector is not valid UTF-8".to_string(),
                    })?
                    .to_string();
                match word.as_str() {
                    "in" => Token::In,
                    "notin" => Token::NotIn,
                    _ => Token::Identifier(word),
                }
            }
        };
        Ok((start, token))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }
}

fn is_special(ch: u8) -> bool {
    matches!(ch, b'(' | b')' | b',' | b'>' | b'<' | b'=' | b'!') || ch.is_ascii_whitespace()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<(usize, Token)>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
            lookahead: None,
        }
    }

    fn next(&mut self) -> Result<(usize, Token), ParseError> {
        match self.lookahead.take() {
            Some(t) => Ok(t),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> Result<&(usize, Token), ParseError> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lexer.next_token()?);
        }
        Ok(self.lookahead.as_ref().expect("lookahead just filled"))
    }

    fn unexpected(position: usize, token: &Token, wanted: &str) -> ParseError {
        ParseError {
            position,
            message: format!("found {}, expected {wanted}", token.describe()),
        }
    }

    fn parse(&mut self) -> Result<Vec<Requirement>, ParseError> {
        let mut requirements = Vec::new();
        loop {
            let (pos, token) = self.next()?;
            match token {
                Token::End => return Ok(requirements),
                Token::Bang => {
                    let (kpos, key) = self.next()?;
                    let Token::Identifier(key) = key else {
                        return Err(Self::unexpected(kpos, &key, "an identifier"));
                    };
                    requirements.push(Requirement {
                        key,
                        operator: Operator::DoesNotExist,
                        values: BTreeSet::new(),
                    });
                }
                Token::Identifier(key) => {
                    requirements.push(self.parse_after_key(key)?);
                }
                other => return Err(Self::unexpected(pos, &other, "an identifier or '!'")),
            }
            let (pos, token) = self.next()?;
            match token {
                Token::Comma => continue,
                Token::End => return Ok(requirements),
                other => return Err(Self::unexpected(pos, &other, "',' or end of selector")),
            }
        }
    }

    fn parse_after_key(&mut self, key: String) -> Result<Requirement, ParseError> {
        let (pos, token) = self.peek()?.clone();
        let operator = match token {
            Token::Comma | Token::End => {
                return Ok(Requirement {
                    key,
                    operator: Operator::Exists,
                    values: BTreeSet::new(),
                });
            }
            Token::Equals => Operator::Equals,
            Token::DoubleEquals => Operator::DoubleEquals,
            Token::NotEquals => Operator::NotEquals,
            Token::GreaterThan => Operator::GreaterThan,
            Token::LessThan => Operator::LessThan,
            Token::In => Operator::In,
            Token::NotIn => Operator::NotIn,
            other => return Err(Self::unexpected(pos, &other, "an operator")),
        };
        self.next()?;

        if matches!(operator, Operator::In | Operator::NotIn) {
            let values = self.parse_value_set()?;
            return Ok(Requirement {
                key,
                operator,
                values,
            });
        }

        let (pos, token) = self.next()?;
        let Token::Identifier(value) = token else {
            return Err(Self::unexpected(pos, &token, "a value"));
        };
        let mut values = BTreeSet::new();
        values.insert(value);
        Ok(Requirement {
            key,
            operator,
            values,
        })
    }

    fn parse_value_set(&mut self) -> Result<BTreeSet<String>, ParseError> {
        let (pos, token) = self.next()?;
        if token != Token::OpenParen {
            return Err(Self::unexpected(pos, &token, "'('"));
        }
        let mut values = BTreeSet::new();
        if self.peek()?.1 == Token::CloseParen {
            self.next()?;
            return Ok(values);
        }
        loop {
            let (pos, token) = self.next()?;
            let Token::Identifier(value) = token else {
                return Err(Self::unexpected(pos, &token, "a value"));
            };
            values.insert(value);
            let (pos, token) = self.next()?;
            match token {
                Token::Comma => continue,
                Token::CloseParen => return Ok(values),
                other => return Err(Self::unexpected(pos, &other, "',' or ')'")),
            }
        }
    }
}

/// Parse a selector string into its requirement conjunction.
///
/// An empty or whitespace-only selector yields no requirements.
pub fn parse(selector: &str) -> Result<Vec<Requirement>, ParseError> {
    Parser::new(selector).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_selector() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_single_equals() {
        let reqs = parse("env=prod").unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].key(), "env");
        assert_eq!(reqs[0].operator(), Operator::Equals);
        assert_eq!(reqs[0].pop_any(), Some("prod"));
    }

    #[test]
    fn test_parse_conjunction_preserves_order() {
        let reqs = parse("env=prod,tier in (web,api),!legacy,replicas>3").unwrap();
        assert_eq!(reqs.len(), 4);
        assert_eq!(reqs[0].key(), "env");
        assert_eq!(reqs[1].key(), "tier");
        assert_eq!(reqs[1].operator(), Operator::In);
        assert_eq!(reqs[1].list(), vec!["api", "web"]);
        assert_eq!(reqs[2].operator(), Operator::DoesNotExist);
        assert_eq!(reqs[3].operator(), Operator::GreaterThan);
    }

    #[test]
    fn test_parse_all_operators() {
        let cases = vec![
            ("a=1", Operator::Equals),
            ("a==1", Operator::DoubleEquals),
            ("a!=1", Operator::NotEquals),
            ("a>1", Operator::GreaterThan),
            ("a<1", Operator::LessThan),
            ("a in (1)", Operator::In),
            ("a notin (1,2)", Operator::NotIn),
            ("a", Operator::Exists),
            ("!a", Operator::DoesNotExist),
        ];
        for (selector, operator) in cases {
            let reqs = parse(selector).unwrap();
            assert_eq!(reqs[0].operator(), operator, "selector {selector:?}");
        }
    }

    #[test]
    fn test_parse_empty_in_set_is_grammatical() {
        let reqs = parse("env in ()").unwrap();
        assert_eq!(reqs[0].operator(), Operator::In);
        assert!(reqs[0].values().is_empty());
    }

    #[test]
    fn test_parse_whitespace_tolerated() {
        let reqs = parse("  env = prod , tier notin ( web , api ) ").unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].pop_any(), Some("prod"));
        assert_eq!(reqs[1].list(), vec!["api", "web"]);
    }

    #[test]
    fn test_parse_malformed_selectors() {
        for selector in ["env=", "=prod", "env in web", "env in (web", "env prod", "env,,"] {
            assert!(parse(selector).is_err(), "selector {selector:?} should fail");
        }
    }

    #[test]
    fn test_requirement_new_checks_arity() {
        assert!(Requirement::new("a", Operator::Equals, vec![]).is_err());
        assert!(Requirement::new(
            "a",
            Operator::Equals,
            vec!["1".to_string(), "2".to_string()]
        )
        .is_err());
        assert!(Requirement::new("a", Operator::Exists, vec!["1".to_string()]).is_err());
        assert!(Requirement::new("a", Operator::In, vec![]).is_ok());
    }

    #[test]
    fn test_round_trip() {
        for selector in [
            "env=prod",
            "a==1,b!=2",
            "tier in (api,web)",
            "tier notin (api,web)",
            "exists_key",
            "!absent_key",
            "replicas>3,replicas<9",
        ] {
            let reqs = parse(selector).unwrap();
            let rendered = to_selector_string(&reqs);
            assert_eq!(rendered, selector);
            assert_eq!(parse(&rendered).unwrap(), reqs);
        }
    }
}
