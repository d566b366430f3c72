//! Recursive-descent parser producing a checked [`Expr`].
//!
//! Precedence, lowest first: `||`, `&&`, comparisons (`==`, `!=`, `in`),
//! unary `!`, postfix (`[index]`, `.method(args)`), primaries.
//! Identifiers are resolved against the build schema while parsing, so an
//! unknown field fails at compile time rather than on the first event.

use regex::Regex;

use super::eval::{Expr, Field, Method, Value};
use super::lexer::{tokenize, Spanned, Token};
use crate::build::BuildStatus;
use crate::error::FilterError;

/// Root variable holding the build.
const BUILD_VAR: &str = "build";

pub(crate) fn parse(input: &str) -> Result<Expr, FilterError> {
    if input.trim().is_empty() {
        return Err(FilterError::Empty);
    }

    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    let expr = parser.or_expr()?;
    parser.expect(&Token::Eof, "end of expression")?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, expected: &'static str) -> Result<(), FilterError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> FilterError {
        let spanned = &self.tokens[self.pos];
        FilterError::UnexpectedToken {
            found: spanned.token.describe(),
            expected,
            offset: spanned.offset,
        }
    }

    fn or_expr(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.comparison()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.comparison()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FilterError> {
        if self.eat(&Token::Bang) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn comparison(&mut self) -> Result<Expr, FilterError> {
        let lhs = self.unary()?;
        let build: fn(Box<Expr>, Box<Expr>) -> Expr = match self.peek() {
            Token::EqEq => Expr::Eq,
            Token::NotEq => Expr::Ne,
            Token::In => Expr::In,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.unary()?;
        Ok(build(Box::new(lhs), Box::new(rhs)))
    }

    fn postfix(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::LBracket) {
                let index = self.or_expr()?;
                self.expect(&Token::RBracket, "`]`")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.peek() == &Token::Dot {
                self.advance();
                let Token::Ident(name) = self.advance() else {
                    return Err(self.unexpected_prev("method name"));
                };
                if self.peek() != &Token::LParen {
                    return Err(self.unexpected("`(`"));
                }
                let args = self.call_args()?;
                expr = method_call(expr, &name, args)?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn unexpected_prev(&self, expected: &'static str) -> FilterError {
        let spanned = &self.tokens[self.pos.saturating_sub(1)];
        FilterError::UnexpectedToken {
            found: spanned.token.describe(),
            expected,
            offset: spanned.offset,
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, FilterError> {
        self.expect(&Token::LParen, "`(`")?;
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.or_expr()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma, "`,` or `)`")?;
        }
    }

    fn primary(&mut self) -> Result<Expr, FilterError> {
        match self.peek().clone() {
            Token::True => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Token::Int(n) => {
                self.advance();
                Ok(Expr::Literal(Value::Int(n)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Value::Str(s)))
            }
            Token::LParen => {
                self.advance();
                let inner = self.or_expr()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(inner)
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.or_expr()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(&Token::Comma, "`,` or `]`")?;
                    }
                }
                Ok(Expr::List(items))
            }
            Token::Ident(_) => self.path(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// Consume `ident(.ident)*`, stopping before a `.name(` method call.
    fn path(&mut self) -> Result<Expr, FilterError> {
        let mut segments = Vec::new();
        if let Token::Ident(first) = self.advance() {
            segments.push(first);
        }
        while self.peek() == &Token::Dot
            && matches!(self.peek_at(1), Token::Ident(_))
            && self.peek_at(2) != &Token::LParen
        {
            self.advance();
            if let Token::Ident(name) = self.advance() {
                segments.push(name);
            }
        }
        resolve_path(&segments)
    }
}

fn resolve_path(segments: &[String]) -> Result<Expr, FilterError> {
    let parts: Vec<&str> = segments.iter().map(String::as_str).collect();
    match parts.as_slice() {
        ["Build", "Status", name] => status_constant(name),
        [BUILD_VAR, rest @ ..] if !rest.is_empty() => field_path(rest, segments),
        [BUILD_VAR] => Err(FilterError::UnknownIdentifier(BUILD_VAR.to_string())),
        [name] if BuildStatus::from_name(name).is_some() => status_constant(name),
        [first, ..] if Field::from_name(first).is_some() => field_path(&parts, segments),
        _ => Err(FilterError::UnknownIdentifier(segments.join("."))),
    }
}

fn field_path(parts: &[&str], segments: &[String]) -> Result<Expr, FilterError> {
    let field =
        Field::from_name(parts[0]).ok_or_else(|| FilterError::UnknownField(parts.join(".")))?;
    match (field, &parts[1..]) {
        (field, []) => Ok(Expr::Field(field)),
        (Field::Substitutions, [key]) => Ok(Expr::Index(
            Box::new(Expr::Field(Field::Substitutions)),
            Box::new(Expr::Literal(Value::Str((*key).to_string()))),
        )),
        _ => Err(FilterError::UnknownField(segments.join("."))),
    }
}

fn status_constant(name: &str) -> Result<Expr, FilterError> {
    BuildStatus::from_name(name)
        .map(|status| Expr::Literal(Value::Status(status)))
        .ok_or_else(|| FilterError::UnknownStatus(name.to_string()))
}

fn method_call(target: Expr, name: &str, args: Vec<Expr>) -> Result<Expr, FilterError> {
    let method = Method::from_name(name).ok_or_else(|| FilterError::UnknownMethod(name.to_string()))?;
    if args.len() != method.arity() {
        return Err(FilterError::Arity {
            method: name.to_string(),
            expected: method.arity(),
            found: args.len(),
        });
    }

    // Literal patterns are compiled once here instead of per event.
    if method == Method::Matches {
        if let Some(Expr::Literal(Value::Str(pattern))) = args.first() {
            let regex = Regex::new(pattern).map_err(|e| FilterError::InvalidRegex {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            return Ok(Expr::Matches(Box::new(target), regex));
        }
    }

    Ok(Expr::Call {
        target: Box::new(target),
        method,
        args,
    })
}
