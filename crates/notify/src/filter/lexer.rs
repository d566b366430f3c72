//! Tokenizer for filter expressions.

use crate::error::FilterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    True,
    False,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

impl Token {
    /// Human-readable form for error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier `{name}`"),
            Self::Str(s) => format!("string {s:?}"),
            Self::Int(n) => format!("integer {n}"),
            Self::True => "`true`".to_string(),
            Self::False => "`false`".to_string(),
            Self::In => "`in`".to_string(),
            Self::LParen => "`(`".to_string(),
            Self::RParen => "`)`".to_string(),
            Self::LBracket => "`[`".to_string(),
            Self::RBracket => "`]`".to_string(),
            Self::Comma => "`,`".to_string(),
            Self::Dot => "`.`".to_string(),
            Self::EqEq => "`==`".to_string(),
            Self::NotEq => "`!=`".to_string(),
            Self::AndAnd => "`&&`".to_string(),
            Self::OrOr => "`||`".to_string(),
            Self::Bang => "`!`".to_string(),
            Self::Eof => "end of expression".to_string(),
        }
    }
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Split `input` into tokens, always ending with [`Token::Eof`].
pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match ch {
            '(' => single(&mut chars, Token::LParen),
            ')' => single(&mut chars, Token::RParen),
            '[' => single(&mut chars, Token::LBracket),
            ']' => single(&mut chars, Token::RBracket),
            ',' => single(&mut chars, Token::Comma),
            '.' => single(&mut chars, Token::Dot),
            '=' | '&' | '|' => {
                chars.next();
                match chars.next() {
                    Some((_, next)) if next == ch => match ch {
                        '=' => Token::EqEq,
                        '&' => Token::AndAnd,
                        _ => Token::OrOr,
                    },
                    _ => return Err(FilterError::UnexpectedChar { ch, offset }),
                }
            }
            '!' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, c)| c == '=') {
                    chars.next();
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            '\'' | '"' => {
                chars.next();
                Token::Str(string_literal(&mut chars, ch, offset)?)
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let n = digits
                    .parse()
                    .map_err(|_| FilterError::InvalidInteger(digits.clone()))?;
                Token::Int(n)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !(c.is_ascii_alphanumeric() || c == '_') {
                        break;
                    }
                    ident.push(c);
                    chars.next();
                }
                match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "in" => Token::In,
                    _ => Token::Ident(ident),
                }
            }
            _ => return Err(FilterError::UnexpectedChar { ch, offset }),
        };

        tokens.push(Spanned { token, offset });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: input.len(),
    });
    Ok(tokens)
}

fn single(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, token: Token) -> Token {
    chars.next();
    token
}

fn string_literal(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
    start: usize,
) -> Result<String, FilterError> {
    let mut out = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            c if c == quote => return Ok(out),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(FilterError::UnterminatedString(start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_operators_and_idents() {
        assert_eq!(
            kinds("build.status != FAILURE && !x || y == 'a'"),
            vec![
                Token::Ident("build".into()),
                Token::Dot,
                Token::Ident("status".into()),
                Token::NotEq,
                Token::Ident("FAILURE".into()),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("x".into()),
                Token::OrOr,
                Token::Ident("y".into()),
                Token::EqEq,
                Token::Str("a".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_literals() {
        assert_eq!(
            kinds(r#"true false in [1, "x\"y"]"#),
            vec![
                Token::True,
                Token::False,
                Token::In,
                Token::LBracket,
                Token::Int(1),
                Token::Comma,
                Token::Str("x\"y".into()),
                Token::RBracket,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            tokenize("a = b"),
            Err(FilterError::UnexpectedChar { ch: '=', offset: 2 })
        );
        assert_eq!(tokenize("'open"), Err(FilterError::UnterminatedString(0)));
        assert_eq!(
            tokenize("a # b"),
            Err(FilterError::UnexpectedChar { ch: '#', offset: 2 })
        );
    }
}
