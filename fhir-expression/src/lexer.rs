//! Tokenizer for expression text.

use crate::errors::{ExpressionError, ExpressionResult};
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Identifier(String),
    Str(String),
    Integer(i64),
    Decimal(Decimal),
    EnvVar(String),
    This,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Pipe,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

pub(crate) fn tokenize(expression: &str) -> ExpressionResult<Vec<Token>> {
    let fail = |message: String| ExpressionError::Compile {
        expression: expression.to_string(),
        message,
    };

    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                match chars.next() {
                    Some('=') => tokens.push(Token::NotEq),
                    _ => return Err(fail("expected `=` after `!`".to_string())),
                }
            }
            '<' | '>' => {
                chars.next();
                let with_eq = chars.peek() == Some(&'=');
                if with_eq {
                    chars.next();
                }
                tokens.push(match (ch, with_eq) {
                    ('<', false) => Token::Lt,
                    ('<', true) => Token::LtEq,
                    ('>', false) => Token::Gt,
                    _ => Token::GtEq,
                });
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some('r') => text.push('\r'),
                            Some(c @ ('\'' | '"' | '`' | '\\' | '/')) => text.push(c),
                            other => {
                                return Err(fail(format!("unsupported escape {:?}", other)));
                            }
                        },
                        Some(c) => text.push(c),
                        None => return Err(fail("unterminated string literal".to_string())),
                    }
                }
                tokens.push(Token::Str(text));
            }
            '`' => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(c) => name.push(c),
                        None => return Err(fail("unterminated delimited identifier".to_string())),
                    }
                }
                tokens.push(Token::Identifier(name));
            }
            '%' => {
                chars.next();
                let name = take_word(&mut chars);
                if name.is_empty() {
                    return Err(fail("expected a name after `%`".to_string()));
                }
                tokens.push(Token::EnvVar(name));
            }
            '$' => {
                chars.next();
                let name = take_word(&mut chars);
                if name != "this" {
                    return Err(fail(format!("unsupported variable ${}", name)));
                }
                tokens.push(Token::This);
            }
            c if c.is_ascii_digit() => {
                let digits = take_word(&mut chars);
                // a decimal point followed by a digit is a decimal literal
                let mut lookahead = chars.clone();
                let token = if lookahead.next() == Some('.')
                    && lookahead.next().map_or(false, |c| c.is_ascii_digit())
                {
                    chars.next();
                    let literal = format!("{}.{}", digits, take_word(&mut chars));
                    Decimal::from_str(&literal)
                        .map(Token::Decimal)
                        .map_err(|_| fail(format!("unsupported number literal `{}`", literal)))?
                } else {
                    digits
                        .parse::<i64>()
                        .map(Token::Integer)
                        .map_err(|_| fail(format!("unsupported number literal `{}`", digits)))?
                };
                tokens.push(token);
            }
            c if c.is_alphabetic() || c == '_' => {
                tokens.push(Token::Identifier(take_word(&mut chars)));
            }
            other => return Err(fail(format!("unexpected character `{}`", other))),
        }
    }

    Ok(tokens)
}

fn take_word(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            chars.next();
        } else {
            break;
        }
    }
    word
}
