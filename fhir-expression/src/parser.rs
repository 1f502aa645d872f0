//! Recursive-descent parser producing the expression tree.

use crate::errors::{ExpressionError, ExpressionResult};
use crate::lexer::{tokenize, Token};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Boolean(bool),
    Str(String),
    Integer(i64),
    Decimal(Decimal),
    This,
    EnvVar(EnvVar),
    Member {
        target: Option<Box<Expr>>,
        name: String,
    },
    Function {
        target: Option<Box<Expr>>,
        function: Function,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnvVar {
    Resource,
    Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Union,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Xor,
    Implies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Exists,
    Empty,
    Not,
    Count,
    First,
    HasValue,
    Where,
    All,
    Select,
    Repeat,
    Resolve,
    Matches,
    StartsWith,
    Length,
}

impl Function {
    /// Function by name with its (min, max) argument count.
    fn lookup(name: &str) -> Option<(Function, usize, usize)> {
        Some(match name {
            "exists" => (Function::Exists, 0, 1),
            "empty" => (Function::Empty, 0, 0),
            "not" => (Function::Not, 0, 0),
            "count" => (Function::Count, 0, 0),
            "first" => (Function::First, 0, 0),
            "hasValue" => (Function::HasValue, 0, 0),
            "where" => (Function::Where, 1, 1),
            "all" => (Function::All, 1, 1),
            "select" => (Function::Select, 1, 1),
            "repeat" => (Function::Repeat, 1, 1),
            "resolve" => (Function::Resolve, 0, 0),
            "matches" => (Function::Matches, 1, 1),
            "startsWith" => (Function::StartsWith, 1, 1),
            "length" => (Function::Length, 0, 0),
            _ => return None,
        })
    }
}

pub(crate) fn parse(expression: &str) -> ExpressionResult<Expr> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        expression,
        tokens,
        pos: 0,
    };
    if parser.tokens.is_empty() {
        return Err(parser.error("empty expression"));
    }
    let expr = parser.parse_implies()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error(format!("unexpected token {:?}", token)));
    }
    Ok(expr)
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Compile {
            expression: self.expression.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> ExpressionResult<()> {
        match self.next() {
            Some(ref token) if *token == expected => Ok(()),
            other => Err(self.error(format!("expected {:?}, found {:?}", expected, other))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Identifier(word)) if word == keyword)
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    fn parse_implies(&mut self) -> ExpressionResult<Expr> {
        let mut lhs = self.parse_or()?;
        while self.peek_keyword("implies") {
            self.pos += 1;
            let rhs = self.parse_or()?;
            lhs = Self::binary(BinaryOp::Implies, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> ExpressionResult<Expr> {
        let mut lhs = self.parse_and()?;
        loop {
            let op = if self.peek_keyword("or") {
                BinaryOp::Or
            } else if self.peek_keyword("xor") {
                BinaryOp::Xor
            } else {
                break;
            };
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Self::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ExpressionResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let rhs = self.parse_equality()?;
            lhs = Self::binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> ExpressionResult<Expr> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_comparison()?;
            lhs = Self::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> ExpressionResult<Expr> {
        let mut lhs = self.parse_union()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::LtEq) => BinaryOp::LtEq,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::GtEq) => BinaryOp::GtEq,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_union()?;
            lhs = Self::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_union(&mut self) -> ExpressionResult<Expr> {
        let mut lhs = self.parse_postfix()?;
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            let rhs = self.parse_postfix()?;
            lhs = Self::binary(BinaryOp::Union, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_postfix(&mut self) -> ExpressionResult<Expr> {
        let mut expr = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = match self.next() {
                        Some(Token::Identifier(name)) => name,
                        other => {
                            return Err(self.error(format!("expected a name after `.`, found {:?}", other)))
                        }
                    };
                    expr = self.parse_invocation(Some(expr), name)?;
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_implies()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_term(&mut self) -> ExpressionResult<Expr> {
        match self.next() {
            Some(Token::Identifier(name)) => match name.as_str() {
                "true" if self.peek() != Some(&Token::LParen) => Ok(Expr::Boolean(true)),
                "false" if self.peek() != Some(&Token::LParen) => Ok(Expr::Boolean(false)),
                _ => self.parse_invocation(None, name),
            },
            Some(Token::Str(text)) => Ok(Expr::Str(text)),
            Some(Token::Integer(value)) => Ok(Expr::Integer(value)),
            Some(Token::Decimal(value)) => Ok(Expr::Decimal(value)),
            Some(Token::This) => Ok(Expr::This),
            Some(Token::EnvVar(name)) => match name.as_str() {
                "resource" | "rootResource" => Ok(Expr::EnvVar(EnvVar::Resource)),
                "context" => Ok(Expr::EnvVar(EnvVar::Context)),
                _ => Err(self.error(format!("unsupported environment variable %{}", name))),
            },
            Some(Token::LParen) => {
                let inner = self.parse_implies()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }

    fn parse_invocation(&mut self, target: Option<Expr>, name: String) -> ExpressionResult<Expr> {
        let target = target.map(Box::new);
        if self.peek() != Some(&Token::LParen) {
            return Ok(Expr::Member { target, name });
        }
        self.pos += 1;

        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.parse_implies()?);
                match self.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    other => return Err(self.error(format!("expected `,` or `)`, found {:?}", other))),
                }
            }
        }

        let (function, min, max) = Function::lookup(&name)
            .ok_or_else(|| self.error(format!("unsupported function {}()", name)))?;
        if args.len() < min || args.len() > max {
            return Err(self.error(format!(
                "{}() takes {} to {} arguments, got {}",
                name,
                min,
                max,
                args.len()
            )));
        }
        Ok(Expr::Function {
            target,
            function,
            args,
        })
    }
}
