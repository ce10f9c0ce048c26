//! Recursive-descent parser for field expressions.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr      := conj (OR conj)*
//! conj      := NOT conj | predicate (AND conj)?
//! predicate := sum [ cmp sum
//!                  | [NOT] IN '(' expr (',' expr)* ')'
//!                  | [NOT] (LIKE | ILIKE) sum
//!                  | BETWEEN sum AND sum
//!                  | IS [NOT] NULL
//!                  | IS offset units ]
//! sum       := product (('+' | '-') product)*
//! product   := unary (('*' | '/') unary)*
//! unary     := '-' unary | primary
//! primary   := literal | column | name '(' args ')' | '(' expr ')'
//!            | '{{' expr '}}'
//! ```
//!
//! `NOT` takes everything to its right that is joined by `AND`, so
//! `NOT a AND b` means `NOT (a AND b)`.

use crate::ast::{ArithOp, CompareOp, Expr, ExprKind, LiteralValue};
use crate::error::Diagnostic;
use crate::lexer::{Lexer, Token, TokenKind};

/// Parse expression text into an AST.
pub fn parse(input: &str) -> Result<Expr, Diagnostic> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    if parser.peek().kind == TokenKind::Eof {
        return Err(Diagnostic::at("Expression is empty", 0));
    }
    let expr = parser.parse_or()?;
    let tail = parser.peek();
    if tail.kind != TokenKind::Eof {
        return Err(Diagnostic::at(
            format!("Unexpected {}", tail.kind.describe()),
            tail.pos,
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize() always ends with Eof, and we never advance past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, Diagnostic> {
        if &self.peek().kind == kind {
            Ok(self.advance())
        } else {
            let tok = self.peek();
            Err(Diagnostic::at(
                format!("Expected {} but found {}", kind.describe(), tok.kind.describe()),
                tok.pos,
            ))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_conj()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_conj()?;
            let pos = left.pos;
            left = Expr::new(ExprKind::Or(Box::new(left), Box::new(right)), pos);
        }
        Ok(left)
    }

    fn parse_conj(&mut self) -> Result<Expr, Diagnostic> {
        if self.peek().kind == TokenKind::Not {
            let pos = self.advance().pos;
            let inner = self.parse_conj()?;
            return Ok(Expr::new(ExprKind::Not(Box::new(inner)), pos));
        }
        let left = self.parse_predicate()?;
        if self.eat(&TokenKind::And) {
            let right = self.parse_conj()?;
            let pos = left.pos;
            return Ok(Expr::new(ExprKind::And(Box::new(left), Box::new(right)), pos));
        }
        Ok(left)
    }

    fn parse_predicate(&mut self) -> Result<Expr, Diagnostic> {
        let left = self.parse_sum()?;
        let pos = left.pos;

        let cmp = match self.peek().kind {
            TokenKind::Eq => Some(CompareOp::Eq),
            TokenKind::NotEq => Some(CompareOp::Ne),
            TokenKind::Lt => Some(CompareOp::Lt),
            TokenKind::Lte => Some(CompareOp::Lte),
            TokenKind::Gt => Some(CompareOp::Gt),
            TokenKind::Gte => Some(CompareOp::Gte),
            _ => None,
        };
        if let Some(op) = cmp {
            self.advance();
            let right = self.parse_sum()?;
            return Ok(Expr::new(
                ExprKind::Compare {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            ));
        }

        // NOT only reaches here as a postfix negation: `x NOT IN (...)`
        let negated = self.peek().kind == TokenKind::Not
            && matches!(
                self.peek_kind_at(1),
                TokenKind::In | TokenKind::Like | TokenKind::ILike
            );
        if negated {
            self.advance();
        }

        match self.peek().kind {
            TokenKind::In => {
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let mut list = vec![self.parse_or()?];
                while self.eat(&TokenKind::Comma) {
                    if self.peek().kind == TokenKind::RParen {
                        break;
                    }
                    list.push(self.parse_or()?);
                }
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::new(
                    ExprKind::In {
                        expr: Box::new(left),
                        list,
                        negated,
                    },
                    pos,
                ))
            }
            TokenKind::Like | TokenKind::ILike => {
                let case_insensitive = self.advance().kind == TokenKind::ILike;
                let pattern = self.parse_sum()?;
                Ok(Expr::new(
                    ExprKind::Like {
                        expr: Box::new(left),
                        pattern: Box::new(pattern),
                        case_insensitive,
                        negated,
                    },
                    pos,
                ))
            }
            TokenKind::Between => {
                self.advance();
                let low = self.parse_sum()?;
                self.expect(&TokenKind::And)?;
                let high = self.parse_sum()?;
                Ok(Expr::new(
                    ExprKind::Between {
                        expr: Box::new(left),
                        low: Box::new(low),
                        high: Box::new(high),
                    },
                    pos,
                ))
            }
            TokenKind::Is => {
                self.advance();
                self.parse_is(left)
            }
            _ => Ok(left),
        }
    }

    fn parse_is(&mut self, left: Expr) -> Result<Expr, Diagnostic> {
        let pos = left.pos;
        let negated = self.eat(&TokenKind::Not);
        if self.eat(&TokenKind::Null) {
            return Ok(Expr::new(
                ExprKind::IsNull {
                    expr: Box::new(left),
                    negated,
                },
                pos,
            ));
        }
        let tok = self.advance();
        match (negated, tok.kind, self.peek().kind.clone()) {
            (false, TokenKind::Ident(offset), TokenKind::Ident(units)) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::IsRange {
                        expr: Box::new(left),
                        offset,
                        units,
                        offset_pos: tok.pos,
                    },
                    pos,
                ))
            }
            (_, kind, _) => Err(Diagnostic::at(
                format!("Expected NULL or a date range but found {}", kind.describe()),
                tok.pos,
            )),
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_product()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_product()?;
            let pos = left.pos;
            left = Expr::new(
                ExprKind::Arith {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            );
        }
    }

    fn parse_product(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            let pos = left.pos;
            left = Expr::new(
                ExprKind::Arith {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            );
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        if self.peek().kind == TokenKind::Minus {
            let pos = self.advance().pos;
            let inner = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Neg(Box::new(inner)), pos));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let tok = self.advance();
        let pos = tok.pos;
        let lit = |v| Ok(Expr::new(ExprKind::Literal(v), pos));
        match tok.kind {
            TokenKind::Int(n) => lit(LiteralValue::Int(n)),
            TokenKind::Float(f) => lit(LiteralValue::Float(f)),
            TokenKind::Str(s) => lit(LiteralValue::Str(s)),
            TokenKind::True => lit(LiteralValue::Bool(true)),
            TokenKind::False => lit(LiteralValue::Bool(false)),
            TokenKind::Null => lit(LiteralValue::Null),
            TokenKind::Column(name) => Ok(Expr::new(ExprKind::Column(name), pos)),
            TokenKind::Star => Ok(Expr::new(ExprKind::Star, pos)),
            TokenKind::Ident(name) => {
                if self.eat(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    Ok(Expr::new(ExprKind::Call { name, args }, pos))
                } else {
                    Ok(Expr::new(ExprKind::Column(name), pos))
                }
            }
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::OpenTotal => {
                let inner = self.parse_or()?;
                self.expect(&TokenKind::CloseTotal)?;
                Ok(Expr::new(ExprKind::Total(Box::new(inner)), pos))
            }
            TokenKind::Reference(name) => Err(Diagnostic::at(
                format!("@{name} must be expanded before parsing"),
                pos,
            )),
            other => Err(Diagnostic::at(
                format!("Unexpected {}", other.describe()),
                pos,
            )),
        }
    }

    /// Arguments after the opening parenthesis, through the closing one.
    fn parse_args(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(&TokenKind::RParen)?;
            return Ok(args);
        }
    }
}
