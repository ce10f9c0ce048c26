//! Tokenizer for field expressions.
//!
//! Positions are character offsets, so carets line up with the source text
//! as the user typed it.

use crate::error::Diagnostic;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `[column name]`
    Column(String),
    /// A bare word that is not a keyword: function names, bare columns,
    /// date range offsets and units.
    Ident(String),
    /// `@ingredient`, which must be expanded before parsing.
    Reference(String),
    Int(i64),
    Float(f64),
    Str(String),

    And,
    Or,
    Not,
    In,
    Is,
    Null,
    True,
    False,
    Between,
    Like,
    ILike,

    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    LParen,
    RParen,
    Comma,
    /// `{{`
    OpenTotal,
    /// `}}`
    CloseTotal,
    Eof,
}

impl TokenKind {
    /// Human description used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Column(name) => format!("column [{name}]"),
            Self::Ident(name) => format!("'{name}'"),
            Self::Reference(name) => format!("@{name}"),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => format!("\"{s}\""),
            Self::And => "AND".into(),
            Self::Or => "OR".into(),
            Self::Not => "NOT".into(),
            Self::In => "IN".into(),
            Self::Is => "IS".into(),
            Self::Null => "NULL".into(),
            Self::True => "TRUE".into(),
            Self::False => "FALSE".into(),
            Self::Between => "BETWEEN".into(),
            Self::Like => "LIKE".into(),
            Self::ILike => "ILIKE".into(),
            Self::Plus => "'+'".into(),
            Self::Minus => "'-'".into(),
            Self::Star => "'*'".into(),
            Self::Slash => "'/'".into(),
            Self::Eq => "'='".into(),
            Self::NotEq => "'!='".into(),
            Self::Lt => "'<'".into(),
            Self::Lte => "'<='".into(),
            Self::Gt => "'>'".into(),
            Self::Gte => "'>='".into(),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
            Self::Comma => "','".into(),
            Self::OpenTotal => "'{{'".into(),
            Self::CloseTotal => "'}}'".into(),
            Self::Eof => "end of expression".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    /// Tokenize the whole input. The last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn next_token(&mut self) -> Result<Token, Diagnostic> {
        self.skip_whitespace();
        let start = self.pos;
        let tok = |kind| Ok(Token { kind, pos: start });

        let Some(ch) = self.advance() else {
            return tok(TokenKind::Eof);
        };

        match ch {
            '+' => tok(TokenKind::Plus),
            '-' => tok(TokenKind::Minus),
            '*' => tok(TokenKind::Star),
            '/' => tok(TokenKind::Slash),
            '(' => tok(TokenKind::LParen),
            ')' => tok(TokenKind::RParen),
            ',' => tok(TokenKind::Comma),
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                }
                tok(TokenKind::Eq)
            }
            '!' if self.peek() == Some('=') => {
                self.advance();
                tok(TokenKind::NotEq)
            }
            '<' => match self.peek() {
                Some('=') => {
                    self.advance();
                    tok(TokenKind::Lte)
                }
                Some('>') => {
                    self.advance();
                    tok(TokenKind::NotEq)
                }
                _ => tok(TokenKind::Lt),
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    tok(TokenKind::Gte)
                } else {
                    tok(TokenKind::Gt)
                }
            }
            '{' if self.peek() == Some('{') => {
                self.advance();
                tok(TokenKind::OpenTotal)
            }
            '}' if self.peek() == Some('}') => {
                self.advance();
                tok(TokenKind::CloseTotal)
            }
            '[' => self.read_column(start),
            '"' | '\'' => self.read_string(ch, start),
            '@' => {
                let name = self.read_word();
                if name.is_empty() {
                    return Err(Diagnostic::at("Expected a name after '@'", start));
                }
                tok(TokenKind::Reference(name))
            }
            c if c.is_ascii_digit() || (c == '.' && self.peek().is_some_and(|n| n.is_ascii_digit())) => {
                self.pos = start;
                self.read_number(start)
            }
            c if c.is_alphabetic() || c == '_' => {
                self.pos = start;
                let word = self.read_word();
                tok(keyword(&word).unwrap_or(TokenKind::Ident(word)))
            }
            other => Err(Diagnostic::at(format!("Unexpected character '{other}'"), start)),
        }
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        word
    }

    fn read_column(&mut self, start: usize) -> Result<Token, Diagnostic> {
        let name_pos = self.pos;
        let mut name = String::new();
        loop {
            match self.advance() {
                Some(']') => break,
                Some(c) => name.push(c),
                None => return Err(Diagnostic::at("Unterminated column name, expected ']'", start)),
            }
        }
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Diagnostic::at("Empty column name", start));
        }
        Ok(Token {
            kind: TokenKind::Column(name),
            pos: name_pos,
        })
    }

    fn read_string(&mut self, quote: char, start: usize) -> Result<Token, Diagnostic> {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('\\') => match self.advance() {
                    Some(c) => value.push(c),
                    None => break,
                },
                Some(c) if c == quote => {
                    return Ok(Token {
                        kind: TokenKind::Str(value),
                        pos: start,
                    });
                }
                Some(c) => value.push(c),
                None => break,
            }
        }
        Err(Diagnostic::at("Unterminated string", start))
    }

    fn read_number(&mut self, start: usize) -> Result<Token, Diagnostic> {
        let mut text = String::new();
        let mut seen_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                text.push(c);
            } else {
                break;
            }
            self.pos += 1;
        }
        let kind = if seen_dot {
            text.parse::<f64>().map(TokenKind::Float).ok()
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .or_else(|_| text.parse::<f64>().map(TokenKind::Float))
                .ok()
        };
        kind.map(|kind| Token { kind, pos: start })
            .ok_or_else(|| Diagnostic::at(format!("Invalid number '{text}'"), start))
    }
}

fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "is" => TokenKind::Is,
        "null" => TokenKind::Null,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "between" => TokenKind::Between,
        "like" => TokenKind::Like,
        "ilike" => TokenKind::ILike,
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn columns_and_operators() {
        assert_eq!(
            kinds("[score] >= 2.5"),
            vec![
                TokenKind::Column("score".into()),
                TokenKind::Gte,
                TokenKind::Float(2.5),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("NOT x anD y Or z"),
            vec![
                TokenKind::Not,
                TokenKind::Ident("x".into()),
                TokenKind::And,
                TokenKind::Ident("y".into()),
                TokenKind::Or,
                TokenKind::Ident("z".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn column_position_points_at_name() {
        let toks = Lexer::new("1 + [a]").tokenize().unwrap();
        assert_eq!(toks[2].pos, 5);
    }

    #[test]
    fn strings_and_totals() {
        assert_eq!(
            kinds(r#"{{ "a'b" }} 'x' <> 3"#),
            vec![
                TokenKind::OpenTotal,
                TokenKind::Str("a'b".into()),
                TokenKind::CloseTotal,
                TokenKind::Str("x".into()),
                TokenKind::NotEq,
                TokenKind::Int(3),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn references() {
        assert_eq!(
            kinds("@total / 2"),
            vec![
                TokenKind::Reference("total".into()),
                TokenKind::Slash,
                TokenKind::Int(2),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn errors_carry_position() {
        let err = Lexer::new("[a] + \"open").tokenize().unwrap_err();
        assert_eq!(err, Diagnostic::at("Unterminated string", 6));
        let err = Lexer::new("1 # 2").tokenize().unwrap_err();
        assert_eq!(err.pos, Some(2));
    }
}
