//! 🔤 The lexer: turns `level == "error"` into a tidy little row of tokens.
//!
//! Positions are byte offsets into the source so compile errors can point at
//! the exact spot where someone typed `=` instead of `==`. Again.

use super::FilterError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Question,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    RegexMatch,
    RegexNotMatch,
    AndAnd,
    OrOr,
}

/// 📍 A token plus the byte offset where it started.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub(crate) token: Token,
    pub(crate) position: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, FilterError> {
    Lexer::new(input).run()
}

struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            index: 0,
        }
    }

    fn run(mut self) -> Result<Vec<Spanned>, FilterError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.index >= self.bytes.len() {
                return Ok(tokens);
            }
            let position = self.index;
            let token = self.next_token()?;
            tokens.push(Spanned { token, position });
        }
    }

    fn skip_whitespace(&mut self) {
        while self.index < self.bytes.len() && self.bytes[self.index].is_ascii_whitespace() {
            self.index += 1;
        }
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.index + offset).copied()
    }

    fn next_token(&mut self) -> Result<Token, FilterError> {
        let ch = self.bytes[self.index];
        let single = match ch {
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'[' => Some(Token::LBracket),
            b']' => Some(Token::RBracket),
            b',' => Some(Token::Comma),
            b'.' => Some(Token::Dot),
            b'?' => Some(Token::Question),
            b':' => Some(Token::Colon),
            b'+' => Some(Token::Plus),
            b'-' => Some(Token::Minus),
            b'*' => Some(Token::Star),
            b'/' => Some(Token::Slash),
            b'%' => Some(Token::Percent),
            _ => None,
        };
        if let Some(token) = single {
            self.index += 1;
            return Ok(token);
        }

        match ch {
            b'"' | b'\'' => self.lex_string(ch),
            b'`' => self.lex_raw_string(),
            b'0'..=b'9' => self.lex_number(),
            b'=' | b'!' | b'<' | b'>' | b'&' | b'|' => self.lex_operator(),
            _ if is_ident_start(ch) => Ok(self.lex_identifier()),
            _ => Err(self.error_here(format!(
                "unexpected character '{}'",
                self.input[self.index..].chars().next().unwrap_or('?')
            ))),
        }
    }

    fn lex_operator(&mut self) -> Result<Token, FilterError> {
        let first = self.bytes[self.index];
        let second = self.peek_at(1);
        let (token, width) = match (first, second) {
            (b'=', Some(b'=')) => (Token::EqEq, 2),
            (b'=', Some(b'~')) => (Token::RegexMatch, 2),
            (b'!', Some(b'=')) => (Token::NotEq, 2),
            (b'!', Some(b'~')) => (Token::RegexNotMatch, 2),
            (b'<', Some(b'=')) => (Token::Le, 2),
            (b'>', Some(b'=')) => (Token::Ge, 2),
            (b'&', Some(b'&')) => (Token::AndAnd, 2),
            (b'|', Some(b'|')) => (Token::OrOr, 2),
            (b'!', _) => (Token::Bang, 1),
            (b'<', _) => (Token::Lt, 1),
            (b'>', _) => (Token::Gt, 1),
            (b'=', _) => return Err(self.error_here("single '=' is not an operator, use '=='")),
            _ => {
                return Err(self.error_here(format!(
                    "incomplete operator '{}'",
                    first as char
                )));
            }
        };
        self.index += width;
        Ok(token)
    }

    fn lex_string(&mut self, quote: u8) -> Result<Token, FilterError> {
        let start = self.index;
        self.index += 1;
        let mut out = String::new();
        let mut chars = self.input[self.index..].char_indices();
        while let Some((offset, ch)) = chars.next() {
            if ch as u32 == quote as u32 {
                self.index += offset + 1;
                return Ok(Token::Str(out));
            }
            if ch == '\\' {
                match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                }
            } else {
                out.push(ch);
            }
        }
        Err(FilterError::Compile {
            position: start,
            message: "unterminated string literal".to_string(),
        })
    }

    fn lex_raw_string(&mut self) -> Result<Token, FilterError> {
        let start = self.index;
        let body_start = self.index + 1;
        match self.input[body_start..].find('`') {
            Some(len) => {
                self.index = body_start + len + 1;
                Ok(Token::Str(self.input[body_start..body_start + len].to_string()))
            }
            None => Err(FilterError::Compile {
                position: start,
                message: "unterminated raw string literal".to_string(),
            }),
        }
    }

    fn lex_number(&mut self) -> Result<Token, FilterError> {
        let start = self.index;
        while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
            self.index += 1;
        }
        if self.peek_at(0) == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.index += 1;
            while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
                self.index += 1;
            }
        }
        if matches!(self.peek_at(0), Some(b'e' | b'E')) {
            let sign_width = usize::from(matches!(self.peek_at(1), Some(b'+' | b'-')));
            if self.peek_at(1 + sign_width).is_some_and(|c| c.is_ascii_digit()) {
                self.index += 1 + sign_width;
                while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
                    self.index += 1;
                }
            }
        }
        self.input[start..self.index]
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|e| FilterError::Compile {
                position: start,
                message: format!("invalid number: {e}"),
            })
    }

    fn lex_identifier(&mut self) -> Token {
        let start = self.index;
        self.index += 1;
        while self.peek_at(0).is_some_and(is_ident_continue) {
            self.index += 1;
        }
        match &self.input[start..self.index] {
            "true" => Token::True,
            "false" => Token::False,
            "nil" | "null" => Token::Null,
            "in" => Token::In,
            ident => Token::Ident(ident.to_string()),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> FilterError {
        FilterError::Compile {
            position: self.index,
            message: message.into(),
        }
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_' || ch == b'$'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'$'
}
