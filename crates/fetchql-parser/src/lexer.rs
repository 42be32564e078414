//! Turns source text into a token stream, tracking byte offsets throughout
//! so the parser can attach a position to every diagnostic.

use fetchql_common::Error;

use crate::token::{Keyword, Token, TokenKind};

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Error> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.pos += 1;
                }
                Some(b'-') if self.peek_at(1) == Some(b'-') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        let Some(b) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                pos: start,
            });
        };

        let kind = match b {
            b'*' => {
                self.advance();
                TokenKind::Star
            }
            b',' => {
                self.advance();
                TokenKind::Comma
            }
            b'(' => {
                self.advance();
                TokenKind::LParen
            }
            b')' => {
                self.advance();
                TokenKind::RParen
            }
            b'.' if !self.peek_at(1).is_some_or(|c| c.is_ascii_digit()) => {
                self.advance();
                TokenKind::Dot
            }
            b'+' => {
                self.advance();
                TokenKind::Plus
            }
            b'-' => {
                self.advance();
                TokenKind::Minus
            }
            b'/' => {
                self.advance();
                TokenKind::Slash
            }
            b'%' => {
                self.advance();
                TokenKind::Percent
            }
            b';' => {
                self.advance();
                TokenKind::Semicolon
            }
            b'=' => {
                self.advance();
                TokenKind::Eq
            }
            b'<' => {
                self.advance();
                match self.peek() {
                    Some(b'>') => {
                        self.advance();
                        TokenKind::Ne
                    }
                    Some(b'=') => {
                        self.advance();
                        TokenKind::Le
                    }
                    _ => TokenKind::Lt,
                }
            }
            b'>' => {
                self.advance();
                match self.peek() {
                    Some(b'=') => {
                        self.advance();
                        TokenKind::Ge
                    }
                    _ => TokenKind::Gt,
                }
            }
            b'!' if self.peek_at(1) == Some(b'=') => {
                self.advance();
                self.advance();
                TokenKind::Ne
            }
            b'@' => {
                self.advance();
                let name_start = self.pos;
                while self.peek().is_some_or(is_ident_byte) {
                    self.pos += 1;
                }
                if self.pos == name_start {
                    return Err(Error::parse("expected variable name after '@'", start));
                }
                TokenKind::Variable(self.src[name_start..self.pos].to_string())
            }
            b'\'' => self.lex_string(start)?,
            b'0'..=b'9' => self.lex_number(),
            b'[' => self.lex_bracketed_ident(start)?,
            _ if is_ident_start(b) => self.lex_ident_or_keyword(),
            _ => {
                return Err(Error::parse(
                    format!("unexpected character '{}'", b as char),
                    start,
                ));
            }
        };
        Ok(Token { kind, pos: start })
    }

    fn lex_string(&mut self, start: usize) -> Result<TokenKind, Error> {
        self.advance();
        let mut s = String::new();
        loop {
            match self.advance() {
                Some(b'\'') => {
                    if self.peek() == Some(b'\'') {
                        s.push('\'');
                        self.advance();
                    } else {
                        return Ok(TokenKind::Str(s));
                    }
                }
                Some(b) => s.push(b as char),
                None => return Err(Error::parse("unterminated string literal", start)),
            }
        }
    }

    fn lex_bracketed_ident(&mut self, start: usize) -> Result<TokenKind, Error> {
        self.advance();
        let name_start = self.pos;
        while self.peek().is_some_and(|b| b != b']') {
            self.pos += 1;
        }
        if self.peek() != Some(b']') {
            return Err(Error::parse("unterminated bracketed identifier", start));
        }
        let name = self.src[name_start..self.pos].to_string();
        self.advance();
        Ok(TokenKind::Ident(name))
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = &self.src[start..self.pos];
        if is_float {
            TokenKind::Float(text.parse().unwrap_or(0.0))
        } else {
            match text.parse::<i64>() {
                Ok(v) => TokenKind::Int(v),
                Err(_) => TokenKind::Float(text.parse().unwrap_or(0.0)),
            }
        }
    }

    fn lex_ident_or_keyword(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_byte) {
            self.pos += 1;
        }
        let word = &self.src[start..self.pos];
        match Keyword::lookup(word) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(word.to_string()),
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_select_star() {
        let kinds = kinds("SELECT * FROM account");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Star,
                TokenKind::Keyword(Keyword::From),
                TokenKind::Ident("account".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_not_equal_forms() {
        assert_eq!(kinds("a <> b"), vec![
            TokenKind::Ident("a".into()),
            TokenKind::Ne,
            TokenKind::Ident("b".into()),
            TokenKind::Eof,
        ]);
        assert_eq!(kinds("a != b")[1], TokenKind::Ne);
    }

    #[test]
    fn lexes_variable_and_string() {
        let kinds = kinds("SET @x = 'it''s'");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Set),
                TokenKind::Variable("x".into()),
                TokenKind::Eq,
                TokenKind::Str("it's".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn position_points_at_offending_byte() {
        let err = Lexer::new("SELECT # FROM x").tokenize().unwrap_err();
        match err {
            Error::ParseError { position, .. } => assert_eq!(position, 7),
            other => panic!("expected ParseError, got {other:?}"),
        }
    }
}
