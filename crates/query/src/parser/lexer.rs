//! Tokenizer for query text.

use crate::error::{QueryError, Result};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Int(i64),
    Long(i64),
    Double(f64),
    Str(String),
    Bind(usize),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Star,
    Slash,
    Colon,
    Minus,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

impl TokenKind {
    pub(crate) fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("'{}'", s),
            TokenKind::Int(i) | TokenKind::Long(i) => format!("number {}", i),
            TokenKind::Double(d) => format!("number {}", d),
            TokenKind::Str(s) => format!("string '{}'", s),
            TokenKind::Bind(i) => format!("${}", i),
            TokenKind::Eof => "end of query".into(),
            other => format!("{:?}", other),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset into the query text.
    pub offset: usize,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn ident(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Ident(self.input[start..self.pos].to_owned())
    }

    fn number(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        let mut is_decimal = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !is_decimal && self.peek_second().is_some_and(|d| d.is_ascii_digit()) {
                is_decimal = true;
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        let bad = |_| QueryError::syntax(format!("malformed number {}", text), start);
        match self.peek() {
            Some('L') | Some('l') if !is_decimal => {
                self.advance();
                Ok(TokenKind::Long(text.parse().map_err(bad)?))
            }
            Some('d') | Some('D') | Some('f') | Some('F') => {
                self.advance();
                Ok(TokenKind::Double(text.parse().map_err(|_| {
                    QueryError::syntax(format!("malformed number {}", text), start)
                })?))
            }
            _ if is_decimal => Ok(TokenKind::Double(text.parse().map_err(|_| {
                QueryError::syntax(format!("malformed number {}", text), start)
            })?)),
            _ => {
                let value: i64 = text.parse().map_err(bad)?;
                if i32::try_from(value).is_ok() {
                    Ok(TokenKind::Int(value))
                } else {
                    Ok(TokenKind::Long(value))
                }
            }
        }
    }

    fn string(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        self.advance();
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(QueryError::syntax("unterminated string literal", start)),
                Some('\'') => {
                    self.advance();
                    // '' is an escaped quote
                    if self.peek() == Some('\'') {
                        out.push('\'');
                        self.advance();
                    } else {
                        return Ok(TokenKind::Str(out));
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
            }
        }
    }

    fn bind(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        self.advance();
        let digits = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        match self.input[digits..self.pos].parse::<usize>() {
            Ok(n) if n > 0 => Ok(TokenKind::Bind(n)),
            _ => Err(QueryError::syntax("bind arguments are written $1, $2, ...", start)),
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        let offset = self.pos;
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset,
            });
        };
        let kind = match c {
            c if c.is_alphabetic() || c == '_' => self.ident(),
            c if c.is_ascii_digit() => self.number()?,
            '\'' => self.string()?,
            '$' => self.bind()?,
            _ => {
                self.advance();
                match c {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    ',' => TokenKind::Comma,
                    '.' => TokenKind::Dot,
                    '*' => TokenKind::Star,
                    '/' => TokenKind::Slash,
                    ':' => TokenKind::Colon,
                    '-' => TokenKind::Minus,
                    '=' => {
                        if self.peek() == Some('=') {
                            self.advance();
                        }
                        TokenKind::Eq
                    }
                    '!' if self.peek() == Some('=') => {
                        self.advance();
                        TokenKind::Ne
                    }
                    '<' => match self.peek() {
                        Some('=') => {
                            self.advance();
                            TokenKind::Le
                        }
                        Some('>') => {
                            self.advance();
                            TokenKind::Ne
                        }
                        _ => TokenKind::Lt,
                    },
                    '>' => {
                        if self.peek() == Some('=') {
                            self.advance();
                            TokenKind::Ge
                        } else {
                            TokenKind::Gt
                        }
                    }
                    other => {
                        return Err(QueryError::syntax(
                            format!("unexpected character '{}'", other),
                            offset,
                        ))
                    }
                }
            }
        };
        Ok(Token { kind, offset })
    }
}

/// Splits query text into tokens, ending with `Eof`.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer { input, pos: 0 };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_select() {
        assert_eq!(
            kinds("SELECT * FROM /R p WHERE p.ID >= 5"),
            vec![
                TokenKind::Ident("SELECT".into()),
                TokenKind::Star,
                TokenKind::Ident("FROM".into()),
                TokenKind::Slash,
                TokenKind::Ident("R".into()),
                TokenKind::Ident("p".into()),
                TokenKind::Ident("WHERE".into()),
                TokenKind::Ident("p".into()),
                TokenKind::Dot,
                TokenKind::Ident("ID".into()),
                TokenKind::Ge,
                TokenKind::Int(5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("5L")[0], TokenKind::Long(5));
        assert_eq!(kinds("3000000000")[0], TokenKind::Long(3_000_000_000));
        assert_eq!(kinds("1.5")[0], TokenKind::Double(1.5));
        assert_eq!(kinds("2d")[0], TokenKind::Double(2.0));
    }

    #[test]
    fn test_strings_and_binds() {
        assert_eq!(kinds("'it''s'")[0], TokenKind::Str("it's".into()));
        assert_eq!(kinds("$12")[0], TokenKind::Bind(12));
        assert!(tokenize("'open").is_err());
        assert!(tokenize("$0").is_err());
        assert!(tokenize("$x").is_err());
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("= == != <> < <= > >="),
            vec![
                TokenKind::Eq,
                TokenKind::Eq,
                TokenKind::Ne,
                TokenKind::Ne,
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::Gt,
                TokenKind::Ge,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_offsets() {
        let tokens = tokenize("INVALID QUERY").unwrap();
        assert_eq!(tokens[1].offset, 8);
        let err = tokenize("a # b").unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery { offset: 2, .. }));
    }
}
