//! Lexer for the graph language: a stateful cursor over the source text that
//! produces typed tokens with line numbers, a non-advancing lookahead, and a
//! raw capture mode for sub-graph bodies.

use strum::Display;

use crate::error::{Error, RunResult};

/// Token kinds of the language.
///
/// `->` lexes as [`Arrow`](TokenKind::Arrow) and `*>` as
/// [`CrossArrow`](TokenKind::CrossArrow); an identifier directly followed by
/// `~` becomes an [`Object`](TokenKind::Object) token with the `~` consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum TokenKind {
    Newline,
    Arrow,
    CrossArrow,
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Colon,
    Comma,
    Ampersand,
    Asterisk,
    Plus,
    Minus,
    Slash,
    NumericLiteral,
    Identifier,
    Object,
    StringLiteral,
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: u32,
}

pub(crate) struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            position: 0,
            line: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn token(&self, kind: TokenKind, value: impl Into<String>, line: u32) -> Token {
        Token {
            kind,
            value: value.into(),
            line,
        }
    }

    // Lower-case plus underscore is the declared alphabet; upper-case is
    // admitted so the capitalised procedure names (Arg, Re, Im, DFT, FFT)
    // stay reachable from source.
    fn is_identifier_char(c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_'
    }

    pub fn next_token(&mut self) -> RunResult<Token> {
        loop {
            match self.current() {
                Some(' ' | '\t' | '\r') => self.position += 1,
                Some(';') => {
                    while self.current().is_some_and(|c| c != '\n') {
                        self.position += 1;
                    }
                }
                _ => break,
            }
        }

        let line = self.line;
        let Some(c) = self.current() else {
            return Ok(self.token(TokenKind::Eof, "", line));
        };
        self.position += 1;

        match c {
            '\n' => {
                self.line += 1;
                Ok(self.token(TokenKind::Newline, "\n", line))
            }
            '-' => {
                if self.current() == Some('>') {
                    self.position += 1;
                    Ok(self.token(TokenKind::Arrow, "->", line))
                } else {
                    Ok(self.token(TokenKind::Minus, "-", line))
                }
            }
            '*' => {
                if self.current() == Some('>') {
                    self.position += 1;
                    Ok(self.token(TokenKind::CrossArrow, "*>", line))
                } else {
                    Ok(self.token(TokenKind::Asterisk, "*", line))
                }
            }
            '{' => Ok(self.token(TokenKind::OpenBrace, "{", line)),
            '}' => Ok(self.token(TokenKind::CloseBrace, "}", line)),
            '(' => Ok(self.token(TokenKind::OpenParen, "(", line)),
            ')' => Ok(self.token(TokenKind::CloseParen, ")", line)),
            '[' => Ok(self.token(TokenKind::OpenBracket, "[", line)),
            ']' => Ok(self.token(TokenKind::CloseBracket, "]", line)),
            ':' => Ok(self.token(TokenKind::Colon, ":", line)),
            ',' => Ok(self.token(TokenKind::Comma, ",", line)),
            '&' => Ok(self.token(TokenKind::Ampersand, "&", line)),
            '+' => Ok(self.token(TokenKind::Plus, "+", line)),
            '/' => Ok(self.token(TokenKind::Slash, "/", line)),
            '0'..='9' => {
                let mut value = String::from(c);
                let mut seen_point = false;
                while let Some(next) = self.current() {
                    if next.is_ascii_digit() || (next == '.' && !seen_point) {
                        seen_point |= next == '.';
                        value.push(next);
                        self.position += 1;
                    } else {
                        break;
                    }
                }
                Ok(self.token(TokenKind::NumericLiteral, value, line))
            }
            '"' => {
                let mut value = String::new();
                loop {
                    match self.current() {
                        None => {
                            return Err(Error::lexical("Unclosed string literal").at_line(line));
                        }
                        Some('"') => {
                            self.position += 1;
                            break;
                        }
                        Some(inner) => {
                            if inner == '\n' {
                                self.line += 1;
                            }
                            value.push(inner);
                            self.position += 1;
                        }
                    }
                }
                Ok(self.token(TokenKind::StringLiteral, value, line))
            }
            c if Self::is_identifier_char(c) => {
                let mut value = String::from(c);
                while self.current().is_some_and(Self::is_identifier_char) {
                    value.push(self.current().unwrap_or_default());
                    self.position += 1;
                }
                if self.current() == Some('~') {
                    self.position += 1;
                    Ok(self.token(TokenKind::Object, value, line))
                } else {
                    Ok(self.token(TokenKind::Identifier, value, line))
                }
            }
            other => Err(Error::lexical(format!("Unknown character '{other}'")).at_line(line)),
        }
    }

    /// Non-advancing lookahead: whether the next token has the expected kind.
    pub fn peek(&mut self, expected: TokenKind) -> bool {
        let position = self.position;
        let line = self.line;
        let result = matches!(self.next_token(), Ok(token) if token.kind == expected);
        self.position = position;
        self.line = line;
        result
    }

    /// Captures raw source up to the brace that matches an already consumed
    /// opening brace. The delimiters themselves are not part of the result.
    pub fn capture_block(&mut self) -> RunResult<String> {
        let opening_line = self.line;
        let mut depth = 1_usize;
        let mut captured = String::new();
        loop {
            let Some(c) = self.current() else {
                return Err(Error::lexical("Unclosed sub-graph block").at_line(opening_line));
            };
            self.position += 1;
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(captured);
                    }
                }
                '\n' => self.line += 1,
                _ => {}
            }
            captured.push(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut collected = Vec::new();
        loop {
            let token = lexer.next_token().expect("token");
            let kind = token.kind;
            collected.push(kind);
            if kind == TokenKind::Eof {
                return collected;
            }
        }
    }

    #[test]
    fn arrows_and_minus_are_disambiguated() {
        assert_eq!(
            kinds("a -> b - c *> d * e"),
            vec![
                TokenKind::Identifier,
                TokenKind::Arrow,
                TokenKind::Identifier,
                TokenKind::Minus,
                TokenKind::Identifier,
                TokenKind::CrossArrow,
                TokenKind::Identifier,
                TokenKind::Asterisk,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn an_identifier_followed_by_a_tilde_is_an_object_token() {
        let mut lexer = Lexer::new("osc~ osc");
        let object = lexer.next_token().expect("token");
        assert_eq!(object.kind, TokenKind::Object);
        assert_eq!(object.value, "osc");
        let identifier = lexer.next_token().expect("token");
        assert_eq!(identifier.kind, TokenKind::Identifier);
    }

    #[test]
    fn comments_run_to_the_end_of_the_line() {
        assert_eq!(
            kinds("a ; ignored -> tokens\nb"),
            vec![
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numeric_literals_take_a_single_decimal_point() {
        let mut lexer = Lexer::new("1.25.5");
        let first = lexer.next_token().expect("token");
        assert_eq!(first.kind, TokenKind::NumericLiteral);
        assert_eq!(first.value, "1.25");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn line_numbers_advance_on_newlines() {
        let mut lexer = Lexer::new("a\nb\nc");
        assert_eq!(lexer.next_token().expect("token").line, 1);
        assert_eq!(lexer.next_token().expect("token").line, 1);
        assert_eq!(lexer.next_token().expect("token").line, 2);
        assert_eq!(lexer.next_token().expect("token").line, 2);
        assert_eq!(lexer.next_token().expect("token").line, 3);
    }

    #[test]
    fn unclosed_strings_are_lexical_errors() {
        let mut lexer = Lexer::new("\"never finished");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn peek_does_not_advance_the_cursor() {
        let mut lexer = Lexer::new("440");
        assert!(lexer.peek(TokenKind::NumericLiteral));
        assert!(!lexer.peek(TokenKind::Identifier));
        let token = lexer.next_token().expect("token");
        assert_eq!(token.value, "440");
    }

    #[test]
    fn capture_block_respects_nested_braces() {
        let mut lexer = Lexer::new("a{0} -> output{0}\n} trailing");
        let captured = lexer.capture_block().expect("captured");
        assert_eq!(captured, "a{0} -> output{0}\n");
    }
}
