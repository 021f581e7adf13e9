//! Lexical analyzer.

use std::iter::Peekable;
use std::rc::Rc;
use std::str::Chars;

use thiserror::Error;

use crate::ctx::Context;
use crate::diag::{Diagnostics, Position};
use crate::token::Token;

/// Lexical errors.  Reported to the diagnostics sink; scanning resumes at
/// the next character so one pass surfaces every offence.
#[derive(Debug, Error, PartialEq)]
pub enum LexError {
    #[error("Unexpected character '{0}'.")]
    UnexpectedChar(char),
    #[error("Unterminated string.")]
    UnterminatedString,
}

/// Turns source text into a token list ending with exactly one `Eof`.
pub struct Scanner<'s> {
    input: Peekable<Chars<'s>>,
    line: Position,
    ctx: Rc<Context>,
    diagnostics: Rc<Diagnostics>,

    // Buffer used when scanning longer tokens.  Allocated here to reuse memory.
    buf: String,
}

impl std::fmt::Debug for Scanner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner").field("line", &self.line).finish()
    }
}

impl<'s> Scanner<'s> {
    pub fn new(source: &'s str, ctx: Rc<Context>, diagnostics: Rc<Diagnostics>) -> Scanner<'s> {
        Scanner {
            input: source.chars().peekable(),
            line: 1,
            ctx,
            diagnostics,
            buf: String::new(),
        }
    }

    /// Scans the whole input.  Never fails; lexical errors have been reported
    /// to the sink when this returns.
    pub fn scan_tokens(mut self) -> Vec<(Position, Token)> {
        let mut tokens = vec![];
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        tokens.push((self.line, Token::Eof));
        tokens
    }

    /// Produces the next token, or `None` at end of input.
    fn next_token(&mut self) -> Option<(Position, Token)> {
        loop {
            let ch = self.input.next()?;
            let token = match ch {
                '\n' => {
                    self.line += 1;
                    continue;
                }
                ' ' | '\t' | '\r' => continue,
                '(' => Token::LeftParen,
                ')' => Token::RightParen,
                '{' => Token::LeftCurly,
                '}' => Token::RightCurly,
                ',' => Token::Comma,
                '.' => Token::Dot,
                ';' => Token::Semicolon,
                '\\' => Token::Backslash,
                '?' => Token::Question,
                ':' => Token::Colon,
                '!' => self.one_or_two('=', Token::BangEqual, Token::Bang),
                '=' => self.one_or_two('=', Token::EqualEqual, Token::Equal),
                '<' => self.one_or_two('=', Token::LessEqual, Token::Less),
                '>' => self.one_or_two('=', Token::GreaterEqual, Token::Greater),
                '*' => self.one_or_two('=', Token::StarEqual, Token::Star),
                '+' => match self.input.peek() {
                    Some('+') => {
                        self.input.next();
                        Token::PlusPlus
                    }
                    Some('=') => {
                        self.input.next();
                        Token::PlusEqual
                    }
                    _ => Token::Plus,
                },
                '-' => match self.input.peek() {
                    Some('-') => {
                        self.input.next();
                        Token::MinusMinus
                    }
                    Some('=') => {
                        self.input.next();
                        Token::MinusEqual
                    }
                    _ => Token::Minus,
                },
                '/' => match self.input.peek() {
                    Some('/') => {
                        self.skip_comment();
                        continue;
                    }
                    Some('=') => {
                        self.input.next();
                        Token::SlashEqual
                    }
                    _ => Token::Slash,
                },
                '"' => match self.scan_string() {
                    Some(token) => token,
                    None => continue,
                },
                '0'..='9' => self.scan_number(ch),
                'a'..='z' | 'A'..='Z' | '_' => self.scan_identifier(ch),
                _ => {
                    self.error(LexError::UnexpectedChar(ch));
                    continue;
                }
            };
            return Some((self.line, token));
        }
    }

    fn one_or_two(&mut self, second: char, two: Token, one: Token) -> Token {
        if self.input.peek() == Some(&second) {
            self.input.next();
            two
        } else {
            one
        }
    }

    fn skip_comment(&mut self) {
        while let Some(&ch) = self.input.peek() {
            if ch == '\n' {
                break;
            }
            self.input.next();
        }
    }

    /// Scans the remainder of a string literal; the opening quote has been
    /// consumed.  Strings may span lines and have no escape sequences.
    fn scan_string(&mut self) -> Option<Token> {
        self.buf.clear();
        loop {
            match self.input.next() {
                None => {
                    self.error(LexError::UnterminatedString);
                    return None;
                }
                Some('"') => return Some(Token::Str(self.buf.clone())),
                Some(ch) => {
                    if ch == '\n' {
                        self.line += 1;
                    }
                    self.buf.push(ch);
                }
            }
        }
    }

    fn scan_number(&mut self, first_digit: char) -> Token {
        self.buf.clear();
        self.buf.push(first_digit);
        while let Some(&ch) = self.input.peek() {
            if !ch.is_ascii_digit() {
                break;
            }
            self.buf.push(ch);
            self.input.next();
        }

        // A '.' only belongs to the number when a digit follows it.
        if self.input.peek() == Some(&'.') {
            let mut ahead = self.input.clone();
            ahead.next();
            if matches!(ahead.peek(), Some(c) if c.is_ascii_digit()) {
                self.buf.push('.');
                self.input.next();
                while let Some(&ch) = self.input.peek() {
                    if !ch.is_ascii_digit() {
                        break;
                    }
                    self.buf.push(ch);
                    self.input.next();
                }
            }
        }

        let n = self
            .buf
            .parse::<f64>()
            .expect("digit sequence is a valid float literal");
        Token::Number(n)
    }

    fn scan_identifier(&mut self, first_char: char) -> Token {
        self.buf.clear();
        self.buf.push(first_char);
        while let Some(&ch) = self.input.peek() {
            if !(ch.is_ascii_alphanumeric() || ch == '_') {
                break;
            }
            self.buf.push(ch);
            self.input.next();
        }

        let sym = self.ctx.symbol(&self.buf);
        match self.ctx.keyword(&sym) {
            Some(token) => token,
            None => Token::Identifier(sym),
        }
    }

    fn error(&self, error: LexError) {
        self.diagnostics
            .static_error(self.line, "", &error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(input: &str) -> Vec<Token> {
        let (tokens, diagnostics) = scan_all(input);
        assert!(!diagnostics.had_error(), "unexpected scan errors");
        tokens.into_iter().map(|(_, t)| t).collect()
    }

    fn scan_all(input: &str) -> (Vec<(Position, Token)>, Rc<Diagnostics>) {
        let ctx = Context::new();
        let diagnostics = Diagnostics::new();
        let scanner = Scanner::new(input, ctx, diagnostics.clone());
        (scanner.scan_tokens(), diagnostics)
    }

    #[test]
    fn empty_input_yields_only_eof() {
        assert_eq!(scan(""), vec![Token::Eof]);
    }

    #[test]
    fn fixed_tokens() {
        assert_eq!(
            scan("(){},.;\\?: ! != = == < <= > >= * *= /="),
            vec![
                Token::LeftParen,
                Token::RightParen,
                Token::LeftCurly,
                Token::RightCurly,
                Token::Comma,
                Token::Dot,
                Token::Semicolon,
                Token::Backslash,
                Token::Question,
                Token::Colon,
                Token::Bang,
                Token::BangEqual,
                Token::Equal,
                Token::EqualEqual,
                Token::Less,
                Token::LessEqual,
                Token::Greater,
                Token::GreaterEqual,
                Token::Star,
                Token::StarEqual,
                Token::SlashEqual,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn plus_minus_families() {
        assert_eq!(
            scan("+ ++ += - -- -= /"),
            vec![
                Token::Plus,
                Token::PlusPlus,
                Token::PlusEqual,
                Token::Minus,
                Token::MinusMinus,
                Token::MinusEqual,
                Token::Slash,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            scan("1 42 4.2"),
            vec![
                Token::Number(1.0),
                Token::Number(42.0),
                Token::Number(4.2),
                Token::Eof
            ]
        );
    }

    #[test]
    fn trailing_dot_is_not_part_of_a_number() {
        assert_eq!(
            scan("123."),
            vec![Token::Number(123.0), Token::Dot, Token::Eof]
        );
    }

    #[test]
    fn string_literal() {
        assert_eq!(
            scan("\"hi there\""),
            vec![Token::Str("hi there".to_string()), Token::Eof]
        );
    }

    #[test]
    fn string_may_span_lines() {
        let (tokens, _) = scan_all("\"a\nb\" 1");
        assert_eq!(
            tokens,
            vec![
                (2, Token::Str("a\nb".to_string())),
                (2, Token::Number(1.0)),
                (2, Token::Eof)
            ]
        );
    }

    #[test]
    fn unterminated_string_is_reported_and_scanning_ends_cleanly() {
        let (tokens, diagnostics) = scan_all("1 \"oops");
        assert_eq!(tokens, vec![(1, Token::Number(1.0)), (1, Token::Eof)]);
        assert!(diagnostics.had_error());
        assert_eq!(
            diagnostics.take_reports(),
            vec!["[line 1] Error: Unterminated string."]
        );
    }

    #[test]
    fn unexpected_character_is_reported_and_skipped() {
        let (tokens, diagnostics) = scan_all("1 @ 2");
        assert_eq!(
            tokens,
            vec![
                (1, Token::Number(1.0)),
                (1, Token::Number(2.0)),
                (1, Token::Eof)
            ]
        );
        assert_eq!(
            diagnostics.take_reports(),
            vec!["[line 1] Error: Unexpected character '@'."]
        );
    }

    #[test]
    fn keywords() {
        assert_eq!(
            scan("and break class continue else false for fun if nil or print return super this true var while"),
            vec![
                Token::And,
                Token::Break,
                Token::Class,
                Token::Continue,
                Token::Else,
                Token::False,
                Token::For,
                Token::Fun,
                Token::If,
                Token::Nil,
                Token::Or,
                Token::Print,
                Token::Return,
                Token::Super,
                Token::This,
                Token::True,
                Token::Var,
                Token::While,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn identifiers() {
        let ctx = Context::new();
        let diagnostics = Diagnostics::new();
        let scanner = Scanner::new("f foo _foo t42", ctx.clone(), diagnostics);
        let tokens: Vec<Token> = scanner.scan_tokens().into_iter().map(|(_, t)| t).collect();
        assert_eq!(
            tokens,
            vec![
                Token::Identifier(ctx.symbol("f")),
                Token::Identifier(ctx.symbol("foo")),
                Token::Identifier(ctx.symbol("_foo")),
                Token::Identifier(ctx.symbol("t42")),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            scan("true // false ++ \"\nfalse"),
            vec![Token::True, Token::False, Token::Eof]
        );
    }

    #[test]
    fn lines_are_monotonically_non_decreasing() {
        let (tokens, _) = scan_all("1\n2 3\n\"a\nb\"\n4");
        let lines: Vec<Position> = tokens.iter().map(|(line, _)| *line).collect();
        assert_eq!(lines, vec![1, 2, 2, 4, 5, 5]);
        assert!(lines.windows(2).all(|w| w[0] <= w[1]));
    }
}
