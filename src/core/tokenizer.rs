// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Tokenizer for assembly source lines.
//!
//! One `Tokenizer` scans a single source line into typed tokens with
//! line/column spans. Whitespace is consumed silently; a `;` ends the line.

/// Source location of a token or diagnostic. Columns are 1-based;
/// `col_end` points one past the last column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: u32,
    pub col_start: usize,
    pub col_end: usize,
}

impl Span {
    pub fn new(line: u32, col_start: usize, col_end: usize) -> Self {
        Self {
            line,
            col_start,
            col_end,
        }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn cover(self, other: Span) -> Span {
        Span {
            line: self.line.min(other.line),
            col_start: self.col_start.min(other.col_start),
            col_end: self.col_end.max(other.col_end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Register,
    Number,
    Float,
    OpenBracket,
    CloseBracket,
    Plus,
    Minus,
    Comma,
    Label,
    DataLabel,
    Str,
    Eof,
}

/// A single lexed token. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
    /// Integer value for `Number` and `Register` tokens.
    pub value: i64,
    /// Float value for `Float` tokens.
    pub fvalue: f64,
}

impl Token {
    fn new(kind: TokenKind, text: String, span: Span) -> Self {
        Self {
            kind,
            text,
            span,
            value: 0,
            fvalue: 0.0,
        }
    }
}

/// Error produced when a line cannot be tokenized. The caller is expected
/// to drop the line and resynchronize at the next one.
#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LexError {}

const REGISTER_NAMES: &[(&str, i64)] = &[
    ("R0", 0),
    ("R1", 1),
    ("R2", 2),
    ("R3", 3),
    ("R4", 4),
    ("R5", 5),
    ("R6", 6),
    ("R7", 7),
    ("SP", 7),
    ("IP", 8),
];

#[derive(Debug)]
pub struct Tokenizer<'a> {
    bytes: &'a [u8],
    cursor: usize,
    line: u32,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str, line: u32) -> Self {
        Self {
            bytes: text.as_bytes(),
            cursor: 0,
            line,
        }
    }

    /// Tokenize the whole line. The returned sequence never contains an
    /// `Eof` token; an empty line yields an empty vector.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            if token.kind == TokenKind::Eof {
                return Ok(tokens);
            }
            tokens.push(token);
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_white();
        let start = self.cursor;
        let c = self.current_byte();

        if c == b'\0' || c == b';' {
            return Ok(Token::new(
                TokenKind::Eof,
                String::new(),
                self.span_from(start),
            ));
        }
        if is_alpha(c) || c == b'_' {
            return Ok(self.scan_identifier(start));
        }
        if is_digit(c) {
            return self.scan_number(start);
        }
        if c == b'.' {
            return self.scan_data_label(start);
        }
        if c == b'\'' || c == b'"' {
            return self.scan_string(start);
        }

        let kind = match c {
            b'[' => TokenKind::OpenBracket,
            b']' => TokenKind::CloseBracket,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b',' => TokenKind::Comma,
            _ => {
                return Err(self.failure(start, "Unrecognized character", Some(c as char)));
            }
        };
        self.cursor += 1;
        Ok(Token::new(
            kind,
            (c as char).to_string(),
            self.span_from(start),
        ))
    }

    fn scan_identifier(&mut self, start: usize) -> Token {
        while is_ident_char(self.current_byte()) {
            self.cursor += 1;
        }
        let text = self.text_from(start);

        // A trailing ':' turns the identifier into a label declaration or
        // reference; the colon is part of the lexeme but not the name.
        if self.current_byte() == b':' {
            self.cursor += 1;
            return Token::new(TokenKind::Label, self.text_from(start), self.span_from(start));
        }

        let upper = text.to_ascii_uppercase();
        for (name, index) in REGISTER_NAMES {
            if upper == *name {
                let mut token = Token::new(TokenKind::Register, text, self.span_from(start));
                token.value = *index;
                return token;
            }
        }
        Token::new(TokenKind::Identifier, text, self.span_from(start))
    }

    fn scan_number(&mut self, start: usize) -> Result<Token, LexError> {
        let c0 = self.current_byte();
        let c1 = self.peek_byte(1);

        if c0 == b'0' && (c1 == b'x' || c1 == b'X') {
            self.cursor += 2;
            let digits = self.cursor;
            while is_hex_digit(self.current_byte()) {
                self.cursor += 1;
            }
            if self.cursor == digits {
                return Err(self.failure(start, "Missing digits in hex constant", None));
            }
            let text = self.text_from(start);
            let value = i64::from_str_radix(&text[2..], 16)
                .map_err(|_| self.failure_at(start, "Hex constant out of range", &text))?;
            let mut token = Token::new(TokenKind::Number, text, self.span_from(start));
            token.value = value;
            return Ok(token);
        }

        if c0 == b'0' && (c1 == b'b' || c1 == b'B') {
            self.cursor += 2;
            let digits = self.cursor;
            while self.current_byte() == b'0' || self.current_byte() == b'1' {
                self.cursor += 1;
            }
            if self.cursor == digits {
                return Err(self.failure(start, "Missing digits in binary constant", None));
            }
            let text = self.text_from(start);
            let value = i64::from_str_radix(&text[2..], 2)
                .map_err(|_| self.failure_at(start, "Binary constant out of range", &text))?;
            let mut token = Token::new(TokenKind::Number, text, self.span_from(start));
            token.value = value;
            return Ok(token);
        }

        while is_digit(self.current_byte()) {
            self.cursor += 1;
        }
        if self.current_byte() == b'.' && is_digit(self.peek_byte(1)) {
            self.cursor += 1;
            while is_digit(self.current_byte()) {
                self.cursor += 1;
            }
            let text = self.text_from(start);
            let fvalue: f64 = text
                .parse()
                .map_err(|_| self.failure_at(start, "Malformed float constant", &text))?;
            let mut token = Token::new(TokenKind::Float, text, self.span_from(start));
            token.fvalue = fvalue;
            return Ok(token);
        }

        let text = self.text_from(start);
        let value: i64 = text
            .parse()
            .map_err(|_| self.failure_at(start, "Decimal constant out of range", &text))?;
        let mut token = Token::new(TokenKind::Number, text, self.span_from(start));
        token.value = value;
        Ok(token)
    }

    fn scan_data_label(&mut self, start: usize) -> Result<Token, LexError> {
        self.cursor += 1;
        let digits = self.cursor;
        while is_ident_char(self.current_byte()) {
            self.cursor += 1;
        }
        if self.cursor == digits {
            return Err(self.failure(start, "Missing name after '.'", None));
        }
        Ok(Token::new(
            TokenKind::DataLabel,
            self.text_from(start),
            self.span_from(start),
        ))
    }

    fn scan_string(&mut self, start: usize) -> Result<Token, LexError> {
        let quote = self.current_byte();
        self.cursor += 1;
        let body = self.cursor;
        while self.current_byte() != b'\0' && self.current_byte() != quote {
            self.cursor += 1;
        }
        if self.current_byte() != quote {
            return Err(self.failure(start, "Unterminated string", None));
        }
        let text = self.text_between(body, self.cursor);
        self.cursor += 1;
        Ok(Token::new(TokenKind::Str, text, self.span_from(start)))
    }

    fn skip_white(&mut self) {
        while self.current_byte() == b' ' || self.current_byte() == b'\t' {
            self.cursor += 1;
        }
    }

    fn failure(&self, start: usize, msg: &str, param: Option<char>) -> LexError {
        let message = match param {
            Some(p) => format!("{msg}: '{p}'"),
            None => msg.to_string(),
        };
        LexError {
            message,
            span: Span::new(self.line, start + 1, start + 2),
        }
    }

    fn failure_at(&self, start: usize, msg: &str, text: &str) -> LexError {
        LexError {
            message: format!("{msg}: {text}"),
            span: self.span_from(start),
        }
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(self.line, start + 1, self.cursor + 1)
    }

    fn text_from(&self, start: usize) -> String {
        self.text_between(start, self.cursor)
    }

    fn text_between(&self, start: usize, end: usize) -> String {
        String::from_utf8_lossy(&self.bytes[start..end]).to_string()
    }

    fn current_byte(&self) -> u8 {
        self.bytes.get(self.cursor).copied().unwrap_or(b'\0')
    }

    fn peek_byte(&self, offset: usize) -> u8 {
        self.bytes.get(self.cursor + offset).copied().unwrap_or(b'\0')
    }
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic()
}

fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

fn is_hex_digit(c: u8) -> bool {
    c.is_ascii_hexdigit()
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::{Token, TokenKind, Tokenizer};

    fn lex(text: &str) -> Vec<Token> {
        Tokenizer::new(text, 1).tokenize().expect("line should lex")
    }

    #[test]
    fn mnemonic_register_and_number() {
        let tokens = lex("MOV R1, 42");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "MOV");
        assert_eq!(tokens[1].kind, TokenKind::Register);
        assert_eq!(tokens[1].value, 1);
        assert_eq!(tokens[2].kind, TokenKind::Comma);
        assert_eq!(tokens[3].kind, TokenKind::Number);
        assert_eq!(tokens[3].value, 42);
    }

    #[test]
    fn hex_binary_and_float_constants() {
        let tokens = lex("0x1F 0b101 2.5");
        assert_eq!(tokens[0].value, 0x1f);
        assert_eq!(tokens[1].value, 0b101);
        assert_eq!(tokens[2].kind, TokenKind::Float);
        assert_eq!(tokens[2].fvalue, 2.5);
    }

    #[test]
    fn sp_aliases_r7() {
        let tokens = lex("sp r7 ip");
        assert_eq!(tokens[0].kind, TokenKind::Register);
        assert_eq!(tokens[0].value, 7);
        assert_eq!(tokens[1].value, 7);
        assert_eq!(tokens[2].value, 8);
    }

    #[test]
    fn label_and_data_label_tokens() {
        let tokens = lex("start: .data");
        assert_eq!(tokens[0].kind, TokenKind::Label);
        assert_eq!(tokens[0].text, "start:");
        assert_eq!(tokens[1].kind, TokenKind::DataLabel);
        assert_eq!(tokens[1].text, ".data");
    }

    #[test]
    fn comment_terminates_the_line() {
        let tokens = lex("halt ; stop here");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "halt");
    }

    #[test]
    fn quoted_strings_are_atomic() {
        let tokens = lex("'hello world' \"two  spaces\"");
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, "hello world");
        assert_eq!(tokens[1].text, "two  spaces");
    }

    #[test]
    fn brackets_and_signs() {
        let tokens = lex("[R0+4] -2");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::OpenBracket,
                TokenKind::Register,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::CloseBracket,
                TokenKind::Minus,
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn unrecognized_character_fails_the_line() {
        let err = Tokenizer::new("mov r1, @", 3).tokenize().unwrap_err();
        assert!(err.message.contains("Unrecognized character"));
        assert_eq!(err.span.line, 3);
    }

    #[test]
    fn spans_track_columns() {
        let tokens = lex("  mov r1");
        assert_eq!(tokens[0].span.col_start, 3);
        assert_eq!(tokens[0].span.col_end, 6);
        assert_eq!(tokens[1].span.col_start, 7);
    }
}
