// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Recursive-descent parser for assembly lines.
//!
//! One [`AsmLine`] is produced per source line. Operand expressions are
//! parsed with precedence climbing: unary `-` binds tighter than binary
//! `+`/`-`; primaries are registers, numbers, label references, data-label
//! references, and bracketed dereferences. Dereferences do not nest.

use crate::core::tokenizer::{Span, Token, TokenKind};

/// Error returned by line parsing. The caller records it as a diagnostic
/// and resynchronizes at the next line.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// An operand expression node. Forms a tree; every node knows its covering
/// source span.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Register { index: u8, span: Span },
    Int { value: i64, span: Span },
    Float { value: f64, span: Span },
    LabelRef { name: String, span: Span },
    DataRef { name: String, span: Span },
    Deref { inner: Box<Operand>, span: Span },
    Neg { inner: Box<Operand>, span: Span },
    Add { lhs: Box<Operand>, rhs: Box<Operand>, span: Span },
    Sub { lhs: Box<Operand>, rhs: Box<Operand>, span: Span },
}

impl Operand {
    /// The covering span: min/max over the node and its children.
    pub fn span(&self) -> Span {
        match self {
            Operand::Register { span, .. }
            | Operand::Int { span, .. }
            | Operand::Float { span, .. }
            | Operand::LabelRef { span, .. }
            | Operand::DataRef { span, .. }
            | Operand::Deref { span, .. }
            | Operand::Neg { span, .. }
            | Operand::Add { span, .. }
            | Operand::Sub { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Data,
    Text,
}

/// A parsed `.data` declaration value.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// `size N`: an N-byte zero-filled buffer.
    Buffer { size: u32 },
    /// A quoted string, stored as UTF-16LE code units with a null terminator.
    Str(String),
    Byte(i64),
    Int16(i64),
    Int32(i64),
    Float(f64),
}

/// One parsed assembly line.
#[derive(Debug, Clone, PartialEq)]
pub enum AsmLine {
    Section {
        kind: SectionKind,
        span: Span,
    },
    EntryPoint {
        label: String,
        span: Span,
    },
    LabelDecl {
        name: String,
        span: Span,
    },
    DataDecl {
        name: String,
        value: DataValue,
        span: Span,
    },
    Instruction {
        mnemonic: Token,
        operands: Vec<Operand>,
    },
}

/// Parse one tokenized line. `line` is the source line number used for
/// spans when the token list is empty.
pub fn parse_line(tokens: &[Token], line: u32) -> Result<AsmLine, ParseError> {
    LineParser::new(tokens, line).parse()
}

struct LineParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: u32,
}

impl<'a> LineParser<'a> {
    fn new(tokens: &'a [Token], line: u32) -> Self {
        Self {
            tokens,
            pos: 0,
            line,
        }
    }

    fn parse(mut self) -> Result<AsmLine, ParseError> {
        let first = match self.peek() {
            Some(token) => token.clone(),
            None => {
                return Err(ParseError::new(
                    "Empty line reached the parser",
                    Span::new(self.line, 1, 1),
                ))
            }
        };

        match first.kind {
            TokenKind::Identifier => self.parse_instruction(first),
            TokenKind::Label => {
                self.advance();
                self.expect_end("after label declaration")?;
                Ok(AsmLine::LabelDecl {
                    name: label_name(&first),
                    span: first.span,
                })
            }
            TokenKind::DataLabel => self.parse_data_label_line(first),
            _ => Err(ParseError::new(
                format!("Unexpected token at line start: {}", first.text),
                first.span,
            )),
        }
    }

    fn parse_data_label_line(&mut self, first: Token) -> Result<AsmLine, ParseError> {
        self.advance();
        match first.text.to_ascii_lowercase().as_str() {
            ".data" => {
                self.expect_end("after .data")?;
                Ok(AsmLine::Section {
                    kind: SectionKind::Data,
                    span: first.span,
                })
            }
            ".text" => {
                self.expect_end("after .text")?;
                Ok(AsmLine::Section {
                    kind: SectionKind::Text,
                    span: first.span,
                })
            }
            ".global" => {
                let label = self.next_or_err(".global requires an entry label")?;
                if label.kind != TokenKind::Label {
                    return Err(ParseError::new(
                        ".global target must be a label ending in ':'",
                        label.span,
                    ));
                }
                self.expect_end("after .global declaration")?;
                Ok(AsmLine::EntryPoint {
                    label: label_name(&label),
                    span: first.span.cover(label.span),
                })
            }
            _ => self.parse_data_declaration(first),
        }
    }

    fn parse_data_declaration(&mut self, first: Token) -> Result<AsmLine, ParseError> {
        let name = first.text[1..].to_string();
        let shape = self.next_or_err("Data declaration requires a type or string")?;

        let value = match shape.kind {
            TokenKind::Str => DataValue::Str(shape.text.clone()),
            TokenKind::Identifier => {
                let kind = shape.text.to_ascii_lowercase();
                let number = self.next_or_err("Data declaration requires a value")?;
                match kind.as_str() {
                    "size" => {
                        let size = int_value(&number)?;
                        let size = u32::try_from(size).map_err(|_| {
                            ParseError::new("Buffer size must be non-negative", number.span)
                        })?;
                        DataValue::Buffer { size }
                    }
                    "byte" => DataValue::Byte(int_value(&number)?),
                    "word" => DataValue::Int16(int_value(&number)?),
                    "long" => DataValue::Int32(int_value(&number)?),
                    "float" => match number.kind {
                        TokenKind::Float => DataValue::Float(number.fvalue),
                        TokenKind::Number => DataValue::Float(number.value as f64),
                        _ => {
                            return Err(ParseError::new(
                                "float declaration requires a numeric value",
                                number.span,
                            ))
                        }
                    },
                    other => {
                        return Err(ParseError::new(
                            format!("Unknown data declaration type: {other}"),
                            shape.span,
                        ))
                    }
                }
            }
            _ => {
                return Err(ParseError::new(
                    "Data declaration requires a type or quoted string",
                    shape.span,
                ))
            }
        };

        self.expect_end("after data declaration")?;
        Ok(AsmLine::DataDecl {
            name,
            value,
            span: first.span,
        })
    }

    fn parse_instruction(&mut self, mnemonic: Token) -> Result<AsmLine, ParseError> {
        self.advance();
        let mut operands = Vec::new();
        while self.peek().is_some() {
            operands.push(self.parse_operand(false)?);
            if let Some(token) = self.peek() {
                if token.kind == TokenKind::Comma {
                    self.advance();
                }
            }
        }
        Ok(AsmLine::Instruction { mnemonic, operands })
    }

    fn parse_operand(&mut self, in_deref: bool) -> Result<Operand, ParseError> {
        let mut lhs = self.parse_unary(in_deref)?;
        while let Some(token) = self.peek() {
            let op = token.kind;
            if op != TokenKind::Plus && op != TokenKind::Minus {
                break;
            }
            self.advance();
            let rhs = self.parse_unary(in_deref)?;
            let span = lhs.span().cover(rhs.span());
            lhs = match op {
                TokenKind::Plus => Operand::Add {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                },
                _ => Operand::Sub {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                },
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, in_deref: bool) -> Result<Operand, ParseError> {
        if let Some(token) = self.peek() {
            if token.kind == TokenKind::Minus {
                let minus_span = token.span;
                self.advance();
                let inner = self.parse_unary(in_deref)?;
                let span = minus_span.cover(inner.span());
                return Ok(Operand::Neg {
                    inner: Box::new(inner),
                    span,
                });
            }
        }
        self.parse_primary(in_deref)
    }

    fn parse_primary(&mut self, in_deref: bool) -> Result<Operand, ParseError> {
        let token = self.next_or_err("Expected an operand")?;
        match token.kind {
            TokenKind::Register => Ok(Operand::Register {
                index: token.value as u8,
                span: token.span,
            }),
            TokenKind::Number => Ok(Operand::Int {
                value: token.value,
                span: token.span,
            }),
            TokenKind::Float => Ok(Operand::Float {
                value: token.fvalue,
                span: token.span,
            }),
            TokenKind::Identifier => Ok(Operand::LabelRef {
                name: token.text.to_ascii_lowercase(),
                span: token.span,
            }),
            TokenKind::Label => Ok(Operand::LabelRef {
                name: label_name(&token),
                span: token.span,
            }),
            TokenKind::DataLabel => Ok(Operand::DataRef {
                name: token.text[1..].to_ascii_lowercase(),
                span: token.span,
            }),
            TokenKind::OpenBracket => {
                if in_deref {
                    return Err(ParseError::new(
                        "Nested dereference is not supported",
                        token.span,
                    ));
                }
                let inner = self.parse_operand(true)?;
                let close = self.next_or_err("Missing ']' in dereference")?;
                if close.kind != TokenKind::CloseBracket {
                    return Err(ParseError::new("Missing ']' in dereference", close.span));
                }
                Ok(Operand::Deref {
                    inner: Box::new(inner),
                    span: token.span.cover(close.span),
                })
            }
            _ => Err(ParseError::new(
                format!("Unexpected token in operand: {}", token.text),
                token.span,
            )),
        }
    }

    fn expect_end(&mut self, context: &str) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ParseError::new(
                format!("Unexpected trailing token {context}: {}", token.text),
                token.span,
            )),
        }
    }

    fn next_or_err(&mut self, message: &str) -> Result<Token, ParseError> {
        match self.peek() {
            Some(token) => {
                let token = token.clone();
                self.advance();
                Ok(token)
            }
            None => Err(ParseError::new(message, self.end_span())),
        }
    }

    fn end_span(&self) -> Span {
        self.tokens
            .last()
            .map(|t| t.span)
            .unwrap_or_else(|| Span::new(self.line, 1, 1))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }
}

fn int_value(token: &Token) -> Result<i64, ParseError> {
    if token.kind == TokenKind::Number {
        Ok(token.value)
    } else {
        Err(ParseError::new(
            "Expected an integer value",
            token.span,
        ))
    }
}

/// Label token text without the trailing ':', lowercased for lookup.
fn label_name(token: &Token) -> String {
    token
        .text
        .trim_end_matches(':')
        .to_ascii_lowercase()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{parse_line, AsmLine, DataValue, Operand, SectionKind};
    use crate::core::tokenizer::Tokenizer;

    fn parse(text: &str) -> AsmLine {
        let tokens = Tokenizer::new(text, 1).tokenize().expect("lex");
        parse_line(&tokens, 1).expect("parse")
    }

    fn parse_err(text: &str) -> String {
        let tokens = Tokenizer::new(text, 1).tokenize().expect("lex");
        parse_line(&tokens, 1).unwrap_err().message
    }

    #[test]
    fn instruction_with_comma_separated_operands() {
        match parse("MOV R1, R2") {
            AsmLine::Instruction { mnemonic, operands } => {
                assert_eq!(mnemonic.text, "MOV");
                assert_eq!(operands.len(), 2);
                assert!(matches!(operands[0], Operand::Register { index: 1, .. }));
                assert!(matches!(operands[1], Operand::Register { index: 2, .. }));
            }
            other => panic!("expected instruction, got {other:?}"),
        }
    }

    #[test]
    fn space_separated_operands_also_parse() {
        match parse("mvi r5 20") {
            AsmLine::Instruction { operands, .. } => {
                assert_eq!(operands.len(), 2);
                assert!(matches!(operands[1], Operand::Int { value: 20, .. }));
            }
            other => panic!("expected instruction, got {other:?}"),
        }
    }

    #[test]
    fn label_reference_with_trailing_colon() {
        match parse("MVI R0 entry:") {
            AsmLine::Instruction { operands, .. } => match &operands[1] {
                Operand::LabelRef { name, .. } => assert_eq!(name, "entry"),
                other => panic!("expected label ref, got {other:?}"),
            },
            other => panic!("expected instruction, got {other:?}"),
        }
    }

    #[test]
    fn deref_with_register_and_offset() {
        match parse("mov r1, [r2+4]") {
            AsmLine::Instruction { operands, .. } => match &operands[1] {
                Operand::Deref { inner, .. } => match inner.as_ref() {
                    Operand::Add { lhs, rhs, .. } => {
                        assert!(matches!(**lhs, Operand::Register { index: 2, .. }));
                        assert!(matches!(**rhs, Operand::Int { value: 4, .. }));
                    }
                    other => panic!("expected add, got {other:?}"),
                },
                other => panic!("expected deref, got {other:?}"),
            },
            other => panic!("expected instruction, got {other:?}"),
        }
    }

    #[test]
    fn unary_minus_binds_tighter_than_addition() {
        match parse("mvi r0 -2+5") {
            AsmLine::Instruction { operands, .. } => match &operands[1] {
                Operand::Add { lhs, .. } => {
                    assert!(matches!(**lhs, Operand::Neg { .. }));
                }
                other => panic!("expected add at the top, got {other:?}"),
            },
            other => panic!("expected instruction, got {other:?}"),
        }
    }

    #[test]
    fn nested_deref_is_rejected() {
        assert!(parse_err("mov r1, [[r2]]").contains("Nested dereference"));
    }

    #[test]
    fn covering_span_spans_all_children() {
        match parse("mvi r0 1+12") {
            AsmLine::Instruction { operands, .. } => {
                let span = operands[1].span();
                assert_eq!(span.col_start, 8);
                assert_eq!(span.col_end, 12);
            }
            other => panic!("expected instruction, got {other:?}"),
        }
    }

    #[test]
    fn section_markers_and_entry_point() {
        assert!(matches!(
            parse(".data"),
            AsmLine::Section {
                kind: SectionKind::Data,
                ..
            }
        ));
        assert!(matches!(
            parse(".text"),
            AsmLine::Section {
                kind: SectionKind::Text,
                ..
            }
        ));
        match parse(".global start:") {
            AsmLine::EntryPoint { label, .. } => assert_eq!(label, "start"),
            other => panic!("expected entry point, got {other:?}"),
        }
    }

    #[test]
    fn label_declaration_stands_alone() {
        match parse("Loop:") {
            AsmLine::LabelDecl { name, .. } => assert_eq!(name, "loop"),
            other => panic!("expected label decl, got {other:?}"),
        }
        assert!(parse_err("loop: mov r1, r2").contains("trailing token"));
    }

    #[test]
    fn data_declarations() {
        match parse(".buf size 16") {
            AsmLine::DataDecl { name, value, .. } => {
                assert_eq!(name, "buf");
                assert_eq!(value, DataValue::Buffer { size: 16 });
            }
            other => panic!("expected data decl, got {other:?}"),
        }
        match parse(".msg 'hi there'") {
            AsmLine::DataDecl { value, .. } => {
                assert_eq!(value, DataValue::Str("hi there".to_string()));
            }
            other => panic!("expected data decl, got {other:?}"),
        }
        match parse(".pi float 3.5") {
            AsmLine::DataDecl { value, .. } => assert_eq!(value, DataValue::Float(3.5)),
            other => panic!("expected data decl, got {other:?}"),
        }
        match parse(".count word 512") {
            AsmLine::DataDecl { value, .. } => assert_eq!(value, DataValue::Int16(512)),
            other => panic!("expected data decl, got {other:?}"),
        }
    }

    #[test]
    fn unknown_data_type_is_reported() {
        assert!(parse_err(".x quad 9").contains("Unknown data declaration type"));
    }
}
