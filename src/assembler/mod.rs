// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembler engine.
//!
//! Orchestrates preprocessing, section location, parsing, two-pass symbol
//! resolution and instruction encoding into one contiguous machine-code
//! buffer (text section followed by data section), plus the read-only
//! regions a loader installs.

pub mod data;
pub mod preprocess;
pub mod resolver;
pub mod spec;
#[cfg(test)]
mod tests;

use std::collections::HashMap;

use crate::assembler::data::DataLabel;
use crate::assembler::preprocess::{
    drop_blank_lines, fold_constants, inject_entry_point, run_passes, source_lines, strip_comments,
    trim, SourceLine,
};
use crate::assembler::resolver::{lower_instruction, measure_length, resolve_operand, SymbolTables};
use crate::assembler::spec::{InstructionSpec, SpecTable};
use crate::codec::{CodecKind, InstructionCodec};
use crate::core::error::{AsmError, AsmErrorKind, Diagnostic, Severity};
use crate::core::parser::{parse_line, AsmLine, DataValue, Operand, SectionKind};
use crate::core::tokenizer::Tokenizer;
use crate::vm::memory::Region;

/// Per-session assembler configuration. The codec choice must match the
/// CPU that executes the buffer.
#[derive(Debug, Clone, Copy)]
pub struct AssembleConfig {
    pub codec: CodecKind,
    pub base_offset: u32,
}

impl Default for AssembleConfig {
    fn default() -> Self {
        Self {
            codec: CodecKind::Fixed,
            base_offset: 0,
        }
    }
}

/// The complete artifact handed to a loader: the machine-code buffer, the
/// text-section length, and the read-only regions covering the code.
#[derive(Debug, Clone)]
pub struct AsmOutput {
    pub code: Vec<u8>,
    pub text_len: u32,
    pub base_offset: u32,
    pub regions: Vec<Region>,
    pub labels: HashMap<String, u32>,
    pub data_labels: Vec<DataLabel>,
}

struct PendingInstruction {
    spec: &'static InstructionSpec,
    operands: Vec<Operand>,
    line: u32,
}

pub struct Assembler {
    specs: SpecTable,
    config: AssembleConfig,
    codec: Box<dyn InstructionCodec>,
    diagnostics: Vec<Diagnostic>,
}

impl Assembler {
    pub fn new(config: AssembleConfig) -> Self {
        let specs = SpecTable::new();
        specs.assert_complete();
        Self {
            specs,
            config,
            codec: config.codec.build(),
            diagnostics: Vec::new(),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Assemble a full source text. Lex/parse/resolution problems are
    /// collected as per-line diagnostics; encoding validation errors are
    /// fatal. No artifact is produced when any error diagnostic exists.
    pub fn assemble(&mut self, source: &str) -> Result<AsmOutput, AsmError> {
        let lines = run_passes(
            source_lines(source),
            &[trim, strip_comments, drop_blank_lines],
        );
        self.check_sections(&lines)?;
        let lines = run_passes(lines, &[fold_constants, inject_entry_point]);

        let (data_lines, text_lines) = split_sections(lines);

        let declarations = self.parse_data_section(&data_lines);
        let parsed_text = self.parse_text_section(&text_lines);

        // Pass 1: byte offsets for every label, text length from per-
        // instruction length estimates.
        let mut labels: HashMap<String, u32> = HashMap::new();
        let mut pending: Vec<PendingInstruction> = Vec::new();
        let mut offset: u32 = 0;
        for (number, line) in parsed_text {
            match line {
                AsmLine::LabelDecl { name, span } => {
                    if labels.insert(name.clone(), offset).is_some() {
                        self.error_at(
                            number,
                            AsmErrorKind::Symbol,
                            "Label defined more than once",
                            Some(&name),
                            Some(span.col_start),
                        );
                    }
                }
                AsmLine::Instruction { mnemonic, operands } => {
                    let Some(spec) = self.specs.lookup(&mnemonic.text) else {
                        self.error_at(
                            number,
                            AsmErrorKind::Parser,
                            "Unknown mnemonic",
                            Some(&mnemonic.text),
                            Some(mnemonic.span.col_start),
                        );
                        continue;
                    };
                    if !self.check_operands(number, spec, &operands) {
                        continue;
                    }
                    match measure_length(self.codec.as_ref(), spec, &operands) {
                        Ok(length) => {
                            pending.push(PendingInstruction {
                                spec,
                                operands,
                                line: number,
                            });
                            offset += length as u32;
                        }
                        Err(err) => {
                            self.error_at(
                                number,
                                AsmErrorKind::Encode,
                                &err.message,
                                None,
                                err.span.map(|s| s.col_start),
                            );
                        }
                    }
                }
                AsmLine::Section { span, .. }
                | AsmLine::EntryPoint { span, .. }
                | AsmLine::DataDecl { span, .. } => {
                    self.error_at(
                        number,
                        AsmErrorKind::Section,
                        "Declaration not allowed inside the text section",
                        None,
                        Some(span.col_start),
                    );
                }
            }
        }
        let text_len = offset;

        // Data labels live directly after the encoded text section.
        let data_labels = data::layout(declarations, text_len + self.config.base_offset);
        let mut data_map: HashMap<String, u32> = HashMap::new();
        for label in &data_labels {
            if data_map.insert(label.name.clone(), label.address).is_some() {
                self.error_at(
                    0,
                    AsmErrorKind::Data,
                    "Data label defined more than once",
                    Some(&label.name),
                    None,
                );
            }
        }

        // Pass 2: substitute reference nodes, lower, encode.
        let symbols = SymbolTables {
            labels,
            data: data_map,
            base_offset: self.config.base_offset,
        };
        let mut code: Vec<u8> = Vec::with_capacity(text_len as usize);
        for item in &pending {
            let mut resolved = Vec::with_capacity(item.operands.len());
            let mut failed = false;
            for operand in &item.operands {
                match resolve_operand(operand, &symbols) {
                    Ok(operand) => resolved.push(operand),
                    Err(err) => {
                        self.error_at(
                            item.line,
                            AsmErrorKind::Symbol,
                            &err.message,
                            None,
                            err.span.map(|s| s.col_start),
                        );
                        failed = true;
                        break;
                    }
                }
            }
            if failed {
                continue;
            }
            let inst = match lower_instruction(item.spec, &resolved) {
                Ok(inst) => inst,
                Err(err) => {
                    self.error_at(
                        item.line,
                        AsmErrorKind::Encode,
                        &err.message,
                        None,
                        err.span.map(|s| s.col_start),
                    );
                    continue;
                }
            };
            match self.codec.encode(&inst) {
                Ok(bytes) => code.extend(bytes),
                Err(err) => {
                    // Encoding validation failures are fatal: no partial
                    // artifact is ever produced.
                    self.error_at(item.line, AsmErrorKind::Encode, &err.message, None, None);
                    return Err(AsmError::new(
                        AsmErrorKind::Encode,
                        "Instruction failed to encode",
                        Some(&err.message),
                    ));
                }
            }
        }

        if self.has_errors() {
            return Err(AsmError::new(
                AsmErrorKind::Parser,
                "Errors detected in source. No output produced.",
                None,
            ));
        }

        code.extend(data::serialize(&data_labels));

        let mut regions = Vec::new();
        if text_len > 0 {
            regions.push(Region::new(
                self.config.base_offset,
                self.config.base_offset + text_len - 1,
            ));
        }

        Ok(AsmOutput {
            code,
            text_len,
            base_offset: self.config.base_offset,
            regions,
            labels: symbols.labels,
            data_labels,
        })
    }

    /// Section boundaries are found per marker as the first line starting
    /// with the literal. `.text` must precede `.global` and both must
    /// exist; `.data`, when present, must precede `.text`.
    fn check_sections(&mut self, lines: &[SourceLine]) -> Result<(), AsmError> {
        let find = |marker: &str| lines.iter().position(|line| line.text.starts_with(marker));
        let data = find(".data");
        let text = find(".text");
        let global = find(".global");

        let Some(text) = text else {
            return Err(self.section_error("Missing .text section"));
        };
        let Some(global) = global else {
            return Err(self.section_error("Missing .global entry point"));
        };
        if global < text {
            return Err(self.section_error(".global must come after .text"));
        }
        if let Some(data) = data {
            if data > text {
                return Err(self.section_error(".data must come before .text"));
            }
        }
        Ok(())
    }

    fn section_error(&mut self, msg: &str) -> AsmError {
        let err = AsmError::new(AsmErrorKind::Section, msg, None);
        self.diagnostics
            .push(Diagnostic::new(0, Severity::Error, err.clone()));
        err
    }

    fn parse_data_section(&mut self, lines: &[SourceLine]) -> Vec<(String, DataValue)> {
        let mut declarations = Vec::new();
        for line in lines {
            let Some(parsed) = self.parse_one(line) else {
                continue;
            };
            match parsed {
                AsmLine::DataDecl { name, value, .. } => {
                    declarations.push((name.to_ascii_lowercase(), value));
                }
                other => {
                    let column = match &other {
                        AsmLine::Instruction { mnemonic, .. } => Some(mnemonic.span.col_start),
                        _ => None,
                    };
                    self.error_at(
                        line.number,
                        AsmErrorKind::Data,
                        "Only data declarations are allowed in the .data section",
                        None,
                        column,
                    );
                }
            }
        }
        declarations
    }

    fn parse_text_section(&mut self, lines: &[SourceLine]) -> Vec<(u32, AsmLine)> {
        let mut parsed = Vec::with_capacity(lines.len());
        for line in lines {
            if let Some(ast) = self.parse_one(line) {
                parsed.push((line.number, ast));
            }
        }
        parsed
    }

    /// Lex and parse one line; on failure, record a diagnostic and skip the
    /// line (resynchronization is per line).
    fn parse_one(&mut self, line: &SourceLine) -> Option<AsmLine> {
        let tokens = match Tokenizer::new(&line.text, line.number).tokenize() {
            Ok(tokens) => tokens,
            Err(err) => {
                self.error_at(
                    line.number,
                    AsmErrorKind::Lexer,
                    &err.message,
                    None,
                    Some(err.span.col_start),
                );
                return None;
            }
        };
        if tokens.is_empty() {
            return None;
        }
        match parse_line(&tokens, line.number) {
            Ok(ast) => Some(ast),
            Err(err) => {
                self.error_at(
                    line.number,
                    AsmErrorKind::Parser,
                    &err.message,
                    None,
                    Some(err.span.col_start),
                );
                None
            }
        }
    }

    fn check_operands(&mut self, line: u32, spec: &InstructionSpec, operands: &[Operand]) -> bool {
        if operands.len() != spec.operand_count() {
            self.error_at(
                line,
                AsmErrorKind::Parser,
                &format!(
                    "{} expects {} operand(s), found {}",
                    spec.mnemonic,
                    spec.operand_count(),
                    operands.len()
                ),
                None,
                None,
            );
            return false;
        }
        for (kind, operand) in spec.operands.iter().zip(operands) {
            if !kind.accepts(operand) {
                self.error_at(
                    line,
                    AsmErrorKind::Parser,
                    &format!("Operand not allowed here for {}", spec.mnemonic),
                    None,
                    Some(operand.span().col_start),
                );
                return false;
            }
        }
        true
    }

    fn error_at(
        &mut self,
        line: u32,
        kind: AsmErrorKind,
        msg: &str,
        param: Option<&str>,
        column: Option<usize>,
    ) {
        self.diagnostics.push(
            Diagnostic::new(line, Severity::Error, AsmError::new(kind, msg, param))
                .with_column(column),
        );
    }

    fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diag| diag.severity == Severity::Error)
    }
}

/// Split the preprocessed lines into data-section and text-section lines,
/// dropping the markers themselves.
fn split_sections(lines: Vec<SourceLine>) -> (Vec<SourceLine>, Vec<SourceLine>) {
    let mut data = Vec::new();
    let mut text = Vec::new();
    let mut section: Option<SectionKind> = None;
    for line in lines {
        if line.text.starts_with(".data") && section.is_none() {
            section = Some(SectionKind::Data);
            continue;
        }
        if line.text.starts_with(".text") && section != Some(SectionKind::Text) {
            section = Some(SectionKind::Text);
            continue;
        }
        match section {
            Some(SectionKind::Data) => data.push(line),
            Some(SectionKind::Text) => text.push(line),
            None => data.push(line),
        }
    }
    (data, text)
}
