// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Symbol resolution and instruction lowering.
//!
//! Labels resolve through immutable symbol tables keyed by lowercased name;
//! a dedicated pass substitutes each reference *node* in the operand tree
//! with its resolved numeric value. Lowering then turns a fully-resolved
//! operand list into a codec [`Instruction`].

use std::collections::HashMap;

use crate::assembler::spec::InstructionSpec;
use crate::codec::{FieldValue, Instruction, InstructionCodec, Opcode, OpcodeMode};
use crate::core::parser::Operand;
use crate::core::tokenizer::Span;

/// Error from resolution or lowering, carrying the offending span when one
/// is known.
#[derive(Debug, Clone)]
pub struct ResolveError {
    pub message: String,
    pub span: Option<Span>,
}

impl ResolveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span: Some(span),
        }
    }
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ResolveError {}

/// Immutable symbol tables used by the relocation pass. Label offsets are
/// text-section byte offsets; the base memory offset is added at
/// substitution time. Data addresses are already absolute.
pub struct SymbolTables {
    pub labels: HashMap<String, u32>,
    pub data: HashMap<String, u32>,
    pub base_offset: u32,
}

impl SymbolTables {
    fn label_address(&self, name: &str) -> Option<i64> {
        self.labels
            .get(name)
            .map(|offset| i64::from(*offset) + i64::from(self.base_offset))
    }

    fn data_address(&self, name: &str) -> Option<i64> {
        self.data.get(name).map(|addr| i64::from(*addr))
    }
}

/// Substitute every label / data-label reference node with its resolved
/// numeric address. Every occurrence resolves, including repeated
/// references within one operand list.
pub fn resolve_operand(operand: &Operand, symbols: &SymbolTables) -> Result<Operand, ResolveError> {
    map_references(operand, &mut |name, span, is_data| {
        let resolved = if is_data {
            symbols.data_address(name)
        } else {
            // A plain identifier may also name a data label.
            symbols
                .label_address(name)
                .or_else(|| symbols.data_address(name))
        };
        match resolved {
            Some(value) => Ok(Operand::Int { value, span }),
            None => Err(ResolveError::with_span(
                format!("Unresolved label reference: {name}"),
                span,
            )),
        }
    })
}

/// Substitute every reference with zero. Used by the sizing pass to measure
/// an instruction before any address is known.
pub fn resolve_operand_for_sizing(operand: &Operand) -> Operand {
    map_references(operand, &mut |_, span, _| Ok(Operand::Int { value: 0, span }))
        .unwrap_or_else(|_| operand.clone())
}

fn map_references(
    operand: &Operand,
    subst: &mut dyn FnMut(&str, Span, bool) -> Result<Operand, ResolveError>,
) -> Result<Operand, ResolveError> {
    Ok(match operand {
        Operand::LabelRef { name, span } => subst(name, *span, false)?,
        Operand::DataRef { name, span } => subst(name, *span, true)?,
        Operand::Deref { inner, span } => Operand::Deref {
            inner: Box::new(map_references(inner, subst)?),
            span: *span,
        },
        Operand::Neg { inner, span } => Operand::Neg {
            inner: Box::new(map_references(inner, subst)?),
            span: *span,
        },
        Operand::Add { lhs, rhs, span } => Operand::Add {
            lhs: Box::new(map_references(lhs, subst)?),
            rhs: Box::new(map_references(rhs, subst)?),
            span: *span,
        },
        Operand::Sub { lhs, rhs, span } => Operand::Sub {
            lhs: Box::new(map_references(lhs, subst)?),
            rhs: Box::new(map_references(rhs, subst)?),
            span: *span,
        },
        other => other.clone(),
    })
}

/// One operand endpoint after lowering: an optional register, a pointer
/// flag, and the numeric field.
#[derive(Debug, Clone, Copy, Default)]
struct Endpoint {
    register: Option<u8>,
    pointer: bool,
    value: FieldValue,
}

impl Endpoint {
    fn register(index: u8) -> Self {
        Self {
            register: Some(index),
            pointer: false,
            value: FieldValue::Int(0),
        }
    }

    fn literal(value: FieldValue) -> Self {
        Self {
            register: None,
            pointer: false,
            value,
        }
    }
}

/// Lower a fully-resolved operand list into a codec instruction. The
/// operand shapes feed the opcode-mode bits; the load and store families
/// swap their endpoints so the named register is the value side and the
/// address the memory side.
pub fn lower_instruction(
    spec: &InstructionSpec,
    operands: &[Operand],
) -> Result<Instruction, ResolveError> {
    if operands.len() != spec.operand_count() {
        return Err(ResolveError::new(format!(
            "{} expects {} operand(s), found {}",
            spec.mnemonic,
            spec.operand_count(),
            operands.len()
        )));
    }
    let mut inst = Instruction::new(spec.opcode);

    let (dest, src) = match spec.opcode {
        Opcode::Ldr | Opcode::Ldrb | Opcode::Ldrw | Opcode::Ldrf => {
            let dest = lower_endpoint(&operands[0])?;
            let mut src = lower_endpoint(&operands[1])?;
            // The source of a load is memory at the given absolute address.
            src.pointer = true;
            (Some(dest), Some(src))
        }
        Opcode::Str | Opcode::Strb | Opcode::Strw | Opcode::Strf => {
            let src = lower_endpoint(&operands[0])?;
            let dest = lower_endpoint(&operands[1])?;
            (Some(dest), Some(src))
        }
        _ => {
            let dest = operands.first().map(|op| lower_endpoint(op)).transpose()?;
            let src = operands.get(1).map(|op| lower_endpoint(op)).transpose()?;
            (dest, src)
        }
    };

    let mut mode = OpcodeMode::default();
    if let Some(dest) = dest {
        mode.dest_register = dest.register.is_some();
        mode.dest_pointer = dest.pointer && dest.register.is_some();
        match dest.register {
            Some(reg) => {
                inst.dest_reg = reg;
                if dest.pointer {
                    inst.dest_field = dest.value;
                }
            }
            None => inst.dest_field = dest.value,
        }
    }
    if let Some(src) = src {
        mode.src_register = src.register.is_some();
        mode.src_pointer = src.pointer;
        match src.register {
            Some(reg) => {
                inst.src_reg = reg;
                if src.pointer {
                    inst.src_field = src.value;
                }
            }
            None => inst.src_field = src.value,
        }
    }
    inst.mode = mode;
    Ok(inst)
}

fn lower_endpoint(operand: &Operand) -> Result<Endpoint, ResolveError> {
    match operand {
        Operand::Register { index, .. } => Ok(Endpoint::register(*index)),
        Operand::Deref { inner, span } => lower_deref(inner, *span),
        other => Ok(Endpoint::literal(eval(other)?)),
    }
}

/// A dereference is register-relative (`[Rn]`, `[Rn+k]`, `[Rn-k]`) or
/// absolute (`[addr]`).
fn lower_deref(inner: &Operand, span: Span) -> Result<Endpoint, ResolveError> {
    match inner {
        Operand::Register { index, .. } => Ok(Endpoint {
            register: Some(*index),
            pointer: true,
            value: FieldValue::Int(0),
        }),
        Operand::Add { lhs, rhs, .. } => match lhs.as_ref() {
            Operand::Register { index, .. } => Ok(Endpoint {
                register: Some(*index),
                pointer: true,
                value: eval(rhs)?,
            }),
            _ => absolute_deref(inner),
        },
        Operand::Sub { lhs, rhs, .. } => match lhs.as_ref() {
            Operand::Register { index, .. } => {
                let offset = eval_int(rhs)?;
                Ok(Endpoint {
                    register: Some(*index),
                    pointer: true,
                    value: FieldValue::Int(-offset),
                })
            }
            _ => absolute_deref(inner),
        },
        _ => absolute_deref(inner).map_err(|err| match err.span {
            Some(_) => err,
            None => ResolveError::with_span(err.message, span),
        }),
    }
}

fn absolute_deref(inner: &Operand) -> Result<Endpoint, ResolveError> {
    Ok(Endpoint {
        register: None,
        pointer: true,
        value: eval(inner)?,
    })
}

/// Evaluate a resolved operand tree to a number. Register nodes are not
/// values; unresolved references are a resolution bug surfacing here.
fn eval(operand: &Operand) -> Result<FieldValue, ResolveError> {
    match operand {
        Operand::Int { value, .. } => Ok(FieldValue::Int(*value)),
        Operand::Float { value, .. } => Ok(FieldValue::Float(*value)),
        Operand::Neg { inner, .. } => Ok(match eval(inner)? {
            FieldValue::Int(v) => FieldValue::Int(-v),
            FieldValue::Float(v) => FieldValue::Float(-v),
        }),
        Operand::Add { lhs, rhs, .. } => arith(eval(lhs)?, eval(rhs)?, false),
        Operand::Sub { lhs, rhs, .. } => arith(eval(lhs)?, eval(rhs)?, true),
        Operand::Register { span, .. } => Err(ResolveError::with_span(
            "Register is not valid in a value position",
            *span,
        )),
        Operand::LabelRef { name, span } | Operand::DataRef { name, span } => {
            Err(ResolveError::with_span(
                format!("Unresolved label reference reached the encoder: {name}"),
                *span,
            ))
        }
        Operand::Deref { span, .. } => Err(ResolveError::with_span(
            "Nested dereference is not supported",
            *span,
        )),
    }
}

fn eval_int(operand: &Operand) -> Result<i64, ResolveError> {
    match eval(operand)? {
        FieldValue::Int(v) => Ok(v),
        FieldValue::Float(_) => Err(ResolveError::with_span(
            "Expected an integer value",
            operand.span(),
        )),
    }
}

fn arith(lhs: FieldValue, rhs: FieldValue, subtract: bool) -> Result<FieldValue, ResolveError> {
    Ok(match (lhs, rhs) {
        (FieldValue::Int(a), FieldValue::Int(b)) => {
            FieldValue::Int(if subtract { a - b } else { a + b })
        }
        (a, b) => {
            let a = a.as_float().unwrap_or_else(|| a.as_int().unwrap_or(0) as f64);
            let b = b.as_float().unwrap_or_else(|| b.as_int().unwrap_or(0) as f64);
            FieldValue::Float(if subtract { a - b } else { a + b })
        }
    })
}

/// Measure one instruction's encoded length before addresses exist:
/// references size as zero, then the instruction is encoded once.
pub fn measure_length(
    codec: &dyn InstructionCodec,
    spec: &InstructionSpec,
    operands: &[Operand],
) -> Result<usize, ResolveError> {
    let estimate = codec.estimate_length(spec.opcode);
    if estimate.certain {
        return Ok(estimate.length);
    }
    let sized: Vec<Operand> = operands.iter().map(resolve_operand_for_sizing).collect();
    let inst = lower_instruction(spec, &sized)?;
    let bytes = codec
        .encode(&inst)
        .map_err(|err| ResolveError::new(err.message))?;
    Ok(bytes.len())
}
