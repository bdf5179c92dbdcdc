// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Variable-length instruction codec.
//!
//! An explicit opcode-to-layout table picks compact encodings for common
//! instruction shapes; any opcode absent from the table falls back to a
//! 12-byte layout structurally identical to the fixed codec's field order,
//! byte-aligned.

use super::{
    check_register, CodecError, FieldValue, Instruction, InstructionCodec, LengthEstimate, Opcode,
    OpcodeMode,
};

pub struct VariableCodec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Opcode only.
    Bare,
    /// Opcode + one register byte.
    Reg,
    /// Opcode + one byte packing two 3-bit register indices
    /// (destination in bits 0-2, source in bits 3-5).
    RegPair,
    /// Opcode + register + 8-byte float payload.
    RegFloat,
    /// Opcode + register + little-endian integer of the given byte width.
    RegInt(usize),
    /// Opcode + 4-byte absolute address.
    Addr,
    /// Byte-aligned rendition of the fixed codec's field order:
    /// opcode, mode, srcReg, destReg, dest field (4), src field (4).
    Default,
}

fn layout_for(opcode: Opcode) -> Layout {
    match opcode {
        Opcode::Halt | Opcode::Ret | Opcode::Int => Layout::Bare,
        Opcode::Neg
        | Opcode::Inc
        | Opcode::Dec
        | Opcode::Not
        | Opcode::Push
        | Opcode::Pop
        | Opcode::Jmr
        | Opcode::Cmpz
        | Opcode::Sete
        | Opcode::Setne
        | Opcode::Setlt
        | Opcode::Setlte
        | Opcode::Setgt
        | Opcode::Setgte
        | Opcode::Truncf => Layout::Reg,
        Opcode::Swap | Opcode::Or | Opcode::Xor | Opcode::Cmp => Layout::RegPair,
        Opcode::Mvif | Opcode::Strf | Opcode::Ldrf => Layout::RegFloat,
        Opcode::Mvi | Opcode::Str | Opcode::Ldr => Layout::RegInt(4),
        Opcode::Mviw | Opcode::Strw | Opcode::Ldrw => Layout::RegInt(2),
        Opcode::Mvib | Opcode::Strb | Opcode::Ldrb => Layout::RegInt(1),
        Opcode::Call
        | Opcode::Jmp
        | Opcode::Jeq
        | Opcode::Jne
        | Opcode::Jge
        | Opcode::Jlt
        | Opcode::Jnz => Layout::Addr,
        _ => Layout::Default,
    }
}

fn layout_length(layout: Layout) -> usize {
    match layout {
        Layout::Bare => 1,
        Layout::Reg | Layout::RegPair => 2,
        Layout::RegFloat => 10,
        Layout::RegInt(width) => 2 + width,
        Layout::Addr => 5,
        Layout::Default => 12,
    }
}

/// True when the opcode's register+value layout names the *source* register
/// and addresses memory through the destination field (the store family);
/// the move-immediate and load families name the destination register.
fn value_layout_is_store(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Str | Opcode::Strb | Opcode::Strw | Opcode::Strf
    )
}

/// Canonical mode flags reconstructed for a table layout on decode.
fn canonical_mode(opcode: Opcode, layout: Layout) -> OpcodeMode {
    let mut mode = OpcodeMode::default();
    match layout {
        Layout::Bare | Layout::Addr | Layout::Default => {}
        Layout::Reg => mode.dest_register = true,
        Layout::RegPair => {
            mode.src_register = true;
            mode.dest_register = true;
        }
        Layout::RegFloat | Layout::RegInt(_) => {
            if value_layout_is_store(opcode) {
                mode.src_register = true;
            } else {
                mode.dest_register = true;
                if matches!(opcode, Opcode::Ldr | Opcode::Ldrb | Opcode::Ldrw | Opcode::Ldrf) {
                    mode.src_pointer = true;
                }
            }
        }
    }
    mode
}

impl InstructionCodec for VariableCodec {
    fn encode(&self, inst: &Instruction) -> Result<Vec<u8>, CodecError> {
        check_register(inst.src_reg, "source")?;
        check_register(inst.dest_reg, "destination")?;
        let layout = layout_for(inst.opcode);
        let mut bytes = Vec::with_capacity(layout_length(layout));
        bytes.push(inst.opcode.as_u8());

        match layout {
            Layout::Bare => {}
            Layout::Reg => bytes.push(inst.dest_reg),
            Layout::RegPair => bytes.push(inst.dest_reg | inst.src_reg << 3),
            Layout::RegFloat => {
                if value_layout_is_store(inst.opcode) {
                    bytes.push(inst.src_reg);
                    // The target address rides the 8-byte float payload.
                    let addr = int_field(inst.dest_field, "destination")?;
                    bytes.extend_from_slice(&(addr as f64).to_le_bytes());
                } else {
                    bytes.push(inst.dest_reg);
                    let payload = match (inst.opcode, inst.src_field) {
                        (Opcode::Mvif, FieldValue::Float(v)) => v,
                        (Opcode::Mvif, FieldValue::Int(v)) => v as f64,
                        (_, field) => int_field(field, "source")? as f64,
                    };
                    bytes.extend_from_slice(&payload.to_le_bytes());
                }
            }
            Layout::RegInt(width) => {
                let (reg, value) = if value_layout_is_store(inst.opcode) {
                    (inst.src_reg, int_field(inst.dest_field, "destination")?)
                } else {
                    (inst.dest_reg, int_field(inst.src_field, "source")?)
                };
                bytes.push(reg);
                push_int(&mut bytes, value, width)?;
            }
            Layout::Addr => {
                let addr = int_field(inst.dest_field, "destination")?;
                if !(0..=i64::from(u32::MAX)).contains(&addr) {
                    return Err(CodecError::new(format!(
                        "branch target {addr} exceeds 32 bits"
                    )));
                }
                bytes.extend_from_slice(&(addr as u32).to_le_bytes());
            }
            Layout::Default => {
                bytes.push(inst.mode.bits());
                bytes.push(inst.src_reg);
                bytes.push(inst.dest_reg);
                push_int(&mut bytes, int_field(inst.dest_field, "destination")?, 4)?;
                push_int(&mut bytes, int_field(inst.src_field, "source")?, 4)?;
            }
        }

        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8], offset: usize) -> Result<Instruction, CodecError> {
        let opcode_byte = *bytes
            .get(offset)
            .ok_or_else(|| CodecError::new("truncated instruction"))?;
        let opcode = Opcode::from_u8(opcode_byte)
            .ok_or_else(|| CodecError::new(format!("unrecognized opcode {opcode_byte}")))?;
        let layout = layout_for(opcode);
        let length = layout_length(layout);
        let body = bytes
            .get(offset..offset + length)
            .ok_or_else(|| CodecError::new("truncated instruction"))?;

        let mut inst = Instruction::new(opcode);
        inst.length = length;
        inst.mode = canonical_mode(opcode, layout);

        match layout {
            Layout::Bare => {}
            Layout::Reg => {
                inst.dest_reg = decode_register(body[1], "destination")?;
            }
            Layout::RegPair => {
                inst.dest_reg = body[1] & 0x7;
                inst.src_reg = body[1] >> 3 & 0x7;
                if body[1] >> 6 != 0 {
                    return Err(CodecError::new("register pair byte has stray bits"));
                }
            }
            Layout::RegFloat => {
                let payload = f64::from_le_bytes([
                    body[2], body[3], body[4], body[5], body[6], body[7], body[8], body[9],
                ]);
                if value_layout_is_store(opcode) {
                    inst.src_reg = decode_register(body[1], "source")?;
                    inst.dest_field = FieldValue::Int(payload as i64);
                } else {
                    inst.dest_reg = decode_register(body[1], "destination")?;
                    inst.src_field = if opcode == Opcode::Mvif {
                        FieldValue::Float(payload)
                    } else {
                        FieldValue::Int(payload as i64)
                    };
                }
            }
            Layout::RegInt(width) => {
                let value = read_int(&body[2..], width);
                if value_layout_is_store(opcode) {
                    inst.src_reg = decode_register(body[1], "source")?;
                    inst.dest_field = FieldValue::Int(value);
                } else {
                    inst.dest_reg = decode_register(body[1], "destination")?;
                    inst.src_field = FieldValue::Int(value);
                }
            }
            Layout::Addr => {
                let addr = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
                inst.dest_field = FieldValue::Int(i64::from(addr));
            }
            Layout::Default => {
                if body[1] > 0xF {
                    return Err(CodecError::new("invalid mode byte"));
                }
                inst.mode = OpcodeMode::from_bits(body[1]);
                inst.src_reg = decode_register(body[2], "source")?;
                inst.dest_reg = decode_register(body[3], "destination")?;
                inst.dest_field = FieldValue::Int(read_int(&body[4..], 4));
                inst.src_field = FieldValue::Int(read_int(&body[8..], 4));
            }
        }

        Ok(inst)
    }

    fn estimate_length(&self, opcode: Opcode) -> LengthEstimate {
        let layout = layout_for(opcode);
        LengthEstimate {
            certain: layout != Layout::Default,
            length: layout_length(layout),
        }
    }
}

fn int_field(field: FieldValue, what: &str) -> Result<i64, CodecError> {
    field
        .as_int()
        .ok_or_else(|| CodecError::new(format!("{what} field must be an integer")))
}

fn decode_register(byte: u8, what: &str) -> Result<u8, CodecError> {
    if byte > 7 {
        return Err(CodecError::new(format!(
            "{what} register byte {byte} out of range 0..=7"
        )));
    }
    Ok(byte)
}

/// Append `value` as a `width`-byte little-endian integer. Values must fit
/// the signed or unsigned range of the width; decode sign-extends.
fn push_int(bytes: &mut Vec<u8>, value: i64, width: usize) -> Result<(), CodecError> {
    let signed_min = -(1i64 << (width * 8 - 1));
    let unsigned_max = (1i64 << (width * 8)) - 1;
    if value < signed_min || value > unsigned_max {
        return Err(CodecError::new(format!(
            "value {value} does not fit in {width} byte(s)"
        )));
    }
    bytes.extend_from_slice(&value.to_le_bytes()[..width]);
    Ok(())
}

fn read_int(bytes: &[u8], width: usize) -> i64 {
    let mut value: i64 = 0;
    for (ix, byte) in bytes[..width].iter().enumerate() {
        value |= i64::from(*byte) << (ix * 8);
    }
    let shift = 64 - width * 8;
    value << shift >> shift
}
