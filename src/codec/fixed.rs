// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Fixed 32-bit instruction codec.
//!
//! One little-endian word per instruction: opcode(6) | mode(4) | srcReg(3) |
//! destReg(3) | address(16). When both endpoints are pointers the address
//! field holds two signed 8-bit sign-magnitude offsets (destination low,
//! source high); otherwise it is a single 16-bit value owned by whichever
//! endpoint addresses memory.

use super::{
    check_register, CodecError, FieldValue, Instruction, InstructionCodec, LengthEstimate, Opcode,
    OpcodeMode,
};

pub struct FixedCodec;

const WORD_LEN: usize = 4;

impl InstructionCodec for FixedCodec {
    fn encode(&self, inst: &Instruction) -> Result<Vec<u8>, CodecError> {
        check_register(inst.src_reg, "source")?;
        check_register(inst.dest_reg, "destination")?;
        let dest = int_field(inst.dest_field, "destination")?;
        let src = int_field(inst.src_field, "source")?;

        let address: u16 = if inst.mode.dual_pointer() {
            let dest_byte = encode_offset(dest, "destination")?;
            let src_byte = encode_offset(src, "source")?;
            u16::from(dest_byte) | u16::from(src_byte) << 8
        } else {
            let value = single_field_value(inst.mode, dest, src)?;
            if !(0..=0xFFFF).contains(&value) {
                return Err(CodecError::new(format!(
                    "address field {value} exceeds 16 bits"
                )));
            }
            value as u16
        };

        let word = u32::from(inst.opcode.as_u8())
            | u32::from(inst.mode.bits()) << 6
            | u32::from(inst.src_reg) << 10
            | u32::from(inst.dest_reg) << 13
            | u32::from(address) << 16;
        Ok(word.to_le_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8], offset: usize) -> Result<Instruction, CodecError> {
        let word_bytes = bytes
            .get(offset..offset + WORD_LEN)
            .ok_or_else(|| CodecError::new("truncated instruction"))?;
        let word = u32::from_le_bytes([word_bytes[0], word_bytes[1], word_bytes[2], word_bytes[3]]);

        let opcode_bits = (word & 0x3F) as u8;
        let opcode = Opcode::from_u8(opcode_bits)
            .ok_or_else(|| CodecError::new(format!("unrecognized opcode {opcode_bits}")))?;
        let mode = OpcodeMode::from_bits((word >> 6 & 0xF) as u8);
        let src_reg = (word >> 10 & 0x7) as u8;
        let dest_reg = (word >> 13 & 0x7) as u8;
        let address = (word >> 16) as u16;

        let (dest_field, src_field) = if mode.dual_pointer() {
            (
                decode_offset(address as u8),
                decode_offset((address >> 8) as u8),
            )
        } else {
            assign_single_field(mode, i64::from(address))
        };

        Ok(Instruction {
            opcode,
            mode,
            src_reg,
            dest_reg,
            dest_field: FieldValue::Int(dest_field),
            src_field: FieldValue::Int(src_field),
            length: WORD_LEN,
        })
    }

    fn estimate_length(&self, _opcode: Opcode) -> LengthEstimate {
        LengthEstimate {
            certain: true,
            length: WORD_LEN,
        }
    }
}

fn int_field(field: FieldValue, what: &str) -> Result<i64, CodecError> {
    field.as_int().ok_or_else(|| {
        CodecError::new(format!(
            "{what} float immediate is not encodable by the fixed codec"
        ))
    })
}

/// Which endpoints consume the 16-bit field when the instruction is not
/// dual-indirect. An endpoint addresses memory when it is a pointer or not
/// a register (literal read / absolute-address write).
fn field_owners(mode: OpcodeMode) -> (bool, bool) {
    let dest_uses = mode.dest_pointer || !mode.dest_register;
    let src_uses = mode.src_pointer || !mode.src_register;
    (dest_uses, src_uses)
}

fn single_field_value(mode: OpcodeMode, dest: i64, src: i64) -> Result<i64, CodecError> {
    match field_owners(mode) {
        (true, false) => {
            if src != 0 {
                return Err(CodecError::new("source field unused but nonzero"));
            }
            Ok(dest)
        }
        (false, true) => {
            if dest != 0 {
                return Err(CodecError::new("destination field unused but nonzero"));
            }
            Ok(src)
        }
        (true, true) => {
            if dest != src {
                return Err(CodecError::new(
                    "both endpoints address memory but only one 16-bit field is available",
                ));
            }
            Ok(dest)
        }
        (false, false) => {
            if dest != 0 || src != 0 {
                return Err(CodecError::new("register-only instruction with nonzero field"));
            }
            Ok(0)
        }
    }
}

fn assign_single_field(mode: OpcodeMode, value: i64) -> (i64, i64) {
    match field_owners(mode) {
        (true, false) => (value, 0),
        (false, true) => (0, value),
        (true, true) => (value, value),
        (false, false) => (0, 0),
    }
}

/// Sign-magnitude: bit 7 is the sign, bits 0-6 the magnitude, range ±127.
fn encode_offset(value: i64, what: &str) -> Result<u8, CodecError> {
    if !(-127..=127).contains(&value) {
        return Err(CodecError::new(format!(
            "{what} offset {value} out of range -127..=127"
        )));
    }
    let magnitude = value.unsigned_abs() as u8;
    Ok(if value < 0 { 0x80 | magnitude } else { magnitude })
}

fn decode_offset(byte: u8) -> i64 {
    let magnitude = i64::from(byte & 0x7F);
    if byte & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::super::{FieldValue, Instruction, InstructionCodec, Opcode, OpcodeMode};
    use super::FixedCodec;

    fn dual_mode() -> OpcodeMode {
        OpcodeMode {
            src_pointer: true,
            dest_pointer: true,
            src_register: true,
            dest_register: true,
        }
    }

    #[test]
    fn encode_is_always_four_bytes() {
        let inst = Instruction::new(Opcode::Halt);
        let bytes = FixedCodec.encode(&inst).expect("encode");
        assert_eq!(bytes.len(), 4);
        let estimate = FixedCodec.estimate_length(Opcode::Mov);
        assert!(estimate.certain);
        assert_eq!(estimate.length, 4);
    }

    #[test]
    fn round_trips_a_register_move() {
        let mut inst = Instruction::new(Opcode::Mov);
        inst.mode.src_register = true;
        inst.mode.dest_register = true;
        inst.src_reg = 3;
        inst.dest_reg = 5;
        inst.length = 4;
        let bytes = FixedCodec.encode(&inst).expect("encode");
        let decoded = FixedCodec.decode(&bytes, 0).expect("decode");
        assert_eq!(decoded, inst);
    }

    #[test]
    fn round_trips_every_opcode_with_an_immediate() {
        let mut mode = OpcodeMode::default();
        mode.dest_register = true;
        for op in Opcode::ALL {
            let mut inst = Instruction::new(*op);
            inst.mode = mode;
            inst.dest_reg = 2;
            inst.src_field = FieldValue::Int(0x1234);
            inst.length = 4;
            let bytes = FixedCodec.encode(&inst).expect("encode");
            let decoded = FixedCodec.decode(&bytes, 0).expect("decode");
            assert_eq!(decoded, inst, "opcode {op:?}");
            assert_eq!(decoded.length, bytes.len());
        }
    }

    #[test]
    fn dual_offsets_recover_exactly() {
        for dest in [-127i64, -63, -1, 0, 1, 90, 127] {
            for src in [-127i64, -5, 0, 33, 127] {
                let mut inst = Instruction::new(Opcode::Mov);
                inst.mode = dual_mode();
                inst.src_reg = 1;
                inst.dest_reg = 2;
                inst.dest_field = FieldValue::Int(dest);
                inst.src_field = FieldValue::Int(src);
                inst.length = 4;
                let bytes = FixedCodec.encode(&inst).expect("encode");
                let decoded = FixedCodec.decode(&bytes, 0).expect("decode");
                assert_eq!(decoded.dest_field, FieldValue::Int(dest));
                assert_eq!(decoded.src_field, FieldValue::Int(src));
            }
        }
    }

    #[test]
    fn single_field_recovers_full_sixteen_bits() {
        let mut inst = Instruction::new(Opcode::Mvi);
        inst.mode.dest_register = true;
        inst.dest_reg = 0;
        inst.src_field = FieldValue::Int(0xFFFF);
        inst.length = 4;
        let bytes = FixedCodec.encode(&inst).expect("encode");
        let decoded = FixedCodec.decode(&bytes, 0).expect("decode");
        assert_eq!(decoded.src_field, FieldValue::Int(0xFFFF));
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let mut inst = Instruction::new(Opcode::Mvi);
        inst.mode.dest_register = true;
        inst.src_field = FieldValue::Int(0x10000);
        assert!(FixedCodec.encode(&inst).is_err());

        let mut inst = Instruction::new(Opcode::Mov);
        inst.mode = dual_mode();
        inst.dest_field = FieldValue::Int(128);
        assert!(FixedCodec.encode(&inst).is_err());

        let mut inst = Instruction::new(Opcode::Mov);
        inst.src_reg = 9;
        assert!(FixedCodec.encode(&inst).is_err());
    }

    #[test]
    fn rejects_float_immediates() {
        let mut inst = Instruction::new(Opcode::Mvif);
        inst.mode.dest_register = true;
        inst.src_field = FieldValue::Float(1.5);
        assert!(FixedCodec.encode(&inst).is_err());
    }

    #[test]
    fn negative_offset_uses_sign_magnitude() {
        let mut inst = Instruction::new(Opcode::Mov);
        inst.mode = dual_mode();
        inst.dest_field = FieldValue::Int(-5);
        inst.src_field = FieldValue::Int(3);
        let bytes = FixedCodec.encode(&inst).expect("encode");
        // Address field is the upper half of the LE word.
        assert_eq!(bytes[2], 0x80 | 5);
        assert_eq!(bytes[3], 3);
    }

    #[test]
    fn truncated_buffer_is_an_error() {
        assert!(FixedCodec.decode(&[0x00, 0x01], 0).is_err());
    }
}
