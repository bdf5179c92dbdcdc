// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Static instruction specifications.
//!
//! Maps each mnemonic to its opcode and operand-kind constraints. The table
//! is an immutable value built once and passed by reference; a startup
//! assertion checks that every opcode has exactly one entry.

use std::collections::HashMap;

use crate::codec::Opcode;
use crate::core::parser::Operand;

/// Constraint on one operand position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    RegisterOnly,
    LiteralOnly,
    RegisterOrLiteral,
    RegisterOrPointer,
    Any,
}

impl OperandKind {
    /// Whether a parsed operand satisfies this constraint. Label and
    /// data-label references count as literals; they resolve to numbers
    /// before encoding.
    pub fn accepts(self, operand: &Operand) -> bool {
        let is_register = matches!(operand, Operand::Register { .. });
        let is_pointer = matches!(operand, Operand::Deref { .. });
        match self {
            OperandKind::RegisterOnly => is_register,
            OperandKind::LiteralOnly => !is_register && !is_pointer,
            OperandKind::RegisterOrLiteral => !is_pointer,
            OperandKind::RegisterOrPointer => is_register || is_pointer,
            OperandKind::Any => true,
        }
    }
}

/// Specification of one instruction: opcode plus ordered operand constraints.
#[derive(Debug, Clone)]
pub struct InstructionSpec {
    pub mnemonic: &'static str,
    pub opcode: Opcode,
    pub operands: &'static [OperandKind],
}

impl InstructionSpec {
    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }
}

use OperandKind::{Any, LiteralOnly, RegisterOnly};

const SPECS: &[InstructionSpec] = &[
    InstructionSpec {
        mnemonic: "MOV",
        opcode: Opcode::Mov,
        operands: &[Any, Any],
    },
    InstructionSpec {
        mnemonic: "MVI",
        opcode: Opcode::Mvi,
        operands: &[RegisterOnly, LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "MVIB",
        opcode: Opcode::Mvib,
        operands: &[RegisterOnly, LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "MVIW",
        opcode: Opcode::Mviw,
        operands: &[RegisterOnly, LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "MVIF",
        opcode: Opcode::Mvif,
        operands: &[RegisterOnly, LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "LDR",
        opcode: Opcode::Ldr,
        operands: &[RegisterOnly, LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "LDRB",
        opcode: Opcode::Ldrb,
        operands: &[RegisterOnly, LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "LDRW",
        opcode: Opcode::Ldrw,
        operands: &[RegisterOnly, LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "LDRF",
        opcode: Opcode::Ldrf,
        operands: &[RegisterOnly, LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "STR",
        opcode: Opcode::Str,
        operands: &[RegisterOnly, LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "STRB",
        opcode: Opcode::Strb,
        operands: &[RegisterOnly, LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "STRW",
        opcode: Opcode::Strw,
        operands: &[RegisterOnly, LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "STRF",
        opcode: Opcode::Strf,
        operands: &[RegisterOnly, LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "ADD",
        opcode: Opcode::Add,
        operands: &[RegisterOnly, Any],
    },
    InstructionSpec {
        mnemonic: "SUB",
        opcode: Opcode::Sub,
        operands: &[RegisterOnly, Any],
    },
    InstructionSpec {
        mnemonic: "MUL",
        opcode: Opcode::Mul,
        operands: &[RegisterOnly, Any],
    },
    InstructionSpec {
        mnemonic: "DIV",
        opcode: Opcode::Div,
        operands: &[RegisterOnly, Any],
    },
    InstructionSpec {
        mnemonic: "ADDF",
        opcode: Opcode::Addf,
        operands: &[RegisterOnly, Any],
    },
    InstructionSpec {
        mnemonic: "SUBF",
        opcode: Opcode::Subf,
        operands: &[RegisterOnly, Any],
    },
    InstructionSpec {
        mnemonic: "MULF",
        opcode: Opcode::Mulf,
        operands: &[RegisterOnly, Any],
    },
    InstructionSpec {
        mnemonic: "DIVF",
        opcode: Opcode::Divf,
        operands: &[RegisterOnly, Any],
    },
    InstructionSpec {
        mnemonic: "NEG",
        opcode: Opcode::Neg,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "INC",
        opcode: Opcode::Inc,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "DEC",
        opcode: Opcode::Dec,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "AND",
        opcode: Opcode::And,
        operands: &[RegisterOnly, Any],
    },
    InstructionSpec {
        mnemonic: "OR",
        opcode: Opcode::Or,
        operands: &[RegisterOnly, RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "XOR",
        opcode: Opcode::Xor,
        operands: &[RegisterOnly, RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "NOT",
        opcode: Opcode::Not,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "LSH",
        opcode: Opcode::Lsh,
        operands: &[RegisterOnly, Any],
    },
    InstructionSpec {
        mnemonic: "RSH",
        opcode: Opcode::Rsh,
        operands: &[RegisterOnly, Any],
    },
    InstructionSpec {
        mnemonic: "CMP",
        opcode: Opcode::Cmp,
        operands: &[RegisterOnly, RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "CMPZ",
        opcode: Opcode::Cmpz,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "SETE",
        opcode: Opcode::Sete,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "SETNE",
        opcode: Opcode::Setne,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "SETLT",
        opcode: Opcode::Setlt,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "SETLTE",
        opcode: Opcode::Setlte,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "SETGT",
        opcode: Opcode::Setgt,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "SETGTE",
        opcode: Opcode::Setgte,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "TRUNCF",
        opcode: Opcode::Truncf,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "SWAP",
        opcode: Opcode::Swap,
        operands: &[RegisterOnly, RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "PUSH",
        opcode: Opcode::Push,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "POP",
        opcode: Opcode::Pop,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "JMP",
        opcode: Opcode::Jmp,
        operands: &[LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "JMR",
        opcode: Opcode::Jmr,
        operands: &[RegisterOnly],
    },
    InstructionSpec {
        mnemonic: "JEQ",
        opcode: Opcode::Jeq,
        operands: &[LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "JNE",
        opcode: Opcode::Jne,
        operands: &[LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "JGE",
        opcode: Opcode::Jge,
        operands: &[LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "JLT",
        opcode: Opcode::Jlt,
        operands: &[LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "JNZ",
        opcode: Opcode::Jnz,
        operands: &[LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "CALL",
        opcode: Opcode::Call,
        operands: &[LiteralOnly],
    },
    InstructionSpec {
        mnemonic: "RET",
        opcode: Opcode::Ret,
        operands: &[],
    },
    InstructionSpec {
        mnemonic: "LOOP",
        opcode: Opcode::Loop,
        operands: &[RegisterOnly, LiteralOnly],
    },
    // INT takes no assembly operands; the interrupt id and parameter count
    // travel on the stack.
    InstructionSpec {
        mnemonic: "INT",
        opcode: Opcode::Int,
        operands: &[],
    },
    InstructionSpec {
        mnemonic: "HALT",
        opcode: Opcode::Halt,
        operands: &[],
    },
];

/// Lookup table over the static specifications, keyed by uppercased
/// mnemonic. Built once and passed by reference.
pub struct SpecTable {
    by_mnemonic: HashMap<&'static str, &'static InstructionSpec>,
}

impl SpecTable {
    pub fn new() -> Self {
        let mut by_mnemonic = HashMap::with_capacity(SPECS.len());
        for spec in SPECS {
            by_mnemonic.insert(spec.mnemonic, spec);
        }
        Self { by_mnemonic }
    }

    pub fn lookup(&self, mnemonic: &str) -> Option<&'static InstructionSpec> {
        self.by_mnemonic
            .get(mnemonic.to_ascii_uppercase().as_str())
            .copied()
    }

    pub fn specs(&self) -> &'static [InstructionSpec] {
        SPECS
    }

    /// Every opcode must have exactly one specification. Called once at
    /// engine construction.
    pub fn assert_complete(&self) {
        for opcode in Opcode::ALL {
            let count = SPECS.iter().filter(|spec| spec.opcode == *opcode).count();
            assert!(
                count == 1,
                "opcode {opcode:?} has {count} specification entries"
            );
        }
        assert_eq!(SPECS.len(), Opcode::ALL.len());
    }
}

impl Default for SpecTable {
    fn default() -> Self {
        Self::new()
    }
}
