// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Fetch-decode-execute engine.
//!
//! `step()` performs one cycle against the register bank, flags and memory,
//! dispatching through an exhaustive match over the closed opcode set.
//! HALT is the one expected terminal signal and is reported as
//! [`StepResult::Halted`], distinct from an [`ExecError`] fault.

use std::collections::HashMap;
use std::fmt;

use crate::codec::{CodecError, CodecKind, FieldValue, Instruction, InstructionCodec, Opcode};
use crate::vm::memory::{Memory, MemoryError, Region};
use crate::vm::registers::{Flags, RegisterBank};

/// Execution fault. Fatal to the run; HALT is not an error.
#[derive(Debug, Clone)]
pub struct ExecError {
    pub message: String,
}

impl ExecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExecError {}

impl From<MemoryError> for ExecError {
    fn from(err: MemoryError) -> Self {
        ExecError::new(err.message)
    }
}

impl From<CodecError> for ExecError {
    fn from(err: CodecError) -> Self {
        ExecError::new(err.message)
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Continue,
    Halted,
}

/// Builtin invoked by the INT executor: parameters in, result out (stored
/// in R1).
pub type Builtin = Box<dyn FnMut(&[i64]) -> i64>;

/// Host callback for the second, independent interrupt seam; see
/// [`Cpu::add_interrupt`].
pub type InterruptHandler = Box<dyn FnMut(&mut RegisterBank, &mut Memory)>;

pub struct Cpu {
    pub registers: RegisterBank,
    pub flags: Flags,
    pub memory: Memory,
    codec: Box<dyn InstructionCodec>,
    builtins: HashMap<u32, Builtin>,
    interrupts: HashMap<u32, InterruptHandler>,
}

impl Cpu {
    pub fn new(memory: Memory, codec: CodecKind) -> Self {
        let capacity = memory.capacity() as u32;
        Self {
            registers: RegisterBank::new(capacity),
            flags: Flags::default(),
            memory,
            codec: codec.build(),
            builtins: HashMap::new(),
            interrupts: HashMap::new(),
        }
    }

    /// Load a machine-code buffer at `base`, install its read-only regions,
    /// and point IP at the first byte.
    pub fn load_program(
        &mut self,
        code: &[u8],
        base: u32,
        regions: &[Region],
    ) -> Result<(), ExecError> {
        self.memory.blit(base, code)?;
        for region in regions {
            self.memory.add_region(*region);
        }
        self.registers.set_ip(i64::from(base));
        Ok(())
    }

    /// Register a builtin for the INT executor's stack-calling convention.
    /// This is the seam the INT opcode consults.
    pub fn register_builtin(&mut self, id: u32, builtin: Builtin) {
        self.builtins.insert(id, builtin);
    }

    /// Register a host interrupt callback. This table is independent of the
    /// INT builtin table: the INT executor never consults it, only
    /// [`Cpu::interrupt`] does.
    pub fn add_interrupt(&mut self, number: u32, handler: InterruptHandler) {
        self.interrupts.insert(number, handler);
    }

    /// Invoke a host interrupt callback registered with
    /// [`Cpu::add_interrupt`].
    pub fn interrupt(&mut self, number: u32) -> Result<(), ExecError> {
        let mut handler = self
            .interrupts
            .remove(&number)
            .ok_or_else(|| ExecError::new(format!("no interrupt handler for {number}")))?;
        handler(&mut self.registers, &mut self.memory);
        self.interrupts.insert(number, handler);
        Ok(())
    }

    /// One fetch-decode-execute cycle.
    pub fn step(&mut self) -> Result<StepResult, ExecError> {
        let ip = to_addr(self.registers.ip(), "instruction pointer")?;
        let inst = self.codec.decode(self.memory.bytes(), ip as usize)?;
        self.registers.set_ip(i64::from(ip) + inst.length as i64);
        self.execute(&inst)
    }

    /// Drive the step loop until HALT. `max_steps` bounds runaway programs;
    /// exceeding it is a fault, not a normal termination.
    pub fn run(&mut self, max_steps: u64) -> Result<u64, ExecError> {
        for steps in 0..max_steps {
            if self.step()? == StepResult::Halted {
                return Ok(steps + 1);
            }
        }
        Err(ExecError::new(format!(
            "program did not halt within {max_steps} steps"
        )))
    }

    fn execute(&mut self, inst: &Instruction) -> Result<StepResult, ExecError> {
        match inst.opcode {
            Opcode::Mov
            | Opcode::Mvi
            | Opcode::Mvib
            | Opcode::Mviw
            | Opcode::Ldr
            | Opcode::Ldrb
            | Opcode::Ldrw
            | Opcode::Str
            | Opcode::Strb
            | Opcode::Strw => {
                let width = inst.opcode.width();
                let value = self.read_src_int(inst, width)?;
                self.write_dest_int(inst, value, width)?;
            }
            Opcode::Mvif | Opcode::Ldrf | Opcode::Strf => {
                let value = self.read_src_float(inst)?;
                self.write_dest_float(inst, value)?;
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                let width = inst.opcode.width();
                let a = self.read_dest_int(inst, width)?;
                let b = self.read_src_int(inst, width)?;
                let result = match inst.opcode {
                    Opcode::Add => a.wrapping_add(b),
                    Opcode::Sub => a.wrapping_sub(b),
                    Opcode::Mul => a.wrapping_mul(b),
                    _ => {
                        if b == 0 {
                            return Err(ExecError::new("integer division by zero"));
                        }
                        a.wrapping_div(b)
                    }
                };
                let result = truncate(result, width);
                self.flags.update_int(result);
                self.write_dest_int(inst, result, width)?;
            }
            Opcode::Addf | Opcode::Subf | Opcode::Mulf | Opcode::Divf => {
                let a = self.read_dest_float(inst)?;
                let b = self.read_src_float(inst)?;
                let result = match inst.opcode {
                    Opcode::Addf => a + b,
                    Opcode::Subf => a - b,
                    Opcode::Mulf => a * b,
                    _ => a / b,
                };
                self.flags.update_float(result);
                self.write_dest_float(inst, result)?;
            }
            Opcode::Neg | Opcode::Inc | Opcode::Dec | Opcode::Not => {
                let width = inst.opcode.width();
                let a = self.read_dest_int(inst, width)?;
                let result = truncate(
                    match inst.opcode {
                        Opcode::Neg => a.wrapping_neg(),
                        Opcode::Inc => a.wrapping_add(1),
                        Opcode::Dec => a.wrapping_sub(1),
                        _ => !a,
                    },
                    width,
                );
                self.flags.update_int(result);
                self.write_dest_int(inst, result, width)?;
            }
            Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Lsh | Opcode::Rsh => {
                let width = inst.opcode.width();
                let a = self.read_dest_int(inst, width)?;
                let b = self.read_src_int(inst, width)?;
                let shift = (b & 0x1F) as u32;
                let result = truncate(
                    match inst.opcode {
                        Opcode::And => a & b,
                        Opcode::Or => a | b,
                        Opcode::Xor => a ^ b,
                        Opcode::Lsh => a.wrapping_shl(shift),
                        _ => a.wrapping_shr(shift),
                    },
                    width,
                );
                self.flags.update_int(result);
                self.write_dest_int(inst, result, width)?;
            }
            Opcode::Cmp => {
                let width = inst.opcode.width();
                let a = self.read_dest_int(inst, width)?;
                let b = self.read_src_int(inst, width)?;
                self.flags.update_int(truncate(a.wrapping_sub(b), width));
            }
            Opcode::Cmpz => {
                let value = truncate(self.registers.get(inst.dest_reg), 4);
                self.flags.update_int(value);
            }
            Opcode::Sete
            | Opcode::Setne
            | Opcode::Setlt
            | Opcode::Setlte
            | Opcode::Setgt
            | Opcode::Setgte => {
                let flags = self.flags;
                let set = match inst.opcode {
                    Opcode::Sete => flags.zero,
                    Opcode::Setne => !flags.zero,
                    Opcode::Setlt => flags.negative,
                    Opcode::Setlte => flags.negative || flags.zero,
                    Opcode::Setgt => !flags.negative && !flags.zero,
                    _ => !flags.negative,
                };
                self.registers.set(inst.dest_reg, i64::from(set));
            }
            Opcode::Truncf => {
                let value = self.registers.get_float(inst.dest_reg);
                self.registers.set(inst.dest_reg, value as i64);
            }
            Opcode::Swap => {
                let a = self.registers.get(inst.dest_reg);
                let b = self.registers.get(inst.src_reg);
                self.registers.set(inst.dest_reg, b);
                self.registers.set(inst.src_reg, a);
            }
            Opcode::Push => {
                let value = truncate(self.registers.get(inst.dest_reg), 4);
                self.push_u32(value as u32)?;
            }
            Opcode::Pop => {
                let value = self.pop_u32()?;
                self.registers.set(inst.dest_reg, i64::from(value as i32));
            }
            Opcode::Jmp => {
                self.registers.set_ip(field_int(inst.dest_field)?);
            }
            Opcode::Jmr => {
                self.registers.set_ip(self.registers.get(inst.dest_reg));
            }
            Opcode::Jeq => self.branch_if(self.flags.zero, inst)?,
            Opcode::Jne => self.branch_if(!self.flags.zero, inst)?,
            Opcode::Jge => self.branch_if(!self.flags.negative, inst)?,
            Opcode::Jlt => self.branch_if(self.flags.negative, inst)?,
            Opcode::Jnz => self.branch_if(!self.flags.zero, inst)?,
            Opcode::Call => {
                let target = field_int(inst.dest_field)?;
                let return_addr = to_addr(self.registers.ip(), "return address")?;
                self.push_u32(return_addr)?;
                self.registers.set_ip(target);
            }
            Opcode::Ret => {
                let return_addr = self.pop_u32()?;
                self.registers.set_ip(i64::from(return_addr));
            }
            Opcode::Loop => {
                // Branch only while the post-decrement value is strictly
                // positive: a counter starting at 1 falls straight through.
                let value = truncate(self.registers.get(inst.dest_reg).wrapping_sub(1), 4);
                self.registers.set(inst.dest_reg, value);
                if value > 0 {
                    self.registers.set_ip(field_int(inst.src_field)?);
                }
            }
            Opcode::Int => self.execute_int()?,
            Opcode::Halt => return Ok(StepResult::Halted),
        }
        Ok(StepResult::Continue)
    }

    /// INT ignores any decoded operand field. The interrupt id sits at
    /// `[SP]`, the parameter count at `[SP+4]`, and that many 4-byte
    /// parameters follow. The builtin's result lands in R1.
    fn execute_int(&mut self) -> Result<(), ExecError> {
        let sp = to_addr(self.registers.sp(), "stack pointer")?;
        let id = self.memory.read_u32(sp)?;
        let count = self.memory.read_u32(sp + 4)?;
        let mut params = Vec::with_capacity(count as usize);
        for ix in 0..count {
            params.push(i64::from(self.memory.read_u32(sp + 8 + 4 * ix)? as i32));
        }
        let builtin = self
            .builtins
            .get_mut(&id)
            .ok_or_else(|| ExecError::new(format!("invalid interrupt id {id}")))?;
        let result = builtin(&params);
        self.registers.set(1, result);
        Ok(())
    }

    fn branch_if(&mut self, condition: bool, inst: &Instruction) -> Result<(), ExecError> {
        if condition {
            self.registers.set_ip(field_int(inst.dest_field)?);
        }
        Ok(())
    }

    fn push_u32(&mut self, value: u32) -> Result<(), ExecError> {
        let sp = self.registers.sp() - 4;
        let addr = to_addr(sp, "stack pointer")?;
        self.memory.write_u32(addr, value)?;
        self.registers.set_sp(sp);
        Ok(())
    }

    fn pop_u32(&mut self) -> Result<u32, ExecError> {
        let addr = to_addr(self.registers.sp(), "stack pointer")?;
        let value = self.memory.read_u32(addr)?;
        self.registers.set_sp(self.registers.sp() + 4);
        Ok(value)
    }

    fn read_src_int(&self, inst: &Instruction, width: usize) -> Result<i64, ExecError> {
        self.read_int(
            inst.mode.src_register,
            inst.mode.src_pointer,
            inst.src_reg,
            inst.src_field,
            width,
        )
    }

    fn read_dest_int(&self, inst: &Instruction, width: usize) -> Result<i64, ExecError> {
        self.read_int(
            inst.mode.dest_register,
            inst.mode.dest_pointer,
            inst.dest_reg,
            inst.dest_field,
            width,
        )
    }

    /// Addressing-mode resolution for a read endpoint: register+pointer is
    /// memory at `register + offset`; register alone is the raw cell,
    /// width-truncated; pointer alone is memory at the absolute field;
    /// neither makes the field itself the literal.
    fn read_int(
        &self,
        is_register: bool,
        is_pointer: bool,
        reg: u8,
        field: FieldValue,
        width: usize,
    ) -> Result<i64, ExecError> {
        if is_register && is_pointer {
            let addr = to_addr(self.registers.get(reg) + field_int(field)?, "effective address")?;
            self.read_mem_int(addr, width)
        } else if is_register {
            Ok(truncate(self.registers.get(reg), width))
        } else if is_pointer {
            let addr = to_addr(field_int(field)?, "absolute address")?;
            self.read_mem_int(addr, width)
        } else {
            field_int(field)
        }
    }

    fn write_dest_int(&mut self, inst: &Instruction, value: i64, width: usize) -> Result<(), ExecError> {
        let mode = inst.mode;
        if mode.dest_register && mode.dest_pointer {
            let addr = to_addr(
                self.registers.get(inst.dest_reg) + field_int(inst.dest_field)?,
                "effective address",
            )?;
            self.write_mem_int(addr, value, width)
        } else if mode.dest_register {
            self.registers.set(inst.dest_reg, truncate(value, width));
            Ok(())
        } else {
            // A non-register write endpoint is an absolute address.
            let addr = to_addr(field_int(inst.dest_field)?, "absolute address")?;
            self.write_mem_int(addr, value, width)
        }
    }

    fn read_src_float(&self, inst: &Instruction) -> Result<f64, ExecError> {
        let mode = inst.mode;
        if mode.src_register && mode.src_pointer {
            let addr = to_addr(
                self.registers.get(inst.src_reg) + field_int(inst.src_field)?,
                "effective address",
            )?;
            Ok(self.memory.read_f64(addr)?)
        } else if mode.src_register {
            Ok(self.registers.get_float(inst.src_reg))
        } else if mode.src_pointer {
            let addr = to_addr(field_int(inst.src_field)?, "absolute address")?;
            Ok(self.memory.read_f64(addr)?)
        } else {
            Ok(match inst.src_field {
                FieldValue::Float(v) => v,
                FieldValue::Int(v) => v as f64,
            })
        }
    }

    fn write_dest_float(&mut self, inst: &Instruction, value: f64) -> Result<(), ExecError> {
        let mode = inst.mode;
        if mode.dest_register && mode.dest_pointer {
            let addr = to_addr(
                self.registers.get(inst.dest_reg) + field_int(inst.dest_field)?,
                "effective address",
            )?;
            Ok(self.memory.write_f64(addr, value)?)
        } else if mode.dest_register {
            self.registers.set_float(inst.dest_reg, value);
            Ok(())
        } else {
            let addr = to_addr(field_int(inst.dest_field)?, "absolute address")?;
            Ok(self.memory.write_f64(addr, value)?)
        }
    }

    fn read_dest_float(&self, inst: &Instruction) -> Result<f64, ExecError> {
        let mode = inst.mode;
        if mode.dest_register && mode.dest_pointer {
            let addr = to_addr(
                self.registers.get(inst.dest_reg) + field_int(inst.dest_field)?,
                "effective address",
            )?;
            Ok(self.memory.read_f64(addr)?)
        } else if mode.dest_register {
            Ok(self.registers.get_float(inst.dest_reg))
        } else {
            Ok(match inst.dest_field {
                FieldValue::Float(v) => v,
                FieldValue::Int(v) => v as f64,
            })
        }
    }

    fn read_mem_int(&self, addr: u32, width: usize) -> Result<i64, ExecError> {
        Ok(match width {
            1 => i64::from(self.memory.read_u8(addr)? as i8),
            2 => i64::from(self.memory.read_u16(addr)? as i16),
            4 => i64::from(self.memory.read_u32(addr)? as i32),
            other => return Err(ExecError::new(format!("unsupported access width {other}"))),
        })
    }

    fn write_mem_int(&mut self, addr: u32, value: i64, width: usize) -> Result<(), ExecError> {
        match width {
            1 => self.memory.write_u8(addr, value as u8)?,
            2 => self.memory.write_u16(addr, value as u16)?,
            4 => self.memory.write_u32(addr, value as u32)?,
            other => return Err(ExecError::new(format!("unsupported access width {other}"))),
        }
        Ok(())
    }
}

fn field_int(field: FieldValue) -> Result<i64, ExecError> {
    field
        .as_int()
        .ok_or_else(|| ExecError::new("expected an integer field"))
}

fn to_addr(value: i64, what: &str) -> Result<u32, ExecError> {
    u32::try_from(value).map_err(|_| ExecError::new(format!("{what} {value} out of range")))
}

/// Sign-extending truncation to the operation width.
fn truncate(value: i64, width: usize) -> i64 {
    match width {
        1 => i64::from(value as i8),
        2 => i64::from(value as i16),
        4 => i64::from(value as i32),
        _ => value,
    }
}
