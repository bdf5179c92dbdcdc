// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Data-section layout and serialization.
//!
//! Data labels are assigned addresses sequentially in declaration order,
//! starting at the end of the encoded text section plus the base memory
//! offset, and serialized with the same little-endian widths the CPU
//! memory uses.

use crate::core::parser::DataValue;

/// A laid-out data label with its assigned absolute address.
#[derive(Debug, Clone, PartialEq)]
pub struct DataLabel {
    pub name: String,
    pub value: DataValue,
    pub size: u32,
    pub address: u32,
}

/// Byte size of one declaration: 1/2/4/8 for scalars, `2*len+2` for UTF-16
/// strings with a trailing null code unit, the declared size for buffers.
pub fn size_of(value: &DataValue) -> u32 {
    match value {
        DataValue::Buffer { size } => *size,
        DataValue::Str(text) => 2 * text.encode_utf16().count() as u32 + 2,
        DataValue::Byte(_) => 1,
        DataValue::Int16(_) => 2,
        DataValue::Int32(_) => 4,
        DataValue::Float(_) => 8,
    }
}

/// Assign addresses in declaration order starting at `start`. No two labels
/// overlap; the total size is the sum of the per-label sizes.
pub fn layout(declarations: Vec<(String, DataValue)>, start: u32) -> Vec<DataLabel> {
    let mut address = start;
    let mut labels = Vec::with_capacity(declarations.len());
    for (name, value) in declarations {
        let size = size_of(&value);
        labels.push(DataLabel {
            name,
            value,
            size,
            address,
        });
        address += size;
    }
    labels
}

/// Serialize the data region, relative to the first label's address.
pub fn serialize(labels: &[DataLabel]) -> Vec<u8> {
    let total: u32 = labels.iter().map(|label| label.size).sum();
    let mut bytes = Vec::with_capacity(total as usize);
    for label in labels {
        match &label.value {
            DataValue::Buffer { size } => bytes.extend(std::iter::repeat(0u8).take(*size as usize)),
            DataValue::Str(text) => {
                for unit in text.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_le_bytes());
                }
                bytes.extend_from_slice(&0u16.to_le_bytes());
            }
            DataValue::Byte(v) => bytes.push(*v as u8),
            DataValue::Int16(v) => bytes.extend_from_slice(&(*v as u16).to_le_bytes()),
            DataValue::Int32(v) => bytes.extend_from_slice(&(*v as u32).to_le_bytes()),
            DataValue::Float(v) => bytes.extend_from_slice(&v.to_le_bytes()),
        }
    }
    bytes
}
