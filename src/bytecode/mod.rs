/*!
 * Bytecode
 * Compact instruction streams and their disassembly
 */

mod codec;
mod opcode;

pub use codec::{decode_at, encode, make, read_operands, read_u16, read_u8};
pub use opcode::{lookup, CodecError, CodecResult, Definition, Opcode};

use serde::{Deserialize, Serialize};
use std::fmt;

/// An assembled instruction stream
///
/// Ordered and logically immutable once assembled; the CALC countdown is
/// the one sanctioned in-place mutation, through `as_bytes_mut`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructions(Vec<u8>);

impl Instructions {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Append one encoded instruction
    pub fn append(&mut self, encoded: Vec<u8>) {
        self.0.extend(encoded);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

fn fmt_instruction(def: &Definition, operands: &[u32]) -> String {
    let operand_count = def.widths.len();

    if operands.len() != operand_count {
        return format!(
            "ERROR: operand len {} does not match defined {}",
            operands.len(),
            operand_count
        );
    }

    match operand_count {
        0 => def.name.to_string(),
        1 => format!("{} {}", def.name, operands[0]),
        2 => format!("{} {} {}", def.name, operands[0], operands[1]),
        _ => format!("ERROR: unhandled operand count for {}", def.name),
    }
}

impl fmt::Display for Instructions {
    /// Disassemble as `OFFSET OPNAME OPERANDS...`, one instruction per line
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut offset = 0;
        while offset < self.0.len() {
            match lookup(self.0[offset]) {
                Err(err) => {
                    writeln!(f, "{:04} ERROR: {}", offset, err)?;
                    offset += 1;
                }
                Ok(def) => {
                    let (operands, read) = read_operands(def, &self.0[offset + 1..]);
                    writeln!(f, "{:04} {}", offset, fmt_instruction(def, &operands))?;
                    offset += 1 + read;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disassembly_renders_offsets_and_mnemonics() {
        let mut ins = Instructions::new();
        ins.append(encode(Opcode::Calc, &[30]));
        ins.append(encode(Opcode::Fork, &[]));
        ins.append(encode(Opcode::Send, &[7]));

        let expected = "0000 CALC 30\n0002 FORK\n0003 SEND 7\n";
        assert_eq!(ins.to_string(), expected);
    }

    #[test]
    fn disassembly_flags_unknown_opcodes_without_stopping() {
        let mut ins = Instructions::from_bytes(vec![99]);
        ins.append(encode(Opcode::Nop, &[]));

        let out = ins.to_string();
        assert!(out.contains("0000 ERROR: opcode 99 undefined"));
        assert!(out.contains("0001 NOP"));
    }

    #[test]
    fn truncated_operand_yields_diagnostic_line() {
        // SEND declares one operand byte but the stream ends early
        let ins = Instructions::from_bytes(vec![Opcode::Send as u8]);
        let out = ins.to_string();
        assert!(out.contains("ERROR: operand len 0 does not match defined 1"));
    }
}
