/*!
 * Opcodes
 * Static definitions for the simulator instruction set
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Codec operation result
pub type CodecResult<T> = Result<T, CodecError>;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("opcode {0} undefined")]
    UnknownOpcode(u8),

    #[error("unknown mnemonic {0:?}")]
    UnknownMnemonic(String),

    #[error("truncated instruction at offset {0}")]
    Truncated(usize),
}

/// One-byte operation code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Opcode {
    /// Multi-cycle CPU burn; operand is an inline countdown
    Calc = 0,
    /// Device interaction placeholder
    Io = 1,
    /// Unconditional program exit
    Exe = 2,
    /// Spawn a child resuming at the next instruction
    Fork = 3,
    /// Enter critical section
    Enter = 4,
    /// Leave critical section
    Exit = 5,
    /// Best-effort mailbox send of the payload byte
    Send = 6,
    /// Non-blocking mailbox receive (operand reserved)
    Recv = 7,
    /// No effect
    Nop = 8,
}

/// Definition of an instruction: mnemonic plus per-operand byte widths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Definition {
    pub name: &'static str,
    pub widths: &'static [usize],
}

static DEFINITIONS: [(Opcode, Definition); 9] = [
    (Opcode::Calc, Definition { name: "CALC", widths: &[1] }),
    (Opcode::Io, Definition { name: "IO", widths: &[1] }),
    (Opcode::Exe, Definition { name: "EXE", widths: &[] }),
    (Opcode::Fork, Definition { name: "FORK", widths: &[] }),
    (Opcode::Enter, Definition { name: "ENTER", widths: &[] }),
    (Opcode::Exit, Definition { name: "EXIT", widths: &[] }),
    (Opcode::Send, Definition { name: "SEND", widths: &[1] }),
    (Opcode::Recv, Definition { name: "RECV", widths: &[1] }),
    (Opcode::Nop, Definition { name: "NOP", widths: &[] }),
];

impl Opcode {
    /// All defined opcodes, in encoding order
    pub fn all() -> impl Iterator<Item = Opcode> {
        DEFINITIONS.iter().map(|(op, _)| *op)
    }

    /// Decode a raw byte into an opcode
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        DEFINITIONS
            .iter()
            .find(|(op, _)| *op as u8 == byte)
            .map(|(op, _)| *op)
    }

    /// Resolve a mnemonic as written in template files
    pub fn from_name(name: &str) -> Option<Opcode> {
        DEFINITIONS
            .iter()
            .find(|(_, def)| def.name == name)
            .map(|(op, _)| *op)
    }

    /// Static definition for this opcode
    pub fn definition(self) -> &'static Definition {
        // The table is indexed by discriminant
        &DEFINITIONS[self as usize].1
    }
}

/// Associate a raw opcode byte with its definition
pub fn lookup(byte: u8) -> CodecResult<&'static Definition> {
    Opcode::from_byte(byte)
        .map(Opcode::definition)
        .ok_or(CodecError::UnknownOpcode(byte))
}
