/*!
 * Instruction Codec
 * Fixed-layout encoding and decoding of opcode + operand records
 */

use super::opcode::{lookup, CodecError, CodecResult, Definition, Opcode};

/// Encode an instruction from a raw opcode byte and its operands.
///
/// Returns an empty vector when the opcode is unknown. Missing operands
/// encode as zero; extra operands are ignored.
pub fn make(op: u8, operands: &[u32]) -> Vec<u8> {
    match Opcode::from_byte(op) {
        Some(op) => encode(op, operands),
        None => Vec::new(),
    }
}

/// Encode an instruction from a typed opcode and its operands
pub fn encode(op: Opcode, operands: &[u32]) -> Vec<u8> {
    let def = op.definition();

    let len = 1 + def.widths.iter().sum::<usize>();
    let mut instruction = Vec::with_capacity(len);
    instruction.push(op as u8);

    for (i, width) in def.widths.iter().enumerate() {
        let operand = operands.get(i).copied().unwrap_or(0);
        match width {
            1 => instruction.push(operand as u8),
            2 => instruction.extend_from_slice(&(operand as u16).to_be_bytes()),
            _ => {}
        }
    }

    instruction
}

/// Read the operands of one instruction, given its definition and the
/// bytes following the opcode. Returns the parsed values and the number
/// of bytes consumed. A truncated stream yields fewer operands than the
/// definition declares.
pub fn read_operands(def: &Definition, ins: &[u8]) -> (Vec<u32>, usize) {
    let mut operands = Vec::with_capacity(def.widths.len());
    let mut offset = 0;

    for width in def.widths {
        if offset + width > ins.len() {
            break;
        }
        match width {
            1 => operands.push(u32::from(read_u8(&ins[offset..]))),
            2 => operands.push(u32::from(read_u16(&ins[offset..]))),
            _ => {}
        }
        offset += width;
    }

    (operands, offset)
}

/// Decode the instruction at `offset`, returning the opcode, its operand
/// values, and the total number of bytes the instruction occupies.
pub fn decode_at(ins: &[u8], offset: usize) -> CodecResult<(Opcode, Vec<u32>, usize)> {
    let byte = *ins.get(offset).ok_or(CodecError::Truncated(offset))?;
    let def = lookup(byte)?;

    let (operands, read) = read_operands(def, &ins[offset + 1..]);
    if operands.len() != def.widths.len() {
        return Err(CodecError::Truncated(offset));
    }

    // from_byte cannot fail here: lookup above already resolved it
    let op = Opcode::from_byte(byte).ok_or(CodecError::UnknownOpcode(byte))?;
    Ok((op, operands, 1 + read))
}

/// Read an 8-bit operand (caller guarantees at least one byte)
pub fn read_u8(ins: &[u8]) -> u8 {
    ins[0]
}

/// Read a big-endian 16-bit operand (caller guarantees two bytes)
pub fn read_u16(ins: &[u8]) -> u16 {
    u16::from_be_bytes([ins[0], ins[1]])
}
