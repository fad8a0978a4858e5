/*!
 * Bytecode Tests
 * Round-trip and disassembly coverage for the instruction codec
 */

use os_sim::bytecode::{decode_at, encode, lookup, make, read_operands, Instructions, Opcode};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Every defined opcode survives an encode/decode round trip
#[test]
fn round_trip_all_opcodes() {
    for op in Opcode::all() {
        let def = op.definition();
        let operands: Vec<u32> = def
            .widths
            .iter()
            .enumerate()
            .map(|(i, width)| match width {
                1 => 0x40 + i as u32,
                _ => 0x1234,
            })
            .collect();

        let encoded = encode(op, &operands);
        assert_eq!(encoded.len(), 1 + def.widths.iter().sum::<usize>());

        let (decoded_op, decoded_operands, consumed) = decode_at(&encoded, 0).unwrap();
        assert_eq!(decoded_op, op);
        assert_eq!(decoded_operands, operands);
        assert_eq!(consumed, encoded.len());
    }
}

#[test]
fn make_rejects_unknown_opcode() {
    assert!(make(99, &[1, 2]).is_empty());
}

#[test]
fn make_matches_encode_for_known_opcodes() {
    assert_eq!(make(Opcode::Calc as u8, &[9]), encode(Opcode::Calc, &[9]));
}

#[test]
fn read_operands_reports_consumed_bytes() {
    let def = lookup(Opcode::Send as u8).unwrap();
    let (operands, read) = read_operands(def, &[200]);
    assert_eq!(operands, vec![200]);
    assert_eq!(read, 1);
}

#[test]
fn disassembly_walks_a_whole_program() {
    let mut program = Instructions::new();
    program.append(encode(Opcode::Calc, &[30]));
    program.append(encode(Opcode::Io, &[2]));
    program.append(encode(Opcode::Enter, &[]));
    program.append(encode(Opcode::Exit, &[]));
    program.append(encode(Opcode::Exe, &[]));

    let expected = "0000 CALC 30\n0002 IO 2\n0004 ENTER\n0005 EXIT\n0006 EXE\n";
    assert_eq!(program.to_string(), expected);
}

proptest! {
    /// Operand values round-trip for every single-operand opcode
    #[test]
    fn round_trip_operand_values(value in 0u32..=255) {
        for op in [Opcode::Calc, Opcode::Io, Opcode::Send, Opcode::Recv] {
            let encoded = encode(op, &[value]);
            let (decoded_op, operands, _) = decode_at(&encoded, 0).unwrap();
            prop_assert_eq!(decoded_op, op);
            prop_assert_eq!(&operands, &vec![value]);
        }
    }
}
