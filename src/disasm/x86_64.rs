//! x86-64 instruction decoder.
//!
//! A small, fallback-heavy decoder covering the one-byte opcodes that
//! matter for listing and control-flow tagging: returns, calls, jumps,
//! stack pushes/pops, and a handful of system opcodes. Anything else
//! degrades to a `.byte 0xXX` record. Variable length; branch targets
//! are relative to the end of the instruction.

use crate::types::{
    reg_bit, BranchInfo, BranchKind, Instruction, InstructionCategory, PcRelTarget, RawEncoding,
};

const REGS64: [&str; 8] = ["rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi"];
const REGS64_EXT: [&str; 8] = ["r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15"];
const REGS32: [&str; 8] = ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi"];

const JCC_SHORT: [&str; 16] = [
    "JO", "JNO", "JB", "JAE", "JE", "JNE", "JBE", "JA", "JS", "JNS", "JP", "JNP", "JL", "JGE",
    "JLE", "JG",
];
const JCC_NEAR: [&str; 16] = [
    "JO", "JNO", "JB", "JNB", "JZ", "JNZ", "JBE", "JNBE", "JS", "JNS", "JP", "JNP", "JL", "JNL",
    "JLE", "JNLE",
];
const SETCC: [&str; 16] = [
    "SETO", "SETNO", "SETB", "SETNB", "SETZ", "SETNZ", "SETBE", "SETNBE", "SETS", "SETNS", "SETP",
    "SETNP", "SETL", "SETNL", "SETLE", "SETNLE",
];

fn read_i8(bytes: &[u8], pos: usize) -> Option<i8> {
    bytes.get(pos).map(|&b| b as i8)
}

fn read_u16(bytes: &[u8], pos: usize) -> Option<u16> {
    let b = bytes.get(pos..pos + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(bytes: &[u8], pos: usize) -> Option<u32> {
    let b = bytes.get(pos..pos + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_i32(bytes: &[u8], pos: usize) -> Option<i32> {
    read_u32(bytes, pos).map(|v| v as i32)
}

fn set_branch(inst: &mut Instruction, kind: BranchKind) {
    inst.branch = Some(BranchInfo { kind });
    inst.category = InstructionCategory::Branch;
}

fn set_relative_target(inst: &mut Instruction, address: u64, length: usize, rel: i64) {
    let offset = length as i64 + rel;
    inst.target = Some(PcRelTarget {
        target: address.wrapping_add(offset as u64),
        offset,
    });
    inst.operands = format!("0x{:x}", inst.branch_target().unwrap());
}

/// Decode the instruction at the start of `bytes`.
///
/// Always returns a record; the caller advances by its `length` (at
/// least 1). Truncated multi-byte forms degrade to the byte fallback
/// rather than reading out of bounds.
pub fn decode(bytes: &[u8], address: u64) -> Instruction {
    let mut inst = Instruction::new(address, RawEncoding::Bytes(Vec::new()), 1);

    let mut pos = 0usize;
    let mut rex: Option<u8> = None;
    if let Some(&b) = bytes.first() {
        if (0x40..=0x4F).contains(&b) {
            rex = Some(b);
            pos = 1;
        }
    }

    let Some(&opcode) = bytes.get(pos) else {
        inst.mnemonic = ".byte".to_string();
        inst.operands = format!("0x{:02X}", bytes.first().copied().unwrap_or(0));
        inst.category = InstructionCategory::Unknown;
        inst.raw = RawEncoding::Bytes(bytes.get(..1).unwrap_or(&[0]).to_vec());
        return inst;
    };
    pos += 1;

    let mut length = pos;

    match opcode {
        0xC3 => {
            inst.mnemonic = "RET".to_string();
            set_branch(&mut inst, BranchKind::Return);
            inst.is_function_end = true;
        }
        0xCB => {
            inst.mnemonic = "RETF".to_string();
            set_branch(&mut inst, BranchKind::Return);
            inst.is_function_end = true;
        }
        0xC2 => {
            inst.mnemonic = "RET".to_string();
            if let Some(imm) = read_u16(bytes, pos) {
                inst.operands = format!("0x{:x}", imm);
                length = pos + 2;
            }
            set_branch(&mut inst, BranchKind::Return);
            inst.is_function_end = true;
        }
        0x90 => {
            inst.mnemonic = "NOP".to_string();
            inst.category = InstructionCategory::DataProcessing;
        }
        0xCC => {
            inst.mnemonic = "INT3".to_string();
            inst.category = InstructionCategory::System;
        }
        0xF4 => {
            inst.mnemonic = "HLT".to_string();
            inst.category = InstructionCategory::System;
        }
        0xC9 => {
            inst.mnemonic = "LEAVE".to_string();
            inst.category = InstructionCategory::DataProcessing;
        }
        0x9C => {
            inst.mnemonic = if rex.is_some() { "PUSHFQ" } else { "PUSHF" }.to_string();
            inst.category = InstructionCategory::DataProcessing;
        }
        0x9D => {
            inst.mnemonic = if rex.is_some() { "POPFQ" } else { "POPF" }.to_string();
            inst.category = InstructionCategory::DataProcessing;
        }
        0x99 => {
            inst.mnemonic = if rex.is_some() { "CQO" } else { "CDQ" }.to_string();
            inst.category = InstructionCategory::DataProcessing;
        }
        0xF5 => {
            inst.mnemonic = "CMC".to_string();
            inst.category = InstructionCategory::DataProcessing;
        }
        0xF8 => {
            inst.mnemonic = "CLC".to_string();
            inst.category = InstructionCategory::DataProcessing;
        }
        0xF9 => {
            inst.mnemonic = "STC".to_string();
            inst.category = InstructionCategory::DataProcessing;
        }
        0x50..=0x57 | 0x58..=0x5F => {
            let is_push = opcode < 0x58;
            let base = if is_push { 0x50 } else { 0x58 };
            let ext = rex.map_or(false, |r| r & 0x01 != 0);
            let idx = (opcode - base) as usize;
            let reg_index = if ext { idx + 8 } else { idx } as u8;

            inst.mnemonic = if is_push { "PUSH" } else { "POP" }.to_string();
            inst.operands = if ext { REGS64_EXT[idx] } else { REGS64[idx] }.to_string();
            inst.category = InstructionCategory::DataProcessing;
            if is_push {
                inst.regs_read |= reg_bit(reg_index);
            } else {
                inst.regs_written |= reg_bit(reg_index);
            }
        }
        0xE9 => {
            if let Some(rel) = read_i32(bytes, pos) {
                inst.mnemonic = "JMP".to_string();
                length = pos + 4;
                set_relative_target(&mut inst, address, length, rel as i64);
                set_branch(&mut inst, BranchKind::Unconditional);
                inst.updates_pc = true;
            } else {
                byte_fallback(&mut inst, opcode);
            }
        }
        0xEB => {
            if let Some(rel) = read_i8(bytes, pos) {
                inst.mnemonic = "JMP".to_string();
                length = pos + 1;
                set_relative_target(&mut inst, address, length, rel as i64);
                set_branch(&mut inst, BranchKind::Unconditional);
                inst.updates_pc = true;
            } else {
                byte_fallback(&mut inst, opcode);
            }
        }
        0xE8 => {
            if let Some(rel) = read_i32(bytes, pos) {
                inst.mnemonic = "CALL".to_string();
                length = pos + 4;
                set_relative_target(&mut inst, address, length, rel as i64);
                set_branch(&mut inst, BranchKind::Call);
                inst.updates_pc = true;
            } else {
                byte_fallback(&mut inst, opcode);
            }
        }
        0x70..=0x7F => {
            if let Some(rel) = read_i8(bytes, pos) {
                inst.mnemonic = JCC_SHORT[(opcode - 0x70) as usize].to_string();
                length = pos + 1;
                set_relative_target(&mut inst, address, length, rel as i64);
                set_branch(&mut inst, BranchKind::Conditional);
                inst.updates_pc = true;
            } else {
                byte_fallback(&mut inst, opcode);
            }
        }
        0x0F => match bytes.get(pos) {
            Some(&opcode2) if (0x80..=0x8F).contains(&opcode2) => {
                if let Some(rel) = read_i32(bytes, pos + 1) {
                    inst.mnemonic = JCC_NEAR[(opcode2 - 0x80) as usize].to_string();
                    length = pos + 5;
                    set_relative_target(&mut inst, address, length, rel as i64);
                    set_branch(&mut inst, BranchKind::Conditional);
                    inst.updates_pc = true;
                } else {
                    two_byte_fallback(&mut inst, opcode2);
                    length = pos + 1;
                }
            }
            Some(&opcode2) if (0x90..=0x9F).contains(&opcode2) => {
                inst.mnemonic = SETCC[(opcode2 - 0x90) as usize].to_string();
                inst.operands = "r/m8".to_string();
                inst.category = InstructionCategory::DataProcessing;
                length = pos + 2;
            }
            Some(&0x0B) => {
                inst.mnemonic = "UD2".to_string();
                inst.category = InstructionCategory::System;
                length = pos + 1;
            }
            Some(&opcode2) => {
                two_byte_fallback(&mut inst, opcode2);
                length = pos + 1;
            }
            None => byte_fallback(&mut inst, opcode),
        },
        0xB8..=0xBF => {
            if let Some(imm) = read_u32(bytes, pos) {
                inst.mnemonic = "MOV".to_string();
                inst.operands = format!("{}, 0x{:08X}", REGS32[(opcode - 0xB8) as usize], imm);
                inst.category = InstructionCategory::DataProcessing;
                length = pos + 4;
            } else {
                byte_fallback(&mut inst, opcode);
            }
        }
        0xCD => {
            if let Some(&imm) = bytes.get(pos) {
                inst.mnemonic = "INT".to_string();
                inst.operands = format!("0x{:02X}", imm);
                inst.category = InstructionCategory::System;
                length = pos + 1;
            } else {
                byte_fallback(&mut inst, opcode);
            }
        }
        _ => byte_fallback(&mut inst, opcode),
    }

    inst.length = length.clamp(1, 15) as u8;
    inst.raw = RawEncoding::Bytes(bytes[..(inst.length as usize).min(bytes.len())].to_vec());
    inst
}

fn byte_fallback(inst: &mut Instruction, opcode: u8) {
    inst.mnemonic = ".byte".to_string();
    inst.operands = format!("0x{:02X}", opcode);
    inst.category = InstructionCategory::Unknown;
}

fn two_byte_fallback(inst: &mut Instruction, opcode2: u8) {
    inst.mnemonic = ".byte".to_string();
    inst.operands = format!("0x0F 0x{:02X}", opcode2);
    inst.category = InstructionCategory::Unknown;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ret() {
        let inst = decode(&[0xC3], 0x1000);
        assert_eq!(inst.mnemonic, "RET");
        assert_eq!(inst.length, 1);
        assert_eq!(inst.branch_kind(), Some(BranchKind::Return));
        assert!(inst.is_function_end);
    }

    #[test]
    fn test_ret_imm16() {
        let inst = decode(&[0xC2, 0x08, 0x00], 0x1000);
        assert_eq!(inst.mnemonic, "RET");
        assert_eq!(inst.operands, "0x8");
        assert_eq!(inst.length, 3);
    }

    #[test]
    fn test_call_rel32() {
        let inst = decode(&[0xE8, 0x01, 0x00, 0x00, 0x00], 0x1000);
        assert_eq!(inst.mnemonic, "CALL");
        assert_eq!(inst.branch_kind(), Some(BranchKind::Call));
        assert_eq!(inst.branch_target(), Some(0x1006));
        assert_eq!(inst.length, 5);
        assert!(inst.updates_pc);
    }

    #[test]
    fn test_jmp_rel8_backward() {
        let inst = decode(&[0xEB, 0xFE], 0x1000);
        assert_eq!(inst.mnemonic, "JMP");
        assert_eq!(inst.branch_target(), Some(0x1000));
        assert_eq!(inst.branch_offset(), 0);
    }

    #[test]
    fn test_jcc_rel8() {
        let inst = decode(&[0x74, 0x10], 0x1000);
        assert_eq!(inst.mnemonic, "JE");
        assert_eq!(inst.branch_kind(), Some(BranchKind::Conditional));
        assert_eq!(inst.branch_target(), Some(0x1012));
        assert_eq!(inst.length, 2);
    }

    #[test]
    fn test_jcc_rel32() {
        let inst = decode(&[0x0F, 0x84, 0x10, 0x00, 0x00, 0x00], 0x1000);
        assert_eq!(inst.mnemonic, "JZ");
        assert_eq!(inst.branch_target(), Some(0x1016));
        assert_eq!(inst.length, 6);
    }

    #[test]
    fn test_branch_target_invariant() {
        let inst = decode(&[0xE9, 0xF0, 0xFF, 0xFF, 0xFF], 0x2000);
        let target = inst.target.unwrap();
        assert_eq!(target.target, 0x2000u64.wrapping_add(target.offset as u64));
    }

    #[test]
    fn test_push_pop() {
        let push = decode(&[0x55], 0x1000);
        assert_eq!(push.mnemonic, "PUSH");
        assert_eq!(push.operands, "rbp");
        assert_ne!(push.regs_read & reg_bit(5), 0);

        let pop = decode(&[0x5D], 0x1000);
        assert_eq!(pop.mnemonic, "POP");
        assert_eq!(pop.operands, "rbp");
        assert_ne!(pop.regs_written & reg_bit(5), 0);
    }

    #[test]
    fn test_push_rex_extended() {
        let inst = decode(&[0x41, 0x55], 0x1000);
        assert_eq!(inst.mnemonic, "PUSH");
        assert_eq!(inst.operands, "r13");
        assert_eq!(inst.length, 2);
        assert_ne!(inst.regs_read & reg_bit(13), 0);
    }

    #[test]
    fn test_mov_imm32() {
        let inst = decode(&[0xB8, 0x78, 0x56, 0x34, 0x12], 0x1000);
        assert_eq!(inst.mnemonic, "MOV");
        assert_eq!(inst.operands, "eax, 0x12345678");
        assert_eq!(inst.length, 5);
    }

    #[test]
    fn test_nop_and_system() {
        assert_eq!(decode(&[0x90], 0x1000).mnemonic, "NOP");
        assert_eq!(decode(&[0xCC], 0x1000).mnemonic, "INT3");
        assert_eq!(decode(&[0xF4], 0x1000).mnemonic, "HLT");
        assert_eq!(decode(&[0x0F, 0x0B], 0x1000).mnemonic, "UD2");
    }

    #[test]
    fn test_pushfq_with_rex() {
        let inst = decode(&[0x48, 0x9C], 0x1000);
        assert_eq!(inst.mnemonic, "PUSHFQ");
        assert_eq!(inst.length, 2);
    }

    #[test]
    fn test_int_imm8() {
        let inst = decode(&[0xCD, 0x80], 0x1000);
        assert_eq!(inst.mnemonic, "INT");
        assert_eq!(inst.operands, "0x80");
        assert_eq!(inst.length, 2);
    }

    #[test]
    fn test_setcc() {
        let inst = decode(&[0x0F, 0x94, 0xC0], 0x1000);
        assert_eq!(inst.mnemonic, "SETZ");
        assert_eq!(inst.length, 3);
    }

    #[test]
    fn test_unknown_byte() {
        let inst = decode(&[0x06], 0x1000);
        assert_eq!(inst.mnemonic, ".byte");
        assert_eq!(inst.operands, "0x06");
        assert_eq!(inst.category, InstructionCategory::Unknown);
        assert_eq!(inst.length, 1);
    }

    #[test]
    fn test_truncated_call_degrades() {
        let inst = decode(&[0xE8, 0x01], 0x1000);
        assert_eq!(inst.mnemonic, ".byte");
        assert_eq!(inst.length, 1);
    }

    #[test]
    fn test_decoder_is_total() {
        for opcode in 0u8..=255 {
            let inst = decode(&[opcode, 0, 0, 0, 0, 0], 0x1000);
            assert!(!inst.mnemonic.is_empty(), "opcode 0x{:02X}", opcode);
            assert!(inst.length >= 1);
        }
    }
}
