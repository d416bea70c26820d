//! AArch64 instruction decoder.
//!
//! Single-word, table-driven bit-pattern decoder for the A64 subset
//! commonly met in Apple binaries: branches, basic data processing,
//! loads/stores, system instructions, and a few SIMD patterns. The
//! decoder is total — a word that matches no family degrades to a
//! `.word 0xXXXXXXXX` record rather than an error.

use crate::types::{
    reg_bit, BranchInfo, BranchKind, DisasmFlags, Instruction, InstructionCategory, PcRelTarget,
    RawEncoding, LINK_REGISTER, NZCV_ALL,
};

/// 64-bit general register names; index 31 renders as SP.
const X_REGS: [&str; 32] = [
    "X0", "X1", "X2", "X3", "X4", "X5", "X6", "X7", "X8", "X9", "X10", "X11", "X12", "X13", "X14",
    "X15", "X16", "X17", "X18", "X19", "X20", "X21", "X22", "X23", "X24", "X25", "X26", "X27",
    "X28", "X29", "X30", "SP",
];

/// 32-bit general register names; index 31 renders as WSP.
const W_REGS: [&str; 32] = [
    "W0", "W1", "W2", "W3", "W4", "W5", "W6", "W7", "W8", "W9", "W10", "W11", "W12", "W13", "W14",
    "W15", "W16", "W17", "W18", "W19", "W20", "W21", "W22", "W23", "W24", "W25", "W26", "W27",
    "W28", "W29", "W30", "WSP",
];

const CONDITIONS: [&str; 16] = [
    "EQ", "NE", "CS", "CC", "MI", "PL", "VS", "VC", "HI", "LS", "GE", "LT", "GT", "LE", "AL", "NV",
];

/// Textual name of a general register.
pub fn register_name(reg: u8, is_64bit: bool) -> &'static str {
    if reg > 31 {
        return "???";
    }
    if is_64bit {
        X_REGS[reg as usize]
    } else {
        W_REGS[reg as usize]
    }
}

/// Textual name of a condition code.
pub fn condition_name(cond: u8) -> &'static str {
    CONDITIONS.get(cond as usize).copied().unwrap_or("??")
}

/// Extract bits `[hi:lo]` of `word` (inclusive).
#[inline]
fn bits(word: u32, hi: u32, lo: u32) -> u32 {
    debug_assert!(hi >= lo && hi < 32);
    let width = hi - lo + 1;
    ((u64::from(word) >> lo) & ((1u64 << width) - 1)) as u32
}

/// Bit `pos` of `word` as a bool.
#[inline]
fn bit(word: u32, pos: u32) -> bool {
    (word >> pos) & 1 == 1
}

/// Sign-extend the low `width` bits of `value`.
#[inline]
fn sign_extend(value: u32, width: u32) -> i64 {
    let shift = 64 - width;
    ((u64::from(value) << shift) as i64) >> shift
}

fn set_pc_target(inst: &mut Instruction, address: u64, offset: i64) {
    inst.target = Some(PcRelTarget {
        target: address.wrapping_add(offset as u64),
        offset,
    });
}

fn set_branch(inst: &mut Instruction, kind: BranchKind) {
    inst.branch = Some(BranchInfo { kind });
    inst.category = InstructionCategory::Branch;
    inst.updates_pc = true;
}

/// Decode one 32-bit word at `address`.
pub fn decode(word: u32, address: u64, flags: DisasmFlags) -> Instruction {
    let mut inst = Instruction::new(address, RawEncoding::Word(word), 4);

    if !decode_word(&mut inst, word, address) {
        inst.mnemonic = ".word".to_string();
        inst.operands = format!("0x{:08X}", word);
        inst.category = InstructionCategory::Unknown;
    }

    apply_function_heuristics(&mut inst, flags);
    inst
}

fn decode_word(inst: &mut Instruction, word: u32, address: u64) -> bool {
    decode_branch_imm(inst, word, address)
        || decode_adr(inst, word, address)
        || decode_cond_branch(inst, word, address)
        || decode_cbz(inst, word, address)
        || decode_tbz(inst, word, address)
        || decode_branch_reg(inst, word)
        || decode_hint(inst, word)
        || decode_barrier(inst, word)
        || decode_sysreg_move(inst, word)
        || decode_pair(inst, word)
        || decode_load_store_imm(inst, word)
        || decode_load_literal(inst, word, address)
        || decode_load_store_unscaled(inst, word)
        || decode_add_sub_imm(inst, word)
        || decode_mov_wide(inst, word)
        || decode_logical_shifted(inst, word)
        || decode_add_sub_shifted(inst, word)
        || decode_bitfield(inst, word)
        || decode_two_source(inst, word)
        || decode_three_source(inst, word)
        || decode_cond_compare(inst, word)
        || decode_fmov(inst, word)
        || decode_group_fallback(inst, word)
}

/// B / BL (unconditional branch, imm26).
fn decode_branch_imm(inst: &mut Instruction, word: u32, address: u64) -> bool {
    let top6 = bits(word, 31, 26);
    if top6 != 0b000101 && top6 != 0b100101 {
        return false;
    }
    let is_link = bit(word, 31);
    let offset = sign_extend(bits(word, 25, 0), 26) * 4;

    inst.mnemonic = if is_link { "BL" } else { "B" }.to_string();
    set_pc_target(inst, address, offset);
    set_branch(
        inst,
        if is_link {
            BranchKind::Call
        } else {
            BranchKind::Unconditional
        },
    );
    inst.operands = format!("0x{:x}", inst.branch_target().unwrap());
    if is_link {
        inst.regs_written |= reg_bit(LINK_REGISTER);
    }
    true
}

/// ADR / ADRP (PC-relative address computation; a target without a branch).
fn decode_adr(inst: &mut Instruction, word: u32, address: u64) -> bool {
    if word & 0x9F00_0000 != 0x1000_0000 && word & 0x9F00_0000 != 0x9000_0000 {
        return false;
    }
    let is_adrp = bit(word, 31);
    let imm21 = (bits(word, 23, 5) << 2) | bits(word, 30, 29);
    let signed = sign_extend(imm21, 21);
    let rd = bits(word, 4, 0) as u8;

    let (offset, target) = if is_adrp {
        let offset = signed << 12;
        (offset, (address & !0xFFF).wrapping_add(offset as u64))
    } else {
        (signed, address.wrapping_add(signed as u64))
    };

    inst.mnemonic = if is_adrp { "ADRP" } else { "ADR" }.to_string();
    inst.operands = format!("{}, 0x{:x}", register_name(rd, true), target);
    inst.category = InstructionCategory::DataProcessing;
    inst.regs_written |= reg_bit(rd);
    inst.target = Some(PcRelTarget { target, offset });
    true
}

/// B.cond (conditional branch, imm19).
fn decode_cond_branch(inst: &mut Instruction, word: u32, address: u64) -> bool {
    if bits(word, 31, 24) != 0x54 {
        return false;
    }
    let cond = bits(word, 3, 0) as u8;
    let offset = sign_extend(bits(word, 23, 5), 19) * 4;

    inst.mnemonic = format!("B.{}", condition_name(cond));
    set_pc_target(inst, address, offset);
    set_branch(inst, BranchKind::Conditional);
    inst.operands = format!("0x{:x}", inst.branch_target().unwrap());
    true
}

/// CBZ / CBNZ (compare and branch, imm19).
fn decode_cbz(inst: &mut Instruction, word: u32, address: u64) -> bool {
    let op = bits(word, 30, 24);
    if op != 0x34 && op != 0x35 {
        return false;
    }
    let is_cbnz = bit(word, 24);
    let is_64bit = bit(word, 31);
    let rt = bits(word, 4, 0) as u8;
    let offset = sign_extend(bits(word, 23, 5), 19) * 4;

    inst.mnemonic = if is_cbnz { "CBNZ" } else { "CBZ" }.to_string();
    set_pc_target(inst, address, offset);
    set_branch(inst, BranchKind::Conditional);
    inst.operands = format!(
        "{}, 0x{:x}",
        register_name(rt, is_64bit),
        inst.branch_target().unwrap()
    );
    inst.regs_read |= reg_bit(rt);
    true
}

/// TBZ / TBNZ (test bit and branch, imm14).
fn decode_tbz(inst: &mut Instruction, word: u32, address: u64) -> bool {
    let op = bits(word, 30, 24);
    if op != 0x36 && op != 0x37 {
        return false;
    }
    let is_tbnz = bit(word, 24);
    let is_64bit = bit(word, 31);
    let rt = bits(word, 4, 0) as u8;
    let bit_pos = bits(word, 23, 19) | (bits(word, 31, 31) << 5);
    let offset = sign_extend(bits(word, 18, 5), 14) * 4;

    inst.mnemonic = if is_tbnz { "TBNZ" } else { "TBZ" }.to_string();
    set_pc_target(inst, address, offset);
    set_branch(inst, BranchKind::Conditional);
    inst.operands = format!(
        "{}, #{}, 0x{:x}",
        register_name(rt, is_64bit),
        bit_pos,
        inst.branch_target().unwrap()
    );
    inst.regs_read |= reg_bit(rt);
    true
}

/// BR / BLR / RET / BRAA (unconditional branch, register).
fn decode_branch_reg(inst: &mut Instruction, word: u32) -> bool {
    let group = bits(word, 31, 21);
    if !(0x6B0..=0x6B3).contains(&group) {
        return false;
    }
    let opc = bits(word, 22, 21);
    let rn = bits(word, 9, 5) as u8;

    inst.mnemonic = match opc {
        0 => "BR",
        1 => "BLR",
        2 => "RET",
        _ => "BRAA",
    }
    .to_string();
    // RET may name a non-default link register; always show the operand.
    inst.operands = register_name(rn, true).to_string();
    inst.regs_read |= reg_bit(rn);

    let kind = match opc {
        1 => BranchKind::Call,
        2 => BranchKind::Return,
        _ => BranchKind::Unconditional,
    };
    set_branch(inst, kind);

    if opc == 1 {
        inst.regs_written |= reg_bit(LINK_REGISTER);
    } else if opc == 2 {
        inst.is_function_end = true;
    }
    true
}

/// NOP and the other allocated hints.
fn decode_hint(inst: &mut Instruction, word: u32) -> bool {
    if word & 0xFFFF_F01F != 0xD503_201F {
        return false;
    }
    let crm = bits(word, 11, 8);
    let op2 = bits(word, 7, 5);

    inst.mnemonic = match (crm, op2) {
        (0, 0) => "NOP",
        (0, 1) => "YIELD",
        (0, 2) => "WFE",
        (0, 3) => "WFI",
        (0, 4) => "SEV",
        (0, 5) => "SEVL",
        _ => "HINT",
    }
    .to_string();
    inst.category = InstructionCategory::System;
    true
}

/// DSB / DMB / ISB memory barriers.
fn decode_barrier(inst: &mut Instruction, word: u32) -> bool {
    if word & 0xFFFF_F01F != 0xD503_301F {
        return false;
    }
    let crm = bits(word, 11, 8);
    let op2 = bits(word, 7, 5);

    inst.mnemonic = match op2 {
        4 => "DSB",
        5 => "DMB",
        6 => "ISB",
        _ => "BARRIER",
    }
    .to_string();
    inst.operands = format!("#{}", crm);
    inst.category = InstructionCategory::System;
    true
}

/// MRS / MSR with the system register rendered as S<op0>_<op1>_cN_cM_<op2>.
fn decode_sysreg_move(inst: &mut Instruction, word: u32) -> bool {
    let top12 = bits(word, 31, 20);
    if top12 != 0xD53 && top12 != 0xD51 {
        return false;
    }
    let is_read = top12 == 0xD53;
    let rt = bits(word, 4, 0) as u8;
    let op0 = 2 + bits(word, 19, 19);
    let op1 = bits(word, 18, 16);
    let crn = bits(word, 15, 12);
    let crm = bits(word, 11, 8);
    let op2 = bits(word, 7, 5);
    let sysreg = format!("S{}_{}_c{}_c{}_{}", op0, op1, crn, crm, op2);

    if is_read {
        inst.mnemonic = "MRS".to_string();
        inst.operands = format!("{}, {}", register_name(rt, true), sysreg);
        inst.regs_written |= reg_bit(rt);
    } else {
        inst.mnemonic = "MSR".to_string();
        inst.operands = format!("{}, {}", sysreg, register_name(rt, true));
        inst.regs_read |= reg_bit(rt);
    }
    inst.category = InstructionCategory::System;
    true
}

/// LDP / STP register pairs, all three addressing forms.
fn decode_pair(inst: &mut Instruction, word: u32) -> bool {
    let group = bits(word, 31, 22);
    if !(0x290..=0x2BF).contains(&group) {
        return false;
    }
    let is_load = bit(word, 22);
    let is_64bit = bit(word, 31);
    let rt = bits(word, 4, 0) as u8;
    let rt2 = bits(word, 14, 10) as u8;
    let rn = bits(word, 9, 5) as u8;
    let offset = sign_extend(bits(word, 21, 15), 7) * if is_64bit { 8 } else { 4 };

    inst.mnemonic = if is_load { "LDP" } else { "STP" }.to_string();

    let rt_name = register_name(rt, is_64bit);
    let rt2_name = register_name(rt2, is_64bit);
    let rn_name = register_name(rn, true);
    inst.operands = match bits(word, 24, 23) {
        0x3 => format!("{}, {}, [{}, #{}]!", rt_name, rt2_name, rn_name, offset),
        0x1 => format!("{}, {}, [{}], #{}", rt_name, rt2_name, rn_name, offset),
        _ => format!("{}, {}, [{}, #{}]", rt_name, rt2_name, rn_name, offset),
    };
    inst.category = InstructionCategory::LoadStore;

    if is_load {
        inst.regs_written |= reg_bit(rt) | reg_bit(rt2);
        inst.regs_read |= reg_bit(rn);
    } else {
        inst.regs_read |= reg_bit(rt) | reg_bit(rt2) | reg_bit(rn);
    }
    true
}

/// LDR / STR with unsigned scaled immediate.
fn decode_load_store_imm(inst: &mut Instruction, word: u32) -> bool {
    let top8 = bits(word, 31, 24);
    if top8 != 0xB9 && top8 != 0xF9 && top8 != 0x39 && top8 != 0x79 {
        return false;
    }
    let size = bits(word, 31, 30);
    let is_load = bit(word, 22);
    let is_64bit = size == 0x3;
    let rt = bits(word, 4, 0) as u8;
    let rn = bits(word, 9, 5) as u8;
    let offset = bits(word, 21, 10) << size;

    inst.mnemonic = if is_load { "LDR" } else { "STR" }.to_string();
    inst.operands = format!(
        "{}, [{}, #{}]",
        register_name(rt, is_64bit),
        register_name(rn, true),
        offset
    );
    inst.category = InstructionCategory::LoadStore;
    if is_load {
        inst.regs_written |= reg_bit(rt);
        inst.regs_read |= reg_bit(rn);
    } else {
        inst.regs_read |= reg_bit(rt) | reg_bit(rn);
    }
    true
}

/// LDR (literal) — PC-relative load.
fn decode_load_literal(inst: &mut Instruction, word: u32, address: u64) -> bool {
    let top8 = bits(word, 31, 24);
    if top8 != 0x18 && top8 != 0x58 && top8 != 0x98 && top8 != 0xD8 {
        return false;
    }
    let rt = bits(word, 4, 0) as u8;
    let offset = sign_extend(bits(word, 23, 5), 19) * 4;
    let target = address.wrapping_add(offset as u64);

    inst.mnemonic = "LDR".to_string();
    inst.operands = format!("{}, 0x{:x}", register_name(rt, true), target);
    inst.category = InstructionCategory::LoadStore;
    inst.regs_written |= reg_bit(rt);
    inst.target = Some(PcRelTarget { target, offset });
    true
}

/// LDUR / STUR with signed unscaled imm9.
fn decode_load_store_unscaled(inst: &mut Instruction, word: u32) -> bool {
    if bits(word, 29, 24) != 0b111000 || bit(word, 21) || bits(word, 11, 10) != 0 {
        return false;
    }
    let size = bits(word, 31, 30);
    let opc = bits(word, 23, 22);
    let is_64bit = size >= 0x2;
    let rt = bits(word, 4, 0) as u8;
    let rn = bits(word, 9, 5) as u8;
    let imm9 = sign_extend(bits(word, 20, 12), 9);

    inst.mnemonic = if opc == 0 { "STUR" } else { "LDUR" }.to_string();
    inst.operands = format!(
        "{}, [{}, #{}]",
        register_name(rt, is_64bit),
        register_name(rn, true),
        imm9
    );
    inst.category = InstructionCategory::LoadStore;
    if opc == 0 {
        inst.regs_read |= reg_bit(rt) | reg_bit(rn);
    } else {
        inst.regs_written |= reg_bit(rt);
        inst.regs_read |= reg_bit(rn);
    }
    true
}

/// ADD / SUB immediate, including the CMP / CMN aliases.
fn decode_add_sub_imm(inst: &mut Instruction, word: u32) -> bool {
    if bits(word, 28, 23) != 0b100010 {
        return false;
    }
    let is_64bit = bit(word, 31);
    let is_sub = bit(word, 30);
    let sets_flags = bit(word, 29);
    let rd = bits(word, 4, 0) as u8;
    let rn = bits(word, 9, 5) as u8;
    let imm12 = bits(word, 21, 10);
    let imm = if bit(word, 22) { imm12 << 12 } else { imm12 };

    inst.category = InstructionCategory::DataProcessing;
    inst.regs_read |= reg_bit(rn);

    if sets_flags && rd == 31 {
        inst.mnemonic = if is_sub { "CMP" } else { "CMN" }.to_string();
        inst.operands = format!("{}, #{}", register_name(rn, is_64bit), imm);
        inst.flags_written = NZCV_ALL;
        return true;
    }

    inst.mnemonic = match (is_sub, sets_flags) {
        (true, true) => "SUBS",
        (true, false) => "SUB",
        (false, true) => "ADDS",
        (false, false) => "ADD",
    }
    .to_string();
    inst.operands = format!(
        "{}, {}, #{}",
        register_name(rd, is_64bit),
        register_name(rn, is_64bit),
        imm
    );
    inst.regs_written |= reg_bit(rd);
    if sets_flags {
        inst.flags_written = NZCV_ALL;
    }
    true
}

/// MOVZ / MOVN / MOVK wide-immediate moves.
fn decode_mov_wide(inst: &mut Instruction, word: u32) -> bool {
    if bits(word, 28, 23) != 0b100101 {
        return false;
    }
    let opc = bits(word, 30, 29);
    let is_64bit = bit(word, 31);
    let rd = bits(word, 4, 0) as u8;
    let imm16 = bits(word, 20, 5);

    inst.mnemonic = match opc {
        0x0 => "MOVN",
        0x2 => "MOVZ",
        0x3 => "MOVK",
        _ => "MOV",
    }
    .to_string();
    inst.operands = format!("{}, #0x{:X}", register_name(rd, is_64bit), imm16);
    inst.category = InstructionCategory::DataProcessing;

    // MOVK keeps the untouched bits, so the destination is also a source.
    if opc == 0x3 {
        inst.regs_read |= reg_bit(rd);
    }
    inst.regs_written |= reg_bit(rd);
    true
}

const SHIFT_NAMES: [&str; 4] = ["LSL", "LSR", "ASR", "ROR"];

/// AND / ORR / EOR / ANDS and the negated forms; MOV alias for
/// `ORR Rd, ZR, Rm` detected here rather than by text rewriting.
fn decode_logical_shifted(inst: &mut Instruction, word: u32) -> bool {
    if bits(word, 28, 24) != 0b01010 {
        return false;
    }
    let opc = bits(word, 30, 29);
    let negated = bit(word, 21);
    let is_64bit = bit(word, 31);
    let rd = bits(word, 4, 0) as u8;
    let rn = bits(word, 9, 5) as u8;
    let rm = bits(word, 20, 16) as u8;
    let shift_type = bits(word, 23, 22);
    let imm6 = bits(word, 15, 10);

    inst.category = InstructionCategory::DataProcessing;

    if opc == 1 && !negated && rn == 31 && shift_type == 0 && imm6 == 0 {
        inst.mnemonic = "MOV".to_string();
        inst.operands = format!(
            "{}, {}",
            register_name(rd, is_64bit),
            register_name(rm, is_64bit)
        );
        inst.regs_read |= reg_bit(rm);
        inst.regs_written |= reg_bit(rd);
        return true;
    }

    inst.mnemonic = match (opc, negated) {
        (0, false) => "AND",
        (0, true) => "BIC",
        (1, false) => "ORR",
        (1, true) => "ORN",
        (2, false) => "EOR",
        (2, true) => "EON",
        (_, false) => "ANDS",
        (_, true) => "BICS",
    }
    .to_string();

    let rd_name = register_name(rd, is_64bit);
    let rn_name = register_name(rn, is_64bit);
    let rm_name = register_name(rm, is_64bit);
    inst.operands = if imm6 != 0 {
        format!(
            "{}, {}, {}, {} #{}",
            rd_name, rn_name, rm_name, SHIFT_NAMES[shift_type as usize], imm6
        )
    } else {
        format!("{}, {}, {}", rd_name, rn_name, rm_name)
    };
    inst.regs_read |= reg_bit(rn) | reg_bit(rm);
    inst.regs_written |= reg_bit(rd);
    if opc == 3 {
        inst.flags_written = NZCV_ALL;
    }
    true
}

/// ADD / SUB shifted register, including the CMP / CMN aliases.
fn decode_add_sub_shifted(inst: &mut Instruction, word: u32) -> bool {
    if bits(word, 28, 24) != 0b01011 || bit(word, 21) {
        return false;
    }
    let is_64bit = bit(word, 31);
    let is_sub = bit(word, 30);
    let sets_flags = bit(word, 29);
    let rd = bits(word, 4, 0) as u8;
    let rn = bits(word, 9, 5) as u8;
    let rm = bits(word, 20, 16) as u8;
    let shift_type = bits(word, 23, 22);
    let imm6 = bits(word, 15, 10);

    inst.category = InstructionCategory::DataProcessing;
    inst.regs_read |= reg_bit(rn) | reg_bit(rm);

    if sets_flags && rd == 31 {
        inst.mnemonic = if is_sub { "CMP" } else { "CMN" }.to_string();
        inst.operands = format!(
            "{}, {}",
            register_name(rn, is_64bit),
            register_name(rm, is_64bit)
        );
        inst.flags_written = NZCV_ALL;
        return true;
    }

    inst.mnemonic = match (is_sub, sets_flags) {
        (true, true) => "SUBS",
        (true, false) => "SUB",
        (false, true) => "ADDS",
        (false, false) => "ADD",
    }
    .to_string();

    let rd_name = register_name(rd, is_64bit);
    let rn_name = register_name(rn, is_64bit);
    let rm_name = register_name(rm, is_64bit);
    inst.operands = if imm6 != 0 {
        format!(
            "{}, {}, {}, {} #{}",
            rd_name, rn_name, rm_name, SHIFT_NAMES[shift_type as usize], imm6
        )
    } else {
        format!("{}, {}, {}", rd_name, rn_name, rm_name)
    };
    inst.regs_written |= reg_bit(rd);
    if sets_flags {
        inst.flags_written = NZCV_ALL;
    }
    true
}

/// SBFM / BFM / UBFM, with the common LSL / LSR / ASR immediate aliases.
fn decode_bitfield(inst: &mut Instruction, word: u32) -> bool {
    if bits(word, 28, 23) != 0b100110 {
        return false;
    }
    let opc = bits(word, 30, 29);
    if opc == 3 {
        return false;
    }
    let is_64bit = bit(word, 31);
    let size: u32 = if is_64bit { 64 } else { 32 };
    let rd = bits(word, 4, 0) as u8;
    let rn = bits(word, 9, 5) as u8;
    let immr = bits(word, 21, 16);
    let imms = bits(word, 15, 10);

    inst.category = InstructionCategory::DataProcessing;
    inst.regs_read |= reg_bit(rn);
    inst.regs_written |= reg_bit(rd);

    let rd_name = register_name(rd, is_64bit);
    let rn_name = register_name(rn, is_64bit);

    // Shift-immediate aliases.
    if opc == 2 && imms == size - 1 {
        inst.mnemonic = "LSR".to_string();
        inst.operands = format!("{}, {}, #{}", rd_name, rn_name, immr);
        return true;
    }
    if opc == 2 && imms + 1 == immr {
        inst.mnemonic = "LSL".to_string();
        inst.operands = format!("{}, {}, #{}", rd_name, rn_name, size - 1 - imms);
        return true;
    }
    if opc == 0 && imms == size - 1 {
        inst.mnemonic = "ASR".to_string();
        inst.operands = format!("{}, {}, #{}", rd_name, rn_name, immr);
        return true;
    }

    inst.mnemonic = match opc {
        0 => "SBFM",
        1 => "BFM",
        _ => "UBFM",
    }
    .to_string();
    inst.operands = format!("{}, {}, #{}, #{}", rd_name, rn_name, immr, imms);
    true
}

/// Two-source data processing: register shifts and division.
fn decode_two_source(inst: &mut Instruction, word: u32) -> bool {
    if bits(word, 30, 21) != 0b0011010110 {
        return false;
    }
    let is_64bit = bit(word, 31);
    let rd = bits(word, 4, 0) as u8;
    let rn = bits(word, 9, 5) as u8;
    let rm = bits(word, 20, 16) as u8;

    inst.mnemonic = match bits(word, 15, 10) {
        0x2 => "UDIV",
        0x3 => "SDIV",
        0x8 => "LSL",
        0x9 => "LSR",
        0xA => "ASR",
        0xB => "ROR",
        _ => return false,
    }
    .to_string();
    inst.operands = format!(
        "{}, {}, {}",
        register_name(rd, is_64bit),
        register_name(rn, is_64bit),
        register_name(rm, is_64bit)
    );
    inst.category = InstructionCategory::DataProcessing;
    inst.regs_read |= reg_bit(rn) | reg_bit(rm);
    inst.regs_written |= reg_bit(rd);
    true
}

/// Three-source multiplies, with the MUL / SMULL / UMULL aliases when the
/// accumulator is the zero register.
fn decode_three_source(inst: &mut Instruction, word: u32) -> bool {
    if bits(word, 28, 24) != 0b11011 {
        return false;
    }
    let is_64bit = bit(word, 31);
    let op31 = bits(word, 23, 21);
    let o0 = bit(word, 15);
    let rd = bits(word, 4, 0) as u8;
    let rn = bits(word, 9, 5) as u8;
    let rm = bits(word, 20, 16) as u8;
    let ra = bits(word, 14, 10) as u8;

    // The long forms take 32-bit sources and a 64-bit destination.
    let (name, alias, long_form) = match (op31, o0) {
        (0, false) => ("MADD", Some("MUL"), false),
        (0, true) => ("MSUB", None, false),
        (1, false) => ("SMADDL", Some("SMULL"), true),
        (2, false) => ("SMULH", None, false),
        (5, false) => ("UMADDL", Some("UMULL"), true),
        (6, false) => ("UMULH", None, false),
        _ => return false,
    };

    let src_64bit = if long_form { false } else { is_64bit };
    let rd_name = register_name(rd, is_64bit);
    let rn_name = register_name(rn, src_64bit);
    let rm_name = register_name(rm, src_64bit);

    inst.category = InstructionCategory::DataProcessing;
    inst.regs_read |= reg_bit(rn) | reg_bit(rm);
    inst.regs_written |= reg_bit(rd);

    let three_operand = matches!((op31, o0), (2, false) | (6, false));
    if ra == 31 && alias.is_some() {
        inst.mnemonic = alias.unwrap().to_string();
        inst.operands = format!("{}, {}, {}", rd_name, rn_name, rm_name);
    } else if three_operand {
        inst.mnemonic = name.to_string();
        inst.operands = format!("{}, {}, {}", rd_name, rn_name, rm_name);
    } else {
        inst.mnemonic = name.to_string();
        inst.operands = format!(
            "{}, {}, {}, {}",
            rd_name,
            rn_name,
            rm_name,
            register_name(ra, is_64bit)
        );
        inst.regs_read |= reg_bit(ra);
    }
    true
}

/// CCMP / CCMN conditional compare, register and immediate forms.
fn decode_cond_compare(inst: &mut Instruction, word: u32) -> bool {
    if bits(word, 28, 21) != 0b11010010 || !bit(word, 29) || bit(word, 10) || bit(word, 4) {
        return false;
    }
    let is_64bit = bit(word, 31);
    let is_ccmp = bit(word, 30);
    let is_imm = bit(word, 11);
    let rn = bits(word, 9, 5) as u8;
    let nzcv = bits(word, 3, 0);
    let cond = bits(word, 15, 12) as u8;

    let second = if is_imm {
        format!("#{}", bits(word, 20, 16))
    } else {
        let rm = bits(word, 20, 16) as u8;
        inst.regs_read |= reg_bit(rm);
        register_name(rm, is_64bit).to_string()
    };

    inst.mnemonic = if is_ccmp { "CCMP" } else { "CCMN" }.to_string();
    inst.operands = format!(
        "{}, {}, #{}, {}",
        register_name(rn, is_64bit),
        second,
        nzcv,
        condition_name(cond)
    );
    inst.category = InstructionCategory::DataProcessing;
    inst.regs_read |= reg_bit(rn);
    inst.flags_written = NZCV_ALL;
    true
}

/// FMOV (register), single and double forms.
fn decode_fmov(inst: &mut Instruction, word: u32) -> bool {
    if word & 0xFFBF_FC00 != 0x1E20_4000 {
        return false;
    }
    let prefix = if bit(word, 22) { 'D' } else { 'S' };
    let rd = bits(word, 4, 0);
    let rn = bits(word, 9, 5);

    inst.mnemonic = "FMOV".to_string();
    inst.operands = format!("{}{}, {}{}", prefix, rd, prefix, rn);
    inst.category = InstructionCategory::Simd;
    true
}

/// Last resort: classify by top-level encoding group without a precise
/// operand breakdown.
fn decode_group_fallback(inst: &mut Instruction, word: u32) -> bool {
    let op0 = bits(word, 28, 25);

    // Loads/stores occupy the x1x0 encoding groups.
    if op0 & 0b0101 == 0b0100 {
        let is_load = bit(word, 22);
        let size = bits(word, 31, 30);
        let rt = bits(word, 4, 0) as u8;
        let rn = bits(word, 9, 5) as u8;

        inst.mnemonic = if is_load { "LDR" } else { "STR" }.to_string();
        inst.operands = format!(
            "{}, [{}, ...]",
            register_name(rt, size >= 0x2),
            register_name(rn, true)
        );
        inst.category = InstructionCategory::LoadStore;
        return true;
    }

    if op0 == 0x7 || op0 == 0xF {
        inst.mnemonic = "SIMD".to_string();
        inst.operands = "...".to_string();
        inst.category = InstructionCategory::Simd;
        return true;
    }

    false
}

/// Frame-spill heuristics for function boundaries.
///
/// AArch64 ABIs spill x29/x30 as a pair on entry and restore them on
/// exit, so a pre-indexed STP of that pair brackets a function start
/// and the matching LDP a function end. RET ends a function regardless
/// of the heuristic flag.
fn apply_function_heuristics(inst: &mut Instruction, flags: DisasmFlags) {
    if inst.mnemonic == "RET" {
        inst.is_function_end = true;
    }
    if !flags.contains(DisasmFlags::PROLOGUE_EPILOGUE) {
        return;
    }
    let ops = &inst.operands;
    if inst.mnemonic.contains("STP")
        && ops.contains("X29")
        && ops.contains("X30")
        && ops.contains("#-")
    {
        inst.is_function_start = true;
    }
    if inst.mnemonic.contains("LDP") && ops.contains("X29") && ops.contains("X30") {
        inst.is_function_end = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decode_default(word: u32, address: u64) -> Instruction {
        decode(word, address, DisasmFlags::default())
    }

    #[test]
    fn test_b_forward() {
        let inst = decode_default(0x14000002, 0x1000);
        assert_eq!(inst.mnemonic, "B");
        assert_eq!(inst.operands, "0x1008");
        assert_eq!(inst.branch_kind(), Some(BranchKind::Unconditional));
        assert!(inst.has_branch());
        assert!(inst.updates_pc);
        assert_eq!(inst.branch_target(), Some(0x1008));
        assert_eq!(inst.branch_offset(), 8);
    }

    #[test]
    fn test_b_backward() {
        let inst = decode_default(0x17FFFFFF, 0x1000);
        assert_eq!(inst.mnemonic, "B");
        assert_eq!(inst.branch_offset(), -4);
        assert_eq!(inst.branch_target(), Some(0xFFC));
    }

    #[test]
    fn test_bl_sets_link_register() {
        let inst = decode_default(0x94000003, 0x1000);
        assert_eq!(inst.mnemonic, "BL");
        assert_eq!(inst.operands, "0x100c");
        assert_eq!(inst.branch_kind(), Some(BranchKind::Call));
        assert_ne!(inst.regs_written & reg_bit(LINK_REGISTER), 0);
    }

    #[test]
    fn test_ret() {
        let inst = decode_default(0xD65F03C0, 0x4000);
        assert_eq!(inst.mnemonic, "RET");
        assert_eq!(inst.operands, "X30");
        assert_eq!(inst.branch_kind(), Some(BranchKind::Return));
        assert!(inst.is_function_end);
        assert!(inst.updates_pc);
    }

    #[test]
    fn test_ret_without_heuristics_still_ends_function() {
        let inst = decode(0xD65F03C0, 0x4000, DisasmFlags::empty());
        assert!(inst.is_function_end);
    }

    #[test]
    fn test_br_blr() {
        let br = decode_default(0xD61F0020, 0x1000);
        assert_eq!(br.mnemonic, "BR");
        assert_eq!(br.operands, "X1");
        assert_ne!(br.regs_read & reg_bit(1), 0);

        let blr = decode_default(0xD63F0040, 0x1000);
        assert_eq!(blr.mnemonic, "BLR");
        assert_eq!(blr.branch_kind(), Some(BranchKind::Call));
        assert_ne!(blr.regs_written & reg_bit(LINK_REGISTER), 0);
    }

    #[test]
    fn test_cond_branch() {
        let inst = decode_default(0x54000041, 0x1000);
        assert_eq!(inst.mnemonic, "B.NE");
        assert_eq!(inst.operands, "0x1008");
        assert_eq!(inst.branch_kind(), Some(BranchKind::Conditional));
    }

    #[test]
    fn test_cbz() {
        let inst = decode_default(0xB4000040, 0x1000);
        assert_eq!(inst.mnemonic, "CBZ");
        assert_eq!(inst.operands, "X0, 0x1008");
        assert_ne!(inst.regs_read & reg_bit(0), 0);
    }

    #[test]
    fn test_tbz() {
        let inst = decode_default(0x36180040, 0x1000);
        assert_eq!(inst.mnemonic, "TBZ");
        assert_eq!(inst.operands, "W0, #3, 0x1008");
        assert_eq!(inst.branch_kind(), Some(BranchKind::Conditional));
    }

    #[test]
    fn test_adr() {
        let inst = decode_default(0x10000040, 0x1000);
        assert_eq!(inst.mnemonic, "ADR");
        assert_eq!(inst.operands, "X0, 0x1008");
        assert!(!inst.has_branch());
        assert_eq!(inst.branch_target(), Some(0x1008));
        assert_ne!(inst.regs_written & reg_bit(0), 0);
    }

    #[test]
    fn test_adrp_pages() {
        let inst = decode_default(0x90000001, 0x1234);
        assert_eq!(inst.mnemonic, "ADRP");
        assert_eq!(inst.operands, "X1, 0x1000");
        assert!(!inst.has_branch());
    }

    #[test]
    fn test_stp_prologue() {
        let inst = decode_default(0xA9BF7BFD, 0x2000);
        assert_eq!(inst.mnemonic, "STP");
        assert_eq!(inst.operands, "X29, X30, [SP, #-16]!");
        assert!(inst.is_function_start);
        assert_eq!(inst.category, InstructionCategory::LoadStore);
    }

    #[test]
    fn test_stp_prologue_respects_flag() {
        let inst = decode(0xA9BF7BFD, 0x2000, DisasmFlags::empty());
        assert!(!inst.is_function_start);
    }

    #[test]
    fn test_ldp_epilogue() {
        let inst = decode_default(0xA8C17BFD, 0x2000);
        assert_eq!(inst.mnemonic, "LDP");
        assert_eq!(inst.operands, "X29, X30, [SP], #16");
        assert!(inst.is_function_end);
        assert_ne!(inst.regs_written & reg_bit(29), 0);
        assert_ne!(inst.regs_written & reg_bit(30), 0);
    }

    #[test]
    fn test_nop() {
        let inst = decode_default(0xD503201F, 0x1000);
        assert_eq!(inst.mnemonic, "NOP");
        assert_eq!(inst.operands, "");
        assert_eq!(inst.category, InstructionCategory::System);
        assert!(!inst.has_branch());
    }

    #[test]
    fn test_barriers() {
        let dsb = decode_default(0xD5033F9F, 0x1000);
        assert_eq!(dsb.mnemonic, "DSB");
        assert_eq!(dsb.operands, "#15");

        let isb = decode_default(0xD5033FDF, 0x1000);
        assert_eq!(isb.mnemonic, "ISB");
    }

    #[test]
    fn test_mrs_nzcv() {
        let inst = decode_default(0xD53B4200, 0x1000);
        assert_eq!(inst.mnemonic, "MRS");
        assert_eq!(inst.operands, "X0, S3_3_c4_c2_0");
        assert_eq!(inst.category, InstructionCategory::System);
    }

    #[test]
    fn test_msr() {
        let inst = decode_default(0xD51B4200, 0x1000);
        assert_eq!(inst.mnemonic, "MSR");
        assert_eq!(inst.operands, "S3_3_c4_c2_0, X0");
    }

    #[test]
    fn test_add_sub_imm() {
        // ADD X0, X1, #16
        let add = decode_default(0x91004020, 0x1000);
        assert_eq!(add.mnemonic, "ADD");
        assert_eq!(add.operands, "X0, X1, #16");
        assert_eq!(add.flags_written, 0);

        // SUB SP, SP, #32
        let sub = decode_default(0xD10083FF, 0x1000);
        assert_eq!(sub.mnemonic, "SUB");
        assert_eq!(sub.operands, "SP, SP, #32");
    }

    #[test]
    fn test_cmp_imm_sets_flags() {
        // CMP X0, #5 (SUBS XZR, X0, #5)
        let inst = decode_default(0xF100141F, 0x1000);
        assert_eq!(inst.mnemonic, "CMP");
        assert_eq!(inst.operands, "X0, #5");
        assert_eq!(inst.flags_written, NZCV_ALL);
    }

    #[test]
    fn test_cmn_imm_sets_flags() {
        // CMN X1, #1 (ADDS XZR, X1, #1)
        let inst = decode_default(0xB100043F, 0x1000);
        assert_eq!(inst.mnemonic, "CMN");
        assert_eq!(inst.operands, "X1, #1");
        assert_eq!(inst.flags_written, NZCV_ALL);
    }

    #[test]
    fn test_cmp_shifted_reg() {
        // CMP X0, X1 (SUBS XZR, X0, X1)
        let inst = decode_default(0xEB01001F, 0x1000);
        assert_eq!(inst.mnemonic, "CMP");
        assert_eq!(inst.operands, "X0, X1");
        assert_eq!(inst.flags_written, NZCV_ALL);
    }

    #[test]
    fn test_ccmp_sets_flags() {
        // CCMP X0, X1, #0, EQ
        let inst = decode_default(0xFA410000, 0x1000);
        assert_eq!(inst.mnemonic, "CCMP");
        assert_eq!(inst.operands, "X0, X1, #0, EQ");
        assert_eq!(inst.flags_written, NZCV_ALL);
    }

    #[test]
    fn test_movz() {
        let inst = decode_default(0xD2800540, 0x1000);
        assert_eq!(inst.mnemonic, "MOVZ");
        assert_eq!(inst.operands, "X0, #0x2A");
        assert_eq!(inst.regs_read, 0);
    }

    #[test]
    fn test_movk_reads_destination() {
        // MOVK X0, #1
        let inst = decode_default(0xF2800020, 0x1000);
        assert_eq!(inst.mnemonic, "MOVK");
        assert_ne!(inst.regs_read & reg_bit(0), 0);
        assert_ne!(inst.regs_written & reg_bit(0), 0);
    }

    #[test]
    fn test_mov_alias_from_orr() {
        // ORR X0, XZR, X1
        let inst = decode_default(0xAA0103E0, 0x1000);
        assert_eq!(inst.mnemonic, "MOV");
        assert_eq!(inst.operands, "X0, X1");
        assert_ne!(inst.regs_read & reg_bit(1), 0);
        assert_ne!(inst.regs_written & reg_bit(0), 0);
    }

    #[test]
    fn test_orr_with_shift_is_not_mov() {
        // ORR X0, XZR, X1, LSL #4
        let inst = decode_default(0xAA0113E0, 0x1000);
        assert_eq!(inst.mnemonic, "ORR");
        assert!(inst.operands.contains("LSL #4"));
    }

    #[test]
    fn test_ands_sets_flags() {
        // ANDS X0, X1, X2
        let inst = decode_default(0xEA020020, 0x1000);
        assert_eq!(inst.mnemonic, "ANDS");
        assert_eq!(inst.flags_written, NZCV_ALL);
    }

    #[test]
    fn test_ldr_str_imm() {
        let ldr = decode_default(0xF9400020, 0x1000);
        assert_eq!(ldr.mnemonic, "LDR");
        assert_eq!(ldr.operands, "X0, [X1, #0]");
        assert_ne!(ldr.regs_written & reg_bit(0), 0);

        let str_ = decode_default(0xF9000020, 0x1000);
        assert_eq!(str_.mnemonic, "STR");
        assert_ne!(str_.regs_read & reg_bit(0), 0);
    }

    #[test]
    fn test_ldr_literal() {
        // LDR X0, <pc+8>
        let inst = decode_default(0x58000040, 0x1000);
        assert_eq!(inst.mnemonic, "LDR");
        assert_eq!(inst.operands, "X0, 0x1008");
        assert!(!inst.has_branch());
        assert_eq!(inst.branch_target(), Some(0x1008));
    }

    #[test]
    fn test_ldur() {
        // LDUR X0, [X29, #-8]
        let inst = decode_default(0xF85F83A0, 0x1000);
        assert_eq!(inst.mnemonic, "LDUR");
        assert_eq!(inst.operands, "X0, [X29, #-8]");
        assert_eq!(inst.category, InstructionCategory::LoadStore);
    }

    #[test]
    fn test_mul_alias() {
        // MADD X0, X1, X2, XZR
        let inst = decode_default(0x9B027C20, 0x1000);
        assert_eq!(inst.mnemonic, "MUL");
        assert_eq!(inst.operands, "X0, X1, X2");
    }

    #[test]
    fn test_madd_with_accumulator() {
        // MADD X0, X1, X2, X3
        let inst = decode_default(0x9B020C20, 0x1000);
        assert_eq!(inst.mnemonic, "MADD");
        assert_eq!(inst.operands, "X0, X1, X2, X3");
        assert_ne!(inst.regs_read & reg_bit(3), 0);
    }

    #[test]
    fn test_udiv() {
        let inst = decode_default(0x9AC20820, 0x1000);
        assert_eq!(inst.mnemonic, "UDIV");
        assert_eq!(inst.operands, "X0, X1, X2");
    }

    #[test]
    fn test_lsl_register() {
        // LSLV X0, X1, X2
        let inst = decode_default(0x9AC22020, 0x1000);
        assert_eq!(inst.mnemonic, "LSL");
        assert_eq!(inst.operands, "X0, X1, X2");
    }

    #[test]
    fn test_lsr_immediate_alias() {
        // UBFM X0, X1, #4, #63 == LSR X0, X1, #4
        let inst = decode_default(0xD344FC20, 0x1000);
        assert_eq!(inst.mnemonic, "LSR");
        assert_eq!(inst.operands, "X0, X1, #4");
    }

    #[test]
    fn test_fmov() {
        let inst = decode_default(0x1E604020, 0x1000);
        assert_eq!(inst.mnemonic, "FMOV");
        assert_eq!(inst.operands, "D0, D1");
        assert_eq!(inst.category, InstructionCategory::Simd);
    }

    #[test]
    fn test_unknown_word_fallback() {
        let inst = decode_default(0x00000000, 0x1000);
        assert_eq!(inst.mnemonic, ".word");
        assert_eq!(inst.operands, "0x00000000");
        assert_eq!(inst.category, InstructionCategory::Unknown);
    }

    #[test]
    fn test_decoder_is_total() {
        // A spread of words from every encoding group must all produce a
        // record with a non-empty mnemonic.
        let words = [
            0x00000000, 0xFFFFFFFF, 0x14000002, 0x94000003, 0xD65F03C0, 0xD503201F, 0xA9BF7BFD,
            0x91004020, 0xF9400020, 0x1E604020, 0x12345678, 0xDEADBEEF, 0xCAFEBABE, 0x7F4456B9,
        ];
        for &word in &words {
            let inst = decode_default(word, 0x1000);
            assert!(!inst.mnemonic.is_empty(), "word 0x{:08X}", word);
            assert_eq!(inst.length, 4);
        }
    }

    #[test]
    fn test_branch_target_invariant() {
        // target == address + offset for every direct branch.
        let words = [0x14000002, 0x94000003, 0x54000041, 0xB4000040, 0x36180040, 0x17FFFFFF];
        for &word in &words {
            let inst = decode_default(word, 0x4000);
            let target = inst.target.expect("direct branch must carry a target");
            assert_eq!(
                target.target,
                0x4000u64.wrapping_add(target.offset as u64),
                "word 0x{:08X}",
                word
            );
        }
    }

    #[test]
    fn test_decoding_is_deterministic() {
        for &word in &[0x94000003u32, 0xA9BF7BFD, 0x00000000, 0xD53B4200] {
            let a = decode_default(word, 0x1000);
            let b = decode_default(word, 0x1000);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_register_names() {
        assert_eq!(register_name(0, true), "X0");
        assert_eq!(register_name(29, true), "X29");
        assert_eq!(register_name(31, true), "SP");
        assert_eq!(register_name(31, false), "WSP");
        assert_eq!(register_name(32, true), "???");
    }

    #[test]
    fn test_condition_names() {
        assert_eq!(condition_name(0), "EQ");
        assert_eq!(condition_name(1), "NE");
        assert_eq!(condition_name(15), "NV");
        assert_eq!(condition_name(16), "??");
    }
}
