//! Disassembly engine.
//!
//! The driver loads a code section from a parsed Mach-O image and walks
//! it linearly, dispatching each step to the per-architecture decoder:
//! fixed 4-byte words for AArch64, variable-length sequences for x86-64.
//! Decoded records accumulate in address order; range re-targeting,
//! function counting, and address lookup operate on that vector.

pub mod arm64;
pub mod x86_64;

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::error::{AnalyzerError, Result};
use crate::macho::MachO;
use crate::types::{Arch, DisasmFlags, Instruction};

/// Driver state for disassembling one code section.
pub struct Disassembly<'a> {
    macho: &'a MachO,
    arch: Arch,
    code: Vec<u8>,
    code_base_addr: u64,
    current_offset: usize,
    instructions: Vec<Instruction>,
    flags: DisasmFlags,
}

impl<'a> Disassembly<'a> {
    /// Create a driver for the image, with default heuristics.
    pub fn new(macho: &'a MachO) -> Self {
        Self {
            macho,
            arch: macho.arch(),
            code: Vec::new(),
            code_base_addr: 0,
            current_offset: 0,
            instructions: Vec::new(),
            flags: DisasmFlags::default(),
        }
    }

    /// The architecture being decoded.
    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Current heuristic flags.
    pub fn flags(&self) -> DisasmFlags {
        self.flags
    }

    /// Replace the heuristic flags.
    pub fn set_flags(&mut self, flags: DisasmFlags) {
        self.flags = flags;
    }

    /// Base virtual address of the loaded section.
    pub fn code_base_addr(&self) -> u64 {
        self.code_base_addr
    }

    /// Size of the loaded code buffer.
    pub fn code_size(&self) -> usize {
        self.code.len()
    }

    /// Decoded records, in address order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Consume the driver, keeping only the decoded records.
    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    /// Copy a named section into the driver's code buffer.
    pub fn load_section(&mut self, name: &str) -> Result<()> {
        let macho = self.macho;
        let section = macho
            .section_named(name)
            .ok_or_else(|| AnalyzerError::SectionNotFound {
                name: name.to_string(),
            })?;
        let bytes = macho.section_bytes(section)?;

        self.code = bytes.to_vec();
        self.code_base_addr = section.addr;
        self.current_offset = 0;
        debug!(
            section = name,
            addr = section.addr,
            size = self.code.len(),
            "loaded code section"
        );
        Ok(())
    }

    /// Decode the instruction at the current offset and advance past it.
    fn decode_next(&mut self) -> Option<Instruction> {
        if self.current_offset >= self.code.len() {
            return None;
        }
        let addr = self.code_base_addr + self.current_offset as u64;

        match self.arch {
            Arch::Arm64 => {
                if self.current_offset + 4 > self.code.len() {
                    return None;
                }
                let mut word = LittleEndian::read_u32(&self.code[self.current_offset..]);
                if self.macho.header.is_swapped {
                    word = word.swap_bytes();
                }
                self.current_offset += 4;
                Some(arm64::decode(word, addr, self.flags))
            }
            Arch::X86_64 => {
                let inst = x86_64::decode(&self.code[self.current_offset..], addr);
                self.current_offset += inst.length.max(1) as usize;
                Some(inst)
            }
            Arch::Unknown => None,
        }
    }

    /// Disassemble the whole loaded buffer. Returns the record count.
    pub fn run(&mut self) -> usize {
        self.current_offset = 0;
        self.instructions = Vec::with_capacity(self.code.len() / 4);

        while let Some(inst) = self.decode_next() {
            self.instructions.push(inst);
        }
        self.instructions.len()
    }

    /// Disassemble only `[start_va, end_va)`, clamped to the buffer.
    /// Returns the record count.
    pub fn run_range(&mut self, start_va: u64, end_va: u64) -> usize {
        self.instructions = Vec::new();
        if start_va >= end_va {
            return 0;
        }

        let start_offset = start_va.saturating_sub(self.code_base_addr) as usize;
        if start_offset >= self.code.len() {
            return 0;
        }
        let end_offset =
            (end_va.saturating_sub(self.code_base_addr) as usize).min(self.code.len());

        self.current_offset = start_offset;
        while self.current_offset < end_offset {
            let Some(inst) = self.decode_next() else {
                break;
            };
            self.instructions.push(inst);
        }
        self.instructions.len()
    }

    /// Count of records flagged as function entries.
    pub fn function_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| i.is_function_start)
            .count()
    }

    /// Index of the record at exactly `address`, if any. Linear scan.
    pub fn find_by_address(&self, address: u64) -> Option<usize> {
        self.instructions.iter().position(|i| i.address == address)
    }
}

/// Enumerate the register indices set in a bitmask, ascending.
pub fn registers_in_mask(mask: u64) -> Vec<u8> {
    (0u8..64).filter(|&r| mask & (1u64 << r) != 0).collect()
}

/// Format a register bitmask as a comma-separated name list.
pub fn format_register_mask(mask: u64, is_64bit: bool) -> String {
    registers_in_mask(mask)
        .into_iter()
        .map(|r| arm64::register_name(r, is_64bit))
        .collect::<Vec<_>>()
        .join(", ")
}
