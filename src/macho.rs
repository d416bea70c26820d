//! Mach-O image walker.
//!
//! Parses thin 64-bit Mach-O images: header, `LC_SEGMENT_64` sections,
//! and the `LC_SYMTAB` symbol table. Fat/universal binaries are handled
//! by selecting one slice and parsing it as a thin image. The walker
//! never interprets code; it only hands out sections, symbols, and raw
//! bytes to the disassembly engine and the runtime-surface scanner.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{AnalyzerError, Result};
use crate::types::Arch;

/// Mach-O magic numbers, as read little-endian from the first word.
pub mod magic {
    /// 64-bit, file endianness matches the host read
    pub const MH_MAGIC_64: u32 = 0xFEED_FACF;
    /// 64-bit, byte-swapped
    pub const MH_CIGAM_64: u32 = 0xCFFA_EDFE;
    /// 32-bit
    pub const MH_MAGIC: u32 = 0xFEED_FACE;
    /// 32-bit, byte-swapped
    pub const MH_CIGAM: u32 = 0xCEFA_EDFE;
    /// Fat/universal header (big-endian on disk)
    pub const FAT_MAGIC: u32 = 0xCAFE_BABE;
    /// Fat header read byte-swapped
    pub const FAT_CIGAM: u32 = 0xBEBA_FECA;
}

/// Mach-O CPU type constants.
pub mod cpu_type {
    pub const X86: u32 = 7;
    pub const X86_64: u32 = 0x0100_0007;
    pub const ARM: u32 = 12;
    pub const ARM64: u32 = 0x0100_000C;

    /// CPU_TYPE_64 flag
    pub const ABI64: u32 = 0x0100_0000;
}

/// Load command identifiers the walker understands.
pub mod load_command {
    pub const LC_SYMTAB: u32 = 0x2;
    pub const LC_SEGMENT_64: u32 = 0x19;
}

const HEADER_SIZE_64: usize = 32;
const SEGMENT_64_FIXED: usize = 72;
const SECTION_64_SIZE: usize = 80;
const NLIST_64_SIZE: usize = 16;
const FAT_ARCH_SIZE: usize = 20;

/// Parsed `mach_header_64` fields.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MachHeader {
    /// Magic as read from the file
    pub magic: u32,
    /// CPU type (see [`cpu_type`])
    pub cpu_type: u32,
    /// CPU subtype
    pub cpu_subtype: u32,
    /// MH_EXECUTE, MH_DYLIB, ...
    pub file_type: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// True when multi-byte fields are byte-swapped relative to the host
    pub is_swapped: bool,
}

/// A section from an `LC_SEGMENT_64` load command.
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    /// Owning segment name (`__TEXT`, `__DATA`, ...)
    pub segname: String,
    /// Section name (`__text`, `__cstring`, ...)
    pub sectname: String,
    /// Virtual address
    pub addr: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset of the section contents
    pub offset: u32,
}

/// A symbol-table entry: name plus address.
#[derive(Debug, Clone, Serialize)]
pub struct Symbol {
    /// Symbol name from the string table
    pub name: String,
    /// `n_value` — the symbol's address
    pub address: u64,
}

/// A parsed Mach-O image holding its raw bytes.
#[derive(Debug)]
pub struct MachO {
    data: Vec<u8>,
    /// Parsed header
    pub header: MachHeader,
    /// Sections from all 64-bit segments, in load-command order
    pub sections: Vec<Section>,
    /// Named symbols from `LC_SYMTAB`
    pub symbols: Vec<Symbol>,
}

fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    if offset.checked_add(len).map_or(true, |end| end > data.len()) {
        return Err(AnalyzerError::TruncatedData {
            offset,
            expected: len,
            actual: data.len().saturating_sub(offset),
        });
    }
    Ok(&data[offset..offset + len])
}

fn read_u32(data: &[u8], offset: usize, swapped: bool) -> Result<u32> {
    let bytes = slice_at(data, offset, 4)?;
    Ok(if swapped {
        BigEndian::read_u32(bytes)
    } else {
        LittleEndian::read_u32(bytes)
    })
}

fn read_u64(data: &[u8], offset: usize, swapped: bool) -> Result<u64> {
    let bytes = slice_at(data, offset, 8)?;
    Ok(if swapped {
        BigEndian::read_u64(bytes)
    } else {
        LittleEndian::read_u64(bytes)
    })
}

/// Fixed-width name field: bytes up to the first NUL, lossily decoded.
fn read_name16(data: &[u8], offset: usize) -> Result<String> {
    let bytes = slice_at(data, offset, 16)?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(16);
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

/// NUL-terminated string at `offset`, bounded by `limit`.
fn read_cstr(data: &[u8], offset: usize, limit: usize) -> Option<String> {
    if offset >= limit || limit > data.len() {
        return None;
    }
    let bytes = &data[offset..limit];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    if end == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

impl MachO {
    /// Read and parse the image at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse(data)
    }

    /// Parse an image from owned bytes.
    ///
    /// Fat binaries resolve to the first AArch64 or x86-64 slice (first
    /// slice of any kind when neither is present).
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 {
            return Err(AnalyzerError::FileTooSmall {
                expected: HEADER_SIZE_64,
                actual: data.len(),
            });
        }

        let raw_magic = LittleEndian::read_u32(&data[..4]);
        match raw_magic {
            magic::MH_MAGIC_64 => Self::parse_thin(data, false),
            magic::MH_CIGAM_64 => Self::parse_thin(data, true),
            magic::MH_MAGIC | magic::MH_CIGAM => {
                Err(AnalyzerError::Unsupported32Bit { magic: raw_magic })
            }
            magic::FAT_CIGAM | magic::FAT_MAGIC => {
                // On-disk fat headers are big-endian; a little-endian read
                // of 0xCAFEBABE therefore yields FAT_CIGAM.
                let fields_swapped = raw_magic == magic::FAT_CIGAM;
                Self::parse_fat(data, fields_swapped)
            }
            _ => Err(AnalyzerError::NotMachO {
                magic: data[..4].to_vec(),
            }),
        }
    }

    fn parse_fat(data: Vec<u8>, fields_swapped: bool) -> Result<Self> {
        let nfat = read_u32(&data, 4, fields_swapped)? as usize;
        if nfat == 0 {
            return Err(AnalyzerError::EmptyFatBinary);
        }

        let mut chosen: Option<(usize, usize)> = None;
        for i in 0..nfat {
            let entry = 8 + i * FAT_ARCH_SIZE;
            let cputype = read_u32(&data, entry, fields_swapped)?;
            let offset = read_u32(&data, entry + 8, fields_swapped)? as usize;
            let size = read_u32(&data, entry + 12, fields_swapped)? as usize;

            if chosen.is_none() {
                chosen = Some((offset, size));
            }
            if cputype == cpu_type::ARM64 || cputype == cpu_type::X86_64 {
                chosen = Some((offset, size));
                break;
            }
        }

        let (offset, size) = chosen.ok_or(AnalyzerError::EmptyFatBinary)?;
        let slice = slice_at(&data, offset, size)?.to_vec();
        debug!(offset, size, "selected fat slice");
        Self::parse(slice)
    }

    fn parse_thin(data: Vec<u8>, is_swapped: bool) -> Result<Self> {
        if data.len() < HEADER_SIZE_64 {
            return Err(AnalyzerError::FileTooSmall {
                expected: HEADER_SIZE_64,
                actual: data.len(),
            });
        }

        let header = MachHeader {
            magic: LittleEndian::read_u32(&data[..4]),
            cpu_type: read_u32(&data, 4, is_swapped)?,
            cpu_subtype: read_u32(&data, 8, is_swapped)?,
            file_type: read_u32(&data, 12, is_swapped)?,
            ncmds: read_u32(&data, 16, is_swapped)?,
            is_swapped,
        };

        let mut image = MachO {
            data,
            header,
            sections: Vec::new(),
            symbols: Vec::new(),
        };
        image.walk_load_commands()?;
        Ok(image)
    }

    fn walk_load_commands(&mut self) -> Result<()> {
        let swapped = self.header.is_swapped;
        let mut offset = HEADER_SIZE_64;
        let mut symtab: Option<(usize, usize, usize, usize)> = None;

        for _ in 0..self.header.ncmds {
            let cmd = read_u32(&self.data, offset, swapped)?;
            let cmdsize = read_u32(&self.data, offset + 4, swapped)? as usize;
            if cmdsize < 8 {
                return Err(AnalyzerError::MachOParseError {
                    message: format!("load command at offset {} has size {}", offset, cmdsize),
                });
            }

            match cmd {
                load_command::LC_SEGMENT_64 => self.parse_segment(offset, cmdsize)?,
                load_command::LC_SYMTAB => {
                    let symoff = read_u32(&self.data, offset + 8, swapped)? as usize;
                    let nsyms = read_u32(&self.data, offset + 12, swapped)? as usize;
                    let stroff = read_u32(&self.data, offset + 16, swapped)? as usize;
                    let strsize = read_u32(&self.data, offset + 20, swapped)? as usize;
                    symtab = Some((symoff, nsyms, stroff, strsize));
                }
                _ => {}
            }

            offset = offset
                .checked_add(cmdsize)
                .ok_or(AnalyzerError::MachOParseError {
                    message: "load command size overflow".to_string(),
                })?;
        }

        if let Some((symoff, nsyms, stroff, strsize)) = symtab {
            self.parse_symbols(symoff, nsyms, stroff, strsize)?;
        }

        debug!(
            sections = self.sections.len(),
            symbols = self.symbols.len(),
            "parsed Mach-O image"
        );
        Ok(())
    }

    fn parse_segment(&mut self, offset: usize, cmdsize: usize) -> Result<()> {
        let swapped = self.header.is_swapped;
        let nsects = read_u32(&self.data, offset + 64, swapped)? as usize;

        if SEGMENT_64_FIXED + nsects * SECTION_64_SIZE > cmdsize {
            return Err(AnalyzerError::MachOParseError {
                message: format!(
                    "segment at offset {} declares {} sections beyond its command size",
                    offset, nsects
                ),
            });
        }

        for i in 0..nsects {
            let sect = offset + SEGMENT_64_FIXED + i * SECTION_64_SIZE;
            let sectname = read_name16(&self.data, sect)?;
            let segname = read_name16(&self.data, sect + 16)?;
            let addr = read_u64(&self.data, sect + 32, swapped)?;
            let size = read_u64(&self.data, sect + 40, swapped)?;
            let sect_offset = read_u32(&self.data, sect + 48, swapped)?;

            self.sections.push(Section {
                segname,
                sectname,
                addr,
                size,
                offset: sect_offset,
            });
        }
        Ok(())
    }

    fn parse_symbols(
        &mut self,
        symoff: usize,
        nsyms: usize,
        stroff: usize,
        strsize: usize,
    ) -> Result<()> {
        let swapped = self.header.is_swapped;
        let str_end = stroff.saturating_add(strsize).min(self.data.len());

        for i in 0..nsyms {
            let entry = symoff + i * NLIST_64_SIZE;
            if entry + NLIST_64_SIZE > self.data.len() {
                warn!(index = i, "symbol table truncated");
                break;
            }
            let n_strx = read_u32(&self.data, entry, swapped)? as usize;
            let n_value = read_u64(&self.data, entry + 8, swapped)?;

            let Some(name) = read_cstr(&self.data, stroff + n_strx, str_end) else {
                continue;
            };
            self.symbols.push(Symbol {
                name,
                address: n_value,
            });
        }
        Ok(())
    }

    /// The raw image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The architecture decoded from the CPU type.
    pub fn arch(&self) -> Arch {
        match self.header.cpu_type {
            cpu_type::ARM64 => Arch::Arm64,
            cpu_type::X86_64 => Arch::X86_64,
            _ => Arch::Unknown,
        }
    }

    /// Find a section by its `sectname`.
    pub fn section_named(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.sectname == name)
    }

    /// The raw bytes of a section.
    pub fn section_bytes(&self, section: &Section) -> Result<&[u8]> {
        slice_at(&self.data, section.offset as usize, section.size as usize)
    }
}

/// Minimal thin arm64 image for tests: one `__TEXT,__text` section holding
/// the given code words and a symbol table with one named symbol.
#[cfg(test)]
pub(crate) fn build_test_image(code: &[u32], symbol: &str) -> Vec<u8> {
    let seg_cmdsize = (SEGMENT_64_FIXED + SECTION_64_SIZE) as u32;
    let symtab_cmdsize = 24u32;
    let code_off = (HEADER_SIZE_64 as u32) + seg_cmdsize + symtab_cmdsize;
    let code_len = (code.len() * 4) as u32;
    let symoff = code_off + code_len;
    let stroff = symoff + NLIST_64_SIZE as u32;
    let strtab: Vec<u8> = {
        let mut s = vec![0u8];
        s.extend_from_slice(symbol.as_bytes());
        s.push(0);
        s
    };

    let mut data = Vec::new();
    // mach_header_64
    data.extend_from_slice(&magic::MH_MAGIC_64.to_le_bytes());
    data.extend_from_slice(&cpu_type::ARM64.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes()); // cpu_subtype
    data.extend_from_slice(&2u32.to_le_bytes()); // MH_EXECUTE
    data.extend_from_slice(&2u32.to_le_bytes()); // ncmds
    data.extend_from_slice(&(seg_cmdsize + symtab_cmdsize).to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes()); // flags
    data.extend_from_slice(&0u32.to_le_bytes()); // reserved

    // LC_SEGMENT_64 with one section
    data.extend_from_slice(&load_command::LC_SEGMENT_64.to_le_bytes());
    data.extend_from_slice(&seg_cmdsize.to_le_bytes());
    let mut segname = [0u8; 16];
    segname[..6].copy_from_slice(b"__TEXT");
    data.extend_from_slice(&segname);
    data.extend_from_slice(&0x1000u64.to_le_bytes()); // vmaddr
    data.extend_from_slice(&(code_len as u64).to_le_bytes()); // vmsize
    data.extend_from_slice(&(code_off as u64).to_le_bytes()); // fileoff
    data.extend_from_slice(&(code_len as u64).to_le_bytes()); // filesize
    data.extend_from_slice(&5u32.to_le_bytes()); // maxprot
    data.extend_from_slice(&5u32.to_le_bytes()); // initprot
    data.extend_from_slice(&1u32.to_le_bytes()); // nsects
    data.extend_from_slice(&0u32.to_le_bytes()); // flags

    // section_64
    let mut sectname = [0u8; 16];
    sectname[..6].copy_from_slice(b"__text");
    data.extend_from_slice(&sectname);
    data.extend_from_slice(&segname);
    data.extend_from_slice(&0x1000u64.to_le_bytes()); // addr
    data.extend_from_slice(&(code_len as u64).to_le_bytes()); // size
    data.extend_from_slice(&code_off.to_le_bytes()); // offset
    data.extend_from_slice(&[0u8; 28]); // align..reserved2

    // LC_SYMTAB
    data.extend_from_slice(&load_command::LC_SYMTAB.to_le_bytes());
    data.extend_from_slice(&symtab_cmdsize.to_le_bytes());
    data.extend_from_slice(&symoff.to_le_bytes());
    data.extend_from_slice(&1u32.to_le_bytes()); // nsyms
    data.extend_from_slice(&stroff.to_le_bytes());
    data.extend_from_slice(&(strtab.len() as u32).to_le_bytes());

    // code
    for word in code {
        data.extend_from_slice(&word.to_le_bytes());
    }

    // nlist_64
    data.extend_from_slice(&1u32.to_le_bytes()); // n_strx
    data.extend_from_slice(&[0x0F, 1]); // n_type, n_sect
    data.extend_from_slice(&0u16.to_le_bytes()); // n_desc
    data.extend_from_slice(&0x1000u64.to_le_bytes()); // n_value

    data.extend_from_slice(&strtab);
    data
}
