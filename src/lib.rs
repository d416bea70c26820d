//! Mach-O Analyzer - Static Analysis for Apple Binaries
//!
//! This library disassembles Mach-O executables and shared libraries and
//! reconstructs their Objective-C/Swift type surface.
//!
//! # Features
//!
//! - **Disassembly**: AArch64 (fixed-width, table-driven) and x86-64
//!   (variable-length, fallback-heavy) decoders behind a linear driver
//!   with function-boundary heuristics
//! - **Class Dump**: byte-level scanner for ObjC runtime symbols and
//!   bracketed selectors, emitting a printable pseudo-header
//! - **Type Reconstruction**: symbol-table classification into classes,
//!   structs, enums, and protocols with nominal size estimates
//! - **Mach-O Walker**: thin 64-bit images, fat-slice selection,
//!   sections, and symbol table
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use macho_analyzer::{disassemble_file, generate_header_file, ScanOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Disassemble the executable section
//!     let instructions = disassemble_file("path/to/binary", "__text")?;
//!     for inst in &instructions {
//!         println!("{}", inst);
//!     }
//!
//!     // Reconstruct the ObjC surface as a pseudo-header
//!     let header = generate_header_file("path/to/binary", &ScanOptions::new())?;
//!     println!("{}", header);
//!     Ok(())
//! }
//! ```
//!
//! # Guarantees
//!
//! Decoders are total: malformed instruction words never fail, they
//! degrade to `.word`/`.byte` records. The scanner never rejects a
//! binary; partial results are always consistent. File-level failures
//! (missing file, truncated image, missing section) surface as
//! [`AnalyzerError`] values.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]

pub mod disasm;
pub mod error;
pub mod macho;
pub mod objc;
pub mod typeinfo;
pub mod types;

pub use disasm::Disassembly;
pub use error::{AnalyzerError, Result};
pub use macho::MachO;
pub use objc::{class_dump_file, generate_header_file};
pub use typeinfo::reconstruct_types;
pub use types::{
    Arch, BranchInfo, BranchKind, ClassDump, DisasmFlags, Instruction, InstructionCategory,
    ObjcCategory, ObjcClass, ObjcProtocol, PcRelTarget, RawEncoding, ReconstructedType,
    ScanOptions, TypeCategory,
};

use std::path::Path;

/// Disassemble a named section of the binary at `path`, with default
/// heuristics.
///
/// # Arguments
///
/// * `path` - Path to the Mach-O binary
/// * `section` - Section name, typically `__text`
///
/// # Errors
///
/// Fails when the file cannot be read or parsed, the section is
/// missing, or the image's CPU type has no decoder.
pub fn disassemble_file<P: AsRef<Path>>(path: P, section: &str) -> Result<Vec<Instruction>> {
    disassemble_file_with_flags(path, section, DisasmFlags::default())
}

/// Disassemble a named section with explicit heuristic flags.
pub fn disassemble_file_with_flags<P: AsRef<Path>>(
    path: P,
    section: &str,
    flags: DisasmFlags,
) -> Result<Vec<Instruction>> {
    let image = MachO::open(path)?;
    if image.arch() == Arch::Unknown {
        return Err(AnalyzerError::UnsupportedCpuType {
            cpu_type: image.header.cpu_type,
        });
    }

    let mut disasm = Disassembly::new(&image);
    disasm.set_flags(flags);
    disasm.load_section(section)?;
    disasm.run();
    Ok(disasm.into_instructions())
}

/// Get version information for this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
