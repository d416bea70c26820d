//! Error types for the Mach-O analyzer.
//!
//! This module defines all error types used throughout the analyzer,
//! providing detailed error information for debugging and user feedback.

use thiserror::Error;

/// Primary error type for the Mach-O analyzer.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is too small to contain valid binary data.
    #[error("File too small: expected at least {expected} bytes, got {actual}")]
    FileTooSmall { expected: usize, actual: usize },

    /// Invalid or unrecognized magic bytes.
    #[error("Not a Mach-O binary: magic bytes {magic:02X?}")]
    NotMachO { magic: Vec<u8> },

    /// A 32-bit Mach-O image; only 64-bit images are handled.
    #[error("Unsupported Mach-O: 32-bit image (magic 0x{magic:08X})")]
    Unsupported32Bit { magic: u32 },

    /// Error walking the Mach-O structure.
    #[error("Mach-O parse error: {message}")]
    MachOParseError { message: String },

    /// Truncated data when reading.
    #[error("Truncated data at offset {offset}: expected {expected} bytes, got {actual}")]
    TruncatedData {
        offset: usize,
        expected: usize,
        actual: usize,
    },

    /// Fat binary with no usable slices.
    #[error("Fat binary has no architectures")]
    EmptyFatBinary,

    /// A named section was not found in the image.
    #[error("Section not found: {name}")]
    SectionNotFound { name: String },

    /// The image's CPU type has no decoder.
    #[error("Unsupported CPU type: 0x{cpu_type:08X}")]
    UnsupportedCpuType { cpu_type: u32 },

    /// The image has no symbol table load command.
    #[error("No symbol table in image")]
    NoSymbolTable,
}

/// Result type alias for analyzer operations.
pub type Result<T> = std::result::Result<T, AnalyzerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnalyzerError::FileTooSmall {
            expected: 32,
            actual: 4,
        };
        assert!(err.to_string().contains("32"));
        assert!(err.to_string().contains("4"));
    }

    #[test]
    fn test_section_not_found() {
        let err = AnalyzerError::SectionNotFound {
            name: "__text".to_string(),
        };
        assert!(err.to_string().contains("__text"));
    }

    #[test]
    fn test_unsupported_cpu() {
        let err = AnalyzerError::UnsupportedCpuType { cpu_type: 0x12 };
        assert!(err.to_string().contains("00000012"));
    }
}
