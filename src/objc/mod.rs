//! Objective-C / Swift runtime-surface reconstruction.
//!
//! The scanner walks the raw binary for well-known runtime symbol
//! prefixes and bracketed selector strings, building a de-duplicated
//! model of classes, categories, protocols, ivars, and methods. The
//! header emitter renders that model as an Objective-C pseudo-header.

pub mod header;
pub mod scanner;

use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::types::{ClassDump, ScanOptions};

pub use header::generate_header;
pub use scanner::scan;

/// Scan the binary at `path` and return its runtime surface.
///
/// The scanner operates on the raw file bytes; it does not require a
/// well-formed Mach-O image and never fails on malformed contents.
pub fn class_dump_file<P: AsRef<Path>>(path: P, options: &ScanOptions) -> Result<ClassDump> {
    let path = path.as_ref();
    info!(path = %path.display(), "starting class dump");

    let data = std::fs::read(path)?;
    let dump = scanner::scan(&data, options);

    info!(
        classes = dump.classes.len(),
        categories = dump.categories.len(),
        protocols = dump.protocols.len(),
        "class dump complete"
    );
    Ok(dump)
}

/// Scan the binary at `path` and render its pseudo-header.
pub fn generate_header_file<P: AsRef<Path>>(path: P, options: &ScanOptions) -> Result<String> {
    let path = path.as_ref();
    let dump = class_dump_file(path, options)?;
    Ok(header::generate_header(&dump, &path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_class_dump_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x00_OBJC_CLASS_$_Foo\x00junk-[Foo tick]\x00")
            .unwrap();

        let dump = class_dump_file(file.path(), &ScanOptions::new()).unwrap();
        assert_eq!(dump.classes.len(), 1);
        assert_eq!(dump.classes[0].name, "Foo");
        assert_eq!(dump.classes[0].instance_methods, vec!["tick"]);
    }

    #[test]
    fn test_generate_header_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x00_OBJC_CLASS_$_Foo\x00").unwrap();

        let header = generate_header_file(file.path(), &ScanOptions::new()).unwrap();
        assert!(header.contains("@interface Foo : NSObject"));
        assert!(header.contains("#import <Foundation/Foundation.h>"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = class_dump_file("/nonexistent/binary", &ScanOptions::new());
        assert!(err.is_err());
    }
}
