//! Type reconstruction from the symbol table.
//!
//! Classifies symbol names into classes, structs, enums, and protocols
//! by substring patterns, assigns a fixed confidence per pattern class,
//! and estimates a NOMINAL size from the name. The size numbers are
//! placeholders kept for compatibility with existing consumers; they
//! are not measurements.

use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::macho::MachO;
use crate::types::{ReconstructedType, TypeCategory};

/// True for `_OBJC_CLASS_$_`, Swift class mangling, or `objc_class`.
pub fn is_class_symbol(name: &str) -> bool {
    name.contains("_OBJC_CLASS_$_") || name.contains("_TtC") || name.contains("objc_class")
}

/// True for names carrying a struct marker.
pub fn is_struct_symbol(name: &str) -> bool {
    name.contains("struct") || name.contains("Struct") || name.contains("_struct_")
}

/// True for names carrying an enum marker.
pub fn is_enum_symbol(name: &str) -> bool {
    name.contains("enum") || name.contains("Enum") || name.contains("_enum_")
}

/// True for names carrying a protocol marker.
pub fn is_protocol_symbol(name: &str) -> bool {
    name.contains("protocol") || name.contains("Protocol") || name.contains("_protocol_")
}

/// The part of `name` after the first occurrence of `marker`, or the
/// whole name when the marker is absent.
fn strip_after<'a>(name: &'a str, marker: &str) -> &'a str {
    match name.find(marker) {
        Some(idx) => &name[idx + marker.len()..],
        None => name,
    }
}

/// Class name with the ObjC runtime prefix removed.
pub fn extract_class_name(name: &str) -> &str {
    strip_after(name, "_OBJC_CLASS_$_")
}

/// Struct name with the `_struct_` marker removed.
pub fn extract_struct_name(name: &str) -> &str {
    strip_after(name, "_struct_")
}

/// Enum name with the `_enum_` marker removed.
pub fn extract_enum_name(name: &str) -> &str {
    strip_after(name, "_enum_")
}

/// Protocol name with the `_protocol_` marker removed.
pub fn extract_protocol_name(name: &str) -> &str {
    strip_after(name, "_protocol_")
}

/// Nominal class instance size by name pattern.
pub fn estimate_class_size(name: &str) -> u64 {
    if name.contains("View") || name.contains("Controller") {
        200
    } else if name.contains("Model") {
        100
    } else if name.contains("Manager") {
        150
    } else {
        64
    }
}

/// Nominal struct size by name pattern.
pub fn estimate_struct_size(name: &str) -> u64 {
    if name.contains("Point") || name.contains("Size") {
        16
    } else if name.contains("Rect") {
        32
    } else if name.contains("Range") {
        16
    } else {
        24
    }
}

/// Nominal enum size by name pattern.
pub fn estimate_enum_size(name: &str) -> u64 {
    if name.contains("Int") || name.contains("Raw") {
        8
    } else {
        4
    }
}

fn estimated_size(name: &str, category: TypeCategory) -> u64 {
    match category {
        TypeCategory::Class => estimate_class_size(name),
        TypeCategory::Struct => estimate_struct_size(name),
        TypeCategory::Enum => estimate_enum_size(name),
        _ => 0,
    }
}

/// Classification confidence for a symbol name.
fn confidence_for(symbol_name: &str, category: TypeCategory) -> f64 {
    if symbol_name.contains("_OBJC_CLASS_$_") {
        return 0.9;
    }
    if category == TypeCategory::Class
        && (symbol_name.contains("_TtC") || symbol_name.contains("_Tt"))
    {
        return 0.85;
    }
    match category {
        TypeCategory::Enum | TypeCategory::Struct => 0.75,
        TypeCategory::Protocol => 0.7,
        _ => 0.6,
    }
}

/// Reconstruct the type list for the binary at `path`.
pub fn reconstruct_types<P: AsRef<Path>>(path: P) -> Result<Vec<ReconstructedType>> {
    let image = MachO::open(path)?;
    let types = reconstruct_from_image(&image);
    info!(count = types.len(), "type reconstruction complete");
    Ok(types)
}

/// Walk a parsed image's symbols and classify each by name pattern.
/// De-duplicates by extracted name; unclassifiable symbols are skipped.
pub fn reconstruct_from_image(image: &MachO) -> Vec<ReconstructedType> {
    let mut types: Vec<ReconstructedType> = Vec::with_capacity(32);

    for symbol in &image.symbols {
        if symbol.name.is_empty() {
            continue;
        }

        let (category, type_name) = if is_class_symbol(&symbol.name) {
            (TypeCategory::Class, extract_class_name(&symbol.name))
        } else if is_struct_symbol(&symbol.name) {
            (TypeCategory::Struct, extract_struct_name(&symbol.name))
        } else if is_enum_symbol(&symbol.name) {
            (TypeCategory::Enum, extract_enum_name(&symbol.name))
        } else if is_protocol_symbol(&symbol.name) {
            (TypeCategory::Protocol, extract_protocol_name(&symbol.name))
        } else {
            continue;
        };

        if type_name.is_empty() {
            continue;
        }
        if types.iter().any(|t| t.name == type_name) {
            continue;
        }

        types.push(ReconstructedType {
            name: type_name.to_string(),
            address: symbol.address,
            size: estimated_size(type_name, category),
            category,
            confidence: confidence_for(&symbol.name, category),
        });
    }

    types
}
