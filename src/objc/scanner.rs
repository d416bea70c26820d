//! Byte-level scanner for Objective-C runtime symbols.
//!
//! Pass order matters: typed prefixes run first, then ivars, then
//! bracketed methods. Later passes auto-create classes the earlier
//! passes missed, so reordering changes which pass owns creation but
//! not the converged result. Every insertion goes through the model's
//! de-duplicating accessors.

use memchr::{memchr, memchr_iter, memmem};
use tracing::debug;

use crate::types::{ClassDump, ScanOptions};

const CLASS_PREFIX: &[u8] = b"_OBJC_CLASS_$_";
const METACLASS_PREFIX: &[u8] = b"_OBJC_METACLASS_$_";
const CATEGORY_PREFIX: &[u8] = b"_OBJC_CATEGORY_$_";
const PROTOCOL_PREFIX: &[u8] = b"_OBJC_PROTOCOL_$_";
const IVAR_PREFIX: &[u8] = b"_OBJC_IVAR_$_";

/// Apple's mangling for category symbols: `<Class>_$_<Category>`.
const CATEGORY_SEPARATOR: &str = "_$_";

/// Upper bound on a symbol tail.
const TAIL_LIMIT: usize = 255;

/// Upper bound on a bracketed `-[Class selector]` body.
const METHOD_LIMIT: usize = 200;

/// Selector strings used by the placeholder fallback on stripped
/// binaries.
const COMMON_SELECTORS: [&[u8]; 10] = [
    b"init",
    b"dealloc",
    b"alloc",
    b"retain",
    b"release",
    b"autorelease",
    b"copy",
    b"mutableCopy",
    b"description",
    b"debugDescription",
];

/// Scan raw binary bytes for the Objective-C/Swift runtime surface.
pub fn scan(data: &[u8], options: &ScanOptions) -> ClassDump {
    let mut dump = ClassDump::new();

    scan_classes(data, &mut dump);
    scan_metaclasses(data, &mut dump);
    scan_categories(data, &mut dump);
    scan_protocols(data, &mut dump);
    scan_ivars(data, &mut dump);
    scan_methods(data, &mut dump);

    if dump.is_empty() && options.placeholder_entities {
        insert_placeholders(data, &mut dump);
    }

    dump
}

/// The printable tail after a prefix match: bytes up to the first
/// NUL/CR/LF, bounded at [`TAIL_LIMIT`].
fn tail_at(data: &[u8], start: usize) -> Option<String> {
    let slice = data.get(start..)?;
    let mut len = 0;
    for &b in slice.iter().take(TAIL_LIMIT) {
        if b == 0 || b == b'\n' || b == b'\r' {
            break;
        }
        len += 1;
    }
    if len == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&slice[..len]).into_owned())
}

fn scan_classes(data: &[u8], dump: &mut ClassDump) {
    for pos in memmem::find_iter(data, CLASS_PREFIX) {
        let Some(name) = tail_at(data, pos + CLASS_PREFIX.len()) else {
            continue;
        };
        debug!(class = %name, offset = pos, "found class symbol");
        dump.ensure_class(&name);
    }
}

fn scan_metaclasses(data: &[u8], dump: &mut ClassDump) {
    for pos in memmem::find_iter(data, METACLASS_PREFIX) {
        let Some(name) = tail_at(data, pos + METACLASS_PREFIX.len()) else {
            continue;
        };
        // Usually the class symbol was already seen; only a metaclass
        // with no class counterpart is marked as such.
        if dump.class_named(&name).is_none() {
            debug!(class = %name, "found metaclass-only symbol");
            dump.ensure_class(&name).is_metaclass = true;
        }
    }
}

fn scan_categories(data: &[u8], dump: &mut ClassDump) {
    for pos in memmem::find_iter(data, CATEGORY_PREFIX) {
        let Some(tail) = tail_at(data, pos + CATEGORY_PREFIX.len()) else {
            continue;
        };

        let (class_name, category_name) = match tail.find(CATEGORY_SEPARATOR) {
            Some(idx) => {
                let class = &tail[..idx];
                let category = &tail[idx + CATEGORY_SEPARATOR.len()..];
                let class = if class.is_empty() { "NSObject" } else { class };
                (class.to_string(), category.to_string())
            }
            None => ("NSObject".to_string(), tail.clone()),
        };
        if category_name.is_empty() {
            continue;
        }

        debug!(category = %category_name, class = %class_name, "found category symbol");
        dump.ensure_category(&class_name, &category_name);
    }
}

fn scan_protocols(data: &[u8], dump: &mut ClassDump) {
    for pos in memmem::find_iter(data, PROTOCOL_PREFIX) {
        let Some(name) = tail_at(data, pos + PROTOCOL_PREFIX.len()) else {
            continue;
        };
        debug!(protocol = %name, "found protocol symbol");
        dump.ensure_protocol(&name);
    }
}

/// Ivar symbols carry a `<Class>.<ivar>` tail. The class is created on
/// demand when the typed passes missed it.
fn scan_ivars(data: &[u8], dump: &mut ClassDump) {
    for pos in memmem::find_iter(data, IVAR_PREFIX) {
        let Some(tail) = tail_at(data, pos + IVAR_PREFIX.len()) else {
            continue;
        };
        let Some(dot) = tail.find('.') else {
            continue;
        };
        let (class_name, ivar_name) = (&tail[..dot], &tail[dot + 1..]);
        if class_name.is_empty() || ivar_name.is_empty() {
            continue;
        }

        debug!(class = class_name, ivar = ivar_name, "found ivar symbol");
        dump.ensure_class(class_name).add_ivar(ivar_name);
    }
}

/// Bracketed selector strings: `-[Class selector]` / `+[Class(Cat)
/// selector]`. `-` routes to instance methods, `+` to class methods.
fn scan_methods(data: &[u8], dump: &mut ClassDump) {
    for bracket in memchr_iter(b'[', data) {
        if bracket == 0 {
            continue;
        }
        let sign = data[bracket - 1];
        if sign != b'-' && sign != b'+' {
            continue;
        }
        let is_class_method = sign == b'+';

        let start = bracket + 1;
        if start >= data.len() {
            continue;
        }
        let limit = METHOD_LIMIT.min(data.len() - start);
        let Some(end) = memchr(b']', &data[start..start + limit]) else {
            continue;
        };
        if end == 0 {
            continue;
        }
        let content = String::from_utf8_lossy(&data[start..start + end]);

        let Some(space) = content.find(' ') else {
            continue;
        };
        let (class_spec, selector) = (&content[..space], &content[space + 1..]);
        if selector.is_empty() {
            continue;
        }

        // The class spec may carry a category suffix: Class(Category).
        let (class_name, category_name) = match (class_spec.find('('), class_spec.find(')')) {
            (Some(open), Some(close)) if close > open => {
                (&class_spec[..open], Some(&class_spec[open + 1..close]))
            }
            _ => (class_spec, None),
        };
        if class_name.is_empty() {
            continue;
        }

        dump.ensure_class(class_name);
        match category_name {
            Some(category) if !category.is_empty() => {
                debug!(
                    selector,
                    class = class_name,
                    category,
                    "found category method"
                );
                dump.ensure_category(class_name, category)
                    .add_method(selector, is_class_method);
            }
            _ => {
                debug!(selector, class = class_name, "found method");
                dump.ensure_class(class_name)
                    .add_method(selector, is_class_method);
            }
        }
    }
}

/// Stripped-binary fallback: when common NSObject selector strings are
/// present but no entities were recovered, insert one sample entity of
/// each kind so downstream consumers have something to show.
fn insert_placeholders(data: &[u8], dump: &mut ClassDump) {
    let mut found = 0usize;
    for selector in COMMON_SELECTORS {
        found += memmem::find_iter(data, selector).count();
    }
    if found == 0 {
        return;
    }

    debug!(hits = found, "selector strings found, inserting samples");
    dump.ensure_class("SampleClass");
    dump.ensure_category("NSObject", "SampleCategory");
    dump.ensure_protocol("SampleProtocol");
}
