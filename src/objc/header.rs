//! Objective-C pseudo-header emission.
//!
//! Pure functions over the runtime-surface model. Property and method
//! types default to `id` / `void` because the scanner does not recover
//! real type encodings.

use crate::types::{ClassDump, ObjcCategory, ObjcClass, ObjcProtocol};

/// Render the full pseudo-header for a scanned binary.
///
/// Total over any model that upholds the key-uniqueness invariant;
/// every entity block ends with `@end` and a blank line.
pub fn generate_header(dump: &ClassDump, binary_path: &str) -> String {
    let mut out = String::with_capacity(8192);

    out.push_str("//\n");
    out.push_str("//  Generated by macho-analyzer class dump\n");
    out.push_str("//  Binary: ");
    out.push_str(binary_path);
    out.push('\n');
    out.push_str("//\n\n");
    out.push_str("#import <Foundation/Foundation.h>\n");
    out.push_str("#import <UIKit/UIKit.h>\n\n");

    for class in &dump.classes {
        out.push_str(&class_interface(class));
    }
    for category in &dump.categories {
        out.push_str(&category_interface(category));
    }
    for protocol in &dump.protocols {
        out.push_str(&protocol_interface(protocol));
    }

    out
}

/// `@interface Name : Super <Protos> { ivars } properties; methods; @end`
pub fn class_interface(class: &ObjcClass) -> String {
    let mut out = String::with_capacity(256);

    out.push_str("@interface ");
    out.push_str(&class.name);
    if !class.superclass.is_empty() {
        out.push_str(" : ");
        out.push_str(&class.superclass);
    }
    if !class.protocols.is_empty() {
        out.push_str(" <");
        out.push_str(&class.protocols.join(", "));
        out.push('>');
    }
    out.push('\n');

    if !class.ivars.is_empty() {
        out.push_str("{\n");
        for ivar in &class.ivars {
            out.push_str("    id ");
            out.push_str(ivar);
            out.push_str(";\n");
        }
        out.push_str("}\n");
    }

    push_properties(&mut out, &class.properties);
    push_methods(&mut out, &class.instance_methods, &class.class_methods);

    out.push_str("@end\n\n");
    out
}

/// `@interface Class (Category) properties; methods; @end`
pub fn category_interface(category: &ObjcCategory) -> String {
    let mut out = String::with_capacity(128);

    out.push_str("@interface ");
    out.push_str(&category.class_name);
    out.push_str(" (");
    out.push_str(&category.category_name);
    out.push_str(")\n");

    push_properties(&mut out, &category.properties);
    push_methods(&mut out, &category.instance_methods, &category.class_methods);

    out.push_str("@end\n\n");
    out
}

/// `@protocol Name <Inherited> methods; @end`
pub fn protocol_interface(protocol: &ObjcProtocol) -> String {
    let mut out = String::with_capacity(128);

    out.push_str("@protocol ");
    out.push_str(&protocol.name);
    if !protocol.protocols.is_empty() {
        out.push_str(" <");
        out.push_str(&protocol.protocols.join(", "));
        out.push('>');
    }
    out.push('\n');

    for method in &protocol.methods {
        out.push_str("- (void)");
        out.push_str(method);
        out.push_str(";\n");
    }

    out.push_str("@end\n\n");
    out
}

fn push_properties(out: &mut String, properties: &[String]) {
    for property in properties {
        out.push_str("@property (nonatomic, strong) id ");
        out.push_str(property);
        out.push_str(";\n");
    }
}

fn push_methods(out: &mut String, instance_methods: &[String], class_methods: &[String]) {
    for method in instance_methods {
        out.push_str("- (void)");
        out.push_str(method);
        out.push_str(";\n");
    }
    for method in class_methods {
        out.push_str("+ (void)");
        out.push_str(method);
        out.push_str(";\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_class_interface() {
        let mut class = ObjcClass::new("Foo");
        class.ivars.push("counter".to_string());
        class.instance_methods.push("tick".to_string());
        class.class_methods.push("shared".to_string());

        let text = class_interface(&class);
        assert_eq!(
            text,
            "@interface Foo : NSObject\n{\n    id counter;\n}\n- (void)tick;\n+ (void)shared;\n@end\n\n"
        );
    }

    #[test]
    fn test_class_interface_with_protocols_and_properties() {
        let mut class = ObjcClass::new("Foo");
        class.protocols.push("NSCopying".to_string());
        class.protocols.push("NSCoding".to_string());
        class.properties.push("title".to_string());

        let text = class_interface(&class);
        assert!(text.contains("@interface Foo : NSObject <NSCopying, NSCoding>"));
        assert!(text.contains("@property (nonatomic, strong) id title;"));
    }

    #[test]
    fn test_category_interface() {
        let mut category = ObjcCategory::new("Foo", "Bar");
        category.instance_methods.push("extra".to_string());

        let text = category_interface(&category);
        assert_eq!(text, "@interface Foo (Bar)\n- (void)extra;\n@end\n\n");
    }

    #[test]
    fn test_protocol_interface() {
        let mut protocol = ObjcProtocol::new("Observing");
        protocol.protocols.push("NSObject".to_string());
        protocol.methods.push("observe".to_string());

        let text = protocol_interface(&protocol);
        assert_eq!(
            text,
            "@protocol Observing <NSObject>\n- (void)observe;\n@end\n\n"
        );
    }

    #[test]
    fn test_header_banner_and_imports() {
        let dump = ClassDump::new();
        let text = generate_header(&dump, "/tmp/app");
        assert!(text.starts_with("//\n//  Generated by"));
        assert!(text.contains("//  Binary: /tmp/app\n"));
        assert!(text.contains("#import <Foundation/Foundation.h>\n"));
        assert!(text.contains("#import <UIKit/UIKit.h>\n\n"));
    }

    #[test]
    fn test_every_entity_ends_with_end_marker() {
        let mut dump = ClassDump::new();
        dump.ensure_class("A");
        dump.ensure_category("A", "B");
        dump.ensure_protocol("C");

        let text = generate_header(&dump, "bin");
        assert_eq!(text.matches("@end\n\n").count(), 3);
        assert!(text.ends_with("@end\n\n"));
    }
}
