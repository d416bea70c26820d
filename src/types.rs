//! Core types for the Mach-O analyzer.
//!
//! This module defines the fundamental types shared by the disassembly
//! engine and the runtime-surface scanner: decoded instruction records,
//! the Objective-C/Swift class model, reconstructed type entries, and
//! the option structures that control analysis behavior.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of the link register (x30) in a register bitmask.
pub const LINK_REGISTER: u8 = 30;

/// Index shared by the stack pointer and the zero register (x31/SP).
///
/// AArch64 overloads encoding 31: most data-processing instructions read
/// it as XZR, while addressing and stack operations treat it as SP. The
/// bitmask uses a single index for both.
pub const STACK_POINTER: u8 = 31;

/// All four NZCV condition flags.
pub const NZCV_ALL: u8 = 0xF;

/// Bitmask with only the given register index set.
#[inline]
pub fn reg_bit(reg: u8) -> u64 {
    1u64 << reg
}

/// Architectures the disassembly engine can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    /// AArch64 / ARM64 (fixed 32-bit encoding)
    Arm64,
    /// x86-64 (variable-length encoding)
    X86_64,
    /// CPU type without a decoder
    Unknown,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::Arm64 => write!(f, "arm64"),
            Arch::X86_64 => write!(f, "x86_64"),
            Arch::Unknown => write!(f, "unknown"),
        }
    }
}

/// Broad instruction classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionCategory {
    /// Integer data processing (arithmetic, logic, moves)
    DataProcessing,
    /// Memory access (loads, stores, pairs)
    LoadStore,
    /// Control transfer
    Branch,
    /// System instructions (hints, barriers, system registers)
    System,
    /// SIMD / floating point
    Simd,
    /// Unrecognized encoding
    Unknown,
}

impl InstructionCategory {
    /// Human-readable category name.
    pub fn name(&self) -> &'static str {
        match self {
            InstructionCategory::DataProcessing => "Data Processing",
            InstructionCategory::LoadStore => "Load/Store",
            InstructionCategory::Branch => "Branch",
            InstructionCategory::System => "System",
            InstructionCategory::Simd => "SIMD",
            InstructionCategory::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for InstructionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Kind of control transfer performed by a branch instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    /// BL/BLR/CALL — saves a return address
    Call,
    /// B/BR/JMP
    Unconditional,
    /// B.cond, CBZ/CBNZ, TBZ/TBNZ, Jcc
    Conditional,
    /// RET
    Return,
}

impl BranchKind {
    /// Human-readable kind name.
    pub fn name(&self) -> &'static str {
        match self {
            BranchKind::Call => "Call",
            BranchKind::Unconditional => "Unconditional",
            BranchKind::Conditional => "Conditional",
            BranchKind::Return => "Return",
        }
    }
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Control-transfer details, present only on branch records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// What kind of transfer this is
    pub kind: BranchKind,
}

/// A PC-relative target computed during decoding.
///
/// Present on direct branches and on ADR/ADRP (which compute an address
/// without transferring control). For direct branches the invariant
/// `target == address + offset` holds; ADRP bases the target on the
/// 4 KiB page of the instruction instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcRelTarget {
    /// Absolute virtual address
    pub target: u64,
    /// Signed byte offset encoded in the instruction
    pub offset: i64,
}

/// The original encoding of a decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawEncoding {
    /// Fixed 32-bit word (AArch64)
    Word(u32),
    /// Variable-length byte sequence (x86-64)
    Bytes(Vec<u8>),
}

impl RawEncoding {
    /// Render the encoding as the listing column: eight hex digits for a
    /// word, lowercase hex pairs for a byte sequence.
    pub fn to_hex(&self) -> String {
        match self {
            RawEncoding::Word(w) => format!("{:08X}", w),
            RawEncoding::Bytes(b) => hex::encode(b),
        }
    }
}

/// A single decoded instruction.
///
/// Decoders are total: every input word or byte sequence produces a
/// record, with unrecognized encodings degrading to a `.word`/`.byte`
/// form tagged [`InstructionCategory::Unknown`]. The mnemonic is never
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Virtual address of the first byte
    pub address: u64,
    /// Original encoding
    pub raw: RawEncoding,
    /// Bytes consumed (4 on AArch64, 1-15 on x86-64)
    pub length: u8,
    /// Instruction mnemonic
    pub mnemonic: String,
    /// Textual operands (may be empty)
    pub operands: String,
    /// Broad classification
    pub category: InstructionCategory,
    /// Control-transfer details, if this is a branch
    pub branch: Option<BranchInfo>,
    /// PC-relative target, if one was computed
    pub target: Option<PcRelTarget>,
    /// True when the instruction changes the program counter
    pub updates_pc: bool,
    /// Bitmask of registers read (indices 0-31)
    pub regs_read: u64,
    /// Bitmask of registers written (indices 0-31)
    pub regs_written: u64,
    /// NZCV nibble when condition flags are set, else 0
    pub flags_written: u8,
    /// Heuristic function-entry marker
    pub is_function_start: bool,
    /// Heuristic function-exit marker
    pub is_function_end: bool,
    /// Annotation appended to the listing line; decoders leave it empty
    pub comment: String,
}

impl Instruction {
    /// Create an empty record for the decoder to populate.
    pub fn new(address: u64, raw: RawEncoding, length: u8) -> Self {
        Self {
            address,
            raw,
            length,
            mnemonic: String::new(),
            operands: String::new(),
            category: InstructionCategory::Unknown,
            branch: None,
            target: None,
            updates_pc: false,
            regs_read: 0,
            regs_written: 0,
            flags_written: 0,
            is_function_start: false,
            is_function_end: false,
            comment: String::new(),
        }
    }

    /// Whether this instruction transfers control.
    pub fn has_branch(&self) -> bool {
        self.branch.is_some()
    }

    /// The branch kind, if this is a branch.
    pub fn branch_kind(&self) -> Option<BranchKind> {
        self.branch.map(|b| b.kind)
    }

    /// The computed PC-relative target address, if any.
    pub fn branch_target(&self) -> Option<u64> {
        self.target.map(|t| t.target)
    }

    /// The signed byte offset behind the target, zero when absent.
    pub fn branch_offset(&self) -> i64 {
        self.target.map(|t| t.offset).unwrap_or(0)
    }

    /// The canonical one-line form `0xADDR: MNEMONIC OPERANDS`.
    pub fn full_disasm(&self) -> String {
        self.to_string()
    }

    /// Listing line with the raw-encoding column:
    /// `0xADDR: RAWBYTES  MNEMONIC OPERANDS`, plus a `; comment` tail
    /// when an annotation is present.
    pub fn listing_line(&self) -> String {
        let mut line = if self.operands.is_empty() {
            format!("0x{:x}: {}  {:<8}", self.address, self.raw.to_hex(), self.mnemonic)
        } else {
            format!(
                "0x{:x}: {}  {:<8} {}",
                self.address,
                self.raw.to_hex(),
                self.mnemonic,
                self.operands
            )
        };
        if !self.comment.is_empty() {
            line.push_str(" ; ");
            line.push_str(&self.comment);
        }
        line
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operands.is_empty() {
            write!(f, "0x{:x}: {}", self.address, self.mnemonic)
        } else {
            write!(f, "0x{:x}: {} {}", self.address, self.mnemonic, self.operands)
        }
    }
}

bitflags! {
    /// Heuristic toggles for the disassembly driver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DisasmFlags: u32 {
        /// Mark function boundaries from STP/LDP frame spills (default on).
        const PROLOGUE_EPILOGUE = 1 << 0;
    }
}

impl Default for DisasmFlags {
    fn default() -> Self {
        DisasmFlags::PROLOGUE_EPILOGUE
    }
}

// =============================================================================
// Runtime-surface model (Objective-C / Swift)
// =============================================================================

/// Append `value` to `list` unless an equal string is already present.
///
/// The model's "sets" are vectors with membership checks so insertion
/// order survives into the emitted header.
pub(crate) fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|s| s == value) {
        list.push(value.to_string());
    }
}

/// A reconstructed Objective-C (or Swift) class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjcClass {
    /// Class name as found in the binary
    pub name: String,
    /// Superclass name; `NSObject` when unknown
    pub superclass: String,
    /// True when the name carries Swift mangling
    pub is_swift: bool,
    /// True when only the metaclass symbol was observed
    pub is_metaclass: bool,
    /// Adopted protocol names
    pub protocols: Vec<String>,
    /// Instance method selectors
    pub instance_methods: Vec<String>,
    /// Class method selectors
    pub class_methods: Vec<String>,
    /// Property names
    pub properties: Vec<String>,
    /// Instance variable names
    pub ivars: Vec<String>,
}

impl ObjcClass {
    /// Create a class with the default `NSObject` superclass.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let is_swift = is_swift_name(&name);
        Self {
            name,
            superclass: "NSObject".to_string(),
            is_swift,
            is_metaclass: false,
            protocols: Vec::new(),
            instance_methods: Vec::new(),
            class_methods: Vec::new(),
            properties: Vec::new(),
            ivars: Vec::new(),
        }
    }

    /// Record a method selector on the appropriate set.
    pub fn add_method(&mut self, selector: &str, is_class_method: bool) {
        if is_class_method {
            push_unique(&mut self.class_methods, selector);
        } else {
            push_unique(&mut self.instance_methods, selector);
        }
    }

    /// Record an instance variable.
    pub fn add_ivar(&mut self, ivar: &str) {
        push_unique(&mut self.ivars, ivar);
    }
}

/// A reconstructed Objective-C category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjcCategory {
    /// Name of the class being extended
    pub class_name: String,
    /// Category name
    pub category_name: String,
    /// Adopted protocol names
    pub protocols: Vec<String>,
    /// Instance method selectors
    pub instance_methods: Vec<String>,
    /// Class method selectors
    pub class_methods: Vec<String>,
    /// Property names
    pub properties: Vec<String>,
}

impl ObjcCategory {
    /// Create an empty category on the given class.
    pub fn new(class_name: impl Into<String>, category_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            category_name: category_name.into(),
            protocols: Vec::new(),
            instance_methods: Vec::new(),
            class_methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Record a method selector on the appropriate set.
    pub fn add_method(&mut self, selector: &str, is_class_method: bool) {
        if is_class_method {
            push_unique(&mut self.class_methods, selector);
        } else {
            push_unique(&mut self.instance_methods, selector);
        }
    }
}

/// A reconstructed Objective-C protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjcProtocol {
    /// Protocol name
    pub name: String,
    /// Inherited protocol names
    pub protocols: Vec<String>,
    /// Method selectors
    pub methods: Vec<String>,
}

impl ObjcProtocol {
    /// Create an empty protocol.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocols: Vec::new(),
            methods: Vec::new(),
        }
    }
}

/// True when a class name carries Swift mangling markers.
pub fn is_swift_name(name: &str) -> bool {
    name.contains("_TtC") || name.contains("_Tt") || name.contains("Swift")
}

/// The complete runtime surface recovered from a binary.
///
/// Invariant: no two classes share a name, no two categories share a
/// `(class_name, category_name)` pair, no two protocols share a name.
/// All mutation goes through the `ensure_*` methods, which uphold it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassDump {
    /// Reconstructed classes, in discovery order
    pub classes: Vec<ObjcClass>,
    /// Reconstructed categories, in discovery order
    pub categories: Vec<ObjcCategory>,
    /// Reconstructed protocols, in discovery order
    pub protocols: Vec<ObjcProtocol>,
}

impl ClassDump {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no entities of any kind were recovered.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.categories.is_empty() && self.protocols.is_empty()
    }

    /// Look up a class by name.
    pub fn class_named(&self, name: &str) -> Option<&ObjcClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Look up a category by its `(class, category)` key.
    pub fn category_named(&self, class_name: &str, category_name: &str) -> Option<&ObjcCategory> {
        self.categories
            .iter()
            .find(|c| c.class_name == class_name && c.category_name == category_name)
    }

    /// Look up a protocol by name.
    pub fn protocol_named(&self, name: &str) -> Option<&ObjcProtocol> {
        self.protocols.iter().find(|p| p.name == name)
    }

    /// Get or create the class with the given name.
    pub fn ensure_class(&mut self, name: &str) -> &mut ObjcClass {
        if let Some(idx) = self.classes.iter().position(|c| c.name == name) {
            return &mut self.classes[idx];
        }
        self.classes.push(ObjcClass::new(name));
        self.classes.last_mut().unwrap()
    }

    /// Get or create the category with the given `(class, category)` key.
    pub fn ensure_category(&mut self, class_name: &str, category_name: &str) -> &mut ObjcCategory {
        if let Some(idx) = self
            .categories
            .iter()
            .position(|c| c.class_name == class_name && c.category_name == category_name)
        {
            return &mut self.categories[idx];
        }
        self.categories
            .push(ObjcCategory::new(class_name, category_name));
        self.categories.last_mut().unwrap()
    }

    /// Get or create the protocol with the given name.
    pub fn ensure_protocol(&mut self, name: &str) -> &mut ObjcProtocol {
        if let Some(idx) = self.protocols.iter().position(|p| p.name == name) {
            return &mut self.protocols[idx];
        }
        self.protocols.push(ObjcProtocol::new(name));
        self.protocols.last_mut().unwrap()
    }
}

/// Options controlling the runtime-surface scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Insert `SampleClass`/`SampleCategory`/`SampleProtocol` when nothing
    /// was found but common NSObject selector strings are present. Demo
    /// behavior for stripped binaries; off unless requested.
    pub placeholder_entities: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            placeholder_entities: false,
        }
    }
}

impl ScanOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with placeholder-entity injection enabled.
    pub fn with_placeholders() -> Self {
        Self {
            placeholder_entities: true,
        }
    }
}

// =============================================================================
// Type reconstruction
// =============================================================================

/// Category assigned to a reconstructed type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCategory {
    /// Value type
    Struct,
    /// Objective-C or Swift class
    Class,
    /// Enumeration
    Enum,
    /// Protocol
    Protocol,
    /// Classified but unrecognized
    Unknown,
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeCategory::Struct => write!(f, "struct"),
            TypeCategory::Class => write!(f, "class"),
            TypeCategory::Enum => write!(f, "enum"),
            TypeCategory::Protocol => write!(f, "protocol"),
            TypeCategory::Unknown => write!(f, "unknown"),
        }
    }
}

/// A type recovered from the symbol table by name-pattern classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructedType {
    /// Extracted type name
    pub name: String,
    /// Symbol address
    pub address: u64,
    /// Nominal size estimate in bytes (name heuristic, not measured)
    pub size: u64,
    /// Assigned category
    pub category: TypeCategory,
    /// Classification confidence (0.0 - 1.0)
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names() {
        assert_eq!(InstructionCategory::LoadStore.name(), "Load/Store");
        assert_eq!(InstructionCategory::Unknown.name(), "Unknown");
        assert_eq!(BranchKind::Call.name(), "Call");
    }

    #[test]
    fn test_instruction_display() {
        let mut inst = Instruction::new(0x1000, RawEncoding::Word(0x14000002), 4);
        inst.mnemonic = "B".to_string();
        inst.operands = "0x1008".to_string();
        assert_eq!(inst.to_string(), "0x1000: B 0x1008");
        assert_eq!(inst.full_disasm(), "0x1000: B 0x1008");
    }

    #[test]
    fn test_instruction_display_no_operands() {
        let mut inst = Instruction::new(0x2000, RawEncoding::Word(0xD503201F), 4);
        inst.mnemonic = "NOP".to_string();
        assert_eq!(inst.to_string(), "0x2000: NOP");
    }

    #[test]
    fn test_listing_line() {
        let mut inst = Instruction::new(0x1000, RawEncoding::Word(0xD65F03C0), 4);
        inst.mnemonic = "RET".to_string();
        inst.operands = "X30".to_string();
        assert_eq!(inst.listing_line(), "0x1000: D65F03C0  RET      X30");

        inst.comment = "epilogue".to_string();
        assert!(inst.listing_line().ends_with(" ; epilogue"));
    }

    #[test]
    fn test_raw_encoding_hex() {
        assert_eq!(RawEncoding::Word(0xD503201F).to_hex(), "D503201F");
        assert_eq!(RawEncoding::Bytes(vec![0xC3]).to_hex(), "c3");
    }

    #[test]
    fn test_branch_accessors() {
        let mut inst = Instruction::new(0x1000, RawEncoding::Word(0x94000003), 4);
        inst.branch = Some(BranchInfo {
            kind: BranchKind::Call,
        });
        inst.target = Some(PcRelTarget {
            target: 0x100C,
            offset: 12,
        });
        assert!(inst.has_branch());
        assert_eq!(inst.branch_kind(), Some(BranchKind::Call));
        assert_eq!(inst.branch_target(), Some(0x100C));
        assert_eq!(inst.branch_offset(), 12);
    }

    #[test]
    fn test_default_flags() {
        assert!(DisasmFlags::default().contains(DisasmFlags::PROLOGUE_EPILOGUE));
    }

    #[test]
    fn test_class_dedup() {
        let mut dump = ClassDump::new();
        dump.ensure_class("Foo");
        dump.ensure_class("Foo");
        assert_eq!(dump.classes.len(), 1);
        assert_eq!(dump.classes[0].superclass, "NSObject");
    }

    #[test]
    fn test_category_key_is_pair() {
        let mut dump = ClassDump::new();
        dump.ensure_category("Foo", "Extras");
        dump.ensure_category("Bar", "Extras");
        dump.ensure_category("Foo", "Extras");
        assert_eq!(dump.categories.len(), 2);
    }

    #[test]
    fn test_method_dedup() {
        let mut class = ObjcClass::new("Foo");
        class.add_method("tick", false);
        class.add_method("tick", false);
        class.add_method("tick", true);
        assert_eq!(class.instance_methods, vec!["tick"]);
        assert_eq!(class.class_methods, vec!["tick"]);
    }

    #[test]
    fn test_swift_detection() {
        assert!(ObjcClass::new("_TtC5MyApp4View").is_swift);
        assert!(ObjcClass::new("SwiftBridge").is_swift);
        assert!(!ObjcClass::new("NSString").is_swift);
    }

    #[test]
    fn test_reg_bit() {
        assert_eq!(reg_bit(0), 1);
        assert_eq!(reg_bit(LINK_REGISTER), 1 << 30);
        assert_eq!(reg_bit(STACK_POINTER), 1 << 31);
    }
}
