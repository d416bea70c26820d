//! Mach-O Analyzer CLI
//!
//! Command-line tool for disassembling Mach-O binaries and
//! reconstructing their Objective-C/Swift type surface.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use macho_analyzer::{
    class_dump_file, disassemble_file_with_flags, objc, reconstruct_types, ClassDump, DisasmFlags,
    Instruction, MachO, ReconstructedType, ScanOptions,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// Static-analysis toolkit for Mach-O binaries.
///
/// Disassembles AArch64 and x86-64 executable sections and recovers
/// Objective-C/Swift classes, categories, and protocols.
#[derive(Parser, Debug)]
#[command(name = "macho-analyze")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file(s) to analyze
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Disassemble the executable section
    #[arg(short, long)]
    disasm: bool,

    /// Section to disassemble
    #[arg(short, long, default_value = "__text")]
    section: String,

    /// Reconstruct the ObjC/Swift class surface
    #[arg(short, long)]
    class_dump: bool,

    /// Emit the ObjC pseudo-header
    #[arg(long)]
    header: bool,

    /// Reconstruct types from the symbol table
    #[arg(short, long)]
    types: bool,

    /// Output format
    #[arg(short, long, default_value = "human")]
    format: OutputFormat,

    /// Insert sample entities when a stripped binary yields nothing
    #[arg(long)]
    placeholder_entities: bool,

    /// Disable the prologue/epilogue function heuristics
    #[arg(long)]
    no_function_heuristics: bool,

    /// Verbose output (installs a tracing subscriber)
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (only output essential info)
    #[arg(short, long)]
    quiet: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("macho_analyzer=debug")
            .init();
    }

    let mut success = true;
    for path in &args.files {
        if let Err(e) = analyze_file(path, &args) {
            if !args.quiet {
                eprintln!("Error analyzing {}: {:#}", path.display(), e);
            }
            success = false;
        }
    }

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn analyze_file(path: &PathBuf, args: &Args) -> anyhow::Result<()> {
    let scan_options = ScanOptions {
        placeholder_entities: args.placeholder_entities,
    };
    let flags = if args.no_function_heuristics {
        DisasmFlags::empty()
    } else {
        DisasmFlags::default()
    };

    let mut ran_any = false;

    if args.disasm {
        let instructions = disassemble_file_with_flags(path, &args.section, flags)
            .with_context(|| format!("disassembling section {}", args.section))?;
        print_disassembly(&instructions, args)?;
        ran_any = true;
    }

    if args.class_dump || args.header {
        let dump = class_dump_file(path, &scan_options).context("scanning runtime surface")?;
        if args.header {
            println!("{}", objc::generate_header(&dump, &path.display().to_string()));
        } else {
            print_class_dump(&dump, args)?;
        }
        ran_any = true;
    }

    if args.types {
        let types = reconstruct_types(path).context("reconstructing types")?;
        print_types(&types, args)?;
        ran_any = true;
    }

    if !ran_any {
        print_summary(path, args)?;
    }

    Ok(())
}

fn print_disassembly(instructions: &[Instruction], args: &Args) -> anyhow::Result<()> {
    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(instructions)?);
        }
        OutputFormat::Human => {
            for inst in instructions {
                if args.quiet {
                    println!("{}", inst);
                } else {
                    println!("{}", inst.listing_line());
                }
            }
            if !args.quiet {
                let functions = instructions.iter().filter(|i| i.is_function_start).count();
                println!();
                println!(
                    "{} instructions, {} function starts",
                    instructions.len(),
                    functions
                );
            }
        }
    }
    Ok(())
}

fn print_class_dump(dump: &ClassDump, args: &Args) -> anyhow::Result<()> {
    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(dump)?);
        }
        OutputFormat::Human => {
            for class in &dump.classes {
                let mut tags = Vec::new();
                if class.is_swift {
                    tags.push("swift");
                }
                if class.is_metaclass {
                    tags.push("metaclass");
                }
                let tag_text = if tags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", tags.join(", "))
                };
                println!(
                    "class {} : {}{} ({} methods, {} ivars)",
                    class.name,
                    class.superclass,
                    tag_text,
                    class.instance_methods.len() + class.class_methods.len(),
                    class.ivars.len()
                );
            }
            for category in &dump.categories {
                println!(
                    "category {} ({}) ({} methods)",
                    category.class_name,
                    category.category_name,
                    category.instance_methods.len() + category.class_methods.len()
                );
            }
            for protocol in &dump.protocols {
                println!("protocol {} ({} methods)", protocol.name, protocol.methods.len());
            }
            if !args.quiet {
                println!();
                println!(
                    "{} classes, {} categories, {} protocols",
                    dump.classes.len(),
                    dump.categories.len(),
                    dump.protocols.len()
                );
            }
        }
    }
    Ok(())
}

fn print_types(types: &[ReconstructedType], args: &Args) -> anyhow::Result<()> {
    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(types)?);
        }
        OutputFormat::Human => {
            for t in types {
                println!(
                    "{:<10} {:<40} 0x{:<12x} {:>4} bytes  {:.0}%",
                    t.category.to_string(),
                    t.name,
                    t.address,
                    t.size,
                    t.confidence * 100.0
                );
            }
            if !args.quiet {
                println!();
                println!("{} types", types.len());
            }
        }
    }
    Ok(())
}

fn print_summary(path: &PathBuf, args: &Args) -> anyhow::Result<()> {
    let image = MachO::open(path).context("parsing Mach-O image")?;

    if args.quiet {
        println!("{}: {}", path.display(), image.arch());
        return Ok(());
    }

    println!("File: {}", path.display());
    println!("  Arch:       {}", image.arch());
    println!("  CPU type:   0x{:08X}", image.header.cpu_type);
    println!("  Swapped:    {}", image.header.is_swapped);
    println!("  Sections:   {}", image.sections.len());
    println!("  Symbols:    {}", image.symbols.len());
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from(["macho-analyze", "test.bin"]).unwrap();
        assert_eq!(args.files.len(), 1);
        assert!(!args.disasm);
        assert_eq!(args.section, "__text");
    }

    #[test]
    fn test_multiple_files() {
        let args = Args::try_parse_from(["macho-analyze", "a.bin", "b.bin"]).unwrap();
        assert_eq!(args.files.len(), 2);
    }

    #[test]
    fn test_format_options() {
        let args = Args::try_parse_from(["macho-analyze", "-f", "json", "test.bin"]).unwrap();
        assert!(matches!(args.format, OutputFormat::Json));
    }

    #[test]
    fn test_mode_flags() {
        let args = Args::try_parse_from([
            "macho-analyze",
            "--disasm",
            "--section",
            "__stubs",
            "--header",
            "test.bin",
        ])
        .unwrap();
        assert!(args.disasm);
        assert!(args.header);
        assert_eq!(args.section, "__stubs");
    }
}
