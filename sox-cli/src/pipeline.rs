//! The three top-level operations the CLI wires flags to: `generate_object`,
//! `generate_executable`, and `link`. Each returns a single boolean success
//! value, consistent with the back end's failure-semantics contract;
//! diagnostics go to `log`/stderr rather than the return value.

use anyhow::{Context, Result};
use sox_codegen::isa::{Arch, CompiledModule};
use sox_object::ObjectFormat;

use crate::input::read_closures;
use crate::options::{EmitArgs, LinkArgs};

fn format_for_os(os: &str) -> Result<ObjectFormat> {
    match os {
        "linux" => Ok(ObjectFormat::Elf64),
        "macos" | "darwin" => Ok(ObjectFormat::MachO64),
        other => anyhow::bail!("unsupported target OS `{other}`"),
    }
}

fn compile(input: &std::path::Path, arch: Arch, emit_object: bool) -> Result<CompiledModule> {
    let closures =
        read_closures(input).with_context(|| format!("reading {}", input.display()))?;
    let source_name = input.to_string_lossy();
    let module = sox_frontend::build_module(&source_name, &closures)
        .with_context(|| format!("building IR for {}", input.display()))?;
    sox_codegen::compile_module(&module, arch, emit_object)
        .with_context(|| format!("compiling {}", input.display()))
}

/// Compile and write the object file, downgrading a codegen/write failure to
/// a logged diagnostic and `Ok(false)` rather than propagating it — the same
/// failure-semantics contract `link` implements below.
fn write_object_file(args: &EmitArgs, emit_object: bool) -> Result<bool> {
    let arch: Arch = args.target.parse().map_err(anyhow::Error::msg)?;
    let format = format_for_os(&args.os)?;

    let compiled = match compile(&args.input, arch, emit_object) {
        Ok(compiled) => compiled,
        Err(err) => {
            log::error!("{err:#}");
            return Ok(false);
        }
    };

    let model = sox_object::ObjectModel::from_compiled(arch, &compiled);
    let bytes = match sox_object::write_object(&model, format) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::error!("writing object for {}: {err}", args.input.display());
            return Ok(false);
        }
    };

    std::fs::write(&args.output, &bytes)
        .with_context(|| format!("writing {}", args.output.display()))?;
    log::info!("wrote {} ({} bytes)", args.output.display(), bytes.len());
    Ok(true)
}

/// Emit a bare relocatable object (entry symbol `sox_main` only).
pub fn generate_object(args: &EmitArgs) -> Result<bool> {
    write_object_file(args, true)
}

/// Emit an object whose entry is additionally aliased to `main`.
pub fn generate_executable(args: &EmitArgs) -> Result<bool> {
    write_object_file(args, false)
}

/// Compile every input independently, then resolve their symbols and merge
/// their sections as one link unit. Operates on the in-process object
/// models the compile step just produced, since no reader exists (or is
/// specified) for previously written `.o`/Mach-O files on disk.
pub fn link(args: &LinkArgs) -> Result<bool> {
    let arch: Arch = args.target.parse().map_err(anyhow::Error::msg)?;
    let format = format_for_os(&args.os)?;
    let target_format = match format {
        ObjectFormat::Elf64 => sox_module::TargetFormat::Elf,
        ObjectFormat::MachO64 => sox_module::TargetFormat::MachO,
    };

    let mut views = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let compiled = compile(input, arch, true)?;
        let model = sox_object::ObjectModel::from_compiled(arch, &compiled);
        views.push(sox_module::ObjectView::from_object_model(input.to_string_lossy(), &model));
    }

    let report = sox_module::resolve(&views);
    for error in &report.errors {
        eprintln!("error: {error}");
    }

    if report.success {
        let merged = sox_module::merge_sections(&views, target_format);
        for section in &merged {
            log::debug!(
                "merged {:?}: vaddr=0x{:x} size=0x{:x} align={}",
                section.kind,
                section.vaddr,
                section.size,
                section.align
            );
        }
    }

    Ok(report.success)
}
