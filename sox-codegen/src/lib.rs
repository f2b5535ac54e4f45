//! Typed IR, linear-scan register allocation, and the x86-64/ARM64 code
//! generators that turn an `ir::Module` into a relocatable machine-code
//! buffer plus its symbols and relocations.

pub mod binemit;
pub mod error;
pub mod ir;
pub mod isa;
pub mod regalloc;

pub use error::CodegenError;

/// Compile `module` for `arch`, selecting the matching ISA backend.
///
/// `emit_object` controls whether the entry function is additionally
/// exposed under the platform's C `main` symbol (set when producing a
/// linked executable rather than a bare relocatable object).
pub fn compile_module(
    module: &ir::Module,
    arch: isa::Arch,
    emit_object: bool,
) -> Result<isa::CompiledModule, CodegenError> {
    match arch {
        isa::Arch::X86_64 => isa::x64::compile_module(module, emit_object),
        isa::Arch::Arm64 => isa::arm64::compile_module(module, emit_object),
    }
}
