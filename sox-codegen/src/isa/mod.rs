//! Architecture-specific instruction selection, encoding, and code
//! generation.
//!
//! Both ISA backends share the IR, the register allocator, and the
//! relocation/patch model in `crate::binemit`; this module only adds the
//! small amount of glue (`Arch`, `CompiledModule`) common to both, plus the
//! `x64`/`arm64` leaf modules themselves.

pub mod arm64;
pub mod x64;

use crate::binemit::Relocation;

/// Target architecture, matching the `target_arch` strings accepted on the
/// command line.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Arch {
    X86_64,
    Arm64,
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" => Ok(Arch::X86_64),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => Err(format!("unsupported target architecture `{other}`")),
        }
    }
}

/// One defined symbol in a compiled module: a function's entry offset.
#[derive(Clone, Debug)]
pub struct CompiledSymbol {
    pub name: String,
    pub offset: u32,
    pub global: bool,
}

/// A read-only data contribution emitted alongside the code (string
/// literals, unified into a single per-module rodata blob).
#[derive(Clone, Debug)]
pub struct RodataEntry {
    pub symbol: String,
    pub bytes: Vec<u8>,
}

/// The output of compiling an entire `Module` for one ISA: one contiguous
/// code buffer, its relocations, the defined symbols, and any read-only
/// data contributions.
#[derive(Clone, Debug, Default)]
pub struct CompiledModule {
    pub code: Vec<u8>,
    pub relocations: Vec<Relocation>,
    pub symbols: Vec<CompiledSymbol>,
    pub rodata: Vec<RodataEntry>,
}
