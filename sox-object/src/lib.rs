//! ELF64 and Mach-O 64 relocatable object file writers.
//!
//! Both writers consume the same target-independent `ObjectModel`, built
//! once from a `sox_codegen::isa::CompiledModule` via
//! `ObjectModel::from_compiled`.

mod elf;
mod error;
mod macho;
mod model;
mod writer;

pub use elf::write_elf64;
pub use error::ObjectError;
pub use macho::write_macho64;
pub use model::{Binding, ObjRelocation, ObjSymbol, ObjectModel, Section, RODATA, TEXT};

/// Which container format to emit; picked by the CLI from the host platform
/// or an explicit flag.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ObjectFormat {
    Elf64,
    MachO64,
}

impl std::str::FromStr for ObjectFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "elf" | "elf64" => Ok(ObjectFormat::Elf64),
            "macho" | "macho64" => Ok(ObjectFormat::MachO64),
            other => Err(format!("unsupported object format `{other}`")),
        }
    }
}

/// Serialize `model` in the requested container format.
pub fn write_object(model: &ObjectModel, format: ObjectFormat) -> Result<Vec<u8>, ObjectError> {
    match format {
        ObjectFormat::Elf64 => write_elf64(model),
        ObjectFormat::MachO64 => write_macho64(model),
    }
}
