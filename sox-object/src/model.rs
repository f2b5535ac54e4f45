//! Target-independent object model that both writers serialize: sections,
//! a symbol table, and relocations referencing symbols by name. Built once
//! from a `CompiledModule` and then handed to whichever format writer the
//! caller picked.

use sox_codegen::binemit::RelocationKind;
use sox_codegen::isa::{Arch, CompiledModule};

/// One contiguous section of bytes destined for the object file.
#[derive(Clone, Debug)]
pub struct Section {
    pub name: &'static str,
    pub data: Vec<u8>,
    pub align: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Binding {
    Local,
    Global,
    /// Referenced but not defined in this object; resolved at link/run
    /// time (a runtime or libc symbol).
    Undefined,
}

#[derive(Clone, Debug)]
pub struct ObjSymbol {
    pub name: String,
    pub binding: Binding,
    /// Index into `ObjectModel::sections`; `None` for undefined symbols.
    pub section: Option<usize>,
    pub value: u32,
}

#[derive(Clone, Debug)]
pub struct ObjRelocation {
    pub offset: u32,
    /// Section the relocation site lives in (always `.text` today).
    pub section: usize,
    pub symbol: String,
    pub kind: RelocationKind,
    pub addend: i64,
}

pub const TEXT: usize = 0;
pub const RODATA: usize = 1;

/// The format-independent view a `CompiledModule` is flattened into before
/// either writer touches it.
pub struct ObjectModel {
    pub arch: Arch,
    pub sections: Vec<Section>,
    pub symbols: Vec<ObjSymbol>,
    pub relocations: Vec<ObjRelocation>,
}

impl ObjectModel {
    pub fn from_compiled(arch: Arch, module: &CompiledModule) -> Self {
        let mut sections = vec![
            Section { name: ".text", data: module.code.clone(), align: 16 },
            Section { name: ".rodata", data: Vec::new(), align: 16 },
        ];

        let mut symbols: Vec<ObjSymbol> = Vec::new();
        for sym in &module.symbols {
            symbols.push(ObjSymbol {
                name: sym.name.clone(),
                binding: if sym.global { Binding::Global } else { Binding::Local },
                section: Some(TEXT),
                value: sym.offset,
            });
        }

        for entry in &module.rodata {
            let offset = sections[RODATA].data.len() as u32;
            sections[RODATA].data.extend_from_slice(&entry.bytes);
            symbols.push(ObjSymbol {
                name: entry.symbol.clone(),
                binding: Binding::Local,
                section: Some(RODATA),
                value: offset,
            });
        }

        let defined: std::collections::HashSet<String> =
            symbols.iter().map(|s| s.name.clone()).collect();
        let mut seen_undefined = std::collections::HashSet::new();
        for reloc in &module.relocations {
            if !defined.contains(reloc.symbol.as_str()) && seen_undefined.insert(reloc.symbol.clone())
            {
                symbols.push(ObjSymbol {
                    name: reloc.symbol.clone(),
                    binding: Binding::Undefined,
                    section: None,
                    value: 0,
                });
            }
        }

        let relocations = module
            .relocations
            .iter()
            .map(|r| ObjRelocation {
                offset: r.offset,
                section: TEXT,
                symbol: r.symbol.clone(),
                kind: r.kind,
                addend: r.addend,
            })
            .collect();

        ObjectModel { arch, sections, symbols, relocations }
    }
}
