//! Mach-O 64 relocatable object writer: one `__TEXT,__text` section, an
//! on-demand `__TEXT,__cstring` section, a symbol/string table pair, and
//! the four load commands a relocatable object needs (segment, symtab,
//! dysymtab, build-version). Two-pass: section/table sizes are computed
//! first, then everything is serialized against the now-known offsets.

use crate::error::ObjectError;
use crate::model::{Binding, ObjectModel, RODATA, TEXT};
use crate::writer::{Layout, StringTable};
use object::macho;
use sox_codegen::binemit::RelocationKind;
use sox_codegen::isa::Arch;

const HEADER_SIZE: u64 = 32;
const SEGMENT_CMD_SIZE: u64 = 72;
const SECTION_SIZE: u64 = 80;
const SYMTAB_CMD_SIZE: u64 = 24;
const DYSYMTAB_CMD_SIZE: u64 = 80;
const BUILD_VERSION_CMD_SIZE: u64 = 24 + 8; // one build-tool entry
const NLIST_SIZE: u64 = 16;
const RELOC_SIZE: u64 = 8;

fn pad16(name: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = name.as_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
    buf
}

fn macho_reloc_type(kind: RelocationKind) -> u32 {
    match kind {
        RelocationKind::X86Plt32 => macho::X86_64_RELOC_BRANCH,
        RelocationKind::X86Pc32 => macho::X86_64_RELOC_SIGNED,
        RelocationKind::Arm64Call26 | RelocationKind::Arm64Jump26 => macho::ARM64_RELOC_BRANCH26,
        RelocationKind::Arm64AdrPrelPgHi21 => macho::ARM64_RELOC_PAGE21,
        RelocationKind::Arm64AddAbsLo12Nc => macho::ARM64_RELOC_PAGEOFF12,
    }
}

/// Serialize `model` into a complete Mach-O 64 relocatable object.
pub fn write_macho64(model: &ObjectModel) -> Result<Vec<u8>, ObjectError> {
    let (cputype, cpusubtype) = match model.arch {
        Arch::X86_64 => (macho::CPU_TYPE_X86_64, macho::CPU_SUBTYPE_X86_64_ALL),
        Arch::Arm64 => (macho::CPU_TYPE_ARM64, macho::CPU_SUBTYPE_ARM64_ALL),
    };

    let has_cstring = !model.sections[RODATA].data.is_empty();
    let nsects = if has_cstring { 2 } else { 1 };

    let ncmds = 3u32; // segment, symtab, dysymtab (build-version folded in below)
    let ncmds = ncmds + 1; // + build-version
    let sizeofcmds = SEGMENT_CMD_SIZE
        + SECTION_SIZE * nsects as u64
        + SYMTAB_CMD_SIZE
        + DYSYMTAB_CMD_SIZE
        + BUILD_VERSION_CMD_SIZE;

    // Symbol ordering dysymtab requires: locals, defined externals
    // (globals), then undefined externals.
    let locals: Vec<&crate::model::ObjSymbol> =
        model.symbols.iter().filter(|s| s.binding == Binding::Local).collect();
    let globals: Vec<&crate::model::ObjSymbol> =
        model.symbols.iter().filter(|s| s.binding == Binding::Global).collect();
    let undefs: Vec<&crate::model::ObjSymbol> =
        model.symbols.iter().filter(|s| s.binding == Binding::Undefined).collect();

    let mut strtab = StringTable::new();
    let mut sym_index: std::collections::HashMap<&str, u32> = std::collections::HashMap::new();
    let mut nlist = Layout::new();
    let mut push_symbol = |sym: &crate::model::ObjSymbol, layout: &mut Layout| {
        let linker_name = match sym.binding {
            Binding::Local => sym.name.clone(),
            Binding::Global | Binding::Undefined => format!("_{}", sym.name),
        };
        let strx = strtab.add(&linker_name);
        let (n_type, n_sect): (u8, u8) = match (sym.binding, sym.section) {
            (Binding::Undefined, _) => (macho::N_UNDF | macho::N_EXT, 0),
            (Binding::Local, Some(TEXT)) => (macho::N_SECT, 1),
            (Binding::Local, Some(RODATA)) => (macho::N_SECT, if has_cstring { 2 } else { 1 }),
            (Binding::Global, Some(TEXT)) => (macho::N_SECT | macho::N_EXT, 1),
            (Binding::Global, Some(RODATA)) => {
                (macho::N_SECT | macho::N_EXT, if has_cstring { 2 } else { 1 })
            }
            _ => (macho::N_UNDF, 0),
        };
        layout.u32(strx);
        layout.u8(n_type);
        layout.u8(n_sect);
        layout.u16(0); // n_desc
        layout.u64(sym.value as u64);
        sym_index.insert(sym.name.as_str(), sym_index.len() as u32);
    };
    for s in &locals {
        push_symbol(s, &mut nlist);
    }
    for s in &globals {
        push_symbol(s, &mut nlist);
    }
    for s in &undefs {
        push_symbol(s, &mut nlist);
    }

    let mut relocs = Layout::new();
    for r in &model.relocations {
        let symbolnum = *sym_index.get(r.symbol.as_str()).ok_or_else(|| {
            ObjectError::UnknownRelocationSymbol { offset: r.offset, symbol: r.symbol.clone() }
        })?;
        relocs.i32(r.offset as i32); // r_address
        let r_type = macho_reloc_type(r.kind);
        let r_info: u32 = (symbolnum & 0x00FF_FFFF)
            | (1 << 24) // r_pcrel
            | (2 << 25) // r_length: 4 bytes
            | (1 << 27) // r_extern
            | (r_type << 28);
        relocs.u32(r_info);
    }

    // --- Layout pass: compute every offset before writing a single byte. ---
    let cmds_end = HEADER_SIZE + sizeofcmds;
    let mut cursor = cmds_end;

    let text_off = cursor;
    cursor += model.sections[TEXT].data.len() as u64;

    let cstring_off = cursor;
    if has_cstring {
        cursor += model.sections[RODATA].data.len() as u64;
    }

    cursor = (cursor + 7) & !7; // 8-byte align before the relocation area
    let reloc_off = cursor;
    cursor += relocs.bytes.len() as u64;

    cursor = (cursor + 7) & !7; // 8-byte align before the symbol table
    let symoff = cursor;
    cursor += nlist.bytes.len() as u64;

    let stroff = cursor;
    let strsize = strtab.bytes.len() as u64;

    // --- Serialize pass. ---
    let mut out = Layout::new();
    out.u32(macho::MH_MAGIC_64);
    out.u32(cputype as u32);
    out.u32(cpusubtype as u32);
    out.u32(macho::MH_OBJECT);
    out.u32(ncmds);
    out.u32(sizeofcmds as u32);
    out.u32(0); // flags
    out.u32(0); // reserved

    // LC_SEGMENT_64 (unnamed top-level segment, matching ld's "one segment
    // per MH_OBJECT" convention).
    out.u32(macho::LC_SEGMENT_64);
    out.u32((SEGMENT_CMD_SIZE + SECTION_SIZE * nsects as u64) as u32);
    out.bytes(&[0u8; 16]); // segname (empty)
    out.u64(0); // vmaddr
    out.u64(cursor - cmds_end); // vmsize: everything after the load commands
    out.u64(text_off);
    out.u64(cursor - cmds_end); // filesize
    out.u32(7); // maxprot: rwx
    out.u32(7); // initprot: rwx
    out.u32(nsects);
    out.u32(0); // flags

    out.bytes(&pad16("__text"));
    out.bytes(&pad16("__TEXT"));
    out.u64(0); // addr
    out.u64(model.sections[TEXT].data.len() as u64);
    out.u32(text_off as u32);
    out.u32(4); // align: 2^4 = 16 bytes
    out.u32(if model.relocations.is_empty() { 0 } else { reloc_off as u32 });
    out.u32(model.relocations.len() as u32);
    out.u32(macho::S_REGULAR | macho::S_ATTR_PURE_INSTRUCTIONS | macho::S_ATTR_SOME_INSTRUCTIONS);
    out.u32(0);
    out.u32(0);
    out.u32(0);

    if has_cstring {
        out.bytes(&pad16("__cstring"));
        out.bytes(&pad16("__TEXT"));
        out.u64(model.sections[TEXT].data.len() as u64); // addr, contiguous after __text
        out.u64(model.sections[RODATA].data.len() as u64);
        out.u32(cstring_off as u32);
        out.u32(0); // align: byte-aligned
        out.u32(0); // no relocations against string literals
        out.u32(0);
        out.u32(macho::S_CSTRING_LITERALS);
        out.u32(0);
        out.u32(0);
        out.u32(0);
    }

    // LC_SYMTAB
    out.u32(macho::LC_SYMTAB);
    out.u32(SYMTAB_CMD_SIZE as u32);
    out.u32(symoff as u32);
    out.u32((locals.len() + globals.len() + undefs.len()) as u32);
    out.u32(stroff as u32);
    out.u32(strsize as u32);

    // LC_DYSYMTAB
    out.u32(macho::LC_DYSYMTAB);
    out.u32(DYSYMTAB_CMD_SIZE as u32);
    out.u32(0); // ilocalsym
    out.u32(locals.len() as u32); // nlocalsym
    out.u32(locals.len() as u32); // iextdefsym
    out.u32(globals.len() as u32); // nextdefsym
    out.u32((locals.len() + globals.len()) as u32); // iundefsym
    out.u32(undefs.len() as u32); // nundefsym
    out.u32(0); // tocoff
    out.u32(0); // ntoc
    out.u32(0); // modtaboff
    out.u32(0); // nmodtab
    out.u32(0); // extrefsymoff
    out.u32(0); // nextrefsyms
    out.u32(0); // indirectsymoff
    out.u32(0); // nindirectsyms
    out.u32(0); // extreloff
    out.u32(0); // nextrel
    out.u32(0); // locreloff
    out.u32(0); // nlocrel

    // LC_BUILD_VERSION: platform = macOS, fixed minos/sdk, one build-tool
    // record (tool = LD, version 0) matching what a real linker emits.
    out.u32(macho::LC_BUILD_VERSION);
    out.u32(BUILD_VERSION_CMD_SIZE as u32);
    out.u32(macho::PLATFORM_MACOS);
    out.u32(0x000B_0000); // minos 11.0.0
    out.u32(0x000B_0000); // sdk 11.0.0
    out.u32(1); // ntools
    out.u32(3); // TOOL_LD
    out.u32(0); // tool version

    out.bytes(&model.sections[TEXT].data);
    if has_cstring {
        out.bytes(&model.sections[RODATA].data);
    }
    out.pad_to(8);
    out.bytes(&relocs.bytes);
    out.pad_to(8);
    out.bytes(&nlist.bytes);
    out.bytes(&strtab.bytes);

    Ok(out.bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sox_codegen::isa::{CompiledModule, CompiledSymbol};

    fn sample_module() -> CompiledModule {
        CompiledModule {
            code: vec![0x90; 16],
            relocations: Vec::new(),
            symbols: vec![CompiledSymbol { name: "sox_main".into(), offset: 0, global: true }],
            rodata: Vec::new(),
        }
    }

    #[test]
    fn header_starts_with_mach_magic_64() {
        let model = ObjectModel::from_compiled(Arch::X86_64, &sample_module());
        let bytes = write_macho64(&model).unwrap();
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), macho::MH_MAGIC_64);
    }

    #[test]
    fn global_symbol_name_is_underscore_prefixed() {
        let model = ObjectModel::from_compiled(Arch::X86_64, &sample_module());
        let bytes = write_macho64(&model).unwrap();
        let needle = b"_sox_main\0";
        assert!(bytes.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn arm64_variant_uses_arm64_cpu_type() {
        let model = ObjectModel::from_compiled(Arch::Arm64, &sample_module());
        let bytes = write_macho64(&model).unwrap();
        let cputype = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(cputype, macho::CPU_TYPE_ARM64 as u32);
    }
}
