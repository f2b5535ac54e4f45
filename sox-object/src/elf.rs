//! ELF64 relocatable object writer: `.text`, an optional `.rodata`, a
//! `.symtab`/`.strtab` pair, and an optional `.rela.text`, laid out in two
//! passes (section data sizes first, then the header/table serialization
//! that depends on those sizes).

use crate::error::ObjectError;
use crate::model::{Binding, ObjectModel, RODATA, TEXT};
use crate::writer::{Layout, StringTable};
use object::elf;
use sox_codegen::binemit::RelocationKind;
use sox_codegen::isa::Arch;

const EHDR_SIZE: u64 = 64;
const SHDR_SIZE: u64 = 64;
const SYM_SIZE: u64 = 24;
const RELA_SIZE: u64 = 24;

struct SectionLayout {
    name_off: u32,
    sh_type: u32,
    sh_flags: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    addralign: u64,
    entsize: u64,
}

fn elf_reloc_type(kind: RelocationKind) -> u32 {
    match kind {
        RelocationKind::X86Plt32 => elf::R_X86_64_PLT32,
        RelocationKind::X86Pc32 => elf::R_X86_64_PC32,
        RelocationKind::Arm64Call26 | RelocationKind::Arm64Jump26 => elf::R_AARCH64_CALL26,
        RelocationKind::Arm64AdrPrelPgHi21 => elf::R_AARCH64_ADR_PREL_PG_HI21,
        RelocationKind::Arm64AddAbsLo12Nc => elf::R_AARCH64_ADD_ABS_LO12_NC,
    }
}

/// Serialize `model` into a complete ELF64 relocatable object (`.o` file
/// contents).
pub fn write_elf64(model: &ObjectModel) -> Result<Vec<u8>, ObjectError> {
    let e_machine = match model.arch {
        Arch::X86_64 => elf::EM_X86_64,
        Arch::Arm64 => elf::EM_AARCH64,
    };

    let has_rodata = !model.sections[RODATA].data.is_empty();
    let has_relocs = !model.relocations.is_empty();

    // Symbols: locals first (ELF requires STB_LOCAL entries to precede all
    // STB_GLOBAL ones), each preceded by the mandatory null symbol.
    let mut locals: Vec<&crate::model::ObjSymbol> =
        model.symbols.iter().filter(|s| s.binding == Binding::Local).collect();
    let mut globals: Vec<&crate::model::ObjSymbol> =
        model.symbols.iter().filter(|s| s.binding != Binding::Local).collect();
    locals.sort_by(|a, b| a.name.cmp(&b.name));
    globals.sort_by(|a, b| a.name.cmp(&b.name));

    let mut strtab = StringTable::new();
    let mut sym_index: std::collections::HashMap<&str, u32> = std::collections::HashMap::new();
    let mut symtab = Layout::new();
    // Null symbol, index 0.
    symtab.u32(0);
    symtab.u8(0);
    symtab.u8(0);
    symtab.u16(0);
    symtab.u64(0);
    symtab.u64(0);

    let mut next_index = 1u32;
    for sym in locals.iter().chain(globals.iter()) {
        let name_off = strtab.add(&sym.name);
        let (shndx, st_type) = match sym.section {
            Some(TEXT) => (1u16, elf::STT_FUNC),
            Some(RODATA) => {
                let idx = if has_rodata { 2u16 } else { 0 };
                (idx, elf::STT_OBJECT)
            }
            _ => (elf::SHN_UNDEF as u16, elf::STT_NOTYPE),
        };
        let bind = match sym.binding {
            Binding::Local => elf::STB_LOCAL,
            Binding::Global | Binding::Undefined => elf::STB_GLOBAL,
        };
        symtab.u32(name_off);
        symtab.u8((bind << 4) | st_type);
        symtab.u8(0);
        symtab.u16(shndx);
        symtab.u64(sym.value as u64);
        symtab.u64(0);
        sym_index.insert(sym.name.as_str(), next_index);
        next_index += 1;
    }

    let mut rela = Layout::new();
    for r in &model.relocations {
        let idx = *sym_index.get(r.symbol.as_str()).ok_or_else(|| {
            ObjectError::UnknownRelocationSymbol { offset: r.offset, symbol: r.symbol.clone() }
        })?;
        rela.u64(r.offset as u64);
        rela.u64(((idx as u64) << 32) | elf_reloc_type(r.kind) as u64);
        rela.i64(r.addend);
    }

    // Section name table and the ordered section list (index 0 is SHN_UNDEF
    // / the implicit null section, never emitted as data).
    let mut shstrtab = StringTable::new();
    let mut sections: Vec<SectionLayout> = Vec::new();
    let mut body = Layout::new();

    // .text
    body.pad_to(16);
    let text_off = EHDR_SIZE + body.offset() as u64;
    body.bytes(&model.sections[TEXT].data);
    sections.push(SectionLayout {
        name_off: shstrtab.add(".text"),
        sh_type: elf::SHT_PROGBITS,
        sh_flags: (elf::SHF_ALLOC | elf::SHF_EXECINSTR) as u64,
        offset: text_off,
        size: model.sections[TEXT].data.len() as u64,
        link: 0,
        info: 0,
        addralign: 16,
        entsize: 0,
    });

    // .rodata
    if has_rodata {
        body.pad_to(16);
        let off = EHDR_SIZE + body.offset() as u64;
        body.bytes(&model.sections[RODATA].data);
        sections.push(SectionLayout {
            name_off: shstrtab.add(".rodata"),
            sh_type: elf::SHT_PROGBITS,
            sh_flags: elf::SHF_ALLOC as u64,
            offset: off,
            size: model.sections[RODATA].data.len() as u64,
            link: 0,
            info: 0,
            addralign: 16,
            entsize: 0,
        });
    }

    // Section indices (1-based; index 0 is the implicit null section) are
    // fully determined by the fixed push order below, so they are computed
    // up front rather than threading them through the later pushes.
    let base_len = sections.len() as u32; // text + optional rodata
    let symtab_section_index = base_len + 1 + u32::from(has_relocs);
    let strtab_section_index = symtab_section_index + 1;

    // .rela.text
    if has_relocs {
        body.pad_to(8);
        let off = EHDR_SIZE + body.offset() as u64;
        body.bytes(&rela.bytes);
        sections.push(SectionLayout {
            name_off: shstrtab.add(".rela.text"),
            sh_type: elf::SHT_RELA,
            sh_flags: elf::SHF_INFO_LINK as u64,
            offset: off,
            size: rela.bytes.len() as u64,
            link: symtab_section_index,
            info: 1, // index of .text within the final section table
            addralign: 8,
            entsize: RELA_SIZE,
        });
    }

    // .symtab
    body.pad_to(8);
    let symtab_off = EHDR_SIZE + body.offset() as u64;
    body.bytes(&symtab.bytes);
    sections.push(SectionLayout {
        name_off: shstrtab.add(".symtab"),
        sh_type: elf::SHT_SYMTAB,
        sh_flags: 0,
        offset: symtab_off,
        size: symtab.bytes.len() as u64,
        link: strtab_section_index,
        info: locals.len() as u32 + 1,
        addralign: 8,
        entsize: SYM_SIZE,
    });

    // .strtab
    let strtab_off = EHDR_SIZE + body.offset() as u64;
    body.bytes(&strtab.bytes);
    sections.push(SectionLayout {
        name_off: shstrtab.add(".strtab"),
        sh_type: elf::SHT_STRTAB,
        sh_flags: 0,
        offset: strtab_off,
        size: strtab.bytes.len() as u64,
        link: 0,
        info: 0,
        addralign: 1,
        entsize: 0,
    });

    // .shstrtab (names itself, so it must be appended to its own table
    // before computing the final byte offset).
    let shstrtab_name_off = shstrtab.add(".shstrtab");
    let shstrtab_off = EHDR_SIZE + body.offset() as u64;
    body.bytes(&shstrtab.bytes);
    let shstrndx = sections.len() as u16 + 1;
    sections.push(SectionLayout {
        name_off: shstrtab_name_off,
        sh_type: elf::SHT_STRTAB,
        sh_flags: 0,
        offset: shstrtab_off,
        size: shstrtab.bytes.len() as u64,
        link: 0,
        info: 0,
        addralign: 1,
        entsize: 0,
    });

    body.pad_to(8);
    let shoff = EHDR_SIZE + body.offset() as u64;

    let mut out = Layout::new();
    // e_ident
    out.bytes(&[0x7f, b'E', b'L', b'F']);
    out.u8(elf::ELFCLASS64);
    out.u8(elf::ELFDATA2LSB);
    out.u8(elf::EV_CURRENT);
    out.u8(elf::ELFOSABI_NONE);
    out.bytes(&[0u8; 8]); // EI_ABIVERSION + padding
    out.u16(elf::ET_REL);
    out.u16(e_machine as u16);
    out.u32(elf::EV_CURRENT as u32);
    out.u64(0); // e_entry
    out.u64(0); // e_phoff
    out.u64(shoff);
    out.u32(0); // e_flags
    out.u16(EHDR_SIZE as u16);
    out.u16(0); // e_phentsize
    out.u16(0); // e_phnum
    out.u16(SHDR_SIZE as u16);
    out.u16((sections.len() + 1) as u16); // + null section
    out.u16(shstrndx);

    out.bytes(&body.bytes);

    // Null section header.
    out.bytes(&[0u8; SHDR_SIZE as usize]);
    for s in &sections {
        out.u32(s.name_off);
        out.u32(s.sh_type);
        out.u64(s.sh_flags);
        out.u64(0); // sh_addr
        out.u64(s.offset);
        out.u64(s.size);
        out.u32(s.link);
        out.u32(s.info);
        out.u64(s.addralign);
        out.u64(s.entsize);
    }

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
    fn header_starts_with_elf_magic() {
        let model = ObjectModel::from_compiled(Arch::X86_64, &sample_module());
        let bytes = write_elf64(&model).unwrap();
        assert_eq!(&bytes[0..4], &[0x7f, b'E', b'L', b'F']);
        assert_eq!(bytes[4], elf::ELFCLASS64);
    }

    #[test]
    fn section_header_count_matches_no_relocation_layout() {
        let model = ObjectModel::from_compiled(Arch::X86_64, &sample_module());
        let bytes = write_elf64(&model).unwrap();
        // e_shnum at offset 60 (u16 LE): null, .text, .symtab, .strtab, .shstrtab = 5
        let shnum = u16::from_le_bytes([bytes[60], bytes[61]]);
        assert_eq!(shnum, 5);
    }

    #[test]
    fn undefined_relocation_symbol_is_recorded_with_shn_undef() {
        let mut module = sample_module();
        module.relocations.push(sox_codegen::binemit::Relocation {
            offset: 4,
            kind: RelocationKind::X86Plt32,
            symbol: "sox_native_print".into(),
            addend: -4,
        });
        let model = ObjectModel::from_compiled(Arch::X86_64, &module);
        assert!(model.symbols.iter().any(|s| s.name == "sox_native_print" && s.section.is_none()));
        let bytes = write_elf64(&model).unwrap();
        assert!(!bytes.is_empty());
    }
}
