//! Section merging across object views and final-address computation for
//! every defined symbol, once each merged section has a base address.

use crate::object_view::{ObjectView, SectionKind, SymbolLocation};

#[derive(Clone, Debug)]
pub struct Contribution {
    pub object_index: usize,
    pub section_index: usize,
    pub offset: u32,
    pub size: u32,
}

#[derive(Clone, Debug)]
pub struct MergedSection {
    pub kind: SectionKind,
    pub align: u32,
    pub size: u32,
    pub vaddr: u64,
    pub contributions: Vec<Contribution>,
}

/// Target container, which fixes the page size and base address the
/// merged image is laid out against.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TargetFormat {
    Elf,
    MachO,
}

impl TargetFormat {
    fn page_size(self) -> u64 {
        match self {
            TargetFormat::Elf => 0x1000,
            TargetFormat::MachO => 0x4000,
        }
    }

    fn base(self) -> u64 {
        match self {
            TargetFormat::Elf => 0x0040_0000,
            TargetFormat::MachO => 0x1_0000_0000,
        }
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    (value + align - 1) / align * align
}

/// Concatenate every view's same-kind sections, padding between
/// contributions to each contribution's own alignment, then assign each
/// merged section a page-aligned virtual address in canonical order.
pub fn merge_sections(views: &[ObjectView], format: TargetFormat) -> Vec<MergedSection> {
    let mut merged: Vec<MergedSection> = SectionKind::ORDER
        .iter()
        .map(|&kind| MergedSection { kind, align: 1, size: 0, vaddr: 0, contributions: Vec::new() })
        .collect();

    for (object_index, view) in views.iter().enumerate() {
        for (section_index, section) in view.sections.iter().enumerate() {
            let slot = SectionKind::ORDER.iter().position(|k| *k == section.kind).unwrap();
            let m = &mut merged[slot];
            let align = section.align.max(1);
            let offset = align_up(m.size as u64, align as u64) as u32;
            m.align = m.align.max(align);
            m.size = offset + section.size;
            m.contributions.push(Contribution { object_index, section_index, offset, size: section.size });
        }
    }

    let page_size = format.page_size();
    let mut vaddr = format.base() + page_size;
    for m in &mut merged {
        vaddr = align_up(vaddr, page_size);
        m.vaddr = vaddr;
        vaddr += m.size as u64;
    }
    merged
}

/// Final address of one defined symbol; `None` if its owning object's
/// section/contribution bookkeeping doesn't line up (the symbol's section
/// index isn't one `merge_sections` actually absorbed).
pub fn final_address(
    views: &[ObjectView],
    merged: &[MergedSection],
    object_index: usize,
    symbol_index: usize,
) -> Option<u64> {
    let sym = views.get(object_index)?.symbols.get(symbol_index)?;
    match sym.location {
        None => Some(0),
        Some(SymbolLocation::Absolute) => Some(sym.value as u64),
        Some(SymbolLocation::Section(section_index)) => {
            let section = views[object_index].sections.get(section_index)?;
            let m = merged.iter().find(|m| m.kind == section.kind)?;
            let contribution = m
                .contributions
                .iter()
                .find(|c| c.object_index == object_index && c.section_index == section_index)?;
            Some(m.vaddr + contribution.offset as u64 + sym.value as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_view::{ViewSection, ViewSymbol};
    use sox_object::Binding;

    fn view(name: &str, text_len: usize, sym_name: &str, sym_value: u32) -> ObjectView {
        ObjectView {
            name: name.into(),
            sections: vec![ViewSection {
                kind: SectionKind::Text,
                data: vec![0x90; text_len],
                align: 16,
                size: text_len as u32,
            }],
            symbols: vec![ViewSymbol {
                name: sym_name.into(),
                binding: Binding::Global,
                linkage: None,
                location: Some(SymbolLocation::Section(0)),
                value: sym_value,
            }],
        }
    }

    #[test]
    fn merged_vaddr_is_page_aligned() {
        let views = [view("a.o", 16, "f", 0)];
        let merged = merge_sections(&views, TargetFormat::Elf);
        let text = merged.iter().find(|m| m.kind == SectionKind::Text).unwrap();
        assert_eq!(text.vaddr % 0x1000, 0);
    }

    #[test]
    fn second_contribution_is_padded_to_its_alignment() {
        let views = [view("a.o", 5, "f", 0), view("b.o", 5, "g", 0)];
        let merged = merge_sections(&views, TargetFormat::Elf);
        let text = merged.iter().find(|m| m.kind == SectionKind::Text).unwrap();
        assert_eq!(text.contributions[0].offset, 0);
        assert_eq!(text.contributions[1].offset % 16, 0);
        assert!(text.contributions[1].offset >= 5);
    }

    #[test]
    fn final_address_accounts_for_contribution_offset_and_symbol_value() {
        let views = [view("a.o", 16, "f", 0), view("b.o", 16, "g", 4)];
        let merged = merge_sections(&views, TargetFormat::Elf);
        let text = merged.iter().find(|m| m.kind == SectionKind::Text).unwrap();
        let addr = final_address(&views, &merged, 1, 0).unwrap();
        let contribution = &text.contributions[1];
        assert_eq!(addr, text.vaddr + contribution.offset as u64 + 4);
    }

    #[test]
    fn undefined_symbol_has_zero_final_address() {
        let views = [ObjectView {
            name: "a.o".into(),
            sections: vec![],
            symbols: vec![ViewSymbol {
                name: "printf".into(),
                binding: Binding::Undefined,
                linkage: None,
                location: None,
                value: 0,
            }],
        }];
        let merged = merge_sections(&views, TargetFormat::Elf);
        assert_eq!(final_address(&views, &merged, 0, 0), Some(0));
    }
}
