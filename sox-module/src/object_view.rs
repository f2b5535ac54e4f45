//! The resolver's input unit: one compiled object's sections and symbol
//! table, independent of the container format it was (or will be) written
//! as. `ObjectView::from_object_model` bridges from the object writers'
//! `ObjectModel` for the normal compile-then-link pipeline; the variants
//! below exist so synthetic views can also be built directly for testing
//! multi-object linking.

use sox_object::Binding;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SectionKind {
    Text,
    Rodata,
    Data,
    Bss,
}

impl SectionKind {
    /// Canonical order merged sections are laid out in within the final
    /// address space.
    pub const ORDER: [SectionKind; 4] =
        [SectionKind::Text, SectionKind::Rodata, SectionKind::Data, SectionKind::Bss];
}

#[derive(Clone, Debug)]
pub struct ViewSection {
    pub kind: SectionKind,
    /// Empty for a BSS section: its `size` carries the zero-fill extent so
    /// uninitialized sections never materialize bytes.
    pub data: Vec<u8>,
    pub align: u32,
    pub size: u32,
}

/// Distinguishes a strong definition from one that yields to any other
/// definition of the same name. Only meaningful for defined symbols; an
/// object's undefined references carry no linkage.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Linkage {
    Global,
    Weak,
}

/// Where a defined symbol's value is to be interpreted.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SymbolLocation {
    /// Index into the owning view's `sections`; value is an offset into it.
    Section(usize),
    /// Value is already a final address, not relative to any section.
    Absolute,
}

#[derive(Clone, Debug)]
pub struct ViewSymbol {
    pub name: String,
    pub binding: Binding,
    /// `Some(_)` only when `binding` is `Binding::Global`; local and
    /// undefined symbols carry no linkage.
    pub linkage: Option<Linkage>,
    /// `None` iff `binding == Binding::Undefined`.
    pub location: Option<SymbolLocation>,
    pub value: u32,
}

#[derive(Clone, Debug)]
pub struct ObjectView {
    pub name: String,
    pub sections: Vec<ViewSection>,
    pub symbols: Vec<ViewSymbol>,
}

impl ObjectView {
    /// Build a view from a written object's target-independent model,
    /// mapping its fixed text/rodata layout onto the general
    /// text/rodata/data/bss section vocabulary the resolver understands.
    pub fn from_object_model(name: impl Into<String>, model: &sox_object::ObjectModel) -> Self {
        let sections = model
            .sections
            .iter()
            .enumerate()
            .map(|(idx, s)| ViewSection {
                kind: if idx == sox_object::TEXT { SectionKind::Text } else { SectionKind::Rodata },
                size: s.data.len() as u32,
                align: s.align,
                data: s.data.clone(),
            })
            .collect();

        let symbols = model
            .symbols
            .iter()
            .map(|s| ViewSymbol {
                name: s.name.clone(),
                binding: s.binding,
                linkage: (s.binding == Binding::Global).then_some(Linkage::Global),
                location: s.section.map(SymbolLocation::Section),
                value: s.value,
            })
            .collect();

        ObjectView { name: name.into(), sections, symbols }
    }
}
