//! Two-phase symbol resolution: collect every object's global/weak
//! definitions into one table, then resolve every undefined reference
//! against it or the runtime/libc allow-list.

use sox_object::Binding;

use crate::error::ResolveError;
use crate::object_view::{Linkage, ObjectView};
use crate::symtab::SymbolTable;

/// Native runtime entry points the generated calls address directly.
const RUNTIME_SYMBOLS: &[&str] = &[
    "sox_native_add",
    "sox_native_subtract",
    "sox_native_multiply",
    "sox_native_divide",
    "sox_native_negate",
    "sox_native_equal",
    "sox_native_greater",
    "sox_native_less",
    "sox_native_not",
    "sox_native_get_property",
    "sox_native_set_property",
    "sox_native_get_index",
    "sox_native_set_index",
    "sox_native_print",
    "sox_native_alloc_string",
    "sox_native_alloc_table",
    "sox_native_alloc_array",
];

/// Standard C library entry points the runtime itself links against.
const LIBC_SYMBOLS: &[&str] = &[
    "printf", "malloc", "free", "realloc", "calloc", "memcpy", "memmove", "memset", "memcmp",
    "strlen", "strcmp", "strncmp", "exit", "abort", "puts", "putchar",
];

fn is_allowlisted(name: &str) -> bool {
    name.starts_with("sox_runtime_") || RUNTIME_SYMBOLS.contains(&name) || LIBC_SYMBOLS.contains(&name)
}

/// How an undefined reference was resolved.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Outcome {
    /// Resolved to a definition within `views[defining_object]`.
    Internal { defining_object: usize },
    /// Matched the runtime/libc allow-list; left for the dynamic linker.
    External,
}

pub struct ResolveReport {
    pub success: bool,
    pub errors: Vec<ResolveError>,
    /// One entry per undefined reference that did not produce an error, in
    /// `views`-then-symbol order.
    pub references: Vec<(String, Outcome)>,
}

/// Resolve every undefined symbol across `views` against the global/weak
/// definitions the views themselves contribute.
pub fn resolve(views: &[ObjectView]) -> ResolveReport {
    let mut table = SymbolTable::new();
    let mut errors = Vec::new();

    for (object_index, view) in views.iter().enumerate() {
        for (symbol_index, sym) in view.symbols.iter().enumerate() {
            if sym.binding != Binding::Global {
                continue;
            }
            let linkage = sym.linkage.unwrap_or(Linkage::Global);
            if let Err(prior_object) = table.insert(&sym.name, object_index, symbol_index, linkage)
            {
                errors.push(ResolveError::DuplicateDefinition {
                    name: sym.name.clone(),
                    first_object: views[prior_object].name.clone(),
                    second_object: view.name.clone(),
                });
            }
        }
    }

    let mut references = Vec::new();
    for view in views {
        for sym in &view.symbols {
            if sym.binding != Binding::Undefined {
                continue;
            }
            if let Some(entry) = table.get(&sym.name) {
                references.push((sym.name.clone(), Outcome::Internal { defining_object: entry.object_index }));
            } else if is_allowlisted(&sym.name) {
                references.push((sym.name.clone(), Outcome::External));
            } else {
                errors.push(ResolveError::UndefinedSymbol {
                    name: sym.name.clone(),
                    referencing_object: view.name.clone(),
                });
            }
        }
    }

    ResolveReport { success: errors.is_empty(), errors, references }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_view::{SectionKind, SymbolLocation, ViewSection, ViewSymbol};

    fn defining_view(name: &str, symbol: &str) -> ObjectView {
        ObjectView {
            name: name.into(),
            sections: vec![ViewSection {
                kind: SectionKind::Text,
                data: vec![0x90; 4],
                align: 16,
                size: 4,
            }],
            symbols: vec![ViewSymbol {
                name: symbol.into(),
                binding: Binding::Global,
                linkage: Some(Linkage::Global),
                location: Some(SymbolLocation::Section(0)),
                value: 0,
            }],
        }
    }

    #[test]
    fn duplicate_global_definition_fails_resolve() {
        let a = defining_view("a.o", "foo");
        let b = defining_view("b.o", "foo");
        let report = resolve(&[a, b]);
        assert!(!report.success);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(&report.errors[0], ResolveError::DuplicateDefinition { name, .. } if name == "foo"));
    }

    #[test]
    fn undefined_libc_symbol_resolves_external_without_error() {
        let view = ObjectView {
            name: "main.o".into(),
            sections: vec![ViewSection {
                kind: SectionKind::Text,
                data: vec![0x90; 4],
                align: 16,
                size: 4,
            }],
            symbols: vec![ViewSymbol {
                name: "printf".into(),
                binding: Binding::Undefined,
                linkage: None,
                location: None,
                value: 0,
            }],
        };
        let report = resolve(&[view]);
        assert!(report.success);
        assert!(report.errors.is_empty());
        assert_eq!(report.references, vec![("printf".to_string(), Outcome::External)]);
    }

    #[test]
    fn truly_unknown_symbol_is_an_error() {
        let view = ObjectView {
            name: "main.o".into(),
            sections: vec![],
            symbols: vec![ViewSymbol {
                name: "not_a_real_symbol".into(),
                binding: Binding::Undefined,
                linkage: None,
                location: None,
                value: 0,
            }],
        };
        let report = resolve(&[view]);
        assert!(!report.success);
        assert!(matches!(&report.errors[0], ResolveError::UndefinedSymbol { name, .. } if name == "not_a_real_symbol"));
    }
}
