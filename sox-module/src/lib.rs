//! Symbol resolution and section-merging static linker over a set of
//! compiled object views. Two independent phases: `resolve` determines
//! where each undefined reference is satisfied from (or reports it can't
//! be); `merge_sections`/`final_address` compute the merged-image layout
//! and every defined symbol's eventual address within it.

mod error;
mod layout;
mod object_view;
mod resolver;
mod symtab;

pub use error::ResolveError;
pub use layout::{final_address, merge_sections, Contribution, MergedSection, TargetFormat};
pub use object_view::{Linkage, ObjectView, SectionKind, SymbolLocation, ViewSection, ViewSymbol};
pub use resolver::{resolve, Outcome, ResolveReport};
