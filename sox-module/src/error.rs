//! Errors the resolver accumulates across a run rather than aborting on the
//! first one; surfaced together so a single link attempt reports everything
//! wrong with it.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(
        "duplicate definition of global symbol `{name}` in `{first_object}` and `{second_object}`"
    )]
    DuplicateDefinition { name: String, first_object: String, second_object: String },

    #[error("undefined symbol `{name}`, referenced from `{referencing_object}`")]
    UndefinedSymbol { name: String, referencing_object: String },
}
