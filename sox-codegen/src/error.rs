//! Typed, per-function codegen errors.
//!
//! These never cross the `generate_object`/`generate_executable` boundary as
//! a propagated exception: callers there downgrade a `CodegenError` into a
//! logged diagnostic plus a `false` result, so every top-level operation
//! returns a single boolean success value.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("unknown IR opcode at instruction offset {offset}")]
    UnknownOpcode { offset: u32 },

    #[error("{kind} displacement {value} does not fit in the available width")]
    DisplacementOverflow { kind: &'static str, value: i64 },

    #[error("jump/branch target block {block:?} was never emitted")]
    UnresolvedLabel { block: crate::ir::Block },

    #[error("computed frame size {bytes} exceeds the supported limit")]
    FrameTooLarge { bytes: u32 },
}
