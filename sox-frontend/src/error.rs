//! Errors the bytecode-to-IR builder can raise while decoding a chunk.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("unknown bytecode opcode {byte} at offset {offset}")]
    UnknownOpcode { offset: u32, byte: u8 },

    #[error("operand at offset {offset} runs past the end of the chunk")]
    TruncatedOperand { offset: u32 },

    #[error("stack underflow decoding offset {offset}")]
    StackUnderflow { offset: u32 },

    #[error("constant pool index {index} out of range ({len} constants)")]
    ConstantOutOfRange { index: u32, len: usize },

    #[error("closure constant index {index} does not name a known nested closure")]
    UnknownClosureConstant { index: u32 },

    #[error("jump/branch target block {block_index} was never emitted")]
    DanglingLabel { block_index: u32 },
}
