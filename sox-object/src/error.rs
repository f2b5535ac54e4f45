//! Errors the object writers and the symbol/section model can raise.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("relocation at offset {offset} names unknown symbol `{symbol}`")]
    UnknownRelocationSymbol { offset: u32, symbol: String },

    #[error("writing object file failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported architecture for this object format")]
    UnsupportedArch,
}
