//! AArch64 (AAPCS64) backend: fixed-width word encoder plus the code
//! generator that drives it.

pub mod codegen;
pub mod encoder;
pub mod registers;

pub use codegen::compile_module;
