//! x86-64 (System V) backend: byte-level encoder plus the code generator
//! that drives it.

pub mod codegen;
pub mod encoder;
pub mod registers;

pub use codegen::compile_module;
