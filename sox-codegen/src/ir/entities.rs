//! Entity-reference index types for the IR.
//!
//! Every IR value, block, and function reference is a dense `u32` index into
//! a `PrimaryMap` owned by the enclosing `Function`/`Module`, following the
//! arena-plus-index pattern.

use sox_entity::entity_impl;

/// A virtual register: an SSA-style numeric name for an IR value.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(u32);
entity_impl!(VReg, "v");

/// A basic-block label, unique within one function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// A reference to a function within the same module, resolved at IR-build
/// time (never a string at this layer — that is reserved for symbol calls).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// A global-instruction position, assigned by the register allocator's
/// live-range walk. Monotonically increasing within a
/// function in block/instruction emission order.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct ProgramPoint(pub u32);
