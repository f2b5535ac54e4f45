//! The typed intermediate representation: `Module`, `Function`,
//! `BasicBlock`, `Instruction`, `Operand`.

mod entities;
mod function;
mod instruction;
mod module;
mod operand;

pub use entities::{Block, FuncRef, ProgramPoint, VReg};
pub use function::{BasicBlock, Function};
pub use instruction::{Instruction, Opcode};
pub use module::Module;
pub use operand::{Constant, Operand, SizeClass};
