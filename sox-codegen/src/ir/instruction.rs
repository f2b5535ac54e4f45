//! IR instructions: a closed opcode enum plus the generic instruction shape
//! that carries operands, an optional call-argument vector, an optional
//! inline string literal, and a source line.

use super::entities::{Block, FuncRef, VReg};
use super::operand::{Constant, Operand, SizeClass};
use smallvec::SmallVec;

/// The closed set of IR opcodes. ~45 kinds, matching: constants,
/// arithmetic, comparisons, memory, property/index access, control flow,
/// calls/returns, object creation, moves, and phi.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    // --- constants ---
    ConstNil,
    ConstBool,
    ConstInt,
    ConstFloat,
    ConstString,
    // --- arithmetic ---
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    // --- logical / comparisons ---
    Not,
    Equal,
    Greater,
    Less,
    // --- bitwise ---
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    ShiftLeft,
    ShiftRight,
    // --- memory ---
    Load,
    Store,
    // --- property / index access ---
    GetProperty,
    SetProperty,
    GetIndex,
    SetIndex,
    LoadUpvalue,
    StoreUpvalue,
    LoadGlobal,
    StoreGlobal,
    // --- control flow ---
    Jump,
    Branch,
    Phi,
    // --- calls / returns ---
    Call,
    CallExternal,
    Print,
    Return,
    // --- object creation ---
    NewString,
    NewTable,
    NewArray,
    NewClosure,
    // --- stack bookkeeping ---
    Pop,
    Dup,
    // --- data movement ---
    Move,
}

impl Opcode {
    /// The size class of the value this opcode produces, when it produces
    /// one at all. Drives destination-register allocation in the IR builder.
    pub fn result_size_class(self) -> SizeClass {
        match self {
            // A closure value carries both its code pointer and its upvalue
            // array pointer; on ARM64 this occupies an adjacent register pair.
            Opcode::NewClosure => SizeClass::Composite16,
            _ => SizeClass::Scalar8,
        }
    }

    /// True for opcodes whose `sym_target` names an external runtime symbol
    /// rather than resolving to an intra-module `FuncRef`.
    pub fn is_external_call(self) -> bool {
        matches!(self, Opcode::CallExternal | Opcode::Print)
    }
}

/// Up to three source operands inline, a destination, an optional call-site
/// argument vector, and an optional inline string literal.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dest: Option<VReg>,
    pub args: SmallVec<[Operand; 3]>,
    /// A resolved intra-module call target (`Call`).
    pub call_target: Option<FuncRef>,
    /// An external symbol name for `CallExternal`/`Print`/relocation-bearing
    /// references.
    pub sym_target: Option<String>,
    /// Extra call arguments beyond the inline `args` slots, in source order.
    pub call_args: SmallVec<[Operand; 4]>,
    /// An inline string literal (property name, string constant).
    pub string_literal: Option<String>,
    pub line: u32,
}

impl Instruction {
    pub fn new(opcode: Opcode, line: u32) -> Self {
        Instruction {
            opcode,
            dest: None,
            args: SmallVec::new(),
            call_target: None,
            sym_target: None,
            call_args: SmallVec::new(),
            string_literal: None,
            line,
        }
    }

    pub fn with_dest(mut self, dest: VReg) -> Self {
        self.dest = Some(dest);
        self
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = Operand>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn with_call_target(mut self, target: FuncRef) -> Self {
        self.call_target = Some(target);
        self
    }

    pub fn with_sym_target(mut self, sym: impl Into<String>) -> Self {
        self.sym_target = Some(sym.into());
        self
    }

    pub fn with_call_args(mut self, args: impl IntoIterator<Item = Operand>) -> Self {
        self.call_args = args.into_iter().collect();
        self
    }

    pub fn with_string_literal(mut self, s: impl Into<String>) -> Self {
        self.string_literal = Some(s.into());
        self
    }

    pub fn with_constant(mut self, c: Constant) -> Self {
        self.args.push(Operand::Const(c));
        self
    }

    /// Jump/branch target block, if this is a control-flow instruction.
    pub fn target_block(&self) -> Option<Block> {
        self.args.iter().find_map(|op| match op {
            Operand::Label(b) => Some(*b),
            _ => None,
        })
    }

    /// True when this call instruction requires an external relocation: it
    /// carries a symbol name but no statically resolved call target.
    pub fn is_relocatable_call(&self) -> bool {
        matches!(self.opcode, Opcode::Call | Opcode::CallExternal | Opcode::Print)
            && self.call_target.is_none()
            && self.sym_target.is_some()
    }
}
