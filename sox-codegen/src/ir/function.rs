//! `Function` and `BasicBlock`: the owning containers for one function's IR.

use super::entities::{Block, VReg};
use super::instruction::Instruction;
use sox_entity::PrimaryMap;
use std::collections::HashMap;

/// One basic block: an ordered instruction list plus successor/predecessor
/// edges recorded as indices.
#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    pub insts: Vec<Instruction>,
    pub successors: Vec<Block>,
    pub predecessors: Vec<Block>,
}

impl BasicBlock {
    pub fn push(&mut self, inst: Instruction) {
        self.insts.push(inst);
    }
}

/// One function's typed IR: entry block, ordered block list, and the
/// counters the IR builder uses to mint fresh virtual registers and labels.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub arity: u32,
    pub upvalue_count: u32,
    pub local_count: u32,
    pub entry: Block,
    pub blocks: PrimaryMap<Block, BasicBlock>,
    next_vreg: u32,
    /// Final code offset within the assembler's buffer, set after emission.
    /// `None` until the code generator has placed this function.
    pub code_offset: Option<u32>,
    /// Per-instruction source line, duplicated onto the function level only
    /// for the entry line (used by diagnostics before codegen starts).
    pub decl_line: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, arity: u32, upvalue_count: u32) -> Self {
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(BasicBlock::default());
        Function {
            name: name.into(),
            arity,
            upvalue_count,
            local_count: 0,
            entry,
            blocks,
            next_vreg: 0,
            code_offset: None,
            decl_line: 0,
        }
    }

    pub fn new_block(&mut self) -> Block {
        self.blocks.push(BasicBlock::default())
    }

    /// Mint a fresh virtual register. Every vreg is defined exactly once;
    /// callers allocate one per destination.
    pub fn new_vreg(&mut self) -> VReg {
        let v = VReg::new(self.next_vreg as usize);
        self.next_vreg += 1;
        v
    }

    pub fn vreg_count(&self) -> usize {
        self.next_vreg as usize
    }

    pub fn add_edge(&mut self, from: Block, to: Block) {
        self.blocks[from].successors.push(to);
        self.blocks[to].predecessors.push(from);
    }

    /// Walk blocks in emission order, yielding `(Block, &Instruction)`
    /// pairs. This is the canonical instruction order the register
    /// allocator's live-range position counter and the code generator's
    /// label offsets are both defined over.
    pub fn emission_order(&self) -> impl Iterator<Item = (Block, &Instruction)> {
        self.blocks
            .iter()
            .flat_map(|(b, bb)| bb.insts.iter().map(move |i| (b, i)))
    }

    /// Verify every jump/branch target resolves within this function.
    /// Returns the first dangling label found.
    pub fn verify_labels(&self) -> Result<(), Block> {
        let valid: HashMap<Block, ()> = self.blocks.keys().map(|b| (b, ())).collect();
        for (_, inst) in self.emission_order() {
            if let Some(target) = inst.target_block() {
                if !valid.contains_key(&target) {
                    return Err(target);
                }
            }
        }
        Ok(())
    }
}
