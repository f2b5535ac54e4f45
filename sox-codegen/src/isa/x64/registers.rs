//! x86-64 register numbering (System V).

use crate::regalloc::{AllocatableRegs, PhysReg};

pub const RAX: PhysReg = PhysReg(0);
pub const RCX: PhysReg = PhysReg(1);
pub const RDX: PhysReg = PhysReg(2);
pub const RBX: PhysReg = PhysReg(3);
pub const RSP: PhysReg = PhysReg(4);
pub const RBP: PhysReg = PhysReg(5);
pub const RSI: PhysReg = PhysReg(6);
pub const RDI: PhysReg = PhysReg(7);
pub const R8: PhysReg = PhysReg(8);
pub const R9: PhysReg = PhysReg(9);
pub const R10: PhysReg = PhysReg(10);
pub const R11: PhysReg = PhysReg(11);
pub const R12: PhysReg = PhysReg(12);
pub const R13: PhysReg = PhysReg(13);
pub const R14: PhysReg = PhysReg(14);
pub const R15: PhysReg = PhysReg(15);

/// Integer argument registers in System V order.
pub const ARG_REGS: [PhysReg; 6] = [RDI, RSI, RDX, RCX, R8, R9];

/// Callee-saved registers this backend's prologue/epilogue actually push:
/// RBX and R12-R15. RBP is handled separately as the frame
/// pointer.
pub const CALLEE_SAVED: [PhysReg; 5] = [RBX, R12, R13, R14, R15];

/// Scratch registers the code generator uses to fill/spill operands that
/// the allocator didn't give a register, and to marshal call arguments.
/// Reserved out of `allocatable()` so the allocator can never hand one of
/// these to a live vreg out from under the code generator.
pub const SPILL_A: PhysReg = RDI;
pub const SPILL_B: PhysReg = RSI;

/// The allocatable set excluding RSP, RBP, and the two reserved scratch
/// registers: RAX, RCX, RDX, RBX, R8-R15 — 12 registers.
pub fn allocatable() -> AllocatableRegs {
    AllocatableRegs {
        registers: vec![RAX, RCX, RDX, RBX, R8, R9, R10, R11, R12, R13, R14, R15],
        callee_saved: CALLEE_SAVED.to_vec(),
        supports_pairs: false,
    }
}

pub fn needs_rex_bit(r: PhysReg) -> bool {
    r.0 >= 8
}

/// The low 3 bits used in ModR/M / opcode `+r` encodings (the REX `B`/`R`/`X`
/// bit carries the 4th bit separately).
pub fn low3(r: PhysReg) -> u8 {
    r.0 & 0x7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocatable_set_has_twelve_registers() {
        assert_eq!(allocatable().registers.len(), 12);
    }

    #[test]
    fn rsp_and_rbp_are_not_allocatable() {
        let regs = allocatable().registers;
        assert!(!regs.contains(&RSP));
        assert!(!regs.contains(&RBP));
    }

    #[test]
    fn scratch_registers_are_not_allocatable() {
        let regs = allocatable().registers;
        assert!(!regs.contains(&SPILL_A));
        assert!(!regs.contains(&SPILL_B));
    }
}
