//! ARM64 (AAPCS64) register numbering: X-register layout and the FP/LR/SP
//! conventions the rest of this backend builds on.

use crate::regalloc::{AllocatableRegs, PhysReg};

pub const X0: PhysReg = PhysReg(0);
pub const X1: PhysReg = PhysReg(1);
pub const X2: PhysReg = PhysReg(2);
pub const X3: PhysReg = PhysReg(3);
pub const X4: PhysReg = PhysReg(4);
pub const X5: PhysReg = PhysReg(5);
pub const X6: PhysReg = PhysReg(6);
pub const X7: PhysReg = PhysReg(7);
pub const X9: PhysReg = PhysReg(9);
pub const X10: PhysReg = PhysReg(10);
pub const FP: PhysReg = PhysReg(29); // X29
pub const LR: PhysReg = PhysReg(30); // X30
/// Not a real allocatable register; SP is encoded as 31 in load/store and
/// add/sub-immediate forms. Kept separate from the allocator's bitset.
pub const SP_ENCODING: u8 = 31;

/// Integer argument registers in AAPCS64 order.
pub const ARG_REGS: [PhysReg; 8] = [X0, X1, X2, X3, X4, X5, X6, X7];

/// Callee-saved registers: X19-X28. FP/LR are always saved separately via
/// the STP pair in the prologue, not tracked here.
pub const CALLEE_SAVED: [PhysReg; 10] = [
    PhysReg(19),
    PhysReg(20),
    PhysReg(21),
    PhysReg(22),
    PhysReg(23),
    PhysReg(24),
    PhysReg(25),
    PhysReg(26),
    PhysReg(27),
    PhysReg(28),
];

/// Fixed scratch region for module globals, treated as a deliberate
/// constant-size region (DESIGN.md Open Question 2), not a growable arena.
pub const ARM64_GLOBAL_AREA_BYTES: u32 = 256;

/// Scratch registers the code generator uses to fill/spill operands that
/// the allocator didn't give a register, and to marshal call arguments.
/// Reserved out of `allocatable()` so the allocator can never hand one of
/// these to a live vreg out from under the code generator.
pub const SPILL_A: PhysReg = X9;
pub const SPILL_B: PhysReg = X10;

/// X11-X15, X19-X28 (15 registers). X0-X7 are reserved for argument
/// marshalling and X9/X10 for spill scratch, both excluded from this
/// backend's default allocatable set.
pub fn allocatable() -> AllocatableRegs {
    let mut registers: Vec<PhysReg> = (11..=15).map(PhysReg).collect();
    registers.extend(CALLEE_SAVED);
    AllocatableRegs {
        registers,
        callee_saved: CALLEE_SAVED.to_vec(),
        supports_pairs: true,
    }
}

/// The same set with X0-X7 additionally available, for callers that opt in
/// to treating argument registers as scratch once their arguments are read.
pub fn allocatable_with_arg_regs() -> AllocatableRegs {
    let mut regs = allocatable();
    regs.registers.extend(ARG_REGS);
    regs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocatable_set_has_fifteen_registers() {
        assert_eq!(allocatable().registers.len(), 15);
    }

    #[test]
    fn fp_lr_not_in_allocatable_set() {
        let regs = allocatable().registers;
        assert!(!regs.contains(&FP));
        assert!(!regs.contains(&LR));
    }

    #[test]
    fn scratch_registers_are_not_allocatable() {
        let regs = allocatable().registers;
        assert!(!regs.contains(&SPILL_A));
        assert!(!regs.contains(&SPILL_B));
    }
}
