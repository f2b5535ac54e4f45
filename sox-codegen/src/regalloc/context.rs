//! Linear-scan allocation over one function's live ranges.

use super::live_range::{Assignment, LiveRange};
use super::register_set::{PhysReg, RegisterSet};
use crate::error::CodegenError;
use crate::ir::{Function, Operand, ProgramPoint, SizeClass, VReg};
use std::collections::HashMap;

/// Describes one ISA's allocatable register file to the allocator: which
/// registers it may hand out, which of those are callee-saved, and whether
/// 16-byte values need an adjacent register pair (ARM64) or are simply
/// disallowed (x86-64 has no 16-byte GPR pairs in this backend's model).
pub struct AllocatableRegs {
    pub registers: Vec<PhysReg>,
    pub callee_saved: Vec<PhysReg>,
    pub supports_pairs: bool,
}

/// The result of allocating one function: per-vreg assignment plus
/// bookkeeping the code generator's prologue/epilogue needs.
pub struct RegAllocResult {
    assignments: HashMap<VReg, Assignment>,
    size_classes: HashMap<VReg, SizeClass>,
    pub spill_count: u32,
    /// Total bytes the spill area needs, `spill_count * 8` only when every
    /// spilled value is a plain `Scalar8`; a spilled `Composite16` reserves
    /// 16 contiguous bytes at one offset, so this is tracked separately
    /// rather than derived from the slot count.
    pub spill_byte_total: u32,
    pub used_callee_saved: Vec<PhysReg>,
}

impl RegAllocResult {
    pub fn register_for(&self, vreg: VReg) -> Option<PhysReg> {
        match self.assignments.get(&vreg) {
            Some(Assignment::Register { low, .. }) => Some(*low),
            _ => None,
        }
    }

    pub fn high_register_for(&self, vreg: VReg) -> Option<PhysReg> {
        match self.assignments.get(&vreg) {
            Some(Assignment::Register { high, .. }) => *high,
            _ => None,
        }
    }

    pub fn spill_offset(&self, vreg: VReg) -> Option<u32> {
        match self.assignments.get(&vreg) {
            Some(Assignment::Spilled { offset }) => Some(*offset),
            _ => None,
        }
    }

    pub fn is_spilled(&self, vreg: VReg) -> bool {
        matches!(self.assignments.get(&vreg), Some(Assignment::Spilled { .. }))
    }

    /// The size class a vreg was allocated under. Used by the code
    /// generators to know whether a spilled value occupies one 8-byte slot
    /// or the 16 bytes a spilled `Composite16` pair needs.
    pub fn size_class_of(&self, vreg: VReg) -> SizeClass {
        self.size_classes.get(&vreg).copied().unwrap_or(SizeClass::Scalar8)
    }
}

/// Walk blocks in emission order assigning a monotonically increasing
/// position to each instruction, extending every operand vreg's live range
/// to cover that position.
pub fn compute_live_ranges(func: &Function) -> Vec<LiveRange> {
    let mut ranges: HashMap<VReg, LiveRange> = HashMap::new();
    let mut pos = 0u32;

    for (_, inst) in func.emission_order() {
        let point = ProgramPoint(pos);
        let result_size = inst.opcode.result_size_class();

        for arg in inst.args.iter().chain(inst.call_args.iter()) {
            if let Operand::Reg(v) = arg {
                ranges
                    .entry(*v)
                    .and_modify(|r| r.extend(point, result_size))
                    .or_insert_with(|| LiveRange::new(*v, point, result_size));
            }
        }
        if let Some(dest) = inst.dest {
            ranges
                .entry(dest)
                .and_modify(|r| r.extend(point, result_size))
                .or_insert_with(|| LiveRange::new(dest, point, result_size));
        }
        pos += 1;
    }

    let mut out: Vec<LiveRange> = ranges.into_values().collect();
    out.sort_by_key(|r| r.start.0);
    out
}

/// Linear-scan allocation. Sorts ranges by start, maintains an active set
/// ordered by end position, expires ranges that have ended, and assigns a
/// register (or spill slot) to each new range in turn (
/// a-d).
pub fn allocate(
    func: &Function,
    isa_regs: &AllocatableRegs,
) -> Result<RegAllocResult, CodegenError> {
    let mut ranges = compute_live_ranges(func);
    ranges.sort_by_key(|r| r.start.0);

    let mut free = RegisterSet::from_allocatable(&isa_regs.registers);
    // `active`: ranges currently holding a register, kept sorted by end.
    let mut active: Vec<usize> = Vec::new();
    let mut assignments: HashMap<VReg, Assignment> = HashMap::new();
    let mut size_classes: HashMap<VReg, SizeClass> = HashMap::new();
    let mut used_callee_saved: Vec<PhysReg> = Vec::new();
    let mut next_spill_slot = 0u32;
    let mut spill_bytes = 0u32;

    for i in 0..ranges.len() {
        let start = ranges[i].start;

        // (a) expire active ranges that have ended before this range starts.
        active.retain(|&j| {
            if ranges[j].end.0 < start.0 {
                if let Assignment::Register { low, high } = assignments[&ranges[j].vreg] {
                    free.free(low);
                    if let Some(h) = high {
                        free.free(h);
                    }
                }
                false
            } else {
                true
            }
        });

        let size_class = ranges[i].size_class;
        let assignment = if size_class == SizeClass::Composite16 && isa_regs.supports_pairs {
            // (c) 16-byte value: needs an adjacent register pair.
            match free.pick_pair() {
                Some((low, high)) => {
                    free.take(low);
                    free.take(high);
                    note_callee_saved(isa_regs, low, &mut used_callee_saved);
                    note_callee_saved(isa_regs, high, &mut used_callee_saved);
                    Assignment::Register { low, high: Some(high) }
                }
                None => spill(
                    size_class,
                    &mut next_spill_slot,
                    &mut spill_bytes,
                ),
            }
        } else {
            // (b) 8-byte value: any free register.
            match free.pick_any() {
                Some(low) => {
                    free.take(low);
                    note_callee_saved(isa_regs, low, &mut used_callee_saved);
                    Assignment::Register { low, high: None }
                }
                None => spill(size_class, &mut next_spill_slot, &mut spill_bytes),
            }
        };

        assignments.insert(ranges[i].vreg, assignment);
        size_classes.insert(ranges[i].vreg, size_class);
        if matches!(assignment, Assignment::Register { .. }) {
            active.push(i);
            active.sort_by_key(|&j| ranges[j].end.0);
        }
    }

    Ok(RegAllocResult {
        spill_count: next_spill_slot,
        spill_byte_total: spill_bytes,
        used_callee_saved,
        assignments,
        size_classes,
    })
}

fn note_callee_saved(isa: &AllocatableRegs, r: PhysReg, used: &mut Vec<PhysReg>) {
    if isa.callee_saved.contains(&r) && !used.contains(&r) {
        used.push(r);
    }
}

/// (d) no free register: assign a spill slot, respecting the size class's
/// byte width (8 or 16 bytes).
fn spill(size_class: SizeClass, next_slot: &mut u32, spill_bytes: &mut u32) -> Assignment {
    let width = size_class.bytes();
    let offset = *spill_bytes;
    *spill_bytes += width;
    *next_slot += 1;
    Assignment::Spilled { offset }
}
