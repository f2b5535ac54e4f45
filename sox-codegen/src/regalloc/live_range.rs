//! Per-virtual-register live ranges.

use super::register_set::PhysReg;
use crate::ir::{ProgramPoint, SizeClass, VReg};

#[derive(Clone, Debug)]
pub struct LiveRange {
    pub vreg: VReg,
    pub start: ProgramPoint,
    pub end: ProgramPoint,
    pub size_class: SizeClass,
    pub is_float: bool,
    pub assigned: Assignment,
}

/// Where a live range's value lives after allocation: a physical register
/// (plus its pair-mate for a 16-byte ARM64 value), or a spill slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assignment {
    Unassigned,
    Register { low: PhysReg, high: Option<PhysReg> },
    Spilled { offset: u32 },
}

impl LiveRange {
    pub fn new(vreg: VReg, pos: ProgramPoint, size_class: SizeClass) -> Self {
        LiveRange {
            vreg,
            start: pos,
            end: pos,
            size_class,
            is_float: false,
            assigned: Assignment::Unassigned,
        }
    }

    /// Extend this range's end to include `pos`, and widen its size class
    /// to the maximum seen at any use.
    pub fn extend(&mut self, pos: ProgramPoint, size_class: SizeClass) {
        if pos.0 > self.end.0 {
            self.end = pos;
        }
        if pos.0 < self.start.0 {
            self.start = pos;
        }
        self.size_class = self.size_class.join(size_class);
    }
}
