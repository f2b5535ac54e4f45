//! Fixed-width 32-bit ARM64 instruction emission: each method packs one
//! instruction word's fields by hand and pushes it whole.
//!
//! Every word is pushed through `CodeBuffer::push_u32_le`, so `current_offset`
//! before an emission point always lands on a 4-byte boundary.

use crate::binemit::CodeBuffer;
use crate::regalloc::PhysReg;

/// Condition codes, matching the 4-bit AArch64 condition field.
#[derive(Copy, Clone, Debug)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cond {
    fn code(self) -> u32 {
        match self {
            Cond::Eq => 0b0000,
            Cond::Ne => 0b0001,
            Cond::Lt => 0b1011,
            Cond::Ge => 0b1010,
            Cond::Gt => 0b1100,
            Cond::Le => 0b1101,
        }
    }

    /// The inverted condition, used to build CSET from CSINC.
    fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Ge => Cond::Lt,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
        }
    }
}

const XZR: u32 = 31;
const SP: u32 = 31;

fn r(p: PhysReg) -> u32 {
    p.0 as u32
}

pub struct Encoder<'a> {
    pub buf: &'a mut CodeBuffer,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut CodeBuffer) -> Self {
        Encoder { buf }
    }

    fn word(&mut self, w: u32) {
        self.buf.push_u32_le(w);
    }

    /// MOVZ Xd, #imm16, LSL #(hw*16).
    pub fn movz(&mut self, rd: PhysReg, imm16: u16, hw: u32) {
        self.word(0xD2800000 | (hw << 21) | ((imm16 as u32) << 5) | r(rd));
    }

    /// MOVK Xd, #imm16, LSL #(hw*16).
    pub fn movk(&mut self, rd: PhysReg, imm16: u16, hw: u32) {
        self.word(0xF2800000 | (hw << 21) | ((imm16 as u32) << 5) | r(rd));
    }

    /// Build a full 64-bit immediate via one MOVZ and up to three MOVK.
    pub fn mov_imm64(&mut self, rd: PhysReg, imm: i64) {
        let bits = imm as u64;
        let chunks = [
            (bits & 0xFFFF) as u16,
            ((bits >> 16) & 0xFFFF) as u16,
            ((bits >> 32) & 0xFFFF) as u16,
            ((bits >> 48) & 0xFFFF) as u16,
        ];
        self.movz(rd, chunks[0], 0);
        for (hw, chunk) in chunks.iter().enumerate().skip(1) {
            if *chunk != 0 {
                self.movk(rd, *chunk, hw as u32);
            }
        }
    }

    /// MOV Xd, Xm — the ORR-with-XZR alias.
    pub fn mov_reg(&mut self, rd: PhysReg, rm: PhysReg) {
        self.word(0xAA0003E0 | (r(rm) << 16) | r(rd));
    }

    pub fn add_reg_reg(&mut self, rd: PhysReg, rn: PhysReg, rm: PhysReg) {
        self.word(0x8B000000 | (r(rm) << 16) | (r(rn) << 5) | r(rd));
    }

    pub fn sub_reg_reg(&mut self, rd: PhysReg, rn: PhysReg, rm: PhysReg) {
        self.word(0xCB000000 | (r(rm) << 16) | (r(rn) << 5) | r(rd));
    }

    /// SUBS Xzr, Xn, Xm — the CMP (register) alias.
    pub fn cmp_reg_reg(&mut self, rn: PhysReg, rm: PhysReg) {
        self.word(0xEB000000 | (r(rm) << 16) | (r(rn) << 5) | XZR);
    }

    pub fn and_reg_reg(&mut self, rd: PhysReg, rn: PhysReg, rm: PhysReg) {
        self.word(0x8A000000 | (r(rm) << 16) | (r(rn) << 5) | r(rd));
    }

    pub fn orr_reg_reg(&mut self, rd: PhysReg, rn: PhysReg, rm: PhysReg) {
        self.word(0xAA000000 | (r(rm) << 16) | (r(rn) << 5) | r(rd));
    }

    pub fn eor_reg_reg(&mut self, rd: PhysReg, rn: PhysReg, rm: PhysReg) {
        self.word(0xCA000000 | (r(rm) << 16) | (r(rn) << 5) | r(rd));
    }

    /// MVN Xd, Xm — the ORN-with-XZR alias.
    pub fn mvn_reg(&mut self, rd: PhysReg, rm: PhysReg) {
        self.word(0xAA2003E0 | (r(rm) << 16) | r(rd));
    }

    /// ANDS Xzr, Xn, Xm — the TST (register) alias.
    pub fn tst_reg_reg(&mut self, rn: PhysReg, rm: PhysReg) {
        self.word(0xEA000000 | (r(rm) << 16) | (r(rn) << 5) | XZR);
    }

    /// MUL Xd, Xn, Xm — the MADD-with-XZR alias.
    pub fn mul_reg_reg(&mut self, rd: PhysReg, rn: PhysReg, rm: PhysReg) {
        self.word(0x9B007C00 | (r(rm) << 16) | (r(rn) << 5) | r(rd));
    }

    pub fn sdiv_reg_reg(&mut self, rd: PhysReg, rn: PhysReg, rm: PhysReg) {
        self.word(0x9AC00C00 | (r(rm) << 16) | (r(rn) << 5) | r(rd));
    }

    /// NEG Xd, Xm — the SUB-with-XZR alias.
    pub fn neg_reg(&mut self, rd: PhysReg, rm: PhysReg) {
        self.word(0xCB0003E0 | (r(rm) << 16) | r(rd));
    }

    pub fn csel(&mut self, rd: PhysReg, rn: PhysReg, rm: PhysReg, cond: Cond) {
        self.word(0x9A800000 | (r(rm) << 16) | (cond.code() << 12) | (r(rn) << 5) | r(rd));
    }

    /// CSET Xd, cond — CSINC Xd, XZR, XZR, invert(cond).
    pub fn cset(&mut self, rd: PhysReg, cond: Cond) {
        self.word(0x9A9F07E0 | (cond.invert().code() << 12) | r(rd));
    }

    /// ADD Xd, Xn, #imm12 (unsigned, unshifted).
    pub fn add_imm(&mut self, rd: PhysReg, rn: PhysReg, imm12: u16) {
        self.word(0x91000000 | ((imm12 as u32 & 0xFFF) << 10) | (r(rn) << 5) | r(rd));
    }

    pub fn sub_imm(&mut self, rd: PhysReg, rn: PhysReg, imm12: u16) {
        self.word(0xD1000000 | ((imm12 as u32 & 0xFFF) << 10) | (r(rn) << 5) | r(rd));
    }

    /// Stack-pointer arithmetic uses the same immediate form with Rn=SP.
    pub fn add_sp_imm(&mut self, rd: PhysReg, imm12: u16) {
        self.add_imm(rd, PhysReg(SP as u8), imm12);
    }

    pub fn sub_sp_imm(&mut self, rd: PhysReg, imm12: u16) {
        self.sub_imm(rd, PhysReg(SP as u8), imm12);
    }

    /// LDR Xt, [Xn, #imm] — unsigned offset form, imm scaled by 8.
    pub fn ldr_imm(&mut self, rt: PhysReg, rn: PhysReg, byte_offset: u16) {
        let imm12 = (byte_offset / 8) as u32;
        self.word(0xF9400000 | (imm12 << 10) | (r(rn) << 5) | r(rt));
    }

    pub fn str_imm(&mut self, rt: PhysReg, rn: PhysReg, byte_offset: u16) {
        let imm12 = (byte_offset / 8) as u32;
        self.word(0xF9000000 | (imm12 << 10) | (r(rn) << 5) | r(rt));
    }

    fn imm7(byte_offset: i32) -> u32 {
        ((byte_offset / 8) as i32 & 0x7F) as u32
    }

    /// STP Xt, Xt2, [Xn, #-disp]! — pre-indexed pair store used for the
    /// FP/LR save in the prologue.
    pub fn stp_preindex(&mut self, rt: PhysReg, rt2: PhysReg, rn: PhysReg, byte_offset: i32) {
        self.word(
            0xA9800000 | (Self::imm7(byte_offset) << 15) | (r(rt2) << 10) | (r(rn) << 5) | r(rt),
        );
    }

    /// LDP Xt, Xt2, [Xn], #disp — post-indexed pair load used for the
    /// FP/LR restore in the epilogue.
    pub fn ldp_postindex(&mut self, rt: PhysReg, rt2: PhysReg, rn: PhysReg, byte_offset: i32) {
        self.word(
            0xA8C00000 | (Self::imm7(byte_offset) << 15) | (r(rt2) << 10) | (r(rn) << 5) | r(rt),
        );
    }

    /// STP Xt, Xt2, [Xn, #disp] — signed-offset pair store, no writeback.
    pub fn stp_offset(&mut self, rt: PhysReg, rt2: PhysReg, rn: PhysReg, byte_offset: i32) {
        self.word(
            0xA9000000 | (Self::imm7(byte_offset) << 15) | (r(rt2) << 10) | (r(rn) << 5) | r(rt),
        );
    }

    pub fn ldp_offset(&mut self, rt: PhysReg, rt2: PhysReg, rn: PhysReg, byte_offset: i32) {
        self.word(
            0xA9400000 | (Self::imm7(byte_offset) << 15) | (r(rt2) << 10) | (r(rn) << 5) | r(rt),
        );
    }

    /// B with a placeholder 26-bit offset; returns the word's own offset.
    pub fn b_placeholder(&mut self) -> u32 {
        let at = self.buf.current_offset();
        self.word(0x14000000);
        at
    }

    pub fn bl_placeholder(&mut self) -> u32 {
        let at = self.buf.current_offset();
        self.word(0x94000000);
        at
    }

    /// B.cond with a placeholder 19-bit offset.
    pub fn b_cond_placeholder(&mut self, cond: Cond) -> u32 {
        let at = self.buf.current_offset();
        self.word(0x54000000 | cond.code());
        at
    }

    /// Overwrite a previously emitted unconditional B/BL's 26-bit immediate,
    /// given the displacement in bytes (converted to instruction words).
    pub fn patch_branch26(&mut self, at: u32, byte_disp: i32) {
        let word_disp = (byte_disp / 4) & 0x3FF_FFFF;
        let existing = u32::from_le_bytes(
            self.buf.as_bytes()[at as usize..at as usize + 4]
                .try_into()
                .unwrap(),
        );
        self.buf
            .patch_i32_le(at, ((existing & 0xFC000000) | word_disp as u32) as i32);
    }

    /// Overwrite a previously emitted B.cond's 19-bit immediate.
    pub fn patch_cond_branch19(&mut self, at: u32, byte_disp: i32) {
        let word_disp = ((byte_disp / 4) & 0x7FFFF) as u32;
        let existing = u32::from_le_bytes(
            self.buf.as_bytes()[at as usize..at as usize + 4]
                .try_into()
                .unwrap(),
        );
        self.buf
            .patch_i32_le(at, ((existing & 0xFF00001F) | (word_disp << 5)) as i32);
    }

    pub fn br(&mut self, rn: PhysReg) {
        self.word(0xD61F0000 | (r(rn) << 5));
    }

    pub fn blr(&mut self, rn: PhysReg) {
        self.word(0xD63F0000 | (r(rn) << 5));
    }

    pub fn ret(&mut self) {
        self.word(0xD65F03C0);
    }

    /// ADRP Xd, #0 — placeholder page address; the PAGE21 relocation carries
    /// the real displacement, resolved by the object format's consumer.
    pub fn adrp_placeholder(&mut self, rd: PhysReg) -> u32 {
        let at = self.buf.current_offset();
        self.word(0x90000000 | r(rd));
        at
    }

    /// ADD Xd, Xn, #0 — placeholder low-12 offset; paired with a
    /// PAGEOFF12 relocation.
    pub fn add_low12_placeholder(&mut self, rd: PhysReg, rn: PhysReg) -> u32 {
        let at = self.buf.current_offset();
        self.word(0x91000000 | (r(rn) << 5) | r(rd));
        at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::arm64::registers::*;

    #[test]
    fn every_instruction_is_one_word() {
        let mut buf = CodeBuffer::new();
        Encoder::new(&mut buf).mov_reg(X9, X9);
        assert_eq!(buf.as_bytes().len(), 4);
    }

    #[test]
    fn stp_preindex_matches_standard_frame_pointer_save() {
        let mut buf = CodeBuffer::new();
        Encoder::new(&mut buf).stp_preindex(FP, LR, PhysReg(31), -16);
        assert_eq!(
            u32::from_le_bytes(buf.as_bytes().try_into().unwrap()),
            0xA9BF7BFD
        );
    }

    #[test]
    fn ldp_postindex_matches_standard_frame_pointer_restore() {
        let mut buf = CodeBuffer::new();
        Encoder::new(&mut buf).ldp_postindex(FP, LR, PhysReg(31), 16);
        assert_eq!(
            u32::from_le_bytes(buf.as_bytes().try_into().unwrap()),
            0xA8C17BFD
        );
    }

    #[test]
    fn branch_placeholder_is_patchable() {
        let mut buf = CodeBuffer::new();
        let mut enc = Encoder::new(&mut buf);
        let at = enc.b_placeholder();
        enc.patch_branch26(at, 32);
        let w = u32::from_le_bytes(buf.as_bytes().try_into().unwrap());
        assert_eq!(w & 0x3FFFFFF, 8); // 32 bytes / 4
        assert_eq!(w & 0xFC000000, 0x14000000);
    }
}
