//! ARM64 code generator: instruction selection, AAPCS64 prologue/epilogue,
//! call marshalling, and jump/call patching — the AArch64 analogue of the
//! x86-64 driver in `super::super::x64::codegen`.

use super::encoder::{Cond, Encoder};
use super::registers::{self, ARG_REGS, ARM64_GLOBAL_AREA_BYTES, CALLEE_SAVED, FP, LR, SPILL_A, SPILL_B, X0, X1};
use crate::binemit::{Assembler, Patch, PatchTarget, Relocation, RelocationKind};
use crate::error::CodegenError;
use crate::ir::{Constant, FuncRef, Function, Module, Opcode, Operand, SizeClass, VReg};
use crate::isa::{CompiledModule, CompiledSymbol, RodataEntry};
use crate::regalloc::{self, round_up_16, PhysReg, RegAllocResult};
use sox_entity::{EntityRef, PrimaryMap, SecondaryMap};

const SP: PhysReg = PhysReg(31);

struct Frame {
    size: u32,
    used_callee: Vec<PhysReg>,
    /// SP-relative byte offset (from SP right after the prologue's
    /// `sub sp, sp, #frame.size`) of spill slot 0. The callee-saved area
    /// sits below it, closest to SP, so this is simply that area's size.
    spill_base_disp: u32,
}

/// `round_up_16(spill_bytes + locals*8 + callee_saved_bytes + global_area)`,
/// with `global_area` a fixed scratch region rather than a growable one.
fn frame_size_for(spill_bytes: u32, local_count: u32, callee_count: u32) -> u32 {
    let content = spill_bytes + local_count * 8 + callee_count * 8 + ARM64_GLOBAL_AREA_BYTES;
    round_up_16(content)
}

fn compute_frame(func: &Function, alloc: &RegAllocResult) -> Frame {
    let mut used_callee = alloc.used_callee_saved.clone();
    used_callee.sort_by_key(|r| r.0);
    // Stored in chunks of two via STP; an odd leftover still reserves a
    // full 16-byte chunk (see the prologue's `chunks(2)` loop below).
    let callee_bytes = used_callee.chunks(2).count() as u32 * 16;
    let size = frame_size_for(alloc.spill_byte_total, func.local_count, used_callee.len() as u32);
    Frame { size, used_callee, spill_base_disp: callee_bytes }
}

pub fn compile_module(module: &Module, emit_object: bool) -> Result<CompiledModule, CodegenError> {
    let mut asm = Assembler::new();
    let mut symbols = Vec::new();
    let mut rodata = Vec::new();
    let mut func_offsets: PrimaryMap<FuncRef, u32> = PrimaryMap::new();
    let mut call_patches: Vec<(FuncRef, Patch)> = Vec::new();

    for (fref, func) in module.functions.iter() {
        let start = asm.size();
        func_offsets.push(start);
        log::debug!("arm64: emitting function `{}` at offset {}", func.name, start);
        emit_function(module, func, fref, &mut asm, &mut rodata, &mut call_patches)?;

        let global = func.name == "sox_main" || fref.index() == 0;
        symbols.push(CompiledSymbol { name: func.name.clone(), offset: start, global });
        if !emit_object && (func.name == "sox_main" || fref.index() == 0) {
            symbols.push(CompiledSymbol { name: "main".to_string(), offset: start, global: true });
        }
    }

    for (target, patch) in call_patches {
        let target_offset = func_offsets[target];
        let disp = target_offset as i64 - patch.patch_offset as i64;
        if disp < -(1i64 << 27) || disp >= (1i64 << 27) {
            return Err(CodegenError::DisplacementOverflow { kind: "arm64 bl imm26", value: disp });
        }
        let mut enc = Encoder::new(&mut asm.buffer);
        enc.patch_branch26(patch.patch_offset, disp as i32);
    }

    Ok(CompiledModule { code: asm.buffer.into_bytes(), relocations: asm.relocations, symbols, rodata })
}

#[allow(clippy::too_many_arguments)]
fn emit_function(
    module: &Module,
    func: &Function,
    fref: FuncRef,
    asm: &mut Assembler,
    rodata: &mut Vec<RodataEntry>,
    call_patches: &mut Vec<(FuncRef, Patch)>,
) -> Result<(), CodegenError> {
    let alloc = regalloc::allocate(func, &registers::allocatable())?;
    let frame = compute_frame(func, &alloc);

    {
        let mut enc = Encoder::new(&mut asm.buffer);
        enc.stp_preindex(FP, LR, SP, -16);
        enc.mov_reg(FP, SP);
        if frame.size > 0 {
            if frame.size <= 0xFFF {
                enc.sub_sp_imm(SP, frame.size as u16);
            } else {
                // Oversized frames need a scratch-register immediate build;
                // out of scope for this backend's fixed frame budget.
                return Err(CodegenError::FrameTooLarge { bytes: frame.size });
            }
        }
        for (i, pair) in frame.used_callee.chunks(2).enumerate() {
            let offset = (i * 16) as i32;
            match pair {
                [a, b] => enc.stp_offset(*a, *b, SP, offset),
                [a] => enc.str_imm(*a, SP, offset as u16),
                _ => {}
            }
        }
    }
    log::debug!(
        "arm64: function `{}` frame size {} bytes, {} spill slot(s), {} callee-saved",
        func.name,
        frame.size,
        alloc.spill_count,
        frame.used_callee.len()
    );

    let mut block_offsets: SecondaryMap<crate::ir::Block, u32> = SecondaryMap::with_default(0);
    let mut forward_patches: Vec<(Patch, crate::ir::Block)> = Vec::new();

    for (block, bb) in func.blocks.iter() {
        block_offsets.set(block, asm.size());
        for inst in &bb.insts {
            lower_instruction(
                module,
                func,
                fref,
                inst,
                &alloc,
                &frame,
                asm,
                rodata,
                call_patches,
                &mut forward_patches,
            )?;
        }
    }

    for (patch, target_block) in forward_patches {
        let target_offset = *block_offsets.get(target_block);
        let disp = target_offset as i64 - patch.patch_offset as i64;
        if disp < -(1i64 << 20) || disp >= (1i64 << 20) {
            return Err(CodegenError::DisplacementOverflow { kind: "arm64 b.cond imm19", value: disp });
        }
        let mut enc = Encoder::new(&mut asm.buffer);
        enc.patch_cond_branch19(patch.patch_offset, disp as i32);
    }

    Ok(())
}

fn epilogue(enc: &mut Encoder, frame: &Frame) {
    for (i, pair) in frame.used_callee.chunks(2).enumerate() {
        let offset = (i * 16) as i32;
        match pair {
            [a, b] => enc.ldp_offset(*a, *b, SP, offset),
            [a] => enc.ldr_imm(*a, SP, offset as u16),
            _ => {}
        }
    }
    if frame.size > 0 {
        enc.add_sp_imm(SP, frame.size as u16);
    }
    enc.ldp_postindex(FP, LR, SP, 16);
    enc.ret();
}

fn reg_of(alloc: &RegAllocResult, v: VReg) -> Option<PhysReg> {
    alloc.register_for(v)
}

fn spill_disp(frame: &Frame, offset: u32, extra_sp: u32) -> u16 {
    (frame.spill_base_disp + offset + extra_sp) as u16
}

fn load_spill(asm: &mut Assembler, dest: PhysReg, frame: &Frame, offset: u32, extra_sp: u32) {
    Encoder::new(&mut asm.buffer).ldr_imm(dest, SP, spill_disp(frame, offset, extra_sp));
}

fn store_spill(asm: &mut Assembler, src: PhysReg, frame: &Frame, offset: u32, extra_sp: u32) {
    Encoder::new(&mut asm.buffer).str_imm(src, SP, spill_disp(frame, offset, extra_sp));
}

/// `v`'s live value in a real register: its allocated register, or
/// `scratch` freshly filled from its spill slot. `extra_sp` accounts for a
/// temporary SP lowering in progress (see `marshal_call_args`'s stack-arg
/// store), zero everywhere else.
fn ensure_reg(
    alloc: &RegAllocResult,
    v: VReg,
    scratch: PhysReg,
    frame: &Frame,
    extra_sp: u32,
    asm: &mut Assembler,
) -> PhysReg {
    match reg_of(alloc, v) {
        Some(r) => r,
        None => {
            let offset = alloc.spill_offset(v).expect("vreg has neither a register nor a spill slot");
            load_spill(asm, scratch, frame, offset, extra_sp);
            scratch
        }
    }
}

/// Where a freshly computed value for `dest` should land: its allocated
/// register, or `SPILL_A` pending a `commit_dest` store.
fn dest_reg_or_scratch(alloc: &RegAllocResult, dest: VReg) -> PhysReg {
    reg_of(alloc, dest).unwrap_or(SPILL_A)
}

/// If `dest` has no real register, store the value just computed into
/// `from` out to its spill slot.
fn commit_dest(alloc: &RegAllocResult, dest: VReg, from: PhysReg, frame: &Frame, asm: &mut Assembler) {
    if reg_of(alloc, dest).is_none() {
        let offset = alloc.spill_offset(dest).expect("vreg has neither a register nor a spill slot");
        store_spill(asm, from, frame, offset, 0);
    }
}

#[allow(clippy::too_many_arguments)]
fn lower_instruction(
    module: &Module,
    func: &Function,
    fref: FuncRef,
    inst: &crate::ir::Instruction,
    alloc: &RegAllocResult,
    frame: &Frame,
    asm: &mut Assembler,
    rodata: &mut Vec<RodataEntry>,
    call_patches: &mut Vec<(FuncRef, Patch)>,
    forward_patches: &mut Vec<(Patch, crate::ir::Block)>,
) -> Result<(), CodegenError> {
    match inst.opcode {
        Opcode::ConstNil => {
            if let Some(d) = inst.dest {
                let w = dest_reg_or_scratch(alloc, d);
                Encoder::new(&mut asm.buffer).movz(w, 0, 0);
                commit_dest(alloc, d, w, frame, asm);
            }
        }
        Opcode::ConstBool | Opcode::ConstInt => {
            if let (Some(d), Some(Operand::Const(c))) = (inst.dest, inst.args.first()) {
                let imm = match c {
                    Constant::Int(i) => *i,
                    Constant::Bool(b) => *b as i64,
                    _ => 0,
                };
                let w = dest_reg_or_scratch(alloc, d);
                Encoder::new(&mut asm.buffer).mov_imm64(w, imm);
                commit_dest(alloc, d, w, frame, asm);
            }
        }
        Opcode::ConstFloat => {
            // integer-lowered, mirroring the x86-64 backend's open-question
            // resolution: the bit pattern moves into a GPR.
            if let (Some(d), Some(Operand::Const(Constant::Float(f)))) = (inst.dest, inst.args.first()) {
                let w = dest_reg_or_scratch(alloc, d);
                Encoder::new(&mut asm.buffer).mov_imm64(w, f.to_bits() as i64);
                commit_dest(alloc, d, w, frame, asm);
            }
        }
        Opcode::ConstString | Opcode::NewString => {
            if let Some(lit) = &inst.string_literal {
                let sym = format!("__sox_str_{}", rodata.len());
                rodata.push(RodataEntry { symbol: sym.clone(), bytes: lit.clone().into_bytes() });
                if let Some(d) = inst.dest {
                    let w = dest_reg_or_scratch(alloc, d);
                    let page_at = Encoder::new(&mut asm.buffer).adrp_placeholder(w);
                    asm.record_relocation(Relocation {
                        offset: page_at,
                        kind: RelocationKind::Arm64AdrPrelPgHi21,
                        symbol: sym.clone(),
                        addend: 0,
                    });
                    let lo_at = Encoder::new(&mut asm.buffer).add_low12_placeholder(w, w);
                    asm.record_relocation(Relocation {
                        offset: lo_at,
                        kind: RelocationKind::Arm64AddAbsLo12Nc,
                        symbol: sym,
                        addend: 0,
                    });
                    commit_dest(alloc, d, w, frame, asm);
                }
            }
        }
        Opcode::Add => lower_binop(inst, alloc, frame, asm),
        Opcode::Sub => lower_binop(inst, alloc, frame, asm),
        Opcode::BitAnd => lower_binop(inst, alloc, frame, asm),
        Opcode::BitOr => lower_binop(inst, alloc, frame, asm),
        Opcode::BitXor => lower_binop(inst, alloc, frame, asm),
        Opcode::Mul => {
            if let (Some(d), [Operand::Reg(l), Operand::Reg(r)]) = (inst.dest, inst.args.as_slice()) {
                let rd = ensure_reg(alloc, *r, SPILL_B, frame, 0, asm);
                let ld = ensure_reg(alloc, *l, SPILL_A, frame, 0, asm);
                let w = dest_reg_or_scratch(alloc, d);
                Encoder::new(&mut asm.buffer).mul_reg_reg(w, ld, rd);
                commit_dest(alloc, d, w, frame, asm);
            }
        }
        Opcode::Div => {
            if let (Some(d), [Operand::Reg(l), Operand::Reg(r)]) = (inst.dest, inst.args.as_slice()) {
                let rd = ensure_reg(alloc, *r, SPILL_B, frame, 0, asm);
                let ld = ensure_reg(alloc, *l, SPILL_A, frame, 0, asm);
                let w = dest_reg_or_scratch(alloc, d);
                Encoder::new(&mut asm.buffer).sdiv_reg_reg(w, ld, rd);
                commit_dest(alloc, d, w, frame, asm);
            }
        }
        Opcode::Neg => {
            if let (Some(d), Some(Operand::Reg(src))) = (inst.dest, inst.args.first()) {
                let s = ensure_reg(alloc, *src, SPILL_A, frame, 0, asm);
                let w = dest_reg_or_scratch(alloc, d);
                Encoder::new(&mut asm.buffer).neg_reg(w, s);
                commit_dest(alloc, d, w, frame, asm);
            }
        }
        Opcode::Not | Opcode::BitNot => {
            if let (Some(d), Some(Operand::Reg(src))) = (inst.dest, inst.args.first()) {
                let s = ensure_reg(alloc, *src, SPILL_A, frame, 0, asm);
                let w = dest_reg_or_scratch(alloc, d);
                Encoder::new(&mut asm.buffer).mvn_reg(w, s);
                commit_dest(alloc, d, w, frame, asm);
            }
        }
        Opcode::Equal | Opcode::Greater | Opcode::Less => {
            if let (Some(d), [Operand::Reg(l), Operand::Reg(r)]) = (inst.dest, inst.args.as_slice()) {
                let rd = ensure_reg(alloc, *r, SPILL_B, frame, 0, asm);
                let ld = ensure_reg(alloc, *l, SPILL_A, frame, 0, asm);
                let w = dest_reg_or_scratch(alloc, d);
                {
                    let mut enc = Encoder::new(&mut asm.buffer);
                    enc.cmp_reg_reg(ld, rd);
                    let cond = match inst.opcode {
                        Opcode::Equal => Cond::Eq,
                        Opcode::Greater => Cond::Gt,
                        Opcode::Less => Cond::Lt,
                        _ => unreachable!(),
                    };
                    enc.cset(w, cond);
                }
                commit_dest(alloc, d, w, frame, asm);
            }
        }
        Opcode::Move => {
            if let (Some(d), Some(Operand::Reg(src))) = (inst.dest, inst.args.first()) {
                let s = ensure_reg(alloc, *src, SPILL_A, frame, 0, asm);
                let w = dest_reg_or_scratch(alloc, d);
                if w != s {
                    Encoder::new(&mut asm.buffer).mov_reg(w, s);
                }
                commit_dest(alloc, d, w, frame, asm);
            }
        }
        Opcode::Jump => {
            let target = inst.target_block().expect("Jump carries a label operand");
            let at = Encoder::new(&mut asm.buffer).b_placeholder();
            forward_patches.push((Patch { patch_offset: at, target: PatchTarget::Label(target) }, target));
        }
        Opcode::Branch => {
            if let Some(Operand::Reg(cond_reg)) = inst.args.first() {
                let c = ensure_reg(alloc, *cond_reg, SPILL_A, frame, 0, asm);
                Encoder::new(&mut asm.buffer).tst_reg_reg(c, c);
            }
            let target = inst.target_block().expect("Branch carries a label operand");
            let at = Encoder::new(&mut asm.buffer).b_cond_placeholder(Cond::Ne);
            forward_patches.push((Patch { patch_offset: at, target: PatchTarget::Label(target) }, target));
        }
        Opcode::Phi => {}
        Opcode::Call => {
            marshal_call_args(&inst.call_args, alloc, frame, asm);
            let target = inst.call_target.expect("Call carries a resolved target");
            let at = Encoder::new(&mut asm.buffer).bl_placeholder();
            call_patches.push((target, Patch { patch_offset: at, target: PatchTarget::Function(target) }));
            finish_call(inst.dest, alloc, frame, &inst.call_args, asm);
        }
        Opcode::CallExternal | Opcode::Print => {
            marshal_call_args(&inst.call_args, alloc, frame, asm);
            let sym = inst.sym_target.clone().unwrap_or_else(|| "sox_native_print".to_string());
            let at = Encoder::new(&mut asm.buffer).bl_placeholder();
            asm.record_relocation(Relocation { offset: at, kind: RelocationKind::Arm64Call26, symbol: sym, addend: 0 });
            finish_call(inst.dest, alloc, frame, &inst.call_args, asm);
        }
        Opcode::Return => {
            if let Some(Operand::Reg(v)) = inst.args.first() {
                let s = ensure_reg(alloc, *v, SPILL_A, frame, 0, asm);
                if s != X0 {
                    Encoder::new(&mut asm.buffer).mov_reg(X0, s);
                }
            } else {
                Encoder::new(&mut asm.buffer).movz(X0, 0, 0);
            }
            epilogue(&mut Encoder::new(&mut asm.buffer), frame);
        }
        Opcode::Load
        | Opcode::Store
        | Opcode::GetProperty
        | Opcode::SetProperty
        | Opcode::GetIndex
        | Opcode::SetIndex
        | Opcode::LoadUpvalue
        | Opcode::StoreUpvalue
        | Opcode::LoadGlobal
        | Opcode::StoreGlobal
        | Opcode::NewTable
        | Opcode::NewArray
        | Opcode::NewClosure
        | Opcode::ShiftLeft
        | Opcode::ShiftRight
        | Opcode::Pop
        | Opcode::Dup => {
            if let Some(sym) = runtime_symbol_for(inst.opcode) {
                marshal_call_args(&inst.call_args, alloc, frame, asm);
                let at = Encoder::new(&mut asm.buffer).bl_placeholder();
                asm.record_relocation(Relocation {
                    offset: at,
                    kind: RelocationKind::Arm64Call26,
                    symbol: sym.to_string(),
                    addend: 0,
                });
                finish_call(inst.dest, alloc, frame, &inst.call_args, asm);
            } else {
                log::warn!(
                    "arm64: unsupported opcode {:?} in `{}`, emitting no-op",
                    inst.opcode,
                    func.name
                );
            }
        }
    }

    let _ = (module, fref);
    Ok(())
}

fn lower_binop(inst: &crate::ir::Instruction, alloc: &RegAllocResult, frame: &Frame, asm: &mut Assembler) {
    if let (Some(d), [Operand::Reg(l), Operand::Reg(r)]) = (inst.dest, inst.args.as_slice()) {
        let rd = ensure_reg(alloc, *r, SPILL_B, frame, 0, asm);
        let ld = ensure_reg(alloc, *l, SPILL_A, frame, 0, asm);
        let w = dest_reg_or_scratch(alloc, d);
        {
            let mut enc = Encoder::new(&mut asm.buffer);
            match inst.opcode {
                Opcode::Add => enc.add_reg_reg(w, ld, rd),
                Opcode::Sub => enc.sub_reg_reg(w, ld, rd),
                Opcode::BitAnd => enc.and_reg_reg(w, ld, rd),
                Opcode::BitOr => enc.orr_reg_reg(w, ld, rd),
                Opcode::BitXor => enc.eor_reg_reg(w, ld, rd),
                _ => unreachable!(),
            }
        }
        commit_dest(alloc, d, w, frame, asm);
    }
}

fn runtime_symbol_for(op: Opcode) -> Option<&'static str> {
    Some(match op {
        Opcode::GetProperty => "sox_native_get_property",
        Opcode::SetProperty => "sox_native_set_property",
        Opcode::GetIndex => "sox_native_get_index",
        Opcode::SetIndex => "sox_native_set_index",
        Opcode::NewTable => "sox_native_alloc_table",
        Opcode::NewArray => "sox_native_alloc_array",
        Opcode::NewClosure => "sox_native_make_closure",
        _ => return None,
    })
}

/// Marshal up to eight integer arguments into X0-X7; overflow is pushed to
/// the stack in reverse order via SP-relative stores.
fn marshal_call_args(args: &[Operand], alloc: &RegAllocResult, frame: &Frame, asm: &mut Assembler) {
    let (reg_args, stack_args) = if args.len() > ARG_REGS.len() {
        args.split_at(ARG_REGS.len())
    } else {
        (args, &[][..])
    };

    // SP drops by `extra_sp` bytes for the duration of the stack-arg
    // stores below; any spill slot read/written while it's lowered needs
    // that much added back to its normal frame-relative displacement.
    let extra_sp = if stack_args.is_empty() {
        0
    } else {
        round_up_16((stack_args.len() * 8) as u32)
    };

    if extra_sp > 0 {
        Encoder::new(&mut asm.buffer).sub_sp_imm(SP, extra_sp as u16);
        for (i, extra) in stack_args.iter().enumerate() {
            store_operand_at(extra, (i * 8) as u16, alloc, frame, extra_sp, asm);
        }
    }

    for (i, arg) in reg_args.iter().enumerate() {
        load_operand_into(arg, ARG_REGS[i], alloc, frame, extra_sp, asm);
    }
}

fn load_operand_into(
    op: &Operand,
    target: PhysReg,
    alloc: &RegAllocResult,
    frame: &Frame,
    extra_sp: u32,
    asm: &mut Assembler,
) {
    match op {
        Operand::Reg(v) => {
            let src = ensure_reg(alloc, *v, target, frame, extra_sp, asm);
            if src != target {
                Encoder::new(&mut asm.buffer).mov_reg(target, src);
            }
        }
        Operand::Const(Constant::Int(i)) => Encoder::new(&mut asm.buffer).mov_imm64(target, *i),
        Operand::Const(Constant::Bool(b)) => Encoder::new(&mut asm.buffer).mov_imm64(target, *b as i64),
        Operand::Const(Constant::Nil) => Encoder::new(&mut asm.buffer).movz(target, 0, 0),
        Operand::Const(Constant::Float(f)) => {
            Encoder::new(&mut asm.buffer).mov_imm64(target, f.to_bits() as i64)
        }
        _ => {}
    }
}

fn store_operand_at(
    op: &Operand,
    byte_offset: u16,
    alloc: &RegAllocResult,
    frame: &Frame,
    extra_sp: u32,
    asm: &mut Assembler,
) {
    load_operand_into(op, SPILL_A, alloc, frame, extra_sp, asm);
    Encoder::new(&mut asm.buffer).str_imm(SPILL_A, SP, byte_offset);
}

fn finish_call(
    dest: Option<VReg>,
    alloc: &RegAllocResult,
    frame: &Frame,
    args: &[Operand],
    asm: &mut Assembler,
) {
    if args.len() > ARG_REGS.len() {
        let extra = round_up_16(((args.len() - ARG_REGS.len()) * 8) as u32);
        Encoder::new(&mut asm.buffer).add_sp_imm(SP, extra as u16);
    }
    if let Some(d) = dest {
        let w = dest_reg_or_scratch(alloc, d);
        if w != X0 {
            Encoder::new(&mut asm.buffer).mov_reg(w, X0);
        }
        commit_dest(alloc, d, w, frame, asm);
        // A `Composite16` result (code pointer + upvalue-array pointer)
        // comes back in X0:X1; only stash the high half when `d` actually
        // reserved a second slot, or this would scribble X1 over whatever
        // sits at the next spill offset.
        if alloc.size_class_of(d) == SizeClass::Composite16 {
            match alloc.high_register_for(d) {
                Some(hr) => {
                    if hr != X1 {
                        Encoder::new(&mut asm.buffer).mov_reg(hr, X1);
                    }
                }
                None => {
                    let offset = alloc
                        .spill_offset(d)
                        .expect("Composite16 dest has neither a register pair nor a spill slot");
                    store_spill(asm, X1, frame, offset + 8, 0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Instruction;

    fn simple_print_module() -> Module {
        let mut m = Module::new("test");
        let mut f = Function::new("sox_main", 0, 0);
        let entry = f.entry;
        let two = f.new_vreg();
        let three = f.new_vreg();
        let sum = f.new_vreg();
        f.blocks[entry].push(
            Instruction::new(Opcode::ConstInt, 1).with_dest(two).with_constant(Constant::Int(2)),
        );
        f.blocks[entry].push(
            Instruction::new(Opcode::ConstInt, 1).with_dest(three).with_constant(Constant::Int(3)),
        );
        f.blocks[entry].push(
            Instruction::new(Opcode::Add, 1)
                .with_dest(sum)
                .with_args([Operand::Reg(two), Operand::Reg(three)]),
        );
        f.blocks[entry].push(
            Instruction::new(Opcode::Print, 1)
                .with_sym_target("sox_native_print")
                .with_call_args([Operand::Reg(sum)]),
        );
        f.blocks[entry].push(Instruction::new(Opcode::Return, 1).with_args([Operand::Reg(sum)]));
        m.push_function(f);
        m
    }

    #[test]
    fn prologue_begins_with_stp_fp_lr_preindex() {
        let m = simple_print_module();
        let compiled = compile_module(&m, true).unwrap();
        let w = u32::from_le_bytes(compiled.code[0..4].try_into().unwrap());
        assert_eq!(w, 0xA9BF7BFD);
    }

    #[test]
    fn print_call_records_call26_relocation() {
        let m = simple_print_module();
        let compiled = compile_module(&m, true).unwrap();
        let reloc = compiled
            .relocations
            .iter()
            .find(|rl| rl.symbol == "sox_native_print")
            .expect("print call relocation present");
        assert_eq!(reloc.kind, RelocationKind::Arm64Call26);
    }

    #[test]
    fn frame_size_is_always_a_multiple_of_sixteen() {
        for spill_count in 0..20u32 {
            for callee_count in 0..10u32 {
                assert_eq!(frame_size_for(spill_count * 8, 0, callee_count) % 16, 0);
            }
        }
    }

    #[test]
    fn two_function_module_call_site_has_no_relocation() {
        let mut m = Module::new("test");
        let mut g = Function::new("g", 0, 0);
        let gentry = g.entry;
        let forty_two = g.new_vreg();
        g.blocks[gentry].push(
            Instruction::new(Opcode::ConstInt, 1).with_dest(forty_two).with_constant(Constant::Int(42)),
        );
        g.blocks[gentry].push(Instruction::new(Opcode::Return, 1).with_args([Operand::Reg(forty_two)]));
        let gref = m.push_function(g);

        let mut f = Function::new("f", 0, 0);
        let fentry = f.entry;
        let result = f.new_vreg();
        f.blocks[fentry].push(
            Instruction::new(Opcode::Call, 1).with_dest(result).with_call_target(gref),
        );
        f.blocks[fentry].push(Instruction::new(Opcode::Return, 1).with_args([Operand::Reg(result)]));
        m.push_function(f);

        let compiled = compile_module(&m, true).unwrap();
        assert!(compiled.relocations.is_empty());
    }
}
