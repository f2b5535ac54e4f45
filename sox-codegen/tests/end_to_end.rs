//! End-to-end scenarios driving `compile_module` directly and checking the
//! emitted byte stream, relocations, and symbol table. These exercise full
//! functions rather than single-instruction unit slices, matching the scale
//! the module-level unit tests in `isa::x64`/`isa::arm64` don't cover.

use sox_codegen::ir::{Constant, Function, Instruction, Module, Opcode, Operand};
use sox_codegen::isa::{self, Arch};
use sox_codegen::regalloc::{self, round_up_16};

fn print_sum_module(entry_name: &str) -> Module {
    let mut m = Module::new("test");
    let mut f = Function::new(entry_name, 0, 0);
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

fn find_word_le(code: &[u8], needle: &[u8]) -> Option<usize> {
    code.windows(needle.len()).position(|w| w == needle)
}

/// S1: `print(2 + 3)` on x86_64-linux with `emit_object=true`. The `.text`
/// disassembly must begin with the standard prologue, load the two
/// constants, add them, marshal the result into the call ABI, and record a
/// PLT32 relocation against the external print symbol; `sox_main` must be
/// the global entry symbol at offset 0.
#[test]
fn s1_x64_print_object_has_expected_shape() {
    let m = print_sum_module("sox_main");
    let compiled = sox_codegen::compile_module(&m, Arch::X86_64, true).unwrap();

    assert_eq!(compiled.code[0], 0x55); // push rbp
    assert_eq!(&compiled.code[1..4], &[0x48, 0x89, 0xE5]); // mov rbp, rsp

    let sub_rsp_at =
        find_word_le(&compiled.code, &[0x48, 0x81, 0xEC]).expect("a sub rsp, imm32 prologue");
    let frame = i32::from_le_bytes(compiled.code[sub_rsp_at + 3..sub_rsp_at + 7].try_into().unwrap());
    assert_eq!(frame % 16, 8, "frame size must restore 16-byte stack alignment");

    let reloc = compiled
        .relocations
        .iter()
        .find(|r| r.symbol == "sox_native_print")
        .expect("call to sox_native_print records a relocation");
    assert_eq!(reloc.kind, sox_codegen::binemit::RelocationKind::X86Plt32);
    assert_eq!(reloc.addend, -4);
    assert_eq!(compiled.code[reloc.offset as usize - 1], 0xE8); // call rel32 opcode

    let entry = compiled.symbols.iter().find(|s| s.name == "sox_main").unwrap();
    assert_eq!(entry.offset, 0);
    assert!(entry.global);
    // `emit_object=true`: no extra `main` alias is exposed.
    assert!(!compiled.symbols.iter().any(|s| s.name == "main"));
}

/// S2: same source compiled for arm64-macos with `emit_object=false`.
/// The print call must carry a BRANCH26-shaped relocation and the entry
/// function must additionally be exported as `main` for a linked
/// executable.
#[test]
fn s2_arm64_executable_exports_main_and_relocates_print() {
    let m = print_sum_module("sox_main");
    let compiled = sox_codegen::compile_module(&m, Arch::Arm64, false).unwrap();

    let w = u32::from_le_bytes(compiled.code[0..4].try_into().unwrap());
    assert_eq!(w, 0xA9BF7BFD, "stp fp, lr, [sp, #-16]!");

    let reloc = compiled
        .relocations
        .iter()
        .find(|r| r.symbol == "sox_native_print")
        .expect("print call relocation present");
    assert_eq!(reloc.kind, sox_codegen::binemit::RelocationKind::Arm64Call26);

    let sox_main = compiled.symbols.iter().find(|s| s.name == "sox_main").unwrap();
    assert_eq!(sox_main.offset, 0);
    assert!(sox_main.global);
    let main = compiled.symbols.iter().find(|s| s.name == "main").unwrap();
    assert_eq!(main.offset, 0);
    assert!(main.global);
}

/// S3 (x86-64 side; the arm64 unit test in `isa::arm64::codegen` covers the
/// same scenario there): a call to a function defined earlier in the same
/// module resolves at codegen time and never reaches the relocation list,
/// with the correct rel32 displacement baked in directly.
#[test]
fn s3_x64_intra_module_call_has_no_relocation_and_correct_displacement() {
    let mut m = Module::new("test");

    let mut g = Function::new("g", 0, 0);
    let gentry = g.entry;
    let forty_two = g.new_vreg();
    g.blocks[gentry]
        .push(Instruction::new(Opcode::ConstInt, 1).with_dest(forty_two).with_constant(Constant::Int(42)));
    g.blocks[gentry].push(Instruction::new(Opcode::Return, 1).with_args([Operand::Reg(forty_two)]));
    let gref = m.push_function(g);

    let mut f = Function::new("f", 0, 0);
    let fentry = f.entry;
    let result = f.new_vreg();
    f.blocks[fentry].push(Instruction::new(Opcode::Call, 1).with_dest(result).with_call_target(gref));
    f.blocks[fentry].push(Instruction::new(Opcode::Return, 1).with_args([Operand::Reg(result)]));
    m.push_function(f);

    let compiled = sox_codegen::compile_module(&m, Arch::X86_64, true).unwrap();
    assert!(compiled.relocations.is_empty());

    let g_offset = compiled.symbols.iter().find(|s| s.name == "g").unwrap().offset;
    let call_at =
        find_word_le(&compiled.code, &[0xE8]).expect("a direct call opcode is present");
    let disp = i32::from_le_bytes(
        compiled.code[call_at + 1..call_at + 5].try_into().unwrap(),
    );
    assert_eq!(disp as i64, g_offset as i64 - (call_at as i64 + 5));
}

/// S4: a function with 40 simultaneously live virtual registers exhausts
/// the 12-register x86-64 allocatable set (RAX, RCX, RDX, RBX, R8-R15 —
/// RSP/RBP and the two reserved scratch registers excluded) and spills the
/// rest; the emitted frame size must match the allocator's reported spill
/// byte total.
#[test]
fn s4_x64_spill_heavy_function_spills_excess_live_values() {
    let mut f = Function::new("sox_main", 0, 0);
    let entry = f.entry;
    let mut vregs = Vec::new();
    for i in 0..40i64 {
        let v = f.new_vreg();
        f.blocks[entry]
            .push(Instruction::new(Opcode::ConstInt, 1).with_dest(v).with_constant(Constant::Int(i)));
        vregs.push(v);
    }
    f.blocks[entry].push(
        Instruction::new(Opcode::Print, 1)
            .with_sym_target("sox_native_print")
            .with_call_args(vregs.iter().copied().map(Operand::Reg)),
    );
    f.blocks[entry].push(Instruction::new(Opcode::Return, 1).with_args([Operand::Reg(vregs[0])]));

    let alloc = regalloc::allocate(&f, &isa::x64::registers::allocatable()).unwrap();
    assert_eq!(alloc.spill_count, 28);
    assert_eq!(alloc.spill_byte_total, 28 * 8);

    let mut m = Module::new("test");
    m.push_function(f);
    let compiled = sox_codegen::compile_module(&m, Arch::X86_64, true).unwrap();

    let saved_regs_bytes = isa::x64::registers::CALLEE_SAVED.len() as u32 * 8;
    let expected_frame = round_up_16(saved_regs_bytes + alloc.spill_byte_total) - saved_regs_bytes;

    let sub_rsp_at =
        find_word_le(&compiled.code, &[0x48, 0x81, 0xEC]).expect("a sub rsp, imm32 prologue");
    let frame = u32::from_le_bytes(compiled.code[sub_rsp_at + 3..sub_rsp_at + 7].try_into().unwrap());
    assert_eq!(frame, expected_frame);
}

/// String-literal scenario (`ConstString`/`NewString`): the literal is
/// appended to the rodata blob and its address is loaded into the
/// destination register via a PC-relative relocation against the matching
/// rodata symbol, on both ISAs.
#[test]
fn string_literal_address_is_loaded_via_pcrel_relocation_x64() {
    let mut m = Module::new("test");
    let mut f = Function::new("sox_main", 0, 0);
    let entry = f.entry;
    let s = f.new_vreg();
    f.blocks[entry]
        .push(Instruction::new(Opcode::ConstString, 1).with_dest(s).with_string_literal("hello"));
    f.blocks[entry].push(Instruction::new(Opcode::Return, 1).with_args([Operand::Reg(s)]));
    m.push_function(f);

    let compiled = sox_codegen::compile_module(&m, Arch::X86_64, true).unwrap();

    assert_eq!(compiled.rodata.len(), 1);
    assert_eq!(compiled.rodata[0].bytes, b"hello");
    let sym = compiled.rodata[0].symbol.clone();

    let reloc = compiled
        .relocations
        .iter()
        .find(|r| r.symbol == sym)
        .expect("lea against the rodata symbol records a relocation");
    assert_eq!(reloc.kind, sox_codegen::binemit::RelocationKind::X86Pc32);
    assert_eq!(reloc.addend, -4);
    // lea reg, [rip + disp32]: REX.W 8D /r, ModRM mod=00 rm=101. The dest
    // register's own index (not fixed here) only affects REX.R and the
    // ModRM reg field, not the opcode or the rip-relative rm encoding.
    assert_eq!(compiled.code[reloc.offset as usize - 3] & !0x04, 0x48);
    assert_eq!(compiled.code[reloc.offset as usize - 2], 0x8D);
    assert_eq!(compiled.code[reloc.offset as usize - 1] & 0xC7, 0x05);
}

#[test]
fn string_literal_address_is_loaded_via_adrp_add_pair_arm64() {
    let mut m = Module::new("test");
    let mut f = Function::new("sox_main", 0, 0);
    let entry = f.entry;
    let s = f.new_vreg();
    f.blocks[entry]
        .push(Instruction::new(Opcode::ConstString, 1).with_dest(s).with_string_literal("hello"));
    f.blocks[entry].push(Instruction::new(Opcode::Return, 1).with_args([Operand::Reg(s)]));
    m.push_function(f);

    let compiled = sox_codegen::compile_module(&m, Arch::Arm64, true).unwrap();

    assert_eq!(compiled.rodata.len(), 1);
    assert_eq!(compiled.rodata[0].bytes, b"hello");
    let sym = compiled.rodata[0].symbol.clone();

    let page_reloc = compiled
        .relocations
        .iter()
        .find(|r| r.symbol == sym && r.kind == sox_codegen::binemit::RelocationKind::Arm64AdrPrelPgHi21)
        .expect("adrp records a PAGE21 relocation");
    let low_reloc = compiled
        .relocations
        .iter()
        .find(|r| r.symbol == sym && r.kind == sox_codegen::binemit::RelocationKind::Arm64AddAbsLo12Nc)
        .expect("add records a PAGEOFF12 relocation");
    // the add immediately follows the adrp, one instruction word (4 bytes)
    // later.
    assert_eq!(low_reloc.offset, page_reloc.offset + 4);
}
