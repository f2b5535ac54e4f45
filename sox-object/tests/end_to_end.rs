//! Full pipeline scenarios: IR -> code generator -> `ObjectModel` -> object
//! writer, checked at the byte level against the target container format.

use object::elf;
use object::macho;
use sox_codegen::ir::{Constant, Function, Instruction, Module, Opcode, Operand};
use sox_codegen::isa::Arch;
use sox_object::{write_elf64, write_macho64, ObjectModel};

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

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// S1: `print(2 + 3)` compiled for x86_64-linux with `emit_object=true`,
/// written out to `out.o`. The resulting ELF64 relocatable must carry the
/// right machine type, a `.rela.text` entry against `sox_native_print`, and
/// a global `sox_main` symbol at offset 0.
#[test]
fn s1_x64_linux_print_object_is_a_valid_elf64_relocatable() {
    let m = print_sum_module("sox_main");
    let compiled = sox_codegen::compile_module(&m, Arch::X86_64, true).unwrap();
    let model = ObjectModel::from_compiled(Arch::X86_64, &compiled);
    let bytes = write_elf64(&model).unwrap();

    assert_eq!(&bytes[0..4], &[0x7f, b'E', b'L', b'F']);
    assert_eq!(bytes[4], elf::ELFCLASS64);
    let e_machine = u16::from_le_bytes([bytes[18], bytes[19]]);
    assert_eq!(e_machine, elf::EM_X86_64 as u16);

    // one relocation against the external print symbol, one against no
    // other symbol (no intra-module calls in this module).
    assert_eq!(model.relocations.len(), 1);
    assert_eq!(model.relocations[0].symbol, "sox_native_print");
    assert!(model
        .symbols
        .iter()
        .any(|s| s.name == "sox_native_print" && s.section.is_none()));
    assert!(contains(&bytes, b"sox_native_print\0"));

    let sox_main = model.symbols.iter().find(|s| s.name == "sox_main").unwrap();
    assert_eq!(sox_main.value, 0);
    assert_eq!(sox_main.binding, sox_object::Binding::Global);
    assert!(contains(&bytes, b"sox_main\0"));
}

/// S2: the same source compiled for arm64-macos with `emit_object=false`.
/// The resulting Mach-O 64 object must report CPU type ARM64, export both
/// `_main` and `_sox_main`, carry a BRANCH26 relocation against
/// `_sox_native_print`, and a build-version load command for macOS.
#[test]
fn s2_arm64_macos_print_object_is_a_valid_macho64_relocatable() {
    let m = print_sum_module("sox_main");
    let compiled = sox_codegen::compile_module(&m, Arch::Arm64, false).unwrap();
    let model = ObjectModel::from_compiled(Arch::Arm64, &compiled);
    let bytes = write_macho64(&model).unwrap();

    assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), macho::MH_MAGIC_64);
    let cputype = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    assert_eq!(cputype, macho::CPU_TYPE_ARM64 as u32);

    assert!(contains(&bytes, b"_sox_main\0"));
    assert!(contains(&bytes, b"_main\0"));
    assert!(contains(&bytes, b"_sox_native_print\0"));

    assert_eq!(model.relocations.len(), 1);
    assert_eq!(
        model.relocations[0].kind,
        sox_codegen::binemit::RelocationKind::Arm64Call26
    );

    // LC_BUILD_VERSION is the last of the four load commands this writer
    // always emits (segment, symtab, dysymtab, build-version); with no
    // rodata section here the layout is fully fixed: header(32) +
    // segment+1 section(152) + symtab(24) + dysymtab(80) = 288.
    const BUILD_VERSION_CMD_OFFSET: usize = 32 + (72 + 80) + 24 + 80;
    let cmd = u32::from_le_bytes(
        bytes[BUILD_VERSION_CMD_OFFSET..BUILD_VERSION_CMD_OFFSET + 4].try_into().unwrap(),
    );
    assert_eq!(cmd, macho::LC_BUILD_VERSION);
    let platform = u32::from_le_bytes(
        bytes[BUILD_VERSION_CMD_OFFSET + 8..BUILD_VERSION_CMD_OFFSET + 12].try_into().unwrap(),
    );
    assert_eq!(platform, macho::PLATFORM_MACOS);
}

/// Two objects compiled independently for the same architecture produce
/// disjoint, internally consistent symbol tables — the static linker
/// (covered separately by `sox-module`'s resolver tests) is what merges
/// them, not the object writer.
#[test]
fn independently_compiled_objects_each_round_trip_through_elf64() {
    let a = sox_codegen::compile_module(&print_sum_module("sox_main"), Arch::X86_64, true).unwrap();
    let b = sox_codegen::compile_module(&print_sum_module("sox_main"), Arch::X86_64, true).unwrap();

    let bytes_a = write_elf64(&ObjectModel::from_compiled(Arch::X86_64, &a)).unwrap();
    let bytes_b = write_elf64(&ObjectModel::from_compiled(Arch::X86_64, &b)).unwrap();
    assert_eq!(bytes_a, bytes_b, "compiling the same module twice is deterministic");
}
