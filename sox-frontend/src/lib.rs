//! Bytecode closure model and the stack-simulating IR builder that lowers a
//! compiled closure table into one `sox_codegen::ir::Module`.

mod builder;
mod bytecode;
mod error;

pub use builder::build_module;
pub use bytecode::{Chunk, Closure, ConstantValue, OpCode};
pub use error::FrontendError;

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_from(ops: &[(OpCode, &[u8])], constants: Vec<ConstantValue>) -> Chunk {
        let mut chunk = Chunk::new();
        for (op, operand) in ops {
            chunk.code.push(*op as u8);
            chunk.code.extend_from_slice(operand);
            chunk.lines.push(1);
            chunk.lines.extend(std::iter::repeat(1).take(operand.len()));
        }
        chunk.constants = constants;
        chunk
    }

    #[test]
    fn constant_add_print_return_builds_three_instructions_plus_print_and_return() {
        let chunk = chunk_from(
            &[
                (OpCode::Constant, &[0]),
                (OpCode::Constant, &[1]),
                (OpCode::Add, &[]),
                (OpCode::Print, &[]),
                (OpCode::Nil, &[]),
                (OpCode::Return, &[]),
            ],
            vec![ConstantValue::Int(2), ConstantValue::Int(3)],
        );
        let closure =
            Closure { name: "sox_main".into(), arity: 0, upvalue_count: 0, local_count: 0, chunk };
        let module = build_module("test.sox", std::slice::from_ref(&closure)).unwrap();
        let func = &module.functions[module.find_by_name("sox_main").unwrap()];
        let entry_insts = &func.blocks[func.entry].insts;
        assert!(entry_insts.iter().any(|i| i.opcode == sox_codegen::ir::Opcode::Add));
        assert!(entry_insts.iter().any(|i| i.opcode == sox_codegen::ir::Opcode::Print));
        assert!(entry_insts.iter().any(|i| i.opcode == sox_codegen::ir::Opcode::Return));
    }

    #[test]
    fn jump_if_false_creates_two_successor_blocks() {
        // if (true) { 1; } else { 2; }  -- encoded directly as bytecode.
        let mut chunk = Chunk::new();
        // 0: True
        chunk.code.push(OpCode::True as u8);
        chunk.lines.push(1);
        // 1: JumpIfFalse -> else branch at offset 10
        chunk.code.push(OpCode::JumpIfFalse as u8);
        chunk.code.extend_from_slice(&6u16.to_be_bytes());
        chunk.lines.extend([1, 1, 1]);
        // 4: Pop (discard condition on the then path)
        chunk.code.push(OpCode::Pop as u8);
        chunk.lines.push(1);
        // 5: Constant 0 (then value)
        chunk.code.push(OpCode::Constant as u8);
        chunk.code.push(0);
        chunk.lines.extend([1, 1]);
        // 7: Jump -> end at offset 13
        chunk.code.push(OpCode::Jump as u8);
        chunk.code.extend_from_slice(&3u16.to_be_bytes());
        chunk.lines.extend([1, 1, 1]);
        // 10: Pop (discard condition on the else path)
        chunk.code.push(OpCode::Pop as u8);
        chunk.lines.push(1);
        // 11: Constant 1 (else value)
        chunk.code.push(OpCode::Constant as u8);
        chunk.code.push(1);
        chunk.lines.extend([1, 1]);
        // 13: end: Return
        chunk.code.push(OpCode::Return as u8);
        chunk.lines.push(1);
        chunk.constants = vec![ConstantValue::Int(1), ConstantValue::Int(2)];

        let closure =
            Closure { name: "sox_main".into(), arity: 0, upvalue_count: 0, local_count: 0, chunk };
        let module = build_module("test.sox", std::slice::from_ref(&closure)).unwrap();
        let func = &module.functions[module.find_by_name("sox_main").unwrap()];
        assert!(func.blocks.iter().count() >= 3);
        func.verify_labels().expect("every branch target resolves within the function");
    }
}
