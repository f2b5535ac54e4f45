//! The bytecode-to-IR builder: translates one closure's chunk into a
//! `sox_codegen::ir::Function` by simulating its evaluation stack.
//!
//! Block boundaries come from a first scan over the chunk that locates every
//! jump/branch target and the fallthrough point after every conditional
//! branch. Each such boundary becomes a block whose entry stack slots are
//! represented as phi instructions; as the second pass walks the chunk and
//! transfers control into a boundary (explicitly via a jump, or implicitly
//! via fallthrough), it appends the transferring block's live operand for
//! each slot onto the target's phi argument list.

use crate::bytecode::{Chunk, Closure, ConstantValue, OpCode};
use crate::error::FrontendError;
use sox_codegen::ir::{Block, Constant, FuncRef, Function, Instruction, Module, Opcode, Operand};
use sox_entity::EntityRef;
use std::collections::{BTreeMap, HashMap};

pub fn build_module(source_file: &str, closures: &[Closure]) -> Result<Module, FrontendError> {
    let mut module = Module::new(source_file);
    // Nested-closure references are positional indices into `closures`
    // (assigned in push order, so `func_ref_for_index(i)` is valid before
    // function `i` itself has been built, since `Module::push_function`
    // mints `FuncRef`s in the same order this loop pushes them).
    for closure in closures {
        let func = build_function(closure, closures)?;
        module.push_function(func);
    }
    Ok(module)
}

fn func_ref_for_index(i: usize) -> FuncRef {
    FuncRef::new(i)
}

struct ScanResult {
    /// Every offset at which a new block begins, in increasing order.
    boundaries: Vec<u32>,
    /// Entry operand-stack depth recorded the first time control reaches
    /// each boundary offset.
    depth_at: HashMap<u32, u32>,
}

fn scan(chunk: &Chunk) -> Result<ScanResult, FrontendError> {
    let mut boundaries = vec![0u32];
    let mut depth_at = HashMap::new();
    depth_at.insert(0, 0u32);

    let mut offset = 0u32;
    let mut depth: i32 = 0;
    while (offset as usize) < chunk.code.len() {
        let byte = chunk.code[offset as usize];
        let op = OpCode::from_byte(offset, byte)?;
        let operand_len = op.operand_len();
        if offset as usize + 1 + operand_len as usize > chunk.code.len() {
            return Err(FrontendError::TruncatedOperand { offset });
        }

        let next_offset = offset + 1 + operand_len;

        match op {
            OpCode::Call => {
                let argc = chunk.code[offset as usize + 1] as i32;
                depth -= argc + 1; // callee + args
                depth += 1; // result
            }
            _ => depth += op.stack_delta(),
        }
        if depth < 0 {
            return Err(FrontendError::StackUnderflow { offset });
        }

        match op {
            OpCode::Jump => {
                let disp = read_u16(chunk, offset + 1)?;
                let target = next_offset + disp as u32;
                boundaries.push(target);
                depth_at.entry(target).or_insert(depth as u32);
            }
            OpCode::JumpIfFalse => {
                let disp = read_u16(chunk, offset + 1)?;
                let target = next_offset + disp as u32;
                boundaries.push(target);
                depth_at.entry(target).or_insert(depth as u32);
                boundaries.push(next_offset);
                depth_at.entry(next_offset).or_insert(depth as u32);
            }
            OpCode::Loop => {
                let disp = read_u16(chunk, offset + 1)?;
                let target = next_offset.saturating_sub(disp as u32);
                boundaries.push(target);
                depth_at.entry(target).or_insert(depth as u32);
                boundaries.push(next_offset);
                depth_at.entry(next_offset).or_insert(depth as u32);
            }
            _ => {}
        }

        offset = next_offset;
    }

    boundaries.sort_unstable();
    boundaries.dedup();
    Ok(ScanResult { boundaries, depth_at })
}

fn read_u16(chunk: &Chunk, offset: u32) -> Result<u16, FrontendError> {
    let a = *chunk.code.get(offset as usize).ok_or(FrontendError::TruncatedOperand { offset })?;
    let b = *chunk
        .code
        .get(offset as usize + 1)
        .ok_or(FrontendError::TruncatedOperand { offset })?;
    Ok(u16::from_be_bytes([a, b]))
}

fn constant_str<'a>(chunk: &'a Chunk, index: u8) -> Result<&'a str, FrontendError> {
    match chunk.constants.get(index as usize) {
        Some(ConstantValue::Str(s)) => Ok(s.as_str()),
        Some(_) | None => {
            Err(FrontendError::ConstantOutOfRange { index: index as u32, len: chunk.constants.len() })
        }
    }
}

fn constant(chunk: &Chunk, index: u8) -> Result<Constant, FrontendError> {
    match chunk.constants.get(index as usize) {
        Some(ConstantValue::Nil) => Ok(Constant::Nil),
        Some(ConstantValue::Bool(b)) => Ok(Constant::Bool(*b)),
        Some(ConstantValue::Int(i)) => Ok(Constant::Int(*i)),
        Some(ConstantValue::Float(f)) => Ok(Constant::Float(*f)),
        Some(ConstantValue::Str(_)) | None => {
            Err(FrontendError::ConstantOutOfRange { index: index as u32, len: chunk.constants.len() })
        }
    }
}

fn build_function(closure: &Closure, all_closures: &[Closure]) -> Result<Function, FrontendError> {
    let scan = scan(&closure.chunk)?;
    let mut func = Function::new(closure.name.clone(), closure.arity, closure.upvalue_count);
    func.local_count = closure.local_count;
    func.decl_line = closure.chunk.line_at(0);

    let mut offset_to_block: BTreeMap<u32, Block> = BTreeMap::new();
    offset_to_block.insert(0, func.entry);
    for &b in scan.boundaries.iter().filter(|&&o| o != 0) {
        offset_to_block.insert(b, func.new_block());
    }

    // Pre-populate phi destinations for every non-entry boundary so forward
    // jumps (which reach a target before its contributions are all known)
    // have somewhere to record an argument.
    let mut entry_phis: HashMap<Block, Vec<sox_codegen::ir::VReg>> = HashMap::new();
    for (&offset, &block) in offset_to_block.iter() {
        if offset == 0 {
            continue;
        }
        let depth = *scan.depth_at.get(&offset).unwrap_or(&0);
        let mut vregs = Vec::with_capacity(depth as usize);
        for _ in 0..depth {
            let v = func.new_vreg();
            func.blocks[block].push(Instruction::new(Opcode::Phi, closure.chunk.line_at(offset)).with_dest(v));
            vregs.push(v);
        }
        entry_phis.insert(block, vregs);
    }

    // Parameters are implicit phi values supplied by the caller at entry.
    let mut locals: Vec<Operand> = vec![Operand::Const(Constant::Nil); closure.local_count as usize];
    for slot in locals.iter_mut().take(closure.arity as usize) {
        let v = func.new_vreg();
        func.blocks[func.entry].push(Instruction::new(Opcode::Phi, closure.chunk.line_at(0)).with_dest(v));
        *slot = Operand::Reg(v);
    }

    let mut stack: Vec<Operand> = Vec::new();
    let mut current = func.entry;
    let mut terminated = false;
    let mut offset = 0u32;

    while (offset as usize) < closure.chunk.code.len() {
        if let Some(&block) = offset_to_block.get(&offset) {
            if block != current {
                if !terminated {
                    let line = closure.chunk.line_at(offset);
                    func.blocks[current].push(
                        Instruction::new(Opcode::Jump, line).with_args([Operand::Label(block)]),
                    );
                    func.add_edge(current, block);
                    contribute(&mut func, block, &stack, &entry_phis);
                }
                current = block;
                stack = entry_phis
                    .get(&block)
                    .map(|vs| vs.iter().map(|v| Operand::Reg(*v)).collect())
                    .unwrap_or_default();
                terminated = false;
            }
        }

        let byte = closure.chunk.code[offset as usize];
        let op = OpCode::from_byte(offset, byte)?;
        let operand_len = op.operand_len();
        let next_offset = offset + 1 + operand_len;
        let line = closure.chunk.line_at(offset);

        match op {
            OpCode::Constant => {
                let idx = closure.chunk.code[offset as usize + 1];
                let c = constant(&closure.chunk, idx)?;
                let v = func.new_vreg();
                let ir_op = match c {
                    Constant::Bool(_) => Opcode::ConstBool,
                    Constant::Int(_) => Opcode::ConstInt,
                    Constant::Float(_) => Opcode::ConstFloat,
                    Constant::Nil => Opcode::ConstNil,
                };
                func.blocks[current].push(Instruction::new(ir_op, line).with_dest(v).with_constant(c));
                stack.push(Operand::Reg(v));
            }
            OpCode::Nil => {
                let v = func.new_vreg();
                func.blocks[current]
                    .push(Instruction::new(Opcode::ConstNil, line).with_dest(v).with_constant(Constant::Nil));
                stack.push(Operand::Reg(v));
            }
            OpCode::True | OpCode::False => {
                let v = func.new_vreg();
                let b = op == OpCode::True;
                func.blocks[current].push(
                    Instruction::new(Opcode::ConstBool, line).with_dest(v).with_constant(Constant::Bool(b)),
                );
                stack.push(Operand::Reg(v));
            }
            OpCode::Pop => {
                stack.pop();
            }
            OpCode::Dup => {
                if let Some(top) = stack.last().copied() {
                    stack.push(top);
                }
            }
            OpCode::GetLocal => {
                let slot = closure.chunk.code[offset as usize + 1] as usize;
                stack.push(locals.get(slot).copied().unwrap_or(Operand::Const(Constant::Nil)));
            }
            OpCode::SetLocal => {
                let slot = closure.chunk.code[offset as usize + 1] as usize;
                if let Some(top) = stack.last().copied() {
                    if slot < locals.len() {
                        locals[slot] = top;
                    }
                }
            }
            OpCode::GetGlobal => {
                let idx = closure.chunk.code[offset as usize + 1];
                let name = constant_str(&closure.chunk, idx)?.to_string();
                let v = func.new_vreg();
                func.blocks[current]
                    .push(Instruction::new(Opcode::LoadGlobal, line).with_dest(v).with_string_literal(name));
                stack.push(Operand::Reg(v));
            }
            OpCode::DefineGlobal | OpCode::SetGlobal => {
                let idx = closure.chunk.code[offset as usize + 1];
                let name = constant_str(&closure.chunk, idx)?.to_string();
                if let Some(top) = stack.pop() {
                    func.blocks[current].push(
                        Instruction::new(Opcode::StoreGlobal, line).with_args([top]).with_string_literal(name),
                    );
                }
            }
            OpCode::GetUpvalue => {
                let slot = closure.chunk.code[offset as usize + 1];
                let v = func.new_vreg();
                func.blocks[current].push(
                    Instruction::new(Opcode::LoadUpvalue, line)
                        .with_dest(v)
                        .with_constant(Constant::Int(slot as i64)),
                );
                stack.push(Operand::Reg(v));
            }
            OpCode::SetUpvalue => {
                let slot = closure.chunk.code[offset as usize + 1];
                if let Some(top) = stack.last().copied() {
                    func.blocks[current].push(
                        Instruction::new(Opcode::StoreUpvalue, line)
                            .with_args([top, Operand::Const(Constant::Int(slot as i64))]),
                    );
                }
            }
            OpCode::GetProperty => {
                let idx = closure.chunk.code[offset as usize + 1];
                let name = constant_str(&closure.chunk, idx)?.to_string();
                if let Some(obj) = stack.pop() {
                    let v = func.new_vreg();
                    func.blocks[current].push(
                        Instruction::new(Opcode::GetProperty, line)
                            .with_dest(v)
                            .with_args([obj])
                            .with_string_literal(name),
                    );
                    stack.push(Operand::Reg(v));
                }
            }
            OpCode::SetProperty => {
                let idx = closure.chunk.code[offset as usize + 1];
                let name = constant_str(&closure.chunk, idx)?.to_string();
                let value = stack.pop();
                let obj = stack.pop();
                if let (Some(value), Some(obj)) = (value, obj) {
                    func.blocks[current].push(
                        Instruction::new(Opcode::SetProperty, line)
                            .with_args([obj, value])
                            .with_string_literal(name),
                    );
                    stack.push(value);
                }
            }
            OpCode::GetIndex => {
                let index = stack.pop();
                let obj = stack.pop();
                if let (Some(index), Some(obj)) = (index, obj) {
                    let v = func.new_vreg();
                    func.blocks[current]
                        .push(Instruction::new(Opcode::GetIndex, line).with_dest(v).with_args([obj, index]));
                    stack.push(Operand::Reg(v));
                }
            }
            OpCode::SetIndex => {
                let value = stack.pop();
                let index = stack.pop();
                let obj = stack.pop();
                if let (Some(value), Some(index), Some(obj)) = (value, index, obj) {
                    func.blocks[current]
                        .push(Instruction::new(Opcode::SetIndex, line).with_args([obj, index, value]));
                    stack.push(value);
                }
            }
            OpCode::Equal | OpCode::Greater | OpCode::Less | OpCode::Add | OpCode::Subtract
            | OpCode::Multiply | OpCode::Divide | OpCode::BitAnd | OpCode::BitOr | OpCode::BitXor
            | OpCode::ShiftLeft | OpCode::ShiftRight => {
                let rhs = stack.pop();
                let lhs = stack.pop();
                if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                    let ir_op = match op {
                        OpCode::Equal => Opcode::Equal,
                        OpCode::Greater => Opcode::Greater,
                        OpCode::Less => Opcode::Less,
                        OpCode::Add => Opcode::Add,
                        OpCode::Subtract => Opcode::Sub,
                        OpCode::Multiply => Opcode::Mul,
                        OpCode::Divide => Opcode::Div,
                        OpCode::BitAnd => Opcode::BitAnd,
                        OpCode::BitOr => Opcode::BitOr,
                        OpCode::BitXor => Opcode::BitXor,
                        OpCode::ShiftLeft => Opcode::ShiftLeft,
                        OpCode::ShiftRight => Opcode::ShiftRight,
                        _ => unreachable!(),
                    };
                    let v = func.new_vreg();
                    func.blocks[current]
                        .push(Instruction::new(ir_op, line).with_dest(v).with_args([lhs, rhs]));
                    stack.push(Operand::Reg(v));
                }
            }
            OpCode::Not | OpCode::Negate | OpCode::BitNot => {
                if let Some(src) = stack.pop() {
                    let ir_op = match op {
                        OpCode::Not => Opcode::Not,
                        OpCode::Negate => Opcode::Neg,
                        OpCode::BitNot => Opcode::BitNot,
                        _ => unreachable!(),
                    };
                    let v = func.new_vreg();
                    func.blocks[current].push(Instruction::new(ir_op, line).with_dest(v).with_args([src]));
                    stack.push(Operand::Reg(v));
                }
            }
            OpCode::Print => {
                if let Some(arg) = stack.pop() {
                    func.blocks[current].push(
                        Instruction::new(Opcode::Print, line)
                            .with_sym_target("sox_native_print")
                            .with_call_args([arg]),
                    );
                }
            }
            OpCode::Jump => {
                let target_offset = next_offset + read_u16(&closure.chunk, offset + 1)? as u32;
                let target = offset_to_block[&target_offset];
                func.blocks[current]
                    .push(Instruction::new(Opcode::Jump, line).with_args([Operand::Label(target)]));
                func.add_edge(current, target);
                contribute(&mut func, target, &stack, &entry_phis);
                terminated = true;
            }
            OpCode::JumpIfFalse => {
                let target_offset = next_offset + read_u16(&closure.chunk, offset + 1)? as u32;
                let target = offset_to_block[&target_offset];
                if let Some(&cond) = stack.last() {
                    func.blocks[current].push(
                        Instruction::new(Opcode::Branch, line).with_args([cond, Operand::Label(target)]),
                    );
                }
                func.add_edge(current, target);
                contribute(&mut func, target, &stack, &entry_phis);
                // Condition stays on `stack`; each arm's own `Pop` discards
                // it, and the fallthrough edge is handled by the boundary
                // check at the top of the next iteration.
            }
            OpCode::Loop => {
                let disp = read_u16(&closure.chunk, offset + 1)? as u32;
                let target_offset = next_offset.saturating_sub(disp);
                let target = offset_to_block[&target_offset];
                func.blocks[current]
                    .push(Instruction::new(Opcode::Jump, line).with_args([Operand::Label(target)]));
                func.add_edge(current, target);
                contribute(&mut func, target, &stack, &entry_phis);
                terminated = true;
            }
            OpCode::Call => {
                let argc = closure.chunk.code[offset as usize + 1] as usize;
                let mut args: Vec<Operand> = (0..argc).filter_map(|_| stack.pop()).collect();
                args.reverse();
                let callee = stack.pop();
                let dest = func.new_vreg();
                match callee {
                    Some(Operand::Func(fref)) => {
                        func.blocks[current].push(
                            Instruction::new(Opcode::Call, line)
                                .with_dest(dest)
                                .with_call_target(fref)
                                .with_call_args(args),
                        );
                    }
                    Some(other) => {
                        let mut call_args = vec![other];
                        call_args.extend(args);
                        func.blocks[current].push(
                            Instruction::new(Opcode::CallExternal, line)
                                .with_dest(dest)
                                .with_sym_target("sox_runtime_call_value")
                                .with_call_args(call_args),
                        );
                    }
                    None => {}
                }
                stack.push(Operand::Reg(dest));
            }
            OpCode::Closure => {
                let idx = closure.chunk.code[offset as usize + 1] as usize;
                if idx >= all_closures.len() {
                    return Err(FrontendError::UnknownClosureConstant { index: idx as u32 });
                }
                // A direct call through `OpCode::Call`'s fast path consumes
                // the `Operand::Func` below and never touches this vreg; it
                // exists so a closure's runtime object (code pointer + upvalue
                // array) is materialized whenever the callee isn't known
                // statically (stored in a local/global, passed as a value).
                let upvalue_count = all_closures[idx].upvalue_count;
                let v = func.new_vreg();
                func.blocks[current].push(
                    Instruction::new(Opcode::NewClosure, line).with_dest(v).with_call_args([
                        Operand::Const(Constant::Int(idx as i64)),
                        Operand::Const(Constant::Int(upvalue_count as i64)),
                    ]),
                );
                stack.push(Operand::Func(func_ref_for_index(idx)));
            }
            OpCode::NewTable => {
                let v = func.new_vreg();
                func.blocks[current].push(Instruction::new(Opcode::NewTable, line).with_dest(v));
                stack.push(Operand::Reg(v));
            }
            OpCode::NewArray => {
                let v = func.new_vreg();
                func.blocks[current].push(Instruction::new(Opcode::NewArray, line).with_dest(v));
                stack.push(Operand::Reg(v));
            }
            OpCode::Return => {
                let value = stack.pop();
                func.blocks[current]
                    .push(Instruction::new(Opcode::Return, line).with_args(value.into_iter().collect::<Vec<_>>()));
                terminated = true;
            }
        }

        offset = next_offset;
    }

    func.verify_labels().map_err(|block| FrontendError::DanglingLabel { block_index: block.index() as u32 })?;
    Ok(func)
}

fn contribute(
    func: &mut Function,
    target: Block,
    stack: &[Operand],
    entry_phis: &HashMap<Block, Vec<sox_codegen::ir::VReg>>,
) {
    if let Some(dest_vregs) = entry_phis.get(&target) {
        for (slot, dvreg) in dest_vregs.iter().enumerate() {
            if let Some(operand) = stack.get(slot) {
                if let Some(inst) =
                    func.blocks[target].insts.iter_mut().find(|i| i.dest == Some(*dvreg))
                {
                    inst.args.push(*operand);
                }
            }
        }
    }
}
