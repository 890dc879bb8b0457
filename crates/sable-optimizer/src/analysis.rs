//! Bytecode analysis: control flow, abstract stack states and static metrics

use std::collections::{BTreeMap, BTreeSet};

use smallvec::SmallVec;

use sable_bytecode::{Opcode, instructions};

use crate::constant::StackState;
use crate::error::OptimizeResult;
use crate::program::Program;

/// Execution count above which an address counts as hot
pub const HOT_SPOT_THRESHOLD: u32 = 1000;

/// Addresses control can move to after the instruction at `index`
pub fn successors(program: &Program, index: usize) -> SmallVec<[u32; 2]> {
    let mut next = SmallVec::new();
    let Some(instruction) = program.instructions.get(index) else {
        return next;
    };
    if let Some(target) = instruction.jump_target() {
        next.push(target);
    }
    if !instruction.opcode.ends_flow()
        && let Some(following) = program.instructions.get(index + 1)
    {
        next.push(following.address);
    }
    next
}

/// Abstract stack state on entry to every reachable instruction.
///
/// Forward dataflow from offset 0 with an empty stack. States meeting at a
/// join point merge slot by slot; differing depths poison the state.
pub fn stack_states(program: &Program) -> BTreeMap<u32, StackState> {
    let mut states: BTreeMap<u32, StackState> = BTreeMap::new();
    if program.instructions.is_empty() {
        return states;
    }
    states.insert(0, StackState::empty());
    let mut worklist = vec![0usize];

    while let Some(index) = worklist.pop() {
        let instruction = &program.instructions[index];
        let Some(entry) = states.get(&instruction.address) else {
            continue;
        };
        let exit = entry.apply(instruction);

        for target in successors(program, index) {
            let Some(target_index) = program.index_of(target) else {
                continue;
            };
            let changed = match states.get_mut(&target) {
                Some(existing) => existing.merge_from(&exit),
                None => {
                    states.insert(target, exit.clone());
                    true
                }
            };
            if changed {
                worklist.push(target_index);
            }
        }
    }

    states
}

/// [`stack_states`] for an encoded buffer
pub fn analyze_stack_states(bytes: &[u8]) -> OptimizeResult<BTreeMap<u32, StackState>> {
    Ok(stack_states(&Program::decode(bytes)?))
}

/// Straight-line run of instructions with one entry and one exit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Address of the first instruction
    pub start: u32,
    /// Address just past the last instruction
    pub end: u32,
    /// Opcodes in order
    pub opcodes: Vec<Opcode>,
    /// Start addresses of blocks that can flow here
    pub predecessors: Vec<u32>,
    /// Start addresses of blocks control can flow to
    pub successors: Vec<u32>,
    /// Target of a backward edge
    pub is_loop_header: bool,
}

/// Split bytecode into basic blocks and link them into a control-flow graph
pub fn build_basic_blocks(bytes: &[u8]) -> OptimizeResult<Vec<BasicBlock>> {
    let program = Program::decode(bytes)?;
    if program.instructions.is_empty() {
        return Ok(Vec::new());
    }

    let mut leaders = BTreeSet::from([0u32]);
    for (index, instruction) in program.instructions.iter().enumerate() {
        if let Some(target) = instruction.jump_target()
            && program.index_of(target).is_some()
        {
            leaders.insert(target);
        }
        if (instruction.is_jump() || instruction.opcode.ends_flow())
            && let Some(next) = program.instructions.get(index + 1)
        {
            leaders.insert(next.address);
        }
    }

    let mut blocks: Vec<BasicBlock> = Vec::with_capacity(leaders.len());
    let mut current: Option<BasicBlock> = None;
    for (index, instruction) in program.instructions.iter().enumerate() {
        if leaders.contains(&instruction.address) {
            if let Some(done) = current.take() {
                blocks.push(done);
            }
            current = Some(BasicBlock {
                start: instruction.address,
                end: instruction.address,
                opcodes: Vec::new(),
                predecessors: Vec::new(),
                successors: Vec::new(),
                is_loop_header: false,
            });
        }
        if let Some(block) = current.as_mut() {
            block.opcodes.push(instruction.opcode);
            block.end = instruction.next_address();
            let is_last = program
                .instructions
                .get(index + 1)
                .is_none_or(|n| leaders.contains(&n.address));
            if is_last {
                block.successors = successors(&program, index)
                    .into_iter()
                    .filter(|t| leaders.contains(t))
                    .collect();
            }
        }
    }
    if let Some(done) = current.take() {
        blocks.push(done);
    }

    let edges: Vec<(u32, u32)> = blocks
        .iter()
        .flat_map(|b| b.successors.iter().map(move |&s| (b.start, s)))
        .collect();
    for (from, to) in edges {
        if let Some(block) = blocks.iter_mut().find(|b| b.start == to) {
            if !block.predecessors.contains(&from) {
                block.predecessors.push(from);
            }
            if from >= to {
                block.is_loop_header = true;
            }
        }
    }

    Ok(blocks)
}

/// Rough cost estimate: weighted instruction count with loop bodies
/// counted ten times
pub fn estimate_execution_complexity(bytes: &[u8]) -> OptimizeResult<f64> {
    let program = Program::decode(bytes)?;

    let loops: Vec<(u32, u32)> = program
        .instructions
        .iter()
        .filter_map(|i| i.jump_target().filter(|&t| t <= i.address).map(|t| (t, i.address)))
        .collect();

    let total = program
        .instructions
        .iter()
        .map(|i| {
            let weight = match i.opcode {
                Opcode::Div | Opcode::Mod => 4.0,
                Opcode::Mul => 2.0,
                Opcode::CallNative => 10.0,
                Opcode::LoadMem | Opcode::StoreMem => 3.0,
                op if op.is_jump() => 2.0,
                Opcode::Nop => 0.5,
                _ => 1.0,
            };
            let in_loop = loops
                .iter()
                .any(|&(start, end)| (start..=end).contains(&i.address));
            if in_loop { weight * 10.0 } else { weight }
        })
        .sum();
    Ok(total)
}

/// Addresses executed more than `threshold` times, ascending
pub fn find_hot_spots(execution_counts: &BTreeMap<u32, u32>, threshold: u32) -> Vec<u32> {
    execution_counts
        .iter()
        .filter(|&(_, &count)| count > threshold)
        .map(|(&address, _)| address)
        .collect()
}

/// `PUSH_STR` literals by address. Decoding stops at the first bad instruction.
pub fn extract_string_constants(bytes: &[u8]) -> BTreeMap<u32, String> {
    inline_strings(bytes, Opcode::PushStr)
}

/// Native functions called, by address of the `CALL_NATIVE`
pub fn find_native_calls(bytes: &[u8]) -> BTreeMap<u32, String> {
    inline_strings(bytes, Opcode::CallNative)
}

fn inline_strings(bytes: &[u8], opcode: Opcode) -> BTreeMap<u32, String> {
    instructions(bytes)
        .map_while(Result::ok)
        .filter(|i| i.opcode == opcode)
        .filter_map(|i| {
            let address = i.address;
            i.text.map(|text| (address, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ConstantValue;
    use sable_bytecode::BytecodeBuilder;

    fn diamond() -> Vec<u8> {
        // 0: PUSH 1; 5: JZ else; 10: PUSH 2; 15: JMP end; else(20): PUSH 3; end(25): HALT
        let mut b = BytecodeBuilder::new();
        let other = b.new_label();
        let end = b.new_label();
        b.push_int(1)
            .jump(Opcode::JmpIfZero, other)
            .push_int(2)
            .jump(Opcode::Jmp, end)
            .bind(other)
            .push_int(3)
            .bind(end)
            .halt();
        b.build().unwrap()
    }

    #[test]
    fn test_stack_states_merge_at_join() {
        let states = analyze_stack_states(&diamond()).unwrap();
        let at_halt = &states[&25];
        assert!(at_halt.is_valid);
        assert_eq!(at_halt.values, vec![ConstantValue::Unknown]);
        assert_eq!(states[&10].values, Vec::<ConstantValue>::new());
    }

    #[test]
    fn test_depth_mismatch_poisons() {
        // one path pushes an extra value before the join
        let mut b = BytecodeBuilder::new();
        let join = b.new_label();
        b.push_int(0)
            .jump(Opcode::JmpIfZero, join)
            .push_int(9)
            .bind(join)
            .halt();
        let states = analyze_stack_states(&b.build().unwrap()).unwrap();
        assert!(!states[&15].is_valid);
    }

    #[test]
    fn test_basic_blocks_of_diamond() {
        let blocks = build_basic_blocks(&diamond()).unwrap();
        let starts: Vec<_> = blocks.iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![0, 10, 20, 25]);
        assert_eq!(blocks[0].successors, vec![20, 10]);
        assert_eq!(blocks[3].predecessors.len(), 2);
        assert!(blocks.iter().all(|b| !b.is_loop_header));
    }

    #[test]
    fn test_loop_header_detected() {
        let mut b = BytecodeBuilder::new();
        let top = b.new_label();
        b.push_int(3)
            .bind(top)
            .push_int(1)
            .op(Opcode::Sub)
            .op(Opcode::Dup)
            .jump(Opcode::JmpIfNotZero, top)
            .halt();
        let blocks = build_basic_blocks(&b.build().unwrap()).unwrap();
        let header = blocks.iter().find(|b| b.start == 5).unwrap();
        assert!(header.is_loop_header);
    }

    #[test]
    fn test_complexity_weights_loops() {
        let mut flat = BytecodeBuilder::new();
        flat.push_int(1).op(Opcode::Pop);
        let mut looped = BytecodeBuilder::new();
        let top = looped.new_label();
        looped.bind(top).push_int(1).op(Opcode::Pop).jump(Opcode::Jmp, top);
        let flat = estimate_execution_complexity(&flat.build().unwrap()).unwrap();
        let looped = estimate_execution_complexity(&looped.build().unwrap()).unwrap();
        assert_eq!(flat, 2.0);
        assert_eq!(looped, 40.0);
    }

    #[test]
    fn test_hot_spots() {
        let counts = BTreeMap::from([(0, 5), (5, 1001), (10, 1000), (15, 50_000)]);
        assert_eq!(find_hot_spots(&counts, HOT_SPOT_THRESHOLD), vec![5, 15]);
    }

    #[test]
    fn test_string_and_native_extraction() {
        let mut b = BytecodeBuilder::new();
        b.push_str("hello").unwrap();
        b.call_native("Print").unwrap();
        b.halt();
        let code = b.build().unwrap();
        assert_eq!(
            extract_string_constants(&code),
            BTreeMap::from([(0, "hello".to_string())])
        );
        assert_eq!(find_native_calls(&code), BTreeMap::from([(7, "Print".to_string())]));
    }
}
