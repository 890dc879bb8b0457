//! Static stack-depth analysis
//!
//! Native code keeps the operand stack on the machine stack, so every
//! instruction must see the same depth on every path that reaches it.

use std::collections::BTreeMap;

use sable_bytecode::{Instruction, Opcode};

use crate::error::JitError;

/// Stack depth on entry to each reachable instruction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepthMap {
    /// Entry depth by instruction address
    pub depths: BTreeMap<u32, u32>,
    /// Depth when control runs off the end of the code, if it can
    pub end_depth: Option<u32>,
    /// Deepest point reached
    pub max_depth: u32,
}

impl DepthMap {
    /// Entry depth at `address`; `None` if unreachable
    pub fn at(&self, address: u32) -> Option<u32> {
        self.depths.get(&address).copied()
    }
}

/// Compute entry depths over the control-flow graph.
///
/// Fails on underflow, on a merge point reached with two different depths,
/// and on jumps that do not land on an instruction or the end of the code.
pub fn analyze_stack_depths(instructions: &[Instruction], len: u32) -> Result<DepthMap, JitError> {
    let mut map = DepthMap::default();
    let mut worklist = Vec::new();

    arrive(&mut map, &mut worklist, instructions, len, 0, 0, 0)?;

    while let Some(index) = worklist.pop() {
        let instruction = &instructions[index];
        let address = instruction.address;
        let depth = map.at(address).unwrap_or_default();

        let (pops, pushes) = instruction.opcode.stack_effect();
        let after = depth
            .checked_sub(pops)
            .ok_or(JitError::StackUnderflow { address })?
            + pushes;
        map.max_depth = map.max_depth.max(after);

        if instruction.is_jump() {
            let delta = instruction.jump_delta().unwrap_or_default();
            let target = i64::from(instruction.next_address()) + i64::from(delta);
            arrive(&mut map, &mut worklist, instructions, len, address, target, after)?;
        }
        if !instruction.opcode.ends_flow() {
            let next = i64::from(instruction.next_address());
            arrive(&mut map, &mut worklist, instructions, len, address, next, after)?;
        }
    }

    Ok(map)
}

fn arrive(
    map: &mut DepthMap,
    worklist: &mut Vec<usize>,
    instructions: &[Instruction],
    len: u32,
    from: u32,
    target: i64,
    depth: u32,
) -> Result<(), JitError> {
    let invalid = JitError::InvalidJumpTarget { address: from, target };
    let address = u32::try_from(target).map_err(|_| invalid.clone())?;

    let known = if address == len {
        map.end_depth
    } else {
        let index = instructions
            .binary_search_by_key(&address, |i| i.address)
            .map_err(|_| invalid)?;
        if !map.depths.contains_key(&address) {
            worklist.push(index);
        }
        map.depths.get(&address).copied()
    };

    match known {
        Some(known) if known != depth => Err(JitError::InconsistentStack {
            address,
            expected: known,
            found: depth,
        }),
        Some(_) => Ok(()),
        None if address == len => {
            map.end_depth = Some(depth);
            Ok(())
        }
        None => {
            map.depths.insert(address, depth);
            Ok(())
        }
    }
}

/// Whether `opcode` has a direct native translation
pub fn is_natively_supported(opcode: Opcode) -> bool {
    !matches!(
        opcode,
        Opcode::CallNative | Opcode::PushStr | Opcode::LoadMem | Opcode::StoreMem
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_bytecode::{BytecodeBuilder, decode};

    fn analyze(b: BytecodeBuilder) -> Result<DepthMap, JitError> {
        let code = b.build().unwrap();
        analyze_stack_depths(&decode(&code).unwrap(), code.len() as u32)
    }

    #[test]
    fn test_straight_line() {
        let mut b = BytecodeBuilder::new();
        b.push_int(1).push_int(2).op(Opcode::Add).halt();
        let map = analyze(b).unwrap();
        assert_eq!(map.at(0), Some(0));
        assert_eq!(map.at(10), Some(2));
        assert_eq!(map.at(11), Some(1));
        assert_eq!(map.max_depth, 2);
        assert_eq!(map.end_depth, None);
    }

    #[test]
    fn test_falling_off_the_end() {
        let mut b = BytecodeBuilder::new();
        b.push_int(7);
        assert_eq!(analyze(b).unwrap().end_depth, Some(1));
    }

    #[test]
    fn test_underflow_rejected() {
        let mut b = BytecodeBuilder::new();
        b.push_int(1).op(Opcode::Add);
        assert_eq!(analyze(b), Err(JitError::StackUnderflow { address: 5 }));
    }

    #[test]
    fn test_inconsistent_merge_rejected() {
        let mut b = BytecodeBuilder::new();
        let join = b.new_label();
        b.push_int(0)
            .jump(Opcode::JmpIfZero, join)
            .push_int(9)
            .bind(join)
            .halt();
        assert!(matches!(analyze(b), Err(JitError::InconsistentStack { address: 15, .. })));
    }

    #[test]
    fn test_balanced_loop_accepted() {
        let mut b = BytecodeBuilder::new();
        let top = b.new_label();
        b.push_int(3)
            .bind(top)
            .push_int(1)
            .op(Opcode::Sub)
            .op(Opcode::Dup)
            .jump(Opcode::JmpIfNotZero, top)
            .halt();
        let map = analyze(b).unwrap();
        assert_eq!(map.at(5), Some(1));
    }

    #[test]
    fn test_jump_into_operand_rejected() {
        let mut b = BytecodeBuilder::new();
        b.push_int(1).jump_raw(Opcode::Jmp, -8);
        assert!(matches!(analyze(b), Err(JitError::InvalidJumpTarget { address: 5, target: 2 })));
    }
}
