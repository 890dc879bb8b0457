//! Integer semantics shared by the interpreter and the constant folder

use crate::opcode::Opcode;

/// Evaluate a binary opcode on two 32-bit integers.
///
/// Arithmetic wraps on overflow. Logical operators and comparisons yield 0 or 1.
/// Returns `None` for a zero divisor and for opcodes that are not binary.
pub fn eval_binary(opcode: Opcode, lhs: i32, rhs: i32) -> Option<i32> {
    let value = match opcode {
        Opcode::Add => lhs.wrapping_add(rhs),
        Opcode::Sub => lhs.wrapping_sub(rhs),
        Opcode::Mul => lhs.wrapping_mul(rhs),
        Opcode::Div => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_div(rhs)
        }
        Opcode::Mod => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_rem(rhs)
        }
        Opcode::And => i32::from(lhs != 0 && rhs != 0),
        Opcode::Or => i32::from(lhs != 0 || rhs != 0),
        Opcode::CmpEq => i32::from(lhs == rhs),
        Opcode::CmpGt => i32::from(lhs > rhs),
        _ => return None,
    };
    Some(value)
}

/// Evaluate a unary opcode (`NOT`)
pub fn eval_unary(opcode: Opcode, value: i32) -> Option<i32> {
    match opcode {
        Opcode::Not => Some(i32::from(value == 0)),
        _ => None,
    }
}
