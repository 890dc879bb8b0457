//! Shunting-yard conversion from infix tokens to postfix order

use crate::error::{CompileError, CompileResult};
use crate::lexer::{BinaryOp, Token, TokenKind};

/// One step of a postfix (RPN) program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Postfix {
    /// Push a literal
    Push(i32),
    /// Apply an operator to the two topmost values
    Apply {
        /// Operator
        op: BinaryOp,
        /// Source column of the operator
        column: usize,
    },
}

enum Pending {
    Op(BinaryOp, usize),
    Open(usize),
}

/// Reorder tokens into postfix, honoring precedence and parentheses.
///
/// All operators are left-associative. The result is checked so every
/// operator has two operands and exactly one value remains.
pub fn to_postfix(tokens: &[Token]) -> CompileResult<Vec<Postfix>> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Pending> = Vec::new();

    for token in tokens {
        match &token.kind {
            TokenKind::Number(value) => output.push(Postfix::Push(*value)),
            TokenKind::Op(op) => {
                while let Some(Pending::Op(top, column)) = stack.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    output.push(Postfix::Apply {
                        op: *top,
                        column: *column,
                    });
                    stack.pop();
                }
                stack.push(Pending::Op(*op, token.column));
            }
            TokenKind::LParen => stack.push(Pending::Open(token.column)),
            TokenKind::RParen => loop {
                match stack.pop() {
                    Some(Pending::Op(op, column)) => output.push(Postfix::Apply { op, column }),
                    Some(Pending::Open(_)) => break,
                    None => return Err(CompileError::UnmatchedClose(token.column)),
                }
            },
            TokenKind::Ident(name) => {
                return Err(CompileError::syntax(
                    format!("unexpected identifier '{name}' (native calls take the form name())"),
                    token.column,
                ));
            }
        }
    }

    while let Some(pending) = stack.pop() {
        match pending {
            Pending::Op(op, column) => output.push(Postfix::Apply { op, column }),
            Pending::Open(column) => return Err(CompileError::UnclosedOpen(column)),
        }
    }

    check_arity(&output, tokens)?;
    Ok(output)
}

fn check_arity(program: &[Postfix], tokens: &[Token]) -> CompileResult<()> {
    let mut depth = 0usize;
    for step in program {
        match step {
            Postfix::Push(_) => depth += 1,
            Postfix::Apply { op, column } => {
                if depth < 2 {
                    return Err(CompileError::MissingOperand {
                        op: op.symbol(),
                        column: *column,
                    });
                }
                depth -= 1;
            }
        }
    }
    match depth {
        0 => Err(CompileError::Empty),
        1 => Ok(()),
        _ => {
            // Two values with nothing combining them, e.g. "1 2" or "(1)(2)".
            let column = adjacent_operand_column(tokens).unwrap_or(1);
            Err(CompileError::syntax("missing operator between operands", column))
        }
    }
}

fn adjacent_operand_column(tokens: &[Token]) -> Option<usize> {
    tokens.windows(2).find_map(|pair| {
        let ends_operand = matches!(pair[0].kind, TokenKind::Number(_) | TokenKind::RParen);
        let starts_operand = matches!(pair[1].kind, TokenKind::Number(_) | TokenKind::LParen);
        (ends_operand && starts_operand).then_some(pair[1].column)
    })
}
