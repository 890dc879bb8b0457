//! Tokenizer for infix expressions

use crate::error::{CompileError, CompileResult};
use sable_bytecode::Opcode;

/// Binary arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div | Self::Mod => 2,
        }
    }

    /// Source symbol
    pub const fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
            Self::Mod => '%',
        }
    }

    /// Opcode emitted for this operator
    pub const fn opcode(self) -> Opcode {
        match self {
            Self::Add => Opcode::Add,
            Self::Sub => Opcode::Sub,
            Self::Mul => Opcode::Mul,
            Self::Div => Opcode::Div,
            Self::Mod => Opcode::Mod,
        }
    }

    fn from_char(ch: char) -> Option<Self> {
        match ch {
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            '%' => Some(Self::Mod),
            _ => None,
        }
    }
}

/// Token kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Integer literal
    Number(i32),
    /// Arithmetic operator
    Op(BinaryOp),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// Identifier (only meaningful in the call form)
    Ident(String),
}

/// Token with its 1-based source column, counted in characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What was read
    pub kind: TokenKind,
    /// Column of the first character
    pub column: usize,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TokenKind::Number(n) => write!(f, "{n}"),
            TokenKind::Op(op) => write!(f, "{}", op.symbol()),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::Ident(name) => f.write_str(name),
        }
    }
}

/// Split an expression into tokens
pub fn tokenize(source: &str) -> CompileResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().enumerate().peekable();

    while let Some((idx, ch)) = chars.next() {
        let column = idx + 1;
        if ch.is_whitespace() {
            continue;
        }

        let kind = if ch.is_ascii_digit() {
            let mut literal = String::from(ch);
            while let Some(&(_, next)) = chars.peek() {
                if !next.is_ascii_digit() {
                    break;
                }
                literal.push(next);
                chars.next();
            }
            let value = literal
                .parse::<i32>()
                .map_err(|_| CompileError::IntegerOverflow { literal, column })?;
            TokenKind::Number(value)
        } else if ch.is_ascii_alphabetic() || ch == '_' {
            let mut name = String::from(ch);
            while let Some(&(_, next)) = chars.peek() {
                if !(next.is_ascii_alphanumeric() || next == '_') {
                    break;
                }
                name.push(next);
                chars.next();
            }
            TokenKind::Ident(name)
        } else if let Some(op) = BinaryOp::from_char(ch) {
            TokenKind::Op(op)
        } else if ch == '(' {
            TokenKind::LParen
        } else if ch == ')' {
            TokenKind::RParen
        } else {
            return Err(CompileError::UnknownToken { ch, column });
        };

        tokens.push(Token { kind, column });
    }

    Ok(tokens)
}
