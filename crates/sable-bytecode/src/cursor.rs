//! Bounds-checked reader over a bytecode buffer

use crate::error::{BytecodeError, Result};

/// Read position into an immutable byte slice.
///
/// Every read checks the remaining length first, so truncated or hostile
/// bytecode yields an error instead of reading out of bounds.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Cursor at offset 0
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Cursor at an arbitrary offset (may equal the length)
    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    /// Current offset
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to an absolute offset
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.bytes.len() {
            return Err(BytecodeError::UnexpectedEnd);
        }
        self.pos = pos;
        Ok(())
    }

    /// Bytes left to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    /// True once every byte has been consumed
    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.bytes.get(self.pos).ok_or(BytecodeError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Read a little-endian u32
    pub fn read_u32_le(&mut self) -> Result<u32> {
        let end = self.pos.checked_add(4).ok_or(BytecodeError::UnexpectedEnd)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(BytecodeError::UnexpectedEnd)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(slice);
        self.pos = end;
        Ok(u32::from_le_bytes(raw))
    }

    /// Read a little-endian i32
    pub fn read_i32_le(&mut self) -> Result<i32> {
        self.read_u32_le().map(|v| v as i32)
    }

    /// Read a NUL-terminated UTF-8 string and skip the terminator
    pub fn read_cstr(&mut self) -> Result<&'a str> {
        let start = self.pos;
        let rest = self.bytes.get(start..).unwrap_or(&[]);
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(BytecodeError::UnterminatedString(start))?;
        let text = std::str::from_utf8(&rest[..len]).map_err(|_| BytecodeError::InvalidUtf8(start))?;
        self.pos = start + len + 1;
        Ok(text)
    }
}
