//! Byte-addressed value stack
//!
//! Values are stored as raw little-endian 4-byte slots with no type tag.

use sable_bytecode::SLOT_SIZE;

/// Operand stack of 4-byte slots
#[derive(Debug, Clone)]
pub struct ValueStack {
    bytes: Vec<u8>,
    limit: usize,
}

impl ValueStack {
    /// Stack that refuses to grow past `limit` bytes
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(limit.min(4096)),
            limit,
        }
    }

    /// Push a slot; `false` when the limit would be exceeded
    #[must_use]
    pub fn push(&mut self, value: i32) -> bool {
        if self.bytes.len() + SLOT_SIZE > self.limit {
            return false;
        }
        self.bytes.extend_from_slice(&value.to_le_bytes());
        true
    }

    /// Pop a slot
    pub fn pop(&mut self) -> Option<i32> {
        let start = self.bytes.len().checked_sub(SLOT_SIZE)?;
        let value = read_slot(&self.bytes[start..]);
        self.bytes.truncate(start);
        Some(value)
    }

    /// Top slot without removing it
    pub fn peek(&self) -> Option<i32> {
        let start = self.bytes.len().checked_sub(SLOT_SIZE)?;
        Some(read_slot(&self.bytes[start..]))
    }

    /// Number of slots
    pub fn depth(&self) -> usize {
        self.bytes.len() / SLOT_SIZE
    }

    /// Bytes in use
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Slots from bottom to top
    pub fn values(&self) -> Vec<i32> {
        self.bytes.chunks_exact(SLOT_SIZE).map(read_slot).collect()
    }

    /// Empty the stack
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Change the byte limit
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }
}

fn read_slot(slot: &[u8]) -> i32 {
    let mut raw = [0u8; SLOT_SIZE];
    raw.copy_from_slice(&slot[..SLOT_SIZE]);
    i32::from_le_bytes(raw)
}
