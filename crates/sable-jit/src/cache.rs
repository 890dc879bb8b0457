//! Named code cache with a byte budget

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::compiler::JitCompilationResult;

/// Compiled functions by name.
///
/// The summed `code_size` of all entries never exceeds the budget after an
/// insert, except when a single entry is larger than the whole budget. An
/// insert that would overflow clears the cache first.
#[derive(Debug)]
pub struct CodeCache {
    entries: BTreeMap<String, JitCompilationResult>,
    total_bytes: usize,
    max_bytes: usize,
}

impl CodeCache {
    /// Empty cache holding at most `max_bytes` of native code
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            total_bytes: 0,
            max_bytes,
        }
    }

    /// Byte budget
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Change the budget; clears the cache if it no longer fits
    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        self.max_bytes = max_bytes;
        if self.total_bytes > max_bytes {
            warn!(total = self.total_bytes, max_bytes, "code cache over new budget, clearing");
            self.clear();
        }
    }

    /// Store `result` under `name`, replacing any previous entry
    pub fn insert(&mut self, name: impl Into<String>, result: JitCompilationResult) {
        let name = name.into();
        if let Some(previous) = self.entries.remove(&name) {
            self.total_bytes -= previous.code_size;
        }

        let size = result.code_size;
        if self.total_bytes + size > self.max_bytes {
            warn!(
                total = self.total_bytes,
                incoming = size,
                max_bytes = self.max_bytes,
                "code cache full, clearing"
            );
            self.clear();
        }
        if size > self.max_bytes {
            warn!(name = %name, size, max_bytes = self.max_bytes, "entry larger than the whole code cache");
        }

        self.total_bytes += size;
        debug!(name = %name, size, total = self.total_bytes, "cached compiled code");
        self.entries.insert(name, result);
    }

    /// Entry for `name`
    pub fn get(&self, name: &str) -> Option<&JitCompilationResult> {
        self.entries.get(name)
    }

    /// Remove and return the entry for `name`
    pub fn remove(&mut self, name: &str) -> Option<JitCompilationResult> {
        let removed = self.entries.remove(name)?;
        self.total_bytes -= removed.code_size;
        Some(removed)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!(entries = self.entries.len(), "code cache cleared");
        }
        self.entries.clear();
        self.total_bytes = 0;
    }

    /// Summed code size of all entries
    pub fn size_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}
