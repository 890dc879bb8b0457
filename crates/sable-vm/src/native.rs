//! Host-registered native functions

use std::sync::Arc;

use rustc_hash::FxHashMap;

/// Zero-argument host callback
pub type NativeFn = Arc<dyn Fn() + Send + Sync + 'static>;

/// Name to callback table owned by one VM
#[derive(Default, Clone)]
pub struct NativeRegistry {
    functions: FxHashMap<String, NativeFn>,
}

impl NativeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace `name`. Returns true if a previous binding was replaced.
    pub fn register(&mut self, name: impl Into<String>, callback: NativeFn) -> bool {
        self.functions.insert(name.into(), callback).is_some()
    }

    /// Remove `name`; returns whether it was present
    pub fn unregister(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    /// Drop every binding
    pub fn clear(&mut self) {
        self.functions.clear();
    }

    /// Exact-match lookup
    pub fn get(&self, name: &str) -> Option<&NativeFn> {
        self.functions.get(name)
    }

    /// Is `name` bound
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// No bindings
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Sorted binding names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRegistry")
            .field("functions", &self.names())
            .finish()
    }
}
