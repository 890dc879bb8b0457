//! Arenas implemented outside the crate

#![cfg(all(target_arch = "x86_64", unix))]

use std::ptr::{NonNull, null_mut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sable_compiler::compile;
use sable_jit::{
    ExecutableMemoryArena, ExecutableRegion, JitCompiler, JitError, JitSettings, Protection,
};

/// Maps pages with its own `mmap` calls and counts them
#[derive(Debug, Default)]
struct CountingArena {
    mapped: AtomicUsize,
    protected: AtomicUsize,
}

impl ExecutableMemoryArena for CountingArena {
    fn allocate(&self, size: usize) -> Result<ExecutableRegion, JitError> {
        let ptr = unsafe {
            libc::mmap(
                null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANON | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(JitError::Allocation("mmap failed".to_string()));
        }
        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| JitError::Allocation("mmap returned null".to_string()))?;
        self.mapped.fetch_add(1, Ordering::SeqCst);
        Ok(unsafe { ExecutableRegion::from_raw_parts(ptr, size, Protection::ReadWrite) })
    }

    fn protect(&self, region: &mut ExecutableRegion, protection: Protection) -> Result<(), JitError> {
        let flags = match protection {
            Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
            Protection::ReadExecute => libc::PROT_READ | libc::PROT_EXEC,
        };
        let rc = unsafe { libc::mprotect(region.as_ptr() as *mut libc::c_void, region.len(), flags) };
        if rc != 0 {
            return Err(JitError::Protection("mprotect failed".to_string()));
        }
        unsafe { region.set_protection(protection) };
        self.protected.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_custom_arena_runs_compiled_code() {
    let arena = Arc::new(CountingArena::default());
    let jit = JitCompiler::with_arena(arena.clone());
    assert!(jit.initialize(JitSettings::default()));

    let result = jit.compile(&compile("(8 + 4) * 3").unwrap(), "custom");
    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(jit.execute(&result, null_mut(), null_mut()), 36);
    assert!(jit.verify_code_integrity(&result));

    assert_eq!(arena.mapped.load(Ordering::SeqCst), 1);
    assert_eq!(arena.protected.load(Ordering::SeqCst), 1);
    let region = result.executable_memory.as_deref().unwrap();
    assert_eq!(region.protection(), Protection::ReadExecute);
}

#[test]
fn test_region_from_raw_parts_is_writable_until_protected() {
    let arena = CountingArena::default();
    let mut region = arena.allocate(16).unwrap();
    region.write(0, &[0xC3]).unwrap();
    arena.protect(&mut region, Protection::ReadExecute).unwrap();
    assert!(matches!(region.write(0, &[0x90]), Err(JitError::Protection(_))));
    assert_eq!(region.as_slice()[0], 0xC3);
}
