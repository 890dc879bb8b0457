//! Executable memory
//!
//! Regions are mapped read-write, filled, then flipped to read-execute. A
//! region is never writable and executable at the same time.

use std::ptr::NonNull;

use crate::error::JitError;

/// Page protection of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// Writable, not executable
    ReadWrite,
    /// Executable, not writable
    ReadExecute,
}

/// Owned mapping released exactly once on drop
#[derive(Debug)]
pub struct ExecutableRegion {
    ptr: NonNull<u8>,
    len: usize,
    protection: Protection,
}

// SAFETY: the region is uniquely owned and only mutated through `&mut self`
// while read-write; once read-execute it is immutable.
unsafe impl Send for ExecutableRegion {}
unsafe impl Sync for ExecutableRegion {}

impl ExecutableRegion {
    /// Take ownership of an existing mapping, for arenas that map memory
    /// themselves.
    ///
    /// # Safety
    ///
    /// `ptr` must be the start of a live mapping of `len` bytes obtained from
    /// `mmap` (`VirtualAlloc` on Windows) that nothing else will unmap, and
    /// `protection` must be its current page protection. The mapping is
    /// released with `munmap` (`VirtualFree`) when the region is dropped.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize, protection: Protection) -> Self {
        Self { ptr, len, protection }
    }

    /// Record a protection change made outside [`SystemArena`].
    ///
    /// # Safety
    ///
    /// The pages must already have `protection`; `write` and native execution
    /// trust this value.
    pub unsafe fn set_protection(&mut self, protection: Protection) {
        self.protection = protection;
    }

    /// Mapped length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty (never true for a live mapping)
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current protection
    pub fn protection(&self) -> Protection {
        self.protection
    }

    /// Start of the mapping
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Region contents; readable under either protection
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is a live mapping of `len` readable bytes owned by self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Copy `bytes` in at `offset`. Only allowed while read-write.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), JitError> {
        if self.protection != Protection::ReadWrite {
            return Err(JitError::Protection("region is not writable".to_string()));
        }
        let in_bounds = offset
            .checked_add(bytes.len())
            .is_some_and(|end| end <= self.len);
        if !in_bounds {
            return Err(JitError::Protection(format!(
                "write of {} bytes at {offset} overruns region",
                bytes.len()
            )));
        }
        // SAFETY: bounds checked above and the mapping is writable.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(offset), bytes.len());
        }
        Ok(())
    }
}

impl Drop for ExecutableRegion {
    fn drop(&mut self) {
        sys::unmap(self.ptr, self.len);
    }
}

/// Source of executable memory
pub trait ExecutableMemoryArena: Send + Sync + std::fmt::Debug {
    /// Map `size` bytes read-write
    fn allocate(&self, size: usize) -> Result<ExecutableRegion, JitError>;

    /// Change the protection of `region`
    fn protect(&self, region: &mut ExecutableRegion, protection: Protection) -> Result<(), JitError>;
}

/// Arena backed by the operating system's virtual memory calls
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemArena;

impl ExecutableMemoryArena for SystemArena {
    fn allocate(&self, size: usize) -> Result<ExecutableRegion, JitError> {
        if size == 0 {
            return Err(JitError::Allocation("cannot map an empty region".to_string()));
        }
        let ptr = sys::map(size)?;
        Ok(ExecutableRegion {
            ptr,
            len: size,
            protection: Protection::ReadWrite,
        })
    }

    fn protect(&self, region: &mut ExecutableRegion, protection: Protection) -> Result<(), JitError> {
        sys::protect(region.ptr, region.len, protection)?;
        region.protection = protection;
        Ok(())
    }
}

/// Map a region, copy `code` into it and make it executable
pub fn load_code(arena: &dyn ExecutableMemoryArena, code: &[u8]) -> Result<ExecutableRegion, JitError> {
    let mut region = arena.allocate(code.len())?;
    region.write(0, code)?;
    arena.protect(&mut region, Protection::ReadExecute)?;
    Ok(region)
}

#[cfg(unix)]
mod sys {
    use std::io;
    use std::ptr::NonNull;

    use super::Protection;
    use crate::error::JitError;

    pub(super) fn map(len: usize) -> Result<NonNull<u8>, JitError> {
        // SAFETY: anonymous private mapping with no address hint.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANON | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(JitError::Allocation(format!("mmap failed: {}", io::Error::last_os_error())));
        }
        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| JitError::Allocation("mmap returned null".to_string()))
    }

    pub(super) fn protect(ptr: NonNull<u8>, len: usize, protection: Protection) -> Result<(), JitError> {
        let flags = match protection {
            Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
            Protection::ReadExecute => libc::PROT_READ | libc::PROT_EXEC,
        };
        // SAFETY: `ptr`/`len` describe a mapping created by `map`.
        let rc = unsafe { libc::mprotect(ptr.as_ptr().cast(), len, flags) };
        if rc != 0 {
            return Err(JitError::Protection(format!("mprotect failed: {}", io::Error::last_os_error())));
        }
        Ok(())
    }

    pub(super) fn unmap(ptr: NonNull<u8>, len: usize) {
        // SAFETY: called once from `Drop` for a mapping created by `map`.
        let rc = unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
        if rc != 0 {
            tracing::warn!(error = %io::Error::last_os_error(), "munmap failed");
        }
    }
}

#[cfg(windows)]
mod sys {
    use std::io;
    use std::ptr::NonNull;

    use windows_sys::Win32::System::Memory::{
        MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READ, PAGE_READWRITE, VirtualAlloc,
        VirtualFree, VirtualProtect,
    };

    use super::Protection;
    use crate::error::JitError;

    pub(super) fn map(len: usize) -> Result<NonNull<u8>, JitError> {
        // SAFETY: fresh reservation with no address hint.
        let ptr = unsafe { VirtualAlloc(std::ptr::null(), len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };
        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| {
            JitError::Allocation(format!("VirtualAlloc failed: {}", io::Error::last_os_error()))
        })
    }

    pub(super) fn protect(ptr: NonNull<u8>, len: usize, protection: Protection) -> Result<(), JitError> {
        let flags = match protection {
            Protection::ReadWrite => PAGE_READWRITE,
            Protection::ReadExecute => PAGE_EXECUTE_READ,
        };
        let mut previous = 0;
        // SAFETY: `ptr`/`len` describe an allocation created by `map`.
        let ok = unsafe { VirtualProtect(ptr.as_ptr().cast(), len, flags, &mut previous) };
        if ok == 0 {
            return Err(JitError::Protection(format!("VirtualProtect failed: {}", io::Error::last_os_error())));
        }
        Ok(())
    }

    pub(super) fn unmap(ptr: NonNull<u8>, _len: usize) {
        // SAFETY: called once from `Drop` for an allocation created by `map`.
        let ok = unsafe { VirtualFree(ptr.as_ptr().cast(), 0, MEM_RELEASE) };
        if ok == 0 {
            tracing::warn!(error = %io::Error::last_os_error(), "VirtualFree failed");
        }
    }
}

#[cfg(not(any(unix, windows)))]
mod sys {
    use std::ptr::NonNull;

    use super::Protection;
    use crate::error::JitError;

    pub(super) fn map(_len: usize) -> Result<NonNull<u8>, JitError> {
        Err(JitError::Allocation("unsupported platform".to_string()))
    }

    pub(super) fn protect(_ptr: NonNull<u8>, _len: usize, _protection: Protection) -> Result<(), JitError> {
        Err(JitError::Protection("unsupported platform".to_string()))
    }

    pub(super) fn unmap(_ptr: NonNull<u8>, _len: usize) {}
}
