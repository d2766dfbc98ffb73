//! Raw native allocation tracking
//!
//! `MemoryManager` is an explicit arena for raw buffers handed to native
//! code: every allocation is recorded, every release goes through the
//! table, and teardown frees whatever is still tracked. Freeing a
//! pointer the table does not know is an error, not a no-op; an
//! untracked pointer is never forwarded to the allocator.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Alignment for all tracked buffers; enough for any primitive the
/// bridge marshals.
const BUFFER_ALIGN: usize = 16;

/// Allocation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryError {
    /// Pointer not currently tracked (never allocated, or already freed)
    #[error("double free or foreign pointer: 0x{addr:x}")]
    DoubleFree { addr: usize },
    /// The allocator returned null
    #[error("allocation of {size} bytes failed")]
    AllocationFailed { size: usize },
}

/// Tracks raw allocations handed across the bridge.
///
/// One instance owns its records exclusively; dropping the manager
/// releases everything still tracked and logs a leak warning naming the
/// outstanding count.
///
/// # Example
///
/// ```
/// use charon_bridge::ffi::MemoryManager;
///
/// let memory = MemoryManager::new();
/// let ptr = memory.allocate(16).unwrap();
/// memory.free(ptr).unwrap();
/// assert!(memory.free(ptr).is_err());
/// ```
#[derive(Default)]
pub struct MemoryManager {
    /// Live allocations: address -> layout
    allocations: Mutex<HashMap<usize, Layout>>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self {
            allocations: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate `size` zeroed bytes and track the record.
    ///
    /// Zero-size requests round up to one byte so a successful result is
    /// never null.
    pub fn allocate(&self, size: usize) -> Result<*mut u8, MemoryError> {
        let layout = Layout::from_size_align(size.max(1), BUFFER_ALIGN)
            .map_err(|_| MemoryError::AllocationFailed { size })?;

        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(MemoryError::AllocationFailed { size });
        }

        self.lock().insert(ptr as usize, layout);
        Ok(ptr)
    }

    /// Release one tracked allocation.
    ///
    /// An untracked or already-freed pointer is reported as
    /// `MemoryError::DoubleFree`; the pointer is not passed to the
    /// allocator on that path.
    pub fn free(&self, ptr: *mut u8) -> Result<(), MemoryError> {
        let addr = ptr as usize;
        let layout = self
            .lock()
            .remove(&addr)
            .ok_or(MemoryError::DoubleFree { addr })?;

        unsafe { dealloc(ptr, layout) };
        Ok(())
    }

    /// Release every tracked allocation and empty the table.
    ///
    /// Idempotent: with nothing tracked this is a no-op.
    pub fn release_all(&self) {
        let drained: Vec<(usize, Layout)> = self.lock().drain().collect();
        for (addr, layout) in drained {
            unsafe { dealloc(addr as *mut u8, layout) };
        }
    }

    /// Number of live tracked allocations.
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    /// Total bytes currently tracked.
    pub fn tracked_bytes(&self) -> usize {
        self.lock().values().map(|layout| layout.size()).sum()
    }

    /// True when a pointer is currently tracked.
    pub fn is_tracked(&self, ptr: *mut u8) -> bool {
        self.lock().contains_key(&(ptr as usize))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<usize, Layout>> {
        self.allocations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        let outstanding = self.tracked();
        if outstanding > 0 {
            // Non-fatal: the records are reclaimed here, but the embedder
            // should have released them at a boundary it controls.
            log::warn!(
                "memory manager dropped with {} live allocation(s); releasing",
                outstanding
            );
        }
        self.release_all();
    }
}
