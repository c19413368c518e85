//! # Malloc
//!
//! The per-process entry point for heap memory: one [`Heap`] per NUMA socket,
//! each bootstrapped on first use from a zone reserved on that socket.
//!
//! ```text
//!  allocate ──► preferred socket ──► heap[socket] ──► best-fit element
//!                                       │ (first use)
//!                                       ▼
//!                         reserve zone "MALLOC_S{socket}_HEAP"
//! ```
//!
//! Freeing, resizing and validation find the owning heap from the pointer,
//! so a block may be released from any thread.

use crate::heap::fatal;
use crate::socket::preferred_socket;
use crate::{Heap, HeapCorruption, HeapStats, ResizeError};
use alloc::format;
use core::fmt;
use core::ptr::{self, NonNull};
use log::{trace, warn};
use mem_addresses::VirtualAddress;
use mem_info::memory::{CACHE_LINE_SIZE, MALLOC_MEMZONE_SIZE, MAX_NUMA_NODES};
use mem_info::{SocketConstraint, SocketId};
use mem_zone::{Segment, Zone, ZoneFlags, ZoneReserve};

/// How heaps reserve their backing zones.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HeapConfig {
    /// Length of the zone reserved when a socket's heap is first used.
    pub zone_len: u64,
    pub zone_flags: ZoneFlags,
}

impl Default for HeapConfig {
    /// 11 MiB on 2 MiB pages, falling back to any page size.
    fn default() -> Self {
        Self {
            zone_len: MALLOC_MEMZONE_SIZE,
            zone_flags: ZoneFlags::new()
                .with_page_2m(true)
                .with_size_hint_only(true),
        }
    }
}

/// Socket-aware heap allocator on top of a zone reserver.
pub struct Malloc<Z> {
    zones: Z,
    config: HeapConfig,
    heaps: [Heap; MAX_NUMA_NODES],
}

impl<Z: ZoneReserve> Malloc<Z> {
    #[must_use]
    pub fn new(zones: Z) -> Self {
        Self::with_config(zones, HeapConfig::default())
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_config(zones: Z, config: HeapConfig) -> Self {
        Self {
            zones,
            config,
            // MAX_NUMA_NODES fits a u32
            heaps: core::array::from_fn(|i| Heap::new(SocketId::new(i as u32))),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// The heap of `socket`, whether or not it has memory yet.
    #[must_use]
    pub fn heap(&self, socket: SocketId) -> Option<&Heap> {
        self.heaps.get(socket.index()?)
    }

    /// Statistics of one socket's heap; all zero for sockets never used.
    ///
    /// # Errors
    /// Corruption found while walking the heap.
    pub fn stats(&self, socket: SocketId) -> Result<HeapStats, HeapCorruption> {
        self.heap(socket).map_or(Ok(HeapStats::default()), Heap::stats)
    }

    /// Allocate on the calling thread's preferred socket.
    ///
    /// `type_tag` is informational. Returns `None` for `size == 0`, for an
    /// alignment that is neither `0` nor a power of two, and when the heap
    /// is exhausted or cannot be bootstrapped.
    #[must_use]
    pub fn allocate(&self, type_tag: Option<&str>, size: usize, align: usize) -> Option<NonNull<u8>> {
        self.allocate_on_socket(type_tag, size, align, preferred_socket())
    }

    /// As [`allocate`](Self::allocate), from the heap of `socket`.
    #[must_use]
    pub fn allocate_on_socket(
        &self,
        type_tag: Option<&str>,
        size: usize,
        align: usize,
        socket: SocketId,
    ) -> Option<NonNull<u8>> {
        if size == 0 || !align.max(1).is_power_of_two() {
            return None;
        }
        let heap = self.backed_heap(socket)?;
        let ptr = heap.allocate(size, align);
        trace!(
            "allocate {}: {size} bytes, align {align}, socket {socket} -> {ptr:?}",
            type_tag.unwrap_or("-")
        );
        ptr
    }

    /// As [`allocate`](Self::allocate), with the first `size` bytes zeroed.
    #[must_use]
    pub fn allocate_zeroed(&self, type_tag: Option<&str>, size: usize, align: usize) -> Option<NonNull<u8>> {
        let ptr = self.allocate(type_tag, size, align)?;
        // The block holds at least `size` bytes and nobody else has it yet.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Some(ptr)
    }

    /// Zeroed storage for `count` elements of `elem_size` bytes.
    #[must_use]
    pub fn allocate_array(
        &self,
        type_tag: Option<&str>,
        count: usize,
        elem_size: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        self.allocate_zeroed(type_tag, count.checked_mul(elem_size)?, align)
    }

    /// Release a block. Null is a no-op.
    ///
    /// # Panics
    /// If `ptr` does not belong to any heap or its guards are damaged. With
    /// the `std` feature the process aborts instead.
    ///
    /// # Safety
    /// The block must not be used after this call.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        unsafe { self.owner(ptr).free(ptr) };
    }

    /// Grow or shrink a block without moving it.
    ///
    /// # Errors
    /// [`ResizeError::NoRoom`] if it cannot grow in place.
    ///
    /// # Panics
    /// As [`free`](Self::free).
    ///
    /// # Safety
    /// `ptr` must be a live block; on success only the first `new_size`
    /// bytes may be used.
    pub unsafe fn resize(&self, ptr: NonNull<u8>, new_size: usize) -> Result<(), ResizeError> {
        unsafe { self.owner(ptr.as_ptr()).resize(ptr, new_size) }
    }

    /// Resize a block, moving it if it cannot be resized in place or is not
    /// aligned to `align`.
    ///
    /// A null `ptr` allocates. When the block moves, the first
    /// `min(old usable size, size)` bytes are copied and the old block is
    /// freed. On `None` the original block is left untouched.
    ///
    /// # Panics
    /// As [`free`](Self::free).
    ///
    /// # Safety
    /// `ptr` must be null or a live block. If the result differs from `ptr`,
    /// the old block must not be used again.
    pub unsafe fn reallocate(&self, ptr: *mut u8, size: usize, align: usize) -> Option<NonNull<u8>> {
        let Some(old) = NonNull::new(ptr) else {
            return self.allocate(None, size, align);
        };
        let heap = self.owner(ptr);

        let align = align.max(1);
        if !align.is_power_of_two() {
            return None;
        }
        let rounded = (align as u64).max(CACHE_LINE_SIZE);
        if VirtualAddress::from_nonnull(old).is_aligned(rounded)
            && unsafe { heap.resize(old, size) }.is_ok()
        {
            return Some(old);
        }

        let new = self.allocate(None, size, align)?;
        let old_len = heap.validate(ptr).unwrap_or_else(|e| fatal(e, VirtualAddress::from_ptr(ptr)));
        unsafe {
            ptr::copy_nonoverlapping(ptr, new.as_ptr(), old_len.min(size));
            heap.free(ptr);
        }
        Some(new)
    }

    /// Usable size of the block at `ptr`, or the damage found.
    ///
    /// Never panics and never modifies any heap.
    ///
    /// # Errors
    /// [`HeapCorruption::Foreign`] for pointers outside every heap; otherwise
    /// the damage found on the element.
    pub fn validate(&self, ptr: *const u8) -> Result<usize, HeapCorruption> {
        self.heaps
            .iter()
            .find(|h| h.owns(ptr))
            .ok_or(HeapCorruption::Foreign)?
            .validate(ptr)
    }

    fn owner(&self, ptr: *const u8) -> &Heap {
        match self.heaps.iter().find(|h| h.owns(ptr)) {
            Some(heap) => heap,
            None => fatal(HeapCorruption::Foreign, VirtualAddress::from_ptr(ptr)),
        }
    }

    /// The heap of `socket`, bootstrapping its backing zone if needed.
    fn backed_heap(&self, socket: SocketId) -> Option<&Heap> {
        let heap = self.heap(socket)?;
        heap.bootstrap(|| self.reserve_backing(socket))
            .then_some(heap)
    }

    fn reserve_backing(&self, socket: SocketId) -> Option<Zone> {
        let name = format!("MALLOC_S{socket}_HEAP");
        self.zones
            .reserve_zone(
                &name,
                self.config.zone_len,
                SocketConstraint::Socket(socket),
                self.config.zone_flags,
                CACHE_LINE_SIZE,
            )
            .inspect_err(|e| warn!("cannot reserve <{name}> for the socket {socket} heap: {e}"))
            .ok()
    }
}

impl<Z> fmt::Debug for Malloc<Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Malloc")
            .field("config", &self.config)
            .field("heaps", &self.heaps)
            .finish_non_exhaustive()
    }
}

/// Sizes of the allocator's in-memory descriptors.
///
/// # Errors
/// Propagates errors of the sink.
pub fn dump_struct_sizes<W: fmt::Write>(w: &mut W) -> fmt::Result {
    writeln!(w, "sizeof(Segment) = {}", size_of::<Segment>())?;
    writeln!(w, "sizeof(Zone) = {}", size_of::<Zone>())?;
    writeln!(w, "sizeof(ElemHeader) = {}", size_of::<crate::elem::ElemHeader>())?;
    writeln!(w, "sizeof(Heap) = {}", size_of::<Heap>())
}
