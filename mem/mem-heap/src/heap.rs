//! # Heap
//!
//! A best-fit, split-and-coalesce allocator over one or more zones of a
//! single socket.
//!
//! Every zone added to the heap becomes an *extent*: a run of elements that
//! tiles the zone exactly and ends in an END sentinel. Free elements are kept
//! in an index ordered by `(size, address)`, so the first entry at or above
//! the requested size that also fits the alignment is the best fit, and ties
//! go to the lowest address.
//!
//! # Invariants
//! - No two FREE elements are adjacent; freeing always coalesces.
//! - The free index holds exactly the FREE elements of all extents.
//! - Header and trailer guards of every FREE and BUSY element are intact.
//! - All element state is mutated under the heap lock.

use crate::elem::{
    ELEM_OVERHEAD, Elem, ElemInfo, ElemState, HEADER_LEN, MIN_DATA_LEN, MIN_ELEM_LEN,
};
use crate::{AddZoneError, HeapCorruption, HeapStats, ResizeError};
use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::ptr::NonNull;
use log::{error, trace, warn};
use mem_addresses::VirtualAddress;
use mem_info::SocketId;
use mem_info::memory::CACHE_LINE_SIZE;
use mem_sync::SpinLock;
use mem_zone::Zone;

/// One zone's worth of heap memory.
#[derive(Debug, Copy, Clone)]
struct Extent {
    start: VirtualAddress,
    /// One past the END sentinel.
    end: VirtualAddress,
}

impl Extent {
    fn contains(&self, addr: VirtualAddress) -> bool {
        self.start <= addr && addr < self.end
    }
}

struct HeapInner {
    socket: SocketId,
    extents: Vec<Extent>,
    /// `(size, element)` of every FREE element.
    free: BTreeSet<(u64, Elem)>,
}

/// The heap of one NUMA socket.
pub struct Heap {
    socket: SocketId,
    inner: SpinLock<HeapInner>,
}

impl Heap {
    /// An empty heap; it cannot allocate until a zone is added.
    #[must_use]
    pub const fn new(socket: SocketId) -> Self {
        Self {
            socket,
            inner: SpinLock::new(HeapInner {
                socket,
                extents: Vec::new(),
                free: BTreeSet::new(),
            }),
        }
    }

    #[must_use]
    pub const fn socket_id(&self) -> SocketId {
        self.socket
    }

    /// Whether the heap has any backing memory.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.with_lock(|h| !h.extents.is_empty())
    }

    /// Turn `zone` into one FREE element plus END sentinel and start
    /// allocating from it.
    ///
    /// # Errors
    /// The zone is misaligned or too small to hold an element.
    ///
    /// # Safety
    /// The zone's memory must be valid, writable, used by nothing else, and
    /// must outlive the heap. A zone may be added at most once.
    pub unsafe fn add_zone(&self, zone: &Zone) -> Result<(), AddZoneError> {
        self.inner.with_lock(|h| unsafe { h.add_zone(zone) })
    }

    /// Run `reserve` and add the zone it returns, unless the heap already has
    /// memory. Returns whether the heap has memory afterwards.
    pub(crate) fn bootstrap(&self, reserve: impl FnOnce() -> Option<Zone>) -> bool {
        self.inner.with_lock(|h| {
            if !h.extents.is_empty() {
                return true;
            }
            let Some(zone) = reserve() else {
                return false;
            };
            // Freshly reserved zones are exclusively ours for good.
            match unsafe { h.add_zone(&zone) } {
                Ok(()) => true,
                Err(e) => {
                    warn!("zone <{}> cannot back the heap of socket {}: {e}", zone.name(), self.socket);
                    false
                }
            }
        })
    }

    /// Allocate `size` bytes aligned to `align`.
    ///
    /// Size and alignment are rounded up to the cache line; an alignment of
    /// `0` means "no requirement". Returns `None` when no free element fits or
    /// the alignment is not a power of two.
    ///
    /// # Panics
    /// If the chosen free element or its neighbour is damaged, as
    /// [`free`](Self::free).
    #[must_use]
    pub fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let align = align.max(1);
        if !align.is_power_of_two() {
            return None;
        }
        let align = (align as u64).max(CACHE_LINE_SIZE);
        let size = (size as u64)
            .checked_next_multiple_of(CACHE_LINE_SIZE)?
            .max(MIN_DATA_LEN);
        match self.inner.with_lock(|h| unsafe { h.allocate(size, align) }) {
            Ok(data) => NonNull::new(data?.as_ptr()),
            Err((e, at)) => fatal(e, at),
        }
    }

    /// Return a block to the heap. Null is a no-op.
    ///
    /// # Panics
    /// If `ptr` was not handed out by this heap, or the guards of the block
    /// or of a neighbour it would merge with are damaged. A double free is
    /// caught here as well. With the `std` feature the process aborts instead.
    ///
    /// # Safety
    /// The block must not be used after this call.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let data = VirtualAddress::from_ptr(ptr);
        let result = self.inner.with_lock(|h| unsafe { h.free(data) });
        if let Err(e) = result {
            fatal(e, data);
        }
    }

    /// Grow or shrink a block in place.
    ///
    /// # Errors
    /// [`ResizeError::NoRoom`] if the block cannot grow without moving.
    ///
    /// # Panics
    /// On corruption, as [`free`](Self::free).
    ///
    /// # Safety
    /// `ptr` must be a live block of this heap; on success only the first
    /// `new_size` bytes may be used.
    pub unsafe fn resize(&self, ptr: NonNull<u8>, new_size: usize) -> Result<(), ResizeError> {
        let data = VirtualAddress::from_nonnull(ptr);
        let Some(new_size) = (new_size as u64)
            .checked_next_multiple_of(CACHE_LINE_SIZE)
            .map(|s| s.max(MIN_DATA_LEN))
        else {
            return Err(ResizeError::NoRoom);
        };
        match self.inner.with_lock(|h| unsafe { h.resize(data, new_size) }) {
            Ok(resized) => resized,
            Err(e) => fatal(e, data),
        }
    }

    /// Usable size of the block at `ptr`, or what is wrong with it.
    ///
    /// Never modifies the heap, and only reads memory inside the heap's extents.
    ///
    /// # Errors
    /// The corruption found; [`HeapCorruption::Foreign`] for pointers outside
    /// every extent of this heap.
    pub fn validate(&self, ptr: *const u8) -> Result<usize, HeapCorruption> {
        let data = VirtualAddress::from_ptr(ptr);
        let (_, info) = self.inner.with_lock(|h| unsafe { h.locate_busy(data) })?;
        usize::try_from(info.usable()).map_err(|_| HeapCorruption::BadHeader)
    }

    /// Whether `ptr` points into one of this heap's extents.
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        let data = VirtualAddress::from_ptr(ptr);
        self.inner.with_lock(|h| h.extent_of(data).is_some())
    }

    /// Walk every element of every extent, checking guards along the way.
    ///
    /// # Errors
    /// The first corruption found.
    pub fn stats(&self) -> Result<HeapStats, HeapCorruption> {
        self.inner.with_lock(|h| unsafe { h.stats() })
    }
}

impl core::fmt::Debug for Heap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Heap")
            .field("socket", &self.socket)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

/// Report corruption found at `data` and stop.
///
/// With `std` the process aborts. Without `std`, and in this crate's unit
/// tests, it panics.
pub fn fatal(e: HeapCorruption, data: VirtualAddress) -> ! {
    error!("heap corruption at {data}: {e}");
    #[cfg(all(feature = "std", not(test)))]
    std::process::abort();
    #[cfg(any(not(feature = "std"), test))]
    panic!("heap corruption at {data}: {e}");
}

impl HeapInner {
    fn extent_of(&self, addr: VirtualAddress) -> Option<Extent> {
        self.extents.iter().copied().find(|x| x.contains(addr))
    }

    /// # Safety
    /// See [`Heap::add_zone`].
    unsafe fn add_zone(&mut self, zone: &Zone) -> Result<(), AddZoneError> {
        unsafe { self.add_extent(zone.virtual_base(), zone.len()) }
    }

    /// # Safety
    /// As for [`Heap::add_zone`], for the range `[start, start + len)`.
    unsafe fn add_extent(&mut self, start: VirtualAddress, len: u64) -> Result<(), AddZoneError> {
        if !start.is_aligned(CACHE_LINE_SIZE) {
            return Err(AddZoneError::Misaligned(start));
        }
        let len = len & !(CACHE_LINE_SIZE - 1);
        if len < MIN_ELEM_LEN + HEADER_LEN {
            return Err(AddZoneError::TooSmall(len));
        }

        let first = Elem::at(start);
        let size = len - HEADER_LEN;
        let end = first.next(size);
        unsafe {
            first.store(&ElemInfo::new(ElemState::Free, size, 0, self.socket));
            end.store(&ElemInfo::new(ElemState::End, HEADER_LEN, size, self.socket));
        }
        self.extents.push(Extent {
            start,
            end: end.next(HEADER_LEN).addr(),
        });
        self.free.insert((size, first));
        trace!("socket {} heap: added extent {start} of {len:#x} bytes", self.socket);
        Ok(())
    }

    fn load(&self, elem: Elem) -> Result<ElemInfo, HeapCorruption> {
        let extent = self.extent_of(elem.addr()).ok_or(HeapCorruption::Foreign)?;
        if !elem.addr().is_aligned(CACHE_LINE_SIZE) {
            return Err(HeapCorruption::BadHeader);
        }
        // In bounds and cache-line aligned, so a full header is readable.
        unsafe { elem.load(extent.end) }
    }

    /// Find the BUSY element owning the data pointer `data`.
    ///
    /// # Safety
    /// Heap lock held.
    unsafe fn locate_busy(&self, data: VirtualAddress) -> Result<(Elem, ElemInfo), HeapCorruption> {
        let Some(header) = data.as_u64().checked_sub(HEADER_LEN) else {
            return Err(HeapCorruption::Foreign);
        };
        let mut elem = Elem::at(VirtualAddress::new(header));
        let mut info = self.load(elem)?;
        if info.state == ElemState::Pad {
            let pad = info.size;
            elem = elem.prev(pad);
            info = self.load(elem)?;
            if info.pad != pad {
                return Err(HeapCorruption::BadHeader);
            }
        }
        match info.state {
            ElemState::Busy => Ok((elem, info)),
            ElemState::Free => Err(HeapCorruption::NotBusy),
            ElemState::Pad | ElemState::End => Err(HeapCorruption::BadHeader),
        }
    }

    /// `Ok(None)` when nothing fits; the error is corruption and where it was
    /// found.
    ///
    /// # Safety
    /// Heap lock held; `size` and `align` are multiples of the cache line.
    unsafe fn allocate(
        &mut self,
        size: u64,
        align: u64,
    ) -> Result<Option<VirtualAddress>, (HeapCorruption, VirtualAddress)> {
        let Some(wanted) = size.checked_add(ELEM_OVERHEAD) else {
            return Ok(None);
        };
        let Some((elem, free_size, gap)) = self
            .free
            .range((wanted, Elem::at(VirtualAddress::new(0)))..)
            .find_map(|&(free_size, elem)| {
                let data = elem.data(0).align_up(align);
                let gap = data - elem.data(0);
                let needed = gap.checked_add(wanted)?;
                (needed <= free_size).then_some((elem, free_size, gap))
            })
        else {
            return Ok(None);
        };
        let mut info = self.load(elem).map_err(|e| (e, elem.addr()))?;
        if info.state != ElemState::Free || info.size != free_size {
            return Err((HeapCorruption::BadHeader, elem.addr()));
        }
        let after = elem.next(free_size);
        self.load(after).map_err(|e| (e, after.addr()))?;
        self.free.remove(&(free_size, elem));

        let (elem, mut info) = if gap >= MIN_ELEM_LEN {
            // Gap is big enough to be an element of its own.
            info.size = gap;
            unsafe { elem.store(&info) };
            self.free.insert((gap, elem));
            let busy = elem.next(gap);
            trace!("split {gap:#x} bytes off the front of {:?}", elem.addr());
            (busy, ElemInfo::new(ElemState::Busy, free_size - gap, gap, self.socket))
        } else {
            info.state = ElemState::Busy;
            info.pad = gap;
            (elem, info)
        };

        let used = info.pad + wanted;
        if info.size - used >= MIN_ELEM_LEN {
            unsafe { self.split_tail(elem, &mut info, used) }.map_err(|e| (e, elem.addr()))?;
        } else {
            unsafe {
                elem.store(&info);
                elem.next(info.size).set_prev_len(info.size);
            }
        }

        if info.pad > 0 {
            let marker = Elem::at(elem.data(info.pad) - HEADER_LEN);
            unsafe { marker.store(&ElemInfo::new(ElemState::Pad, info.pad, 0, self.socket)) };
        }
        Ok(Some(elem.data(info.pad)))
    }

    /// Shrink the element at `elem` to `keep` bytes and release the rest as
    /// FREE, merging it with a FREE successor.
    ///
    /// # Safety
    /// Heap lock held; `info` describes `elem` and `info.size - keep` is at
    /// least a minimum element.
    unsafe fn split_tail(
        &mut self,
        elem: Elem,
        info: &mut ElemInfo,
        keep: u64,
    ) -> Result<(), HeapCorruption> {
        let tail = elem.next(keep);
        let mut tail_info = ElemInfo::new(ElemState::Free, info.size - keep, keep, self.socket);
        unsafe {
            self.absorb_next_free(tail, &mut tail_info)?;
            info.size = keep;
            elem.store(info);
            tail.store(&tail_info);
        }
        self.free.insert((tail_info.size, tail));
        trace!("split {:#x} bytes off the end of {:?}", tail_info.size, elem.addr());
        Ok(())
    }

    /// If the element after `elem` is FREE, take it out of the free index and
    /// fold it into `info`. Either way, fix the back link of whatever follows.
    ///
    /// Nothing is written when the element after `elem`, or the one after a
    /// merged neighbour, is damaged.
    ///
    /// # Safety
    /// Heap lock held; `info` describes `elem` (not yet stored).
    unsafe fn absorb_next_free(&mut self, elem: Elem, info: &mut ElemInfo) -> Result<(), HeapCorruption> {
        let next = elem.next(info.size);
        let next_info = self.load(next)?;
        let size = if next_info.state == ElemState::Free {
            let size = info.size + next_info.size;
            self.load(elem.next(size))?;
            self.free.remove(&(next_info.size, next));
            unsafe { next.scrub() };
            trace!("merged {:?} into {:?}", next.addr(), elem.addr());
            size
        } else {
            info.size
        };
        info.size = size;
        unsafe { elem.next(size).set_prev_len(size) };
        Ok(())
    }

    /// # Safety
    /// Heap lock held.
    unsafe fn free(&mut self, data: VirtualAddress) -> Result<(), HeapCorruption> {
        let (mut elem, mut info) = unsafe { self.locate_busy(data)? };
        let prev = (info.prev_len != 0)
            .then(|| {
                let prev = elem.prev(info.prev_len);
                self.load(prev).map(|prev_info| (prev, prev_info))
            })
            .transpose()?;

        unsafe { self.absorb_next_free(elem, &mut info)? };
        if info.pad > 0 {
            unsafe { Elem::at(data - HEADER_LEN).scrub() };
        }
        info.state = ElemState::Free;
        info.pad = 0;

        if let Some((prev, prev_info)) = prev
            && prev_info.state == ElemState::Free
        {
            self.free.remove(&(prev_info.size, prev));
            unsafe { elem.scrub() };
            trace!("merged {:?} into {:?}", elem.addr(), prev.addr());
            info = ElemInfo {
                size: prev_info.size + info.size,
                ..prev_info
            };
            elem = prev;
            unsafe { elem.next(info.size).set_prev_len(info.size) };
        }

        unsafe { elem.store(&info) };
        self.free.insert((info.size, elem));
        Ok(())
    }

    /// `Ok(Err(NoRoom))` is the ordinary failure; the outer error is corruption.
    ///
    /// # Safety
    /// Heap lock held; `new_size` is a multiple of the cache line.
    unsafe fn resize(
        &mut self,
        data: VirtualAddress,
        new_size: u64,
    ) -> Result<Result<(), ResizeError>, HeapCorruption> {
        let (elem, mut info) = unsafe { self.locate_busy(data)? };
        let Some(needed) = new_size.checked_add(info.pad + ELEM_OVERHEAD) else {
            return Ok(Err(ResizeError::NoRoom));
        };

        if needed > info.size {
            let next = elem.next(info.size);
            let next_info = self.load(next)?;
            if next_info.state != ElemState::Free || info.size + next_info.size < needed {
                return Ok(Err(ResizeError::NoRoom));
            }
            self.load(next.next(next_info.size))?;
            self.free.remove(&(next_info.size, next));
            unsafe { next.scrub() };
            info.size += next_info.size;
            unsafe { elem.next(info.size).set_prev_len(info.size) };
            trace!("grew {:?} into {:?}", elem.addr(), next.addr());
        }

        if info.size - needed >= MIN_ELEM_LEN {
            unsafe { self.split_tail(elem, &mut info, needed)? };
        } else {
            unsafe { elem.store(&info) };
        }
        Ok(Ok(()))
    }

    /// # Safety
    /// Heap lock held.
    unsafe fn stats(&self) -> Result<HeapStats, HeapCorruption> {
        let mut stats = HeapStats::default();
        for extent in &self.extents {
            stats.extent_bytes += extent.end - extent.start;
            let mut elem = Elem::at(extent.start);
            loop {
                let info = unsafe { elem.load(extent.end)? };
                match info.state {
                    ElemState::Free => {
                        stats.free_bytes += info.size;
                        stats.free_elements += 1;
                        stats.largest_free = stats.largest_free.max(info.size);
                    }
                    ElemState::Busy => {
                        stats.busy_bytes += info.size;
                        stats.busy_elements += 1;
                    }
                    ElemState::End => {
                        stats.overhead_bytes += HEADER_LEN;
                        break;
                    }
                    ElemState::Pad => return Err(HeapCorruption::BadHeader),
                }
                elem = elem.next(info.size);
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elem::TRAILER_LEN;

    #[repr(C, align(4096))]
    struct Page([u8; 4096]);

    /// A heap over a single raw block; the block must outlive the heap.
    fn heap_over(mem: &mut [Page]) -> Heap {
        let heap = Heap::new(SocketId::new(0));
        let start = VirtualAddress::from_ptr(mem.as_mut_ptr());
        let len = (mem.len() * 4096) as u64;
        heap.inner
            .with_lock(|h| unsafe { h.add_extent(start, len) })
            .unwrap();
        heap
    }

    fn pages(n: usize) -> Vec<Page> {
        (0..n).map(|_| Page([0; 4096])).collect()
    }

    fn conserved(heap: &Heap) -> HeapStats {
        let s = heap.stats().unwrap();
        assert_eq!(s.free_bytes + s.busy_bytes + s.overhead_bytes, s.extent_bytes);
        s
    }

    #[test]
    fn small_allocation_splits_off_the_tail() {
        let mut mem = pages(1);
        let heap = heap_over(&mut mem);
        let p = heap.allocate(100, 64).unwrap();
        assert_eq!(heap.validate(p.as_ptr()), Ok(128));
        let s = conserved(&heap);
        assert_eq!(s.busy_elements, 1);
        assert_eq!(s.busy_bytes, 128 + ELEM_OVERHEAD);
        assert_eq!(s.free_elements, 1);
        assert_eq!(s.free_bytes, 4096 - HEADER_LEN - 128 - ELEM_OVERHEAD);
    }

    #[test]
    fn leftover_below_minimum_stays_in_the_element() {
        let mut mem = pages(1);
        let heap = heap_over(&mut mem);
        // 4032-byte element; 3776 data + 128 overhead leaves 128 < MIN_ELEM_LEN.
        let p = heap.allocate(3776, 64).unwrap();
        assert_eq!(heap.validate(p.as_ptr()), Ok(3776 + 128));
        assert_eq!(conserved(&heap).free_elements, 0);
    }

    #[test]
    fn best_fit_prefers_smallest_then_lowest() {
        let mut mem = pages(4);
        let heap = heap_over(&mut mem);
        let a = heap.allocate(1024, 64).unwrap();
        let _sep1 = heap.allocate(64, 64).unwrap();
        let b = heap.allocate(256, 64).unwrap();
        let _sep2 = heap.allocate(64, 64).unwrap();
        unsafe {
            heap.free(a.as_ptr());
            heap.free(b.as_ptr());
        }
        // Fits both holes; the smaller one wins.
        let c = heap.allocate(200, 64).unwrap();
        assert_eq!(c, b);
    }

    #[test]
    fn small_gap_becomes_padding() {
        let mut mem = pages(2);
        let heap = heap_over(&mut mem);
        let p = heap.allocate(64, 128).unwrap();
        assert!(VirtualAddress::from_nonnull(p).is_aligned(128));
        // Extent is page aligned, so the first data byte needed 64 bytes of pad.
        assert_eq!(heap.validate(p.as_ptr()), Ok(64));
        conserved(&heap);
        unsafe { heap.free(p.as_ptr()) };
        let s = conserved(&heap);
        assert_eq!(s.free_elements, 1);
        assert_eq!(s.busy_elements, 0);
    }

    #[test]
    fn large_gap_is_split_off_as_free() {
        let mut mem = pages(4);
        let heap = heap_over(&mut mem);
        let p = heap.allocate(64, 4096).unwrap();
        assert!(VirtualAddress::from_nonnull(p).is_aligned(4096));
        let s = conserved(&heap);
        assert_eq!(s.free_elements, 2);
        assert_eq!(heap.validate(p.as_ptr()), Ok(64));
        unsafe { heap.free(p.as_ptr()) };
        assert_eq!(conserved(&heap).free_elements, 1);
    }

    #[test]
    fn resize_grows_into_free_neighbour_and_shrinks() {
        let mut mem = pages(2);
        let heap = heap_over(&mut mem);
        let p = heap.allocate(64, 64).unwrap();
        unsafe {
            heap.resize(p, 1000).unwrap();
            assert_eq!(heap.validate(p.as_ptr()), Ok(1024));
            heap.resize(p, 64).unwrap();
        }
        assert_eq!(heap.validate(p.as_ptr()), Ok(64));
        let s = conserved(&heap);
        assert_eq!(s.free_elements, 1);
        assert_eq!(s.busy_bytes, 64 + ELEM_OVERHEAD);
    }

    #[test]
    fn resize_fails_when_blocked() {
        let mut mem = pages(1);
        let heap = heap_over(&mut mem);
        let p = heap.allocate(64, 64).unwrap();
        let _q = heap.allocate(64, 64).unwrap();
        assert_eq!(unsafe { heap.resize(p, 128) }, Err(ResizeError::NoRoom));
        assert_eq!(heap.validate(p.as_ptr()), Ok(64));
    }

    #[test]
    fn foreign_pointers_are_reported() {
        let mut mem = pages(1);
        let heap = heap_over(&mut mem);
        let outside = [0u8; 64];
        assert_eq!(heap.validate(outside.as_ptr()), Err(HeapCorruption::Foreign));
        assert!(!heap.owns(outside.as_ptr()));
    }

    /// Overwrite the guard word of the header at `at`.
    fn smash(at: *mut u8) {
        unsafe { at.write_bytes(0xaa, 8) };
    }

    #[test]
    #[should_panic(expected = "heap corruption")]
    fn double_free_is_fatal() {
        let mut mem = pages(2);
        let heap = heap_over(&mut mem);
        let p = heap.allocate(128, 64).unwrap();
        let _q = heap.allocate(128, 64).unwrap();
        unsafe {
            heap.free(p.as_ptr());
            heap.free(p.as_ptr());
        }
    }

    #[test]
    #[should_panic(expected = "heap corruption")]
    fn freeing_a_foreign_pointer_is_fatal() {
        let mut mem = pages(1);
        let heap = heap_over(&mut mem);
        let mut outside = [0u8; 256];
        unsafe { heap.free(outside.as_mut_ptr().add(128)) };
    }

    #[test]
    #[should_panic(expected = "heap corruption")]
    fn overrun_into_the_trailer_is_fatal_on_free() {
        let mut mem = pages(1);
        let heap = heap_over(&mut mem);
        let p = heap.allocate(64, 64).unwrap();
        unsafe {
            p.as_ptr().write_bytes(0xff, 72);
            heap.free(p.as_ptr());
        }
    }

    #[test]
    #[should_panic(expected = "heap corruption")]
    fn damaged_next_header_is_fatal_on_free() {
        let mut mem = pages(1);
        let heap = heap_over(&mut mem);
        let a = heap.allocate(64, 64).unwrap();
        let b = heap.allocate(64, 64).unwrap();
        smash(unsafe { b.as_ptr().sub(HEADER_LEN as usize) });
        assert_eq!(heap.validate(b.as_ptr()), Err(HeapCorruption::BadHeader));
        unsafe { heap.free(a.as_ptr()) };
    }

    #[test]
    fn damaged_next_header_is_left_untouched() {
        let mut mem = pages(1);
        let heap = heap_over(&mut mem);
        let a = heap.allocate(64, 64).unwrap();
        let b = heap.allocate(64, 64).unwrap();
        let header = unsafe { b.as_ptr().sub(HEADER_LEN as usize) };
        smash(header);
        let before: Vec<u8> = (0..64).map(|i| unsafe { header.add(i).read() }).collect();

        let data = VirtualAddress::from_nonnull(a);
        let r = heap.inner.with_lock(|h| unsafe { h.free(data) });
        assert_eq!(r, Err(HeapCorruption::BadHeader));
        assert!((0..64).all(|i| unsafe { header.add(i).read() } == before[i]));
        // The freed block is still BUSY: nothing was committed.
        assert_eq!(heap.validate(a.as_ptr()), Ok(64));
    }

    #[test]
    #[should_panic(expected = "heap corruption")]
    fn damaged_free_element_is_fatal_on_allocate() {
        let mut mem = pages(1);
        let heap = heap_over(&mut mem);
        let p = heap.allocate(64, 64).unwrap();
        // The FREE tail starts right after p's trailer.
        smash(unsafe { p.as_ptr().add((64 + TRAILER_LEN) as usize) });
        assert!(matches!(heap.stats(), Err(HeapCorruption::BadHeader)));
        let _ = heap.allocate(64, 64);
    }

    #[test]
    #[should_panic(expected = "heap corruption")]
    fn damaged_neighbour_is_fatal_on_shrink() {
        let mut mem = pages(1);
        let heap = heap_over(&mut mem);
        let p = heap.allocate(1024, 64).unwrap();
        let q = heap.allocate(64, 64).unwrap();
        smash(unsafe { q.as_ptr().sub(HEADER_LEN as usize) });
        let _ = unsafe { heap.resize(p, 64) };
    }

    #[test]
    fn tiny_extent_is_rejected() {
        let mut mem = pages(1);
        let heap = Heap::new(SocketId::new(0));
        let start = VirtualAddress::from_ptr(mem.as_mut_ptr());
        let r = heap.inner.with_lock(|h| unsafe { h.add_extent(start, MIN_ELEM_LEN) });
        assert_eq!(r, Err(AddZoneError::TooSmall(MIN_ELEM_LEN)));
        let r = heap.inner.with_lock(|h| unsafe { h.add_extent(start + 8, 4000) });
        assert_eq!(r, Err(AddZoneError::Misaligned(start + 8)));
        assert!(!heap.is_initialized());
    }
}
