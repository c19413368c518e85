//! # Segment Table
//!
//! Physically contiguous memory regions handed to the allocator once, at
//! start-up, by the environment's segment discovery.

use crate::SegmentTableError;
use alloc::vec::Vec;
use core::fmt;
use log::warn;
use mem_addresses::{PageSizeClass, PhysicalAddress, VirtualAddress};
use mem_info::SocketId;
use mem_info::memory::{CACHE_LINE_MASK, CACHE_LINE_SIZE, MAX_MEMSEG};

/// One physically contiguous, NUMA-tagged block of backing memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Segment {
    /// Where the process group has the segment mapped.
    pub virtual_base: VirtualAddress,
    /// Physical (bus) address of `virtual_base`.
    pub physical_base: PhysicalAddress,
    /// Length in bytes.
    pub len: u64,
    /// NUMA socket the memory is attached to.
    pub socket_id: SocketId,
    /// Page size the segment is mapped with.
    pub page_size: PageSizeClass,
}

/// What [`Segment::sanitize`] did to a segment.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Sanitized {
    /// The segment was trimmed to cache-line boundaries and is usable.
    Kept,
    /// Shorter than two cache lines; length forced to zero.
    TooSmall,
    /// Virtual and physical bases disagree modulo the cache line; length forced to zero.
    Misaligned,
}

impl Segment {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Trim the segment so base and length are multiples of [`CACHE_LINE_SIZE`].
    ///
    /// A segment whose virtual and physical bases are not congruent modulo the
    /// cache line cannot hand out zones aligned in both spaces, so it is
    /// discarded, as is a segment too short to be worth tracking.
    pub fn sanitize(&mut self) -> Sanitized {
        let phys_align = self.physical_base.align_residue(CACHE_LINE_SIZE);
        let virt_align = self.virtual_base.align_residue(CACHE_LINE_SIZE);
        if phys_align != virt_align {
            self.len = 0;
            return Sanitized::Misaligned;
        }

        // memseg is really too small, don't bother with it
        if self.len < 2 * CACHE_LINE_SIZE {
            self.len = 0;
            return Sanitized::TooSmall;
        }

        let off = (CACHE_LINE_SIZE - phys_align) & CACHE_LINE_MASK;
        self.advance(off);
        self.len &= !CACHE_LINE_MASK;
        Sanitized::Kept
    }

    /// Drop the first `bytes` of the segment.
    pub(crate) fn advance(&mut self, bytes: u64) {
        debug_assert!(bytes <= self.len);
        self.virtual_base += bytes;
        self.physical_base += bytes;
        self.len -= bytes;
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "phys:{}, len:0x{:x}, virt:{}, socket_id:{}, hugepage_sz:{}",
            self.physical_base, self.len, self.virtual_base, self.socket_id, self.page_size
        )
    }
}

/// The ordered list of segments supplied by discovery.
///
/// The table itself is never modified; the primary process works on a
/// sanitized private copy (see [`ZoneAllocator`](crate::ZoneAllocator)).
#[derive(Debug, Clone, Default)]
pub struct SegmentTable {
    segments: Vec<Segment>,
}

impl SegmentTable {
    /// Wrap the discovered segments.
    ///
    /// # Errors
    /// More than [`MAX_MEMSEG`] segments.
    ///
    /// # Safety
    /// Every segment's virtual range must be valid, writable memory that is
    /// owned by the process group, not used by anything but this allocator,
    /// and stays mapped for as long as any zone or heap derived from it.
    pub unsafe fn new(segments: Vec<Segment>) -> Result<Self, SegmentTableError> {
        if segments.len() > MAX_MEMSEG {
            return Err(SegmentTableError::TooManySegments(segments.len()));
        }
        Ok(Self { segments })
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Duplicate the table and sanitize every entry of the copy.
    pub(crate) fn sanitized_copy(&self) -> Vec<Segment> {
        let mut copy = self.segments.clone();
        for (i, seg) in copy.iter_mut().enumerate() {
            if seg.sanitize() == Sanitized::Misaligned {
                warn!("segment {i} discarded: virtual and physical bases are not congruent ({seg})");
            }
        }
        copy
    }

    /// Describe every segment, one line each.
    ///
    /// # Errors
    /// Propagates errors of the sink.
    pub fn dump<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        dump_segments(&self.segments, w)
    }
}

pub(crate) fn dump_segments<W: fmt::Write>(segments: &[Segment], w: &mut W) -> fmt::Result {
    for (i, seg) in segments.iter().enumerate() {
        writeln!(w, "Segment {i}: {seg}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(va: u64, pa: u64, len: u64) -> Segment {
        Segment {
            virtual_base: VirtualAddress::new(va),
            physical_base: PhysicalAddress::new(pa),
            len,
            socket_id: SocketId::new(0),
            page_size: PageSizeClass::Size2M,
        }
    }

    #[test]
    fn aligned_segment_is_untouched() {
        let mut s = seg(0x1000, 0x8000, 0x1000);
        assert_eq!(s.sanitize(), Sanitized::Kept);
        assert_eq!(s, seg(0x1000, 0x8000, 0x1000));
    }

    #[test]
    fn start_and_length_are_trimmed() {
        let mut s = seg(0x1010, 0x8010, 0x1000);
        assert_eq!(s.sanitize(), Sanitized::Kept);
        assert_eq!(s.virtual_base.as_u64(), 0x1040);
        assert_eq!(s.physical_base.as_u64(), 0x8040);
        // 0x1000 - 0x30 = 0xfd0, truncated to 0xfc0
        assert_eq!(s.len, 0xfc0);
    }

    #[test]
    fn tiny_segment_is_dropped() {
        let mut s = seg(0x1000, 0x8000, 2 * CACHE_LINE_SIZE - 1);
        assert_eq!(s.sanitize(), Sanitized::TooSmall);
        assert!(s.is_empty());
    }

    #[test]
    fn incongruent_bases_are_dropped() {
        let mut s = seg(0x1008, 0x8010, 0x1000);
        assert_eq!(s.sanitize(), Sanitized::Misaligned);
        assert!(s.is_empty());
    }

    #[test]
    fn table_capacity_is_enforced() {
        let too_many = vec![seg(0x1000, 0x1000, 0x1000); MAX_MEMSEG + 1];
        let err = unsafe { SegmentTable::new(too_many) }.unwrap_err();
        assert_eq!(err, SegmentTableError::TooManySegments(MAX_MEMSEG + 1));
    }

    #[test]
    fn dump_lists_every_segment() {
        let table = unsafe { SegmentTable::new(vec![seg(0x1000, 0x2000, 0x100)]) }.unwrap();
        let mut out = String::new();
        table.dump(&mut out).unwrap();
        assert_eq!(
            out,
            "Segment 0: phys:0x0000000000002000, len:0x100, virt:0x0000000000001000, socket_id:0, hugepage_sz:2M\n"
        );
    }
}
