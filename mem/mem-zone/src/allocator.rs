//! # Zone Allocator
//!
//! Carves zones out of the primary process's private, sanitized copy of the
//! segment table.
//!
//! ## Selection
//!
//! A single pass over the working copy filters segments by socket, remaining
//! length, and page size class. With a concrete length the *smallest*
//! qualifying segment wins, which keeps large segments intact for large
//! requests; with length `0` the *largest* wins and the whole remainder of it
//! becomes the zone. Ties keep the earlier segment.
//!
//! ```text
//!  segment before:  [ pad |      zone       |        remaining        ]
//!                   ^ base                  ^ base after reservation
//! ```
//!
//! The consumed prefix never returns to the segment: reservation is
//! monotonic for the lifetime of the process group.

use crate::segment::dump_segments;
use crate::{MemConfig, Segment, SegmentTable, Zone, ZoneError, ZoneFlags, ZoneName};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use log::{debug, error};
use mem_addresses::PageSizeClass;
use mem_info::SocketConstraint;
use mem_info::memory::CACHE_LINE_SIZE;
use mem_sync::SpinLock;

/// Anything that can reserve zones on behalf of a caller.
///
/// The heap layer bootstraps its backing storage through this trait so it does
/// not care whether it holds the allocator itself or a process context.
pub trait ZoneReserve {
    /// Reserve a zone and return a copy of its published descriptor.
    ///
    /// # Errors
    /// See [`ZoneAllocator::reserve_aligned`].
    fn reserve_zone(
        &self,
        name: &str,
        len: u64,
        socket: SocketConstraint,
        flags: ZoneFlags,
        align: u64,
    ) -> Result<Zone, ZoneError>;
}

/// The primary process's mutable handle on the zone layer.
pub struct ZoneAllocator {
    config: Arc<MemConfig>,
    /// Private working copy of the segment table; shrinks with every reservation.
    free_segments: SpinLock<Vec<Segment>>,
}

impl ZoneAllocator {
    /// Duplicate and sanitize `table`, and start from an empty registry.
    #[must_use]
    pub fn initialize(table: &SegmentTable) -> Self {
        let free_segments = table.sanitized_copy();
        debug!(
            "zone allocator initialized with {} segments, {} bytes usable",
            free_segments.iter().filter(|s| !s.is_empty()).count(),
            free_segments.iter().map(|s| s.len).sum::<u64>()
        );
        Self {
            config: Arc::new(MemConfig::new()),
            free_segments: SpinLock::new(free_segments),
        }
    }

    /// State published to secondary processes.
    #[must_use]
    pub const fn config(&self) -> &Arc<MemConfig> {
        &self.config
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Zone> {
        self.config.zones().lookup(name)
    }

    /// Snapshot of the working copy, as it stands after all reservations so far.
    #[must_use]
    pub fn free_segments(&self) -> Vec<Segment> {
        self.free_segments.with_lock(|s| s.clone())
    }

    /// Describe the working copy, one line per segment.
    ///
    /// # Errors
    /// Propagates errors of the sink.
    pub fn dump_free_segments<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        dump_segments(&self.free_segments(), w)
    }

    /// Reserve a cache-line aligned zone.
    ///
    /// # Errors
    /// See [`reserve_aligned`](Self::reserve_aligned).
    pub fn reserve(
        &self,
        name: &str,
        len: u64,
        socket: SocketConstraint,
        flags: ZoneFlags,
    ) -> Result<&Zone, ZoneError> {
        self.reserve_aligned(name, len, socket, flags, CACHE_LINE_SIZE)
    }

    /// Reserve a zone named `name` of at least `len` bytes whose virtual base
    /// is aligned to `align`.
    ///
    /// `len` is rounded up to the cache line; `len == 0` asks for the largest
    /// zone available. `align` below the cache line is raised to it.
    ///
    /// # Errors
    /// - [`ZoneError::InvalidArgument`]: `align` is not a power of two, both
    ///   page size flags are set, or the name is empty or too long.
    /// - [`ZoneError::CapacityExhausted`]: the registry is full.
    /// - [`ZoneError::AlreadyExists`]: `name` is already registered.
    /// - [`ZoneError::OutOfMemory`]: no segment satisfies the request.
    pub fn reserve_aligned(
        &self,
        name: &str,
        len: u64,
        socket: SocketConstraint,
        flags: ZoneFlags,
        align: u64,
    ) -> Result<&Zone, ZoneError> {
        if !align.is_power_of_two() {
            error!("invalid alignment {align} for zone <{name}>");
            return Err(ZoneError::InvalidArgument("alignment is not a power of two"));
        }
        let align = align.max(CACHE_LINE_SIZE);

        let zones = self.config.zones();
        if zones.is_full() {
            error!("no room left in the zone registry for <{name}>");
            return Err(ZoneError::CapacityExhausted);
        }

        if flags.has_conflicting_page_sizes() {
            return Err(ZoneError::InvalidArgument("both 2 MiB and 1 GiB pages requested"));
        }

        let zone_name = ZoneName::new(name)?;
        let Some(requested) = len.checked_next_multiple_of(CACHE_LINE_SIZE) else {
            error!("zone <{name}> length {len:#x} is out of range");
            return Err(ZoneError::OutOfMemory);
        };

        self.free_segments.with_lock(|segments| {
            if zones.lookup(name).is_some() {
                debug!("zone <{name}> already exists");
                return Err(ZoneError::AlreadyExists);
            }
            let zone = carve(segments, zone_name, requested, socket, flags, align)?;
            let zone = zones.publish(zone)?;
            debug!(
                "reserved zone <{name}>: {:#x} bytes at {} on socket {}",
                zone.len(),
                zone.virtual_base(),
                zone.socket_id()
            );
            Ok(zone)
        })
    }
}

impl ZoneReserve for ZoneAllocator {
    fn reserve_zone(
        &self,
        name: &str,
        len: u64,
        socket: SocketConstraint,
        flags: ZoneFlags,
        align: u64,
    ) -> Result<Zone, ZoneError> {
        self.reserve_aligned(name, len, socket, flags, align).copied()
    }
}

impl<T: ZoneReserve + ?Sized> ZoneReserve for &T {
    fn reserve_zone(
        &self,
        name: &str,
        len: u64,
        socket: SocketConstraint,
        flags: ZoneFlags,
        align: u64,
    ) -> Result<Zone, ZoneError> {
        (**self).reserve_zone(name, len, socket, flags, align)
    }
}

impl<T: ZoneReserve + ?Sized> ZoneReserve for Arc<T> {
    fn reserve_zone(
        &self,
        name: &str,
        len: u64,
        socket: SocketConstraint,
        flags: ZoneFlags,
        align: u64,
    ) -> Result<Zone, ZoneError> {
        (**self).reserve_zone(name, len, socket, flags, align)
    }
}

/// Select a segment, split the zone off its front, and shrink it.
///
/// `requested` is already a multiple of the cache line; `0` means "largest".
fn carve(
    segments: &mut [Segment],
    name: ZoneName,
    requested: u64,
    socket: SocketConstraint,
    flags: ZoneFlags,
    align: u64,
) -> Result<Zone, ZoneError> {
    // Room for any front padding, so the aligned zone is sure to fit.
    let needed = if requested == 0 {
        0
    } else {
        requested.checked_add(align).ok_or(ZoneError::OutOfMemory)?
    };

    let Some(idx) = select_segment(segments, needed, socket, flags, align) else {
        if flags.size_hint_only() && flags.has_page_size() {
            debug!("no {flags:?} segment for zone <{name}>, retrying without a page size");
            return carve(segments, name, requested, socket, ZoneFlags::new(), align);
        }
        error!("no appropriate segment found for zone <{name}> ({requested:#x} bytes)");
        return Err(ZoneError::OutOfMemory);
    };

    let seg = &mut segments[idx];
    let pad = seg.virtual_base.align_offset(align);
    let len = if requested == 0 {
        seg.len - pad
    } else {
        requested
    };

    let zone = Zone::new(
        name,
        seg.virtual_base + pad,
        seg.physical_base + pad,
        len,
        seg.socket_id,
        seg.page_size,
        flags,
    );
    seg.advance(pad + len);
    Ok(zone)
}

/// Index of the best segment for a request of `needed` bytes (`0` = largest).
fn select_segment(
    segments: &[Segment],
    needed: u64,
    socket: SocketConstraint,
    flags: ZoneFlags,
    align: u64,
) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (i, seg) in segments.iter().enumerate() {
        if seg.is_empty() || !socket.admits(seg.socket_id) {
            continue;
        }
        if needed == 0 {
            // The largest zone still has to start on an aligned address.
            if seg.virtual_base.align_offset(align) >= seg.len {
                continue;
            }
        } else if needed > seg.len {
            continue;
        }
        if flags.page_2m() && seg.page_size == PageSizeClass::Size1G {
            continue;
        }
        if flags.page_1g() && seg.page_size == PageSizeClass::Size2M {
            continue;
        }

        best = match best {
            None => Some((i, seg.len)),
            Some((_, best_len)) if needed == 0 && seg.len > best_len => Some((i, seg.len)),
            Some((_, best_len)) if needed != 0 && seg.len < best_len => Some((i, seg.len)),
            keep => keep,
        };
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mem_addresses::{PhysicalAddress, VirtualAddress};
    use mem_info::SocketId;

    fn seg(va: u64, len: u64, socket: u32, page_size: PageSizeClass) -> Segment {
        Segment {
            virtual_base: VirtualAddress::new(va),
            physical_base: PhysicalAddress::new(va + 0x1_0000_0000),
            len,
            socket_id: SocketId::new(socket),
            page_size,
        }
    }

    const ANY: SocketConstraint = SocketConstraint::Any;
    const NO_FLAGS: ZoneFlags = ZoneFlags::new();

    #[test]
    fn smallest_fit_wins() {
        let segs = [
            seg(0x10_0000, 0x8000, 0, PageSizeClass::Size4K),
            seg(0x20_0000, 0x2000, 0, PageSizeClass::Size4K),
            seg(0x30_0000, 0x4000, 0, PageSizeClass::Size4K),
        ];
        assert_eq!(select_segment(&segs, 0x1000 + 64, ANY, NO_FLAGS, 64), Some(1));
        assert_eq!(select_segment(&segs, 0x3000 + 64, ANY, NO_FLAGS, 64), Some(2));
        assert_eq!(select_segment(&segs, 0x9000, ANY, NO_FLAGS, 64), None);
    }

    #[test]
    fn largest_fit_for_zero_length_and_ties_keep_first() {
        let segs = [
            seg(0x10_0000, 0x4000, 0, PageSizeClass::Size4K),
            seg(0x20_0000, 0x8000, 0, PageSizeClass::Size4K),
            seg(0x30_0000, 0x8000, 0, PageSizeClass::Size4K),
        ];
        assert_eq!(select_segment(&segs, 0, ANY, NO_FLAGS, 64), Some(1));
        assert_eq!(select_segment(&segs, 0x1000, ANY, NO_FLAGS, 64), Some(0));
    }

    #[test]
    fn socket_and_page_size_filter() {
        let segs = [
            seg(0x10_0000, 0x8000, 0, PageSizeClass::Size1G),
            seg(0x20_0000, 0x8000, 1, PageSizeClass::Size2M),
            seg(0x30_0000, 0x8000, 1, PageSizeClass::Size4K),
        ];
        let s1 = SocketConstraint::Socket(SocketId::new(1));
        assert_eq!(select_segment(&segs, 0x100, s1, NO_FLAGS, 64), Some(1));
        let only_1g = ZoneFlags::new().with_page_1g(true);
        assert_eq!(select_segment(&segs, 0x100, s1, only_1g, 64), Some(2));
        let only_2m = ZoneFlags::new().with_page_2m(true);
        assert_eq!(select_segment(&segs, 0x100, ANY, only_2m, 64), Some(1));
    }

    #[test]
    fn carve_advances_segment_past_padding_and_zone() {
        let mut segs = [seg(0x10_0040, 0x10_0000, 0, PageSizeClass::Size2M)];
        let name = ZoneName::new("z").unwrap();
        let zone = carve(&mut segs, name, 0x1000, ANY, NO_FLAGS, 0x1000).unwrap();
        assert_eq!(zone.virtual_base().as_u64(), 0x10_1000);
        assert_eq!(zone.physical_base().as_u64(), 0x1_0010_1000);
        assert_eq!(zone.len(), 0x1000);
        assert_eq!(segs[0].virtual_base.as_u64(), 0x10_2000);
        assert_eq!(segs[0].len, 0x10_0000 - 0x1000 - (0x1000 - 0x40));
    }

    #[test]
    fn zero_length_takes_the_whole_remainder() {
        let mut segs = [seg(0x10_0000, 0x4000, 0, PageSizeClass::Size2M)];
        let zone = carve(&mut segs, ZoneName::new("all").unwrap(), 0, ANY, NO_FLAGS, 64).unwrap();
        assert_eq!(zone.len(), 0x4000);
        assert!(segs[0].is_empty());
    }
}
