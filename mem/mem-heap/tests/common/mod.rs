#![allow(dead_code)]

use mem_addresses::{PageSizeClass, PhysicalAddress, VirtualAddress};
use mem_info::SocketId;
use mem_zone::{MemContext, Segment, SegmentTable};
use std::alloc::{Layout, alloc_zeroed, dealloc};

pub const MIB: u64 = 1024 * 1024;

/// Host memory posing as one hugepage segment per socket, plus the primary
/// context built over it.
pub struct Fixture {
    pub ctx: MemContext,
    ptr: *mut u8,
    layout: Layout,
}

impl Fixture {
    /// `per_socket` bytes on each of `sockets` sockets.
    pub fn new(sockets: u32, per_socket: u64) -> Self {
        let total = per_socket * u64::from(sockets);
        let layout = Layout::from_size_align(total as usize, 2 * MIB as usize).unwrap();
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        let base = VirtualAddress::from_ptr(ptr);

        let segments = (0..sockets)
            .map(|s| {
                let off = u64::from(s) * per_socket;
                Segment {
                    virtual_base: base + off,
                    physical_base: PhysicalAddress::new(0x2_0000_0000 + off),
                    len: per_socket,
                    socket_id: SocketId::new(s),
                    page_size: PageSizeClass::Size2M,
                }
            })
            .collect();
        let table = unsafe { SegmentTable::new(segments) }.unwrap();
        Self {
            ctx: MemContext::primary(&table),
            ptr,
            layout,
        }
    }

    /// A 16 MiB single-socket fixture, enough for one default heap.
    pub fn single() -> Self {
        Self::new(1, 16 * MIB)
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) };
    }
}

pub fn fill(ptr: *mut u8, len: usize, seed: u8) {
    for i in 0..len {
        unsafe { ptr.add(i).write(seed.wrapping_add(i as u8)) };
    }
}

pub fn check(ptr: *const u8, len: usize, seed: u8) -> bool {
    (0..len).all(|i| unsafe { ptr.add(i).read() } == seed.wrapping_add(i as u8))
}
