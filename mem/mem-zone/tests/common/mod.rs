#![allow(dead_code)]

use mem_addresses::{PageSizeClass, PhysicalAddress, VirtualAddress};
use mem_info::SocketId;
use mem_zone::Segment;
use std::alloc::{Layout, alloc_zeroed, dealloc};

/// Fake bus address the backing block is "mapped" at.
pub const PHYS_BASE: u64 = 0x1_0000_0000;

/// A page-aligned block of host memory standing in for hugepage segments.
pub struct Backing {
    ptr: *mut u8,
    layout: Layout,
}

impl Backing {
    pub fn new(len: usize) -> Self {
        let layout = Layout::from_size_align(len, 4096).unwrap();
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        Self { ptr, layout }
    }

    pub fn base(&self) -> VirtualAddress {
        VirtualAddress::from_ptr(self.ptr)
    }

    /// A segment covering `[offset, offset + len)` of the block.
    pub fn segment(&self, offset: u64, len: u64, socket: u32, page_size: PageSizeClass) -> Segment {
        assert!(offset + len <= self.layout.size() as u64);
        Segment {
            virtual_base: self.base() + offset,
            physical_base: PhysicalAddress::new(PHYS_BASE + offset),
            len,
            socket_id: SocketId::new(socket),
            page_size,
        }
    }
}

impl Drop for Backing {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) };
    }
}
