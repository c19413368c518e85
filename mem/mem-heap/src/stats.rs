use core::fmt;

/// Snapshot of a heap's elements, taken by walking every extent.
///
/// `free_bytes + busy_bytes + overhead_bytes == extent_bytes` always holds
/// for an intact heap.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct HeapStats {
    /// Total bytes of all zones backing the heap.
    pub extent_bytes: u64,
    /// Bytes in FREE elements, headers and trailers included.
    pub free_bytes: u64,
    /// Bytes in BUSY elements, headers, trailers and padding included.
    pub busy_bytes: u64,
    pub free_elements: usize,
    pub busy_elements: usize,
    /// Size of the largest FREE element.
    pub largest_free: u64,
    /// Bytes taken by extent END sentinels.
    pub overhead_bytes: u64,
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "heap_size:0x{:x}, free:0x{:x} in {} elements (largest 0x{:x}), busy:0x{:x} in {} elements",
            self.extent_bytes,
            self.free_bytes,
            self.free_elements,
            self.largest_free,
            self.busy_bytes,
            self.busy_elements
        )
    }
}
