//! # Memory Layout

/// Minimum allocation granularity for segments, zones and heap elements.
///
/// Every zone starts on, and every zone length is a multiple of, this size.
pub const CACHE_LINE_SIZE: u64 = 64;

/// Mask of the in-line offset bits of [`CACHE_LINE_SIZE`].
pub const CACHE_LINE_MASK: u64 = CACHE_LINE_SIZE - 1;

/// Maximum number of physical memory segments accepted from discovery.
pub const MAX_MEMSEG: usize = 256;

/// Number of slots in the zone registry.
pub const MAX_MEMZONE: usize = 512;

/// Size of a zone name buffer, including the terminating byte.
///
/// Names may therefore hold at most `MEMZONE_NAMESIZE - 1` bytes.
pub const MEMZONE_NAMESIZE: usize = 32;

/// Number of NUMA sockets a process group may span; one heap per socket.
pub const MAX_NUMA_NODES: usize = 8;

/// Default length of the zone reserved when a socket's heap is bootstrapped.
pub const MALLOC_MEMZONE_SIZE: u64 = 11 * 1024 * 1024; // 11 MiB

const _: () = {
    assert!(CACHE_LINE_SIZE.is_power_of_two());
    assert!(MALLOC_MEMZONE_SIZE.is_multiple_of(CACHE_LINE_SIZE));
    assert!(MEMZONE_NAMESIZE > 1);
    assert!(MAX_NUMA_NODES > 0 && MAX_NUMA_NODES <= u32::MAX as usize);
};
