use mem_addresses::VirtualAddress;

/// Damage detected on a heap element.
///
/// Returned as a value by validation; any other heap operation that runs into
/// one of these treats it as fatal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeapCorruption {
    #[error("element header guard is damaged")]
    BadHeader,
    #[error("element trailer guard is damaged")]
    BadTrailer,
    #[error("element is not in use")]
    NotBusy,
    #[error("pointer does not belong to any heap")]
    Foreign,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResizeError {
    #[error("not enough room to resize in place")]
    NoRoom,
}

/// A zone that cannot back a heap.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddZoneError {
    #[error("zone base {0} is not cache-line aligned")]
    Misaligned(VirtualAddress),
    #[error("zone of {0:#x} bytes is too small to hold a heap element")]
    TooSmall(u64),
}
