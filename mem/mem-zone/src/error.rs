use mem_info::memory::MAX_MEMSEG;

/// Failure of a zone-layer operation. None of these change allocator state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ZoneError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("operation not permitted in a secondary process")]
    NotPermitted,
    #[error("a zone with this name already exists")]
    AlreadyExists,
    #[error("no free slot left in the zone registry")]
    CapacityExhausted,
    #[error("no memory segment satisfies the request")]
    OutOfMemory,
}

/// Rejected segment discovery input.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SegmentTableError {
    #[error("{0} segments supplied, at most {max} are supported", max = MAX_MEMSEG)]
    TooManySegments(usize),
}
