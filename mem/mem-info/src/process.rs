//! # Process Roles and NUMA Sockets

use crate::memory::MAX_NUMA_NODES;
use core::fmt;

/// Role of a process within the process group sharing the allocator state.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ProcessRole {
    /// The single writer: initializes the segment table and reserves zones.
    Primary,
    /// A read-only participant that only looks up zones published by the primary.
    Secondary,
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Secondary => f.write_str("secondary"),
        }
    }
}

/// NUMA socket identifier.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SocketId(u32);

impl SocketId {
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Index into per-socket tables, or `None` if the socket exceeds [`MAX_NUMA_NODES`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        let idx = self.0 as usize;
        if idx < MAX_NUMA_NODES { Some(idx) } else { None }
    }
}

impl fmt::Debug for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Socket({})", self.0)
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SocketId {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

/// Socket requirement of a zone reservation.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum SocketConstraint {
    /// Any socket will do.
    #[default]
    Any,
    /// Memory must come from this socket.
    Socket(SocketId),
}

impl SocketConstraint {
    /// Whether memory on `socket` satisfies this constraint.
    #[inline]
    #[must_use]
    pub fn admits(self, socket: SocketId) -> bool {
        match self {
            Self::Any => true,
            Self::Socket(s) => s == socket,
        }
    }
}

impl From<SocketId> for SocketConstraint {
    fn from(value: SocketId) -> Self {
        Self::Socket(value)
    }
}
