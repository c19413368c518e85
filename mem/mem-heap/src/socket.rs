//! # Preferred Socket
//!
//! Allocations that do not name a socket are served from the calling
//! thread's preferred socket. Threads start on socket 0.

use mem_info::SocketId;

#[cfg(feature = "std")]
std::thread_local! {
    static PREFERRED: core::cell::Cell<SocketId> = const { core::cell::Cell::new(SocketId::new(0)) };
}

/// Socket the calling thread allocates from by default.
#[cfg(feature = "std")]
#[must_use]
pub fn preferred_socket() -> SocketId {
    PREFERRED.with(core::cell::Cell::get)
}

/// Pin the calling thread's default allocations to `socket`.
#[cfg(feature = "std")]
pub fn set_preferred_socket(socket: SocketId) {
    PREFERRED.with(|s| s.set(socket));
}

/// Without thread-local storage every thread allocates from socket 0.
#[cfg(not(feature = "std"))]
#[must_use]
pub const fn preferred_socket() -> SocketId {
    SocketId::new(0)
}
