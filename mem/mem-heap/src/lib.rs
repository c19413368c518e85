//! # NUMA-Aware Heap Allocation
//!
//! This crate provides general-purpose, variable-size allocation on top of the
//! zones of [`mem_zone`]. Each NUMA socket gets its own heap, which carves a
//! zone into elements that are split on allocation and coalesced on release.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Malloc                          │
//! │    • allocate / zeroed / array / reallocate         │
//! │    • Thread's preferred socket                      │
//! │    • Owner lookup for free / resize / validate      │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ one per socket
//! ┌─────────────────▼───────────────────────────────────┐
//! │                      Heap                           │
//! │    • Best-fit free index                            │
//! │    • Split on allocate, coalesce on free            │
//! │    • In-place resize                                │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ lazily, on first use
//! ┌─────────────────▼───────────────────────────────────┐
//! │                Zone reservation                     │
//! │    • "MALLOC_S{socket}_HEAP" via ZoneReserve        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Element Layout
//!
//! Element headers live in-band, in the cache line right before the data, and
//! every element ends in a trailer. Both carry a guard word, so overruns into
//! a neighbour, double frees, and frees of foreign pointers are detected.
//!
//! ```text
//! extent: [ FREE / BUSY elements ... ][ END ]
//! ```
//!
//! ## Failure Model
//!
//! * Running out of memory returns `None`.
//! * Damaged guards found while allocating, freeing, resizing, or
//!   reallocating are fatal: the allocator logs the damage and aborts the
//!   process. Without the `std` feature it panics instead.
//! * [`Malloc::validate`] reports the same damage as a [`HeapCorruption`]
//!   value instead.
//!
//! ## Usage
//!
//! ```rust
//! use mem_addresses::{PageSizeClass, PhysicalAddress, VirtualAddress};
//! use mem_heap::Malloc;
//! use mem_info::SocketId;
//! use mem_zone::{MemContext, Segment, SegmentTable};
//!
//! let mut backing = vec![0u64; 4 * 1024 * 1024];
//! let va = VirtualAddress::from_ptr(backing.as_mut_ptr());
//! let seg = Segment {
//!     virtual_base: va,
//!     physical_base: PhysicalAddress::new(0x4000_0000 + va.align_residue(64)),
//!     len: 32 * 1024 * 1024,
//!     socket_id: SocketId::new(0),
//!     page_size: PageSizeClass::Size2M,
//! };
//! let table = unsafe { SegmentTable::new(vec![seg]) }.unwrap();
//! let ctx = MemContext::primary(&table);
//! let malloc = Malloc::new(&ctx);
//!
//! let p = malloc.allocate(Some("example"), 100, 64).unwrap();
//! assert!(malloc.validate(p.as_ptr()).unwrap() >= 100);
//! unsafe { malloc.free(p.as_ptr()) };
//! assert!(ctx.lookup("MALLOC_S0_HEAP").is_some());
//! ```

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]

extern crate alloc;

mod elem;
mod error;
mod heap;
pub mod malloc;
pub mod socket;
mod stats;

pub use elem::{ELEM_OVERHEAD, HEADER_LEN, MIN_ELEM_LEN, TRAILER_LEN};
pub use error::{AddZoneError, HeapCorruption, ResizeError};
pub use heap::Heap;
pub use malloc::{HeapConfig, Malloc, dump_struct_sizes};
pub use socket::preferred_socket;
#[cfg(feature = "std")]
pub use socket::set_preferred_socket;
pub use stats::HeapStats;
