//! # Segment and Zone Management
//!
//! This crate turns the physically contiguous memory segments discovered at
//! start-up into named, fixed-address *zones*. Zones are the unit of sharing
//! between the cooperating processes of a process group: once reserved, a
//! zone never moves, never shrinks, and is never released.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Process Context                     │
//! │    • Primary / secondary role                       │
//! │    • Secondary processes cannot reserve             │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                 Zone Allocator                      │
//! │    • Sanitized private copy of the segment table    │
//! │    • Best-fit segment selection                     │
//! │    • Alignment and page size constraints            │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                 Zone Registry                       │
//! │    • Fixed capacity, append-only                    │
//! │    • Lock-free lookup by name                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Segments ([`segment`])
//! * [`Segment`]: one NUMA-tagged block with its virtual and physical base.
//! * [`SegmentTable`]: the discovered segments, at most
//!   [`MAX_MEMSEG`](mem_info::memory::MAX_MEMSEG) of them.
//!
//! ### Zones ([`zone`], [`registry`])
//! * [`Zone`]: an immutable descriptor (name, addresses, length, socket, page size).
//! * [`ZoneRegistry`]: every zone reserved so far, in reservation order.
//!
//! ### Reservation ([`allocator`], [`context`])
//! * [`ZoneAllocator`]: the primary process's reservation engine.
//! * [`MemContext`]: the per-process view, carrying the role.
//! * [`ZoneReserve`]: the seam the heap layer reserves its backing zones through.
//!
//! ## Usage
//!
//! ```rust
//! use mem_addresses::{PageSizeClass, PhysicalAddress, VirtualAddress};
//! use mem_info::{SocketConstraint, SocketId};
//! use mem_zone::{MemContext, Segment, SegmentTable, ZoneFlags};
//!
//! let mut backing = vec![0u64; 0x1000];
//! let va = VirtualAddress::from_ptr(backing.as_mut_ptr());
//! let seg = Segment {
//!     virtual_base: va,
//!     physical_base: PhysicalAddress::new(0x4000_0000 + va.align_residue(64)),
//!     len: 0x8000,
//!     socket_id: SocketId::new(0),
//!     page_size: PageSizeClass::Size2M,
//! };
//! let table = unsafe { SegmentTable::new(vec![seg]) }.unwrap();
//! let ctx = MemContext::primary(&table);
//!
//! let zones = ctx.zone_allocator().unwrap();
//! let zone = zones
//!     .reserve("pool_a", 1000, SocketConstraint::Any, ZoneFlags::new())
//!     .unwrap();
//! assert_eq!(zone.len(), 1024);
//! assert!(zone.virtual_base().is_aligned(64));
//! assert!(ctx.lookup("pool_a").is_some());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod allocator;
pub mod context;
mod error;
mod flags;
pub mod registry;
pub mod segment;
pub mod zone;

pub use allocator::{ZoneAllocator, ZoneReserve};
pub use context::{MemConfig, MemContext};
pub use error::{SegmentTableError, ZoneError};
pub use flags::ZoneFlags;
pub use registry::ZoneRegistry;
pub use segment::{Sanitized, Segment, SegmentTable};
pub use zone::{Zone, ZoneName};
