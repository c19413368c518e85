//! # Allocator Layout and Identity
//!
//! This crate is the single source of truth for the constants that size the
//! allocator's fixed tables and govern its alignment guarantees, together with
//! the small identifier types every layer passes around.
//!
//! ## Overview
//!
//! The zone layer and the heap layer are consumed by several cooperating
//! processes that map the same memory image. All of them must agree on table
//! capacities, name lengths, and the allocation granularity, so these values
//! are compile-time constants rather than runtime configuration.
//!
//! ### Memory Layout ([`memory`])
//! * **Granularity**: [`CACHE_LINE_SIZE`](memory::CACHE_LINE_SIZE) aligns every
//!   segment start, zone start, zone length, and heap element.
//! * **Capacities**: segment table, zone registry, and per-socket heap counts.
//! * **Heap Bootstrap**: default length of the zone a heap reserves on first use.
//!
//! ### Process Identity ([`process`])
//! * [`ProcessRole`](process::ProcessRole): primary (writer) vs. secondary (reader).
//! * [`SocketId`](process::SocketId) and [`SocketConstraint`](process::SocketConstraint)
//!   for NUMA placement.
//!
//! ```text
//!  segment table ──► zone allocator ──► zone registry ──► per-socket heaps
//!   MAX_MEMSEG                           MAX_MEMZONE       MAX_NUMA_NODES
//! ```
//!
//! Layout invariants are checked with `const` assertions so an inconsistent
//! configuration fails to compile.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod process;

pub use process::{ProcessRole, SocketConstraint, SocketId};
