//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the raw addresses carried by memory segments
//! and zones.
//!
//! ## Overview
//!
//! Every segment and every zone is described by two bases: the address the
//! process dereferences, and the physical address a device would DMA to.
//! Mixing them up is a silent, catastrophic bug, so they are distinct types
//! that are zero-cost wrappers around `u64`:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] | A raw 64-bit address, either physical or virtual. |
//! | [`VirtualAddress`] | An address in the process-group's shared mapping. |
//! | [`PhysicalAddress`] | The bus/physical address backing a virtual one. |
//!
//! Alignment is expressed at runtime, since allocator alignment comes from
//! the caller: [`MemoryAddress::align_up`], [`MemoryAddress::align_offset`],
//! and [`MemoryAddress::is_aligned`] all take a power-of-two `align`.
//!
//! ## Page Size Classes
//!
//! [`PageSizeClass`] tags the hugepage size a segment was mapped with. It is a
//! runtime value because it is discovered from the environment, not chosen
//! at compile time.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use mem_addresses::*;
//! let va = VirtualAddress::new(0x7f00_0000_1010);
//! let pa = PhysicalAddress::new(0x0000_0001_0000_0010);
//!
//! // Both share the same residue modulo a cache line.
//! assert_eq!(va.align_residue(64), pa.align_residue(64));
//!
//! // Padding needed to reach the next 64-byte boundary.
//! assert_eq!(va.align_offset(64), 0x30);
//! assert_eq!(va.align_up(64).as_u64(), 0x7f00_0000_1040);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod memory_address;
mod page_size;
mod physical_address;
mod virtual_address;

pub use memory_address::MemoryAddress;
pub use page_size::PageSizeClass;
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;
