//! # Allocator synchronization primitives
//!
//! * [`SpinLock`] serializes mutation of a heap's free list and of the
//!   primary process's segment working copy.
//! * [`SyncOnceCell`] publishes a value exactly once; zone registry slots are
//!   built from it so lookups never observe a half-written zone.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod sync_once_cell;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
