//! # Zone Registry
//!
//! Append-only table of published zones, shared by every process of the
//! group. Only the primary writes, and it writes each slot exactly once; a
//! slot is a [`SyncOnceCell`], so readers never take a lock and never see a
//! partially written zone.

use crate::{Zone, ZoneError};
use alloc::boxed::Box;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use log::info;
use mem_info::memory::MAX_MEMZONE;
use mem_sync::SyncOnceCell;

pub struct ZoneRegistry {
    slots: Box<[SyncOnceCell<Zone>]>,
    /// Index of the next free slot.
    next: AtomicUsize,
}

impl ZoneRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: (0..MAX_MEMZONE).map(|_| SyncOnceCell::new()).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Number of published zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.next.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Published zones in reservation order, up to the first unused slot.
    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.slots.iter().map_while(SyncOnceCell::get)
    }

    /// Find a zone by name.
    ///
    /// Linear, but there are few zones and lookups happen at start-up.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Zone> {
        self.iter().find(|z| z.name() == name)
    }

    /// Write `zone` into the next free slot.
    ///
    /// Callers must be serialized; the zone allocator holds its segment lock.
    pub(crate) fn publish(&self, zone: Zone) -> Result<&Zone, ZoneError> {
        let idx = self.next.load(Ordering::Relaxed);
        let slot = self.slots.get(idx).ok_or(ZoneError::CapacityExhausted)?;
        let published = slot.set(zone).map_err(|_| ZoneError::CapacityExhausted)?;
        self.next.store(idx + 1, Ordering::Release);
        Ok(published)
    }

    /// Describe every published zone, one line each.
    ///
    /// # Errors
    /// Propagates errors of the sink.
    pub fn dump<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        for zone in self.iter() {
            writeln!(w, "{zone}")?;
        }
        Ok(())
    }

    /// [`dump`](Self::dump) to the log at `info` level.
    pub fn log_dump(&self) {
        for zone in self.iter() {
            info!("{zone}");
        }
    }
}

impl fmt::Debug for ZoneRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
