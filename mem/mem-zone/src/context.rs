//! # Process Context
//!
//! Every process of the group shares one [`MemConfig`]. Only the primary
//! process owns a [`ZoneAllocator`]; the role is fixed when the context is
//! built, so a secondary simply has nothing to reserve with.

use crate::{SegmentTable, Zone, ZoneAllocator, ZoneError, ZoneFlags, ZoneRegistry, ZoneReserve};
use alloc::sync::Arc;
use core::fmt;
use log::error;
use mem_info::{ProcessRole, SocketConstraint};

/// State published by the primary process and read by everybody.
#[derive(Debug)]
pub struct MemConfig {
    zones: ZoneRegistry,
}

impl MemConfig {
    pub(crate) fn new() -> Self {
        Self {
            zones: ZoneRegistry::new(),
        }
    }

    #[must_use]
    pub const fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Zone> {
        self.zones.lookup(name)
    }
}

enum Role {
    Primary(ZoneAllocator),
    Secondary(Arc<MemConfig>),
}

/// The zone layer as seen by one process.
pub struct MemContext {
    role: Role,
}

impl MemContext {
    /// Initialize the zone layer from the discovered segments.
    ///
    /// Building a fresh context starts again from an empty registry.
    #[must_use]
    pub fn primary(table: &SegmentTable) -> Self {
        Self {
            role: Role::Primary(ZoneAllocator::initialize(table)),
        }
    }

    /// Attach to the state published by a primary process.
    #[must_use]
    pub const fn secondary(config: Arc<MemConfig>) -> Self {
        Self {
            role: Role::Secondary(config),
        }
    }

    #[must_use]
    pub const fn role(&self) -> ProcessRole {
        match self.role {
            Role::Primary(_) => ProcessRole::Primary,
            Role::Secondary(_) => ProcessRole::Secondary,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Arc<MemConfig> {
        match &self.role {
            Role::Primary(alloc) => alloc.config(),
            Role::Secondary(config) => config,
        }
    }

    /// The zone allocator, if this is the primary process.
    ///
    /// # Errors
    /// [`ZoneError::NotPermitted`] in a secondary process.
    pub fn zone_allocator(&self) -> Result<&ZoneAllocator, ZoneError> {
        match &self.role {
            Role::Primary(alloc) => Ok(alloc),
            Role::Secondary(_) => {
                error!("zones can only be reserved by the primary process");
                Err(ZoneError::NotPermitted)
            }
        }
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Zone> {
        self.config().lookup(name)
    }

    /// Describe every published zone.
    ///
    /// # Errors
    /// Propagates errors of the sink.
    pub fn dump<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        self.config().zones().dump(w)
    }
}

impl ZoneReserve for MemContext {
    fn reserve_zone(
        &self,
        name: &str,
        len: u64,
        socket: SocketConstraint,
        flags: ZoneFlags,
        align: u64,
    ) -> Result<Zone, ZoneError> {
        self.zone_allocator()?
            .reserve_zone(name, len, socket, flags, align)
    }
}

impl fmt::Debug for MemContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemContext")
            .field("role", &self.role())
            .field("zones", &self.config().zones().len())
            .finish()
    }
}
