//! # Zones
//!
//! A zone is a named, immutable sub-range of one segment. Once published in
//! the [`ZoneRegistry`](crate::ZoneRegistry) its fields never change.

use crate::{ZoneError, ZoneFlags};
use core::fmt;
use mem_addresses::{PageSizeClass, PhysicalAddress, VirtualAddress};
use mem_info::SocketId;
use mem_info::memory::MEMZONE_NAMESIZE;

/// Bounded, inline zone name (at most `MEMZONE_NAMESIZE - 1` bytes).
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ZoneName {
    bytes: [u8; MEMZONE_NAMESIZE],
    len: u8,
}

impl ZoneName {
    /// Longest accepted name, in bytes.
    pub const MAX_LEN: usize = MEMZONE_NAMESIZE - 1;

    /// # Errors
    /// The name is empty or longer than [`MAX_LEN`](Self::MAX_LEN) bytes.
    pub fn new(name: &str) -> Result<Self, ZoneError> {
        if name.is_empty() {
            return Err(ZoneError::InvalidArgument("empty zone name"));
        }
        let Ok(len) = u8::try_from(name.len()) else {
            return Err(ZoneError::InvalidArgument("zone name too long"));
        };
        if usize::from(len) > Self::MAX_LEN {
            return Err(ZoneError::InvalidArgument("zone name too long"));
        }
        let mut bytes = [0; MEMZONE_NAMESIZE];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self { bytes, len })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // Built from a `&str` and never truncated, so this cannot fail.
        core::str::from_utf8(&self.bytes[..usize::from(self.len)]).unwrap_or_default()
    }
}

impl fmt::Debug for ZoneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ZoneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for ZoneName {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

/// A reserved, fixed-address region of memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Zone {
    name: ZoneName,
    virtual_base: VirtualAddress,
    physical_base: PhysicalAddress,
    len: u64,
    socket_id: SocketId,
    page_size: PageSizeClass,
    flags: ZoneFlags,
}

impl Zone {
    pub(crate) const fn new(
        name: ZoneName,
        virtual_base: VirtualAddress,
        physical_base: PhysicalAddress,
        len: u64,
        socket_id: SocketId,
        page_size: PageSizeClass,
        flags: ZoneFlags,
    ) -> Self {
        Self {
            name,
            virtual_base,
            physical_base,
            len,
            socket_id,
            page_size,
            flags,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    #[must_use]
    pub const fn virtual_base(&self) -> VirtualAddress {
        self.virtual_base
    }

    #[must_use]
    pub const fn physical_base(&self) -> PhysicalAddress {
        self.physical_base
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn socket_id(&self) -> SocketId {
        self.socket_id
    }

    #[must_use]
    pub const fn page_size(&self) -> PageSizeClass {
        self.page_size
    }

    /// Flags the reservation was satisfied with.
    #[must_use]
    pub const fn flags(&self) -> ZoneFlags {
        self.flags
    }

    /// One past the last byte of the zone.
    #[must_use]
    pub fn virtual_end(&self) -> VirtualAddress {
        self.virtual_base + self.len
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name:<{}>, phys:{}, len:0x{:x}, virt:{}, socket_id:{}",
            self.name, self.physical_base, self.len, self.virtual_base, self.socket_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_bounded() {
        assert!(ZoneName::new("pool_a").is_ok());
        assert!(ZoneName::new(&"x".repeat(ZoneName::MAX_LEN)).is_ok());
        assert_eq!(
            ZoneName::new(&"x".repeat(ZoneName::MAX_LEN + 1)),
            Err(ZoneError::InvalidArgument("zone name too long"))
        );
        assert_eq!(
            ZoneName::new(""),
            Err(ZoneError::InvalidArgument("empty zone name"))
        );
    }

    #[test]
    fn name_compares_with_str() {
        let n = ZoneName::new("MALLOC_S0_HEAP").unwrap();
        assert!(n == *"MALLOC_S0_HEAP");
        assert_eq!(n.to_string(), "MALLOC_S0_HEAP");
        assert_eq!(format!("{n:?}"), "\"MALLOC_S0_HEAP\"");
    }
}
