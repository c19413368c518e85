use bitfield_struct::bitfield;

/// Zone reservation flags.
///
/// Layout (LSB→MSB):
/// - bit 0: only use segments mapped with 2 MiB pages (4 KiB segments still qualify)
/// - bit 1: only use segments mapped with 1 GiB pages (4 KiB segments still qualify)
/// - bit 2: the page size is a hint; if nothing matches, retry without it
/// - bits 3..31: reserved
///
/// `page_2m` and `page_1g` are mutually exclusive.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct ZoneFlags {
    pub page_2m: bool,
    pub page_1g: bool,
    pub size_hint_only: bool,
    #[bits(29)]
    __: u32,
}

impl ZoneFlags {
    /// Whether a page size class was requested.
    #[inline]
    #[must_use]
    pub fn has_page_size(self) -> bool {
        self.page_2m() || self.page_1g()
    }

    #[inline]
    #[must_use]
    pub fn has_conflicting_page_sizes(self) -> bool {
        self.page_2m() && self.page_1g()
    }
}
