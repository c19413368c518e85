//! # Heap Elements
//!
//! Every byte of a heap extent belongs to exactly one element. An element is
//! a cache-line header, the data area, and a cache-line trailer:
//!
//! ```text
//! +--------+-----+--------+------------------------+---------+
//! | header | pad | [PAD]  | data (usable bytes)    | trailer |
//! +--------+-----+--------+------------------------+---------+
//! ^ elem                  ^ data pointer           ^ elem + size - 64
//! ```
//!
//! `size` covers everything from the header to the end of the trailer. When
//! an aligned allocation leaves a gap too small to split off, the gap stays in
//! the element as `pad`, and a PAD marker header right before the data points
//! back to the real header. Each extent ends with an END header that has no
//! data and no trailer.
//!
//! Guards are a cookie XOR the address they protect, so a stale copy of a
//! header at another address never validates.

use crate::HeapCorruption;
use core::ptr;
use mem_addresses::VirtualAddress;
use mem_info::SocketId;
use mem_info::memory::CACHE_LINE_SIZE;

pub const HEADER_LEN: u64 = CACHE_LINE_SIZE;
pub const TRAILER_LEN: u64 = CACHE_LINE_SIZE;
/// Bytes of every FREE or BUSY element not available to the caller.
pub const ELEM_OVERHEAD: u64 = HEADER_LEN + TRAILER_LEN;
pub const MIN_DATA_LEN: u64 = CACHE_LINE_SIZE;
/// Smallest element worth splitting off.
pub const MIN_ELEM_LEN: u64 = ELEM_OVERHEAD + MIN_DATA_LEN;

const HEADER_COOKIE: u64 = 0xbadb_adba_dbad_badb;
const TRAILER_COOKIE: u64 = 0x5a5a_c0de_c0de_5a5a;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u32)]
pub enum ElemState {
    Free = 0x4652_4545,
    Busy = 0x4255_5359,
    /// Marker in front of padded data; `size` is the distance back to the real header.
    Pad = 0x5041_4421,
    /// Extent terminator.
    End = 0x454e_4421,
}

impl ElemState {
    const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x4652_4545 => Some(Self::Free),
            0x4255_5359 => Some(Self::Busy),
            0x5041_4421 => Some(Self::Pad),
            0x454e_4421 => Some(Self::End),
            _ => None,
        }
    }

    const fn has_trailer(self) -> bool {
        matches!(self, Self::Free | Self::Busy)
    }
}

/// The in-band header, exactly one cache line.
#[repr(C, align(64))]
pub struct ElemHeader {
    guard: u64,
    size: u64,
    prev_len: u64,
    pad: u64,
    state: u32,
    socket: u32,
}

const _: () = {
    assert!(size_of::<ElemHeader>() as u64 == HEADER_LEN);
    assert!(align_of::<ElemHeader>() as u64 == CACHE_LINE_SIZE);
};

/// Decoded, guard-checked contents of an element header.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ElemInfo {
    pub state: ElemState,
    /// Total length including header and trailer.
    pub size: u64,
    /// Distance back to the previous element of the extent, `0` for the first.
    pub prev_len: u64,
    /// Bytes between the header and the PAD marker.
    pub pad: u64,
    pub socket: SocketId,
}

impl ElemInfo {
    pub const fn new(state: ElemState, size: u64, prev_len: u64, socket: SocketId) -> Self {
        Self {
            state,
            size,
            prev_len,
            pad: 0,
            socket,
        }
    }

    /// Bytes available to the caller of a BUSY element.
    pub const fn usable(&self) -> u64 {
        self.size - self.pad - ELEM_OVERHEAD
    }
}

/// Address of an element header.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Elem(VirtualAddress);

impl Elem {
    pub const fn at(addr: VirtualAddress) -> Self {
        Self(addr)
    }

    pub const fn addr(self) -> VirtualAddress {
        self.0
    }

    /// The element that follows one of `size` bytes.
    pub fn next(self, size: u64) -> Self {
        Self(self.0 + size)
    }

    /// The element `prev_len` bytes before this one.
    pub fn prev(self, prev_len: u64) -> Self {
        Self(self.0 - prev_len)
    }

    /// First data byte of an element carrying `pad` bytes of padding.
    pub fn data(self, pad: u64) -> VirtualAddress {
        self.0 + pad + HEADER_LEN
    }

    fn header(self) -> *mut ElemHeader {
        self.0.as_ptr()
    }

    fn trailer(self, size: u64) -> *mut u64 {
        (self.0 + size - TRAILER_LEN).as_ptr()
    }

    /// Read and check the header, and the trailer for FREE and BUSY elements.
    ///
    /// # Safety
    /// The header must lie inside a live heap extent that ends at `limit`.
    pub unsafe fn load(self, limit: VirtualAddress) -> Result<ElemInfo, HeapCorruption> {
        let raw = unsafe { ptr::read(self.header()) };
        if raw.guard != HEADER_COOKIE ^ self.0.as_u64() {
            return Err(HeapCorruption::BadHeader);
        }
        let state = ElemState::from_raw(raw.state).ok_or(HeapCorruption::BadHeader)?;
        if state.has_trailer() {
            let fits = self
                .0
                .as_u64()
                .checked_add(raw.size)
                .is_some_and(|end| end <= limit.as_u64());
            if raw.size < MIN_ELEM_LEN || !raw.size.is_multiple_of(CACHE_LINE_SIZE) || !fits {
                return Err(HeapCorruption::BadHeader);
            }
            // The padding must leave room for at least the overhead.
            if raw.pad > raw.size - ELEM_OVERHEAD {
                return Err(HeapCorruption::BadHeader);
            }
            let trailer = unsafe { ptr::read(self.trailer(raw.size)) };
            if trailer != TRAILER_COOKIE ^ self.0.as_u64() {
                return Err(HeapCorruption::BadTrailer);
            }
        }
        Ok(ElemInfo {
            state,
            size: raw.size,
            prev_len: raw.prev_len,
            pad: raw.pad,
            socket: SocketId::new(raw.socket),
        })
    }

    /// Write the header and, for FREE and BUSY elements, the trailer.
    ///
    /// # Safety
    /// `[self, self + info.size)` must lie inside a heap extent, and the
    /// caller must hold the heap lock.
    pub unsafe fn store(self, info: &ElemInfo) {
        let raw = ElemHeader {
            guard: HEADER_COOKIE ^ self.0.as_u64(),
            size: info.size,
            prev_len: info.prev_len,
            pad: info.pad,
            state: info.state as u32,
            socket: info.socket.as_u32(),
        };
        unsafe {
            ptr::write(self.header(), raw);
            if info.state.has_trailer() {
                ptr::write(self.trailer(info.size), TRAILER_COOKIE ^ self.0.as_u64());
            }
        }
    }

    /// Update the back link of an element already known to be valid.
    ///
    /// # Safety
    /// As for [`store`](Self::store).
    pub unsafe fn set_prev_len(self, prev_len: u64) {
        unsafe { (*self.header()).prev_len = prev_len };
    }

    /// Wipe the header so stale pointers to it fail validation.
    ///
    /// # Safety
    /// As for [`store`](Self::store).
    pub unsafe fn scrub(self) {
        unsafe { ptr::write_bytes(self.header(), 0, 1) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(64))]
    struct Block([u8; 512]);

    fn block() -> Box<Block> {
        Box::new(Block([0; 512]))
    }

    fn base(b: &mut Block) -> VirtualAddress {
        VirtualAddress::from_ptr(b.0.as_mut_ptr())
    }

    #[test]
    fn store_then_load() {
        let mut b = block();
        let va = base(&mut b);
        let elem = Elem::at(va);
        let info = ElemInfo::new(ElemState::Busy, 256, 0, SocketId::new(1));
        unsafe { elem.store(&info) };
        assert_eq!(unsafe { elem.load(va + 512) }, Ok(info));
        assert_eq!(info.usable(), 128);
    }

    #[test]
    fn damaged_guards_are_reported() {
        let mut b = block();
        let va = base(&mut b);
        let elem = Elem::at(va);
        unsafe { elem.store(&ElemInfo::new(ElemState::Free, 256, 0, SocketId::new(0))) };

        // trailer guard of a 256-byte element
        b.0[192] ^= 0xff;
        assert_eq!(unsafe { elem.load(va + 512) }, Err(HeapCorruption::BadTrailer));
        b.0[0] ^= 0xff;
        assert_eq!(unsafe { elem.load(va + 512) }, Err(HeapCorruption::BadHeader));
    }

    #[test]
    fn header_copied_elsewhere_does_not_validate() {
        let mut b = block();
        let va = base(&mut b);
        unsafe { Elem::at(va).store(&ElemInfo::new(ElemState::End, HEADER_LEN, 0, SocketId::new(0))) };
        b.0.copy_within(0..64, 64);
        assert_eq!(
            unsafe { Elem::at(va + 64).load(va + 512) },
            Err(HeapCorruption::BadHeader)
        );
    }

    #[test]
    fn size_past_the_extent_is_rejected() {
        let mut b = block();
        let va = base(&mut b);
        let elem = Elem::at(va);
        unsafe { elem.store(&ElemInfo::new(ElemState::Busy, 256, 0, SocketId::new(0))) };
        assert_eq!(unsafe { elem.load(va + 192) }, Err(HeapCorruption::BadHeader));
    }

    #[test]
    fn pad_larger_than_the_element_is_rejected() {
        let mut b = block();
        let va = base(&mut b);
        let elem = Elem::at(va);
        let mut info = ElemInfo::new(ElemState::Busy, 256, 0, SocketId::new(0));
        info.pad = 128;
        unsafe { elem.store(&info) };
        assert_eq!(unsafe { elem.load(va + 512) }.map(|i| i.usable()), Ok(0));

        // Guards intact, but the pad no longer fits.
        info.pad = 192;
        unsafe { elem.store(&info) };
        assert_eq!(unsafe { elem.load(va + 512) }, Err(HeapCorruption::BadHeader));
    }

    #[test]
    fn scrubbed_header_is_invalid() {
        let mut b = block();
        let va = base(&mut b);
        let elem = Elem::at(va);
        unsafe {
            elem.store(&ElemInfo::new(ElemState::Busy, 256, 0, SocketId::new(0)));
            elem.scrub();
        }
        assert_eq!(unsafe { elem.load(va + 512) }, Err(HeapCorruption::BadHeader));
    }
}
