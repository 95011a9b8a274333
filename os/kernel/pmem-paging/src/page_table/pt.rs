//! # Page Table (PT / L1)
//!
//! A PTE always maps a 4 KiB page. Bit 7 is **PAT** at this level, not `PS`.

use bitfield_struct::bitfield;
use pmem_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// Index into the Page Table (VA bits `[20:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L1Index(u16);

impl L1Index {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(((va.as_u64() >> 12) & 0x1FF) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn byte_offset(self) -> u64 {
        self.0 as u64 * crate::page_table::ENTRY_SIZE
    }
}

/// L1 **PTE**: maps a single 4 KiB page.
#[doc(alias = "PTE")]
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Pte {
    /// Present (bit 0).
    pub present: bool,
    /// Writable (bit 1).
    pub writable: bool,
    /// User (bit 2).
    pub user: bool,
    /// Write-Through (bit 3).
    pub write_through: bool,
    /// Cache Disable (bit 4).
    pub cache_disable: bool,
    /// Accessed (bit 5).
    pub accessed: bool,
    /// Dirty (bit 6).
    pub dirty: bool,
    /// PAT selector (bit 7).
    pub pat: bool,
    /// **Global** (bit 8): survives CR3 reloads when `CR4.PGE` is set.
    pub global: bool,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available_low: u8,
    /// Physical base >> 12 (bits 12..51).
    #[bits(40)]
    page_frame: u64,
    /// OS-available / protection key (bits 52..62).
    #[bits(11)]
    pub os_available_high: u16,
    /// No-Execute (bit 63).
    pub no_execute: bool,
}

impl Pte {
    /// A present, writable supervisor leaf mapping `page`.
    #[inline]
    #[must_use]
    pub const fn present_leaf(page: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_physical_page(page)
    }

    /// The mapped 4 KiB page.
    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.page_frame() << 12))
    }

    /// The same entry with only the frame replaced.
    #[inline]
    #[must_use]
    pub const fn with_physical_page(self, page: PhysicalPage<Size4K>) -> Self {
        self.with_page_frame(page.frame_number())
    }
}
