//! # Page Map Level 4 (PML4 / L4)
//!
//! The top-level table, located by CR3. A PML4E always points to a PDPT;
//! the hardware does not support large pages at this level.

use pmem_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use bitfield_struct::bitfield;

/// Index into the PML4 (VA bits `[47:39]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L4Index(u16);

impl L4Index {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(((va.as_u64() >> 39) & 0x1FF) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Byte offset of the selected entry inside its table.
    #[inline]
    #[must_use]
    pub const fn byte_offset(self) -> u64 {
        self.0 as u64 * crate::page_table::ENTRY_SIZE
    }
}

/// L4 **PML4E**: pointer to a PDPT (non-leaf; PS must be 0).
#[doc(alias = "PML4E")]
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Pml4e {
    /// **Present** (bit 0).
    pub present: bool,
    /// **Writable** (bit 1).
    pub writable: bool,
    /// **User/Supervisor** (bit 2).
    pub user: bool,
    /// **Page Write-Through** (bit 3).
    pub write_through: bool,
    /// **Page Cache Disable** (bit 4).
    pub cache_disable: bool,
    /// **Accessed** (bit 5): set by the CPU on first walk through this entry.
    pub accessed: bool,
    /// Bit 6: ignored.
    #[bits(1)]
    __ignored6: u8,
    /// Bit 7: must be 0.
    #[bits(1)]
    __ps_must_be_0: u8,
    /// Bit 8: ignored.
    #[bits(1)]
    __ignored8: u8,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available_low: u8,
    /// PDPT physical base >> 12 (bits 12..51).
    #[bits(40)]
    pdpt_frame: u64,
    /// OS-available (bits 52..62).
    #[bits(11)]
    pub os_available_high: u16,
    /// **No-Execute** (bit 63).
    pub no_execute: bool,
}

impl Pml4e {
    /// A present, writable supervisor entry pointing at `pdpt`.
    #[inline]
    #[must_use]
    pub const fn present_table(pdpt: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_pdpt_frame(pdpt.frame_number())
    }

    /// The PDPT this entry points to.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.pdpt_frame() << 12))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_table_round_trips_the_frame() {
        let pdpt = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(0x0012_3000));
        let e = Pml4e::present_table(pdpt);
        assert!(e.present());
        assert!(e.writable());
        assert_eq!(e.next_table(), pdpt);
        assert_eq!(e.into_bits(), 0x0012_3003);
    }

    #[test]
    fn byte_offset_is_index_times_eight() {
        let i = L4Index::from(VirtualAddress::new(0xFFFF_8000_0000_0000));
        assert_eq!(i.as_u16(), 0x100);
        assert_eq!(i.byte_offset(), 0x800);
    }
}
