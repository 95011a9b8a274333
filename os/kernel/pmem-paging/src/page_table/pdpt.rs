//! # Page Directory Pointer Table (PDPT / L3)
//!
//! A PDPTE either points to a Page Directory (`PS=0`) or maps a 1 GiB page
//! (`PS=1`). The acquisition engine never builds 1 GiB mappings; it only has
//! to recognise them so a walk can stop instead of misreading a data frame
//! as a Page Directory.

use pmem_addresses::{PhysicalAddress, PhysicalPage, Size1G, Size4K, VirtualAddress};
use bitfield_struct::bitfield;

/// Index into the PDPT (VA bits `[38:30]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L3Index(u16);

impl L3Index {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(((va.as_u64() >> 30) & 0x1FF) as u16)
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

/// L3 **PDPTE** in its generic layout; [`kind`](Self::kind) tells the two
/// roles apart.
#[doc(alias = "PDPTE")]
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Pdpte {
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
    /// Dirty (bit 6): only meaningful for a 1 GiB leaf.
    pub dirty: bool,
    /// **Page Size** (bit 7): set for a 1 GiB leaf.
    pub page_size: bool,
    /// Global (bit 8): only meaningful for a 1 GiB leaf.
    pub global: bool,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available_low: u8,
    /// Address bits 12..51. For a 1 GiB leaf, bit 12 is PAT and bits 13..29
    /// are reserved.
    #[bits(40)]
    addr_51_12: u64,
    /// OS-available / protection key (bits 52..62).
    #[bits(11)]
    pub os_available_high: u16,
    /// No-Execute (bit 63).
    pub no_execute: bool,
}

/// Decoded role of a present PDPTE.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PdptEntryKind {
    /// `PS=0`: points to a Page Directory.
    NextPageDirectory(PhysicalPage<Size4K>),
    /// `PS=1`: maps a 1 GiB page.
    Leaf1GiB(PhysicalPage<Size1G>),
}

impl Pdpte {
    /// A present, writable supervisor entry pointing at `pd`.
    #[inline]
    #[must_use]
    pub const fn present_table(pd: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_addr_51_12(pd.frame_number())
    }

    /// A present, writable 1 GiB leaf mapping `page`.
    #[inline]
    #[must_use]
    pub const fn present_leaf_1g(page: PhysicalPage<Size1G>) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_page_size(true)
            .with_addr_51_12(page.base().as_u64() >> 12)
    }

    /// Decode the entry, or `None` if it is not present.
    #[inline]
    #[must_use]
    pub const fn kind(self) -> Option<PdptEntryKind> {
        if !self.present() {
            return None;
        }
        let addr = PhysicalAddress::new(self.addr_51_12() << 12);
        Some(if self.page_size() {
            PdptEntryKind::Leaf1GiB(PhysicalPage::from_addr(addr))
        } else {
            PdptEntryKind::NextPageDirectory(PhysicalPage::from_addr(addr))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_vs_1g_leaf() {
        let pd = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(0x3000_0000));
        assert_eq!(
            Pdpte::present_table(pd).kind(),
            Some(PdptEntryKind::NextPageDirectory(pd))
        );

        let g1 = PhysicalPage::<Size1G>::from_addr(PhysicalAddress::new(0x4000_0000));
        let leaf = Pdpte::present_leaf_1g(g1);
        assert!(leaf.page_size());
        assert_eq!(leaf.kind(), Some(PdptEntryKind::Leaf1GiB(g1)));
    }

    #[test]
    fn pat_bit_does_not_shift_the_1g_base() {
        // PAT lives at bit 12 for 1 GiB leaves.
        let e = Pdpte::from_bits(0x4000_0000 | (1 << 12) | (1 << 7) | 1);
        assert_eq!(
            e.kind(),
            Some(PdptEntryKind::Leaf1GiB(PhysicalPage::from_addr(PhysicalAddress::new(0x4000_0000))))
        );
    }

    #[test]
    fn not_present_decodes_to_none() {
        assert_eq!(Pdpte::new().with_page_size(true).kind(), None);
    }
}
