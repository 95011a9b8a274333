//! # Page Directory (PD / L2)
//!
//! The `PS` bit selects the role of a PDE:
//! - `PS=0`: [`Pde`], pointing to a Page Table (4 KiB-aligned base).
//! - `PS=1`: [`Pde2M`], mapping a 2 MiB page (2 MiB-aligned base, PAT at bit 12).
//!
//! Both layouts share the same 64 bits. [`PdEntry`] is the tagged form: the
//! variant is chosen from the `PS` bit once, at decode time, so a 2 MiB leaf
//! can never be read through the table layout or the other way around.

use crate::page_table::PS_BIT;
use bitfield_struct::bitfield;
use pmem_addresses::{PhysicalAddress, PhysicalPage, Size2M, Size4K, VirtualAddress};

/// Index into the Page Directory (VA bits `[29:21]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L2Index(u16);

impl L2Index {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(((va.as_u64() >> 21) & 0x1FF) as u16)
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

/// L2 **PDE**: pointer to a Page Table (non-leaf; `PS=0`).
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Pde {
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
    /// Bit 6: ignored in non-leaf form.
    #[bits(1)]
    __ignored6: u8,
    /// PS (bit 7): 0 in this form.
    #[bits(1)]
    __ps: u8,
    /// Bit 8: ignored in non-leaf form.
    #[bits(1)]
    __ignored8: u8,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available_low: u8,
    /// Page Table physical base >> 12 (bits 12..51).
    #[bits(40)]
    pt_frame: u64,
    /// OS-available (bits 52..62).
    #[bits(11)]
    pub os_available_high: u16,
    /// No-Execute (bit 63).
    pub no_execute: bool,
}

impl Pde {
    /// A present, writable supervisor entry pointing at `pt`.
    #[inline]
    #[must_use]
    pub const fn present_table(pt: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_pt_frame(pt.frame_number())
    }

    /// The Page Table this entry points to.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.pt_frame() << 12))
    }
}

/// L2 **PDE (2 MiB leaf)**: maps a single 2 MiB page (`PS=1`).
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Pde2M {
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
    /// Page Size (bit 7): 1 in this form.
    #[bits(default = true)]
    pub page_size: bool,
    /// Global (bit 8): survives CR3 reloads when `CR4.PGE` is set.
    pub global: bool,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available_low: u8,
    /// PAT selector for 2 MiB mappings (bit 12).
    pub pat_large: bool,
    /// Reserved (bits 13..20).
    #[bits(8)]
    __reserved: u8,
    /// Physical base >> 21 (bits 21..51).
    #[bits(31)]
    frame_2m: u32,
    /// OS-available (bits 52..62).
    #[bits(11)]
    pub os_available_high: u16,
    /// No-Execute (bit 63).
    pub no_execute: bool,
}

impl Pde2M {
    /// A present, writable supervisor leaf mapping `page`.
    #[inline]
    #[must_use]
    pub const fn present_leaf(page: PhysicalPage<Size2M>) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_page_size(true)
            .with_physical_page(page)
    }

    /// The mapped 2 MiB page.
    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size2M> {
        PhysicalPage::from_frame_number(self.frame_2m() as u64)
    }

    /// The same entry with only the frame replaced.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_physical_page(self, page: PhysicalPage<Size2M>) -> Self {
        self.with_frame_2m(page.frame_number() as u32)
    }
}

/// A PDE decoded by its `PS` bit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PdEntry {
    /// `PS=0`: points to a Page Table.
    Table(Pde),
    /// `PS=1`: maps a 2 MiB page.
    Leaf2M(Pde2M),
}

impl PdEntry {
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        if bits & PS_BIT != 0 {
            Self::Leaf2M(Pde2M::from_bits(bits))
        } else {
            Self::Table(Pde::from_bits(bits))
        }
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u64 {
        match self {
            Self::Table(e) => e.into_bits(),
            Self::Leaf2M(e) => e.into_bits(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        match self {
            Self::Table(e) => e.present(),
            Self::Leaf2M(e) => e.present(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_large(self) -> bool {
        matches!(self, Self::Leaf2M(_))
    }

    /// The 2 MiB leaf, if this entry is a present one.
    #[inline]
    #[must_use]
    pub const fn present_leaf(self) -> Option<Pde2M> {
        match self {
            Self::Leaf2M(e) if e.present() => Some(e),
            _ => None,
        }
    }
}

impl From<Pde> for PdEntry {
    #[inline]
    fn from(e: Pde) -> Self {
        Self::Table(e)
    }
}

impl From<Pde2M> for PdEntry {
    #[inline]
    fn from(e: Pde2M) -> Self {
        Self::Leaf2M(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ps_bit_selects_the_variant() {
        let pt = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(0x3000_0000));
        let table = PdEntry::from_bits(Pde::present_table(pt).into_bits());
        assert_eq!(table, PdEntry::Table(Pde::present_table(pt)));
        assert!(!table.is_large());
        assert_eq!(table.present_leaf(), None);

        let m2 = PhysicalPage::<Size2M>::from_addr(PhysicalAddress::new(0x4000_0000));
        let leaf = PdEntry::from_bits(Pde2M::present_leaf(m2).into_bits());
        assert!(leaf.is_large());
        assert_eq!(leaf.present_leaf().map(Pde2M::physical_page), Some(m2));
    }

    #[test]
    fn replacing_the_frame_keeps_every_flag() {
        let m2 = PhysicalPage::<Size2M>::from_addr(PhysicalAddress::new(0x0060_0000));
        let original = Pde2M::present_leaf(m2)
            .with_global(true)
            .with_pat_large(true)
            .with_no_execute(true);
        let target = PhysicalPage::<Size2M>::from_addr(PhysicalAddress::new(0x1_0000_0000));
        let rewritten = original.with_physical_page(target);
        assert_eq!(rewritten.physical_page(), target);
        assert_eq!(
            rewritten.into_bits() & !(0x7FFF_FFFFu64 << 21),
            original.into_bits() & !(0x7FFF_FFFFu64 << 21)
        );
    }
}
