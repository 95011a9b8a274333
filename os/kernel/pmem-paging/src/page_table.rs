//! # x86-64 Paging Entries
//!
//! One module per level of the 4-level hierarchy, each providing the index
//! type for its slice of the virtual address and the entry layouts that can
//! live at that level:
//!
//! | Level | Module | Entry | Large page? |
//! |-------|--------|-------|-------------|
//! | 4 | [`pml4`] | [`Pml4e`](pml4::Pml4e) | never |
//! | 3 | [`pdpt`] | [`Pdpte`](pdpt::Pdpte) | 1 GiB when `PS=1` |
//! | 2 | [`pd`]   | [`PdEntry`](pd::PdEntry) = [`Pde`](pd::Pde) or [`Pde2M`](pd::Pde2M) | 2 MiB when `PS=1` |
//! | 1 | [`pt`]   | [`Pte`](pt::Pte) | never (bit 7 is PAT) |
//!
//! Entries are plain 64-bit values. They are never cached by this crate;
//! every decoded entry comes from a fresh physical read.

pub mod pd;
pub mod pdpt;
pub mod pml4;
pub mod pt;

use core::fmt;
use pmem_addresses::VirtualAddress;

use crate::page_table::pd::{L2Index, PdEntry};
use crate::page_table::pdpt::{L3Index, Pdpte};
use crate::page_table::pml4::{L4Index, Pml4e};
use crate::page_table::pt::{L1Index, Pte};

/// Hardware **Present** bit, shared across levels (bit 0).
pub(crate) const PRESENT_BIT: u64 = 1 << 0;

/// Hardware **Page Size** bit (bit 7) on PDPTEs and PDEs.
///
/// On PTEs the same bit is PAT.
pub(crate) const PS_BIT: u64 = 1 << 7;

/// Size of one paging entry in bytes.
pub const ENTRY_SIZE: u64 = 8;

/// A level of the paging hierarchy, top to bottom.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PagingLevel {
    /// Page Map Level 4 (entry: PML4E).
    Pml4,
    /// Page Directory Pointer Table (entry: PDPTE).
    Pdpt,
    /// Page Directory (entry: PDE).
    Pd,
    /// Page Table (entry: PTE).
    Pt,
}

impl PagingLevel {
    /// Index of `va` into the table of this level.
    #[inline]
    #[must_use]
    pub const fn index_of(self, va: VirtualAddress) -> u16 {
        match self {
            Self::Pml4 => L4Index::from(va).as_u16(),
            Self::Pdpt => L3Index::from(va).as_u16(),
            Self::Pd => L2Index::from(va).as_u16(),
            Self::Pt => L1Index::from(va).as_u16(),
        }
    }

    #[must_use]
    pub const fn entry_name(self) -> &'static str {
        match self {
            Self::Pml4 => "PML4E",
            Self::Pdpt => "PDPTE",
            Self::Pd => "PDE",
            Self::Pt => "PTE",
        }
    }
}

impl fmt::Display for PagingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry_name())
    }
}

/// A decoded entry of any level, tagged by the level it was read from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PagingEntry {
    Pml4(Pml4e),
    Pdpt(Pdpte),
    Pd(PdEntry),
    Pt(Pte),
}

impl PagingEntry {
    /// Decode a raw value read from a table of `level`.
    #[must_use]
    pub const fn decode(level: PagingLevel, bits: u64) -> Self {
        match level {
            PagingLevel::Pml4 => Self::Pml4(Pml4e::from_bits(bits)),
            PagingLevel::Pdpt => Self::Pdpt(Pdpte::from_bits(bits)),
            PagingLevel::Pd => Self::Pd(PdEntry::from_bits(bits)),
            PagingLevel::Pt => Self::Pt(Pte::from_bits(bits)),
        }
    }

    #[must_use]
    pub const fn level(self) -> PagingLevel {
        match self {
            Self::Pml4(_) => PagingLevel::Pml4,
            Self::Pdpt(_) => PagingLevel::Pdpt,
            Self::Pd(_) => PagingLevel::Pd,
            Self::Pt(_) => PagingLevel::Pt,
        }
    }

    #[must_use]
    pub const fn into_bits(self) -> u64 {
        match self {
            Self::Pml4(e) => e.into_bits(),
            Self::Pdpt(e) => e.into_bits(),
            Self::Pd(e) => e.into_bits(),
            Self::Pt(e) => e.into_bits(),
        }
    }

    #[must_use]
    pub const fn is_present(self) -> bool {
        self.into_bits() & PRESENT_BIT != 0
    }
}

#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (L4Index, L3Index, L2Index, L1Index) {
    (
        L4Index::from(va),
        L3Index::from(va),
        L2Index::from(va),
        L1Index::from(va),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_the_address_layout() {
        // PML4=0x1FF, PDPT=0x100, PD=0x001, PT=0x002, offset=0x345
        let va = VirtualAddress::new(0xFFFF_FFC0_0020_2345);
        let (i4, i3, i2, i1) = split_indices(va);
        assert_eq!(i4.as_u16(), 0x1FF);
        assert_eq!(i3.as_u16(), 0x100);
        assert_eq!(i2.as_u16(), 0x001);
        assert_eq!(i1.as_u16(), 0x002);
        assert_eq!(PagingLevel::Pt.index_of(va), 0x002);
    }

    #[test]
    fn decode_tags_by_level() {
        let e = PagingEntry::decode(PagingLevel::Pd, 0x20_0000 | PS_BIT | PRESENT_BIT);
        assert_eq!(e.level(), PagingLevel::Pd);
        assert!(e.is_present());
        assert!(matches!(e, PagingEntry::Pd(PdEntry::Leaf2M(_))));

        let e = PagingEntry::decode(PagingLevel::Pt, 0x5000 | PS_BIT);
        assert!(!e.is_present());
        assert_eq!(e.into_bits(), 0x5000 | PS_BIT);
    }

    #[test]
    fn level_display_names_the_entry() {
        assert_eq!(format!("{}", PagingLevel::Pdpt), "PDPTE");
    }
}
