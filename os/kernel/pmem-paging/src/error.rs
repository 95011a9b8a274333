use crate::page_table::PagingLevel;
use pmem_addresses::VirtualAddress;

/// Failure of a paging-structure walk.
///
/// `level` names the entry that stopped the walk, not the one that was asked
/// for: a PTE read through a non-present PDE reports [`PagingLevel::Pd`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    #[error("{level} for {va} is not present")]
    NotPresent {
        level: PagingLevel,
        va: VirtualAddress,
    },
    #[error("{level} for {va} maps a large page")]
    LargePageMismatch {
        level: PagingLevel,
        va: VirtualAddress,
    },
}

impl WalkError {
    /// The level of the entry that stopped the walk.
    #[must_use]
    pub const fn level(&self) -> PagingLevel {
        match *self {
            Self::NotPresent { level, .. } | Self::LargePageMismatch { level, .. } => level,
        }
    }

    /// The address whose walk failed.
    #[must_use]
    pub const fn virtual_address(&self) -> VirtualAddress {
        match *self {
            Self::NotPresent { va, .. } | Self::LargePageMismatch { va, .. } => va,
        }
    }
}
