use crate::config::ScratchPageSize;
use core::fmt;
use pmem_addresses::{PhysicalAddress, VirtualAddress};
use pmem_paging::WalkError;

/// A return code handed back by the host kernel, kept verbatim.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct HostStatus(pub i32);

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host status {}", self.0)
    }
}

/// Failure to set up or tear down a rogue mapping.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("physical address {target} is beyond the addressable range")]
    TargetOutOfRange { target: PhysicalAddress },
    #[error("could not reserve a {size} scratch page: {status}")]
    AllocationFailed {
        size: ScratchPageSize,
        status: HostStatus,
    },
    #[error("no leaf entry for scratch page {va}")]
    LeafNotFound {
        va: VirtualAddress,
        #[source]
        source: WalkError,
    },
    #[error("scratch page {va} was reserved as 2M but its PDE is not a large page")]
    LargePageExpected { va: VirtualAddress },
    #[error("could not release scratch page {va}: {status}")]
    DeallocationFailed {
        va: VirtualAddress,
        status: HostStatus,
    },
}

/// Failure of a physical copy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CopyError {
    #[error("invalid physical range: offset {offset}, length {length}")]
    InvalidOffset { offset: i64, length: u64 },
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("transfer at {offset:#x} moved {moved} of {expected} bytes")]
    TransferFailed {
        offset: u64,
        moved: u64,
        expected: u64,
    },
}
