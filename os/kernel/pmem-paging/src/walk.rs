//! # Paging-Structure Reader
//!
//! Computes the physical location of the entry for a virtual address at each
//! level and reads it. Every call starts over from the host's current PML4
//! base; nothing read here is ever cached.
//!
//! ```text
//!  CR3 ──► PML4[i4] ──► PDPT[i3] ──► PD[i2] ──► PT[i1]
//!            │            │            │           │
//!         present?     present?     present?    (leaf)
//!                      PS → 1G      PS → 2M
//! ```

use crate::error::WalkError;
use crate::page_table::pd::{L2Index, PdEntry};
use crate::page_table::pdpt::{L3Index, PdptEntryKind, Pdpte};
use crate::page_table::pml4::{L4Index, Pml4e};
use crate::page_table::pt::{L1Index, Pte};
use crate::page_table::{PagingEntry, PagingLevel};
use crate::{MachineMetadata, PhysicalMemory};
use pmem_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// A decoded entry together with the physical address it was read from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EntryRead<E> {
    pub entry: E,
    pub location: PhysicalAddress,
}

impl<E> EntryRead<E> {
    #[inline]
    pub fn map<F>(self, f: impl FnOnce(E) -> F) -> EntryRead<F> {
        EntryRead {
            entry: f(self.entry),
            location: self.location,
        }
    }
}

/// Reads paging entries of the active address space through a host.
pub struct PagingReader<'h, H: ?Sized> {
    host: &'h H,
}

impl<'h, H> PagingReader<'h, H>
where
    H: MachineMetadata + PhysicalMemory + ?Sized,
{
    #[inline]
    pub const fn new(host: &'h H) -> Self {
        Self { host }
    }

    #[inline]
    pub const fn host(&self) -> &'h H {
        self.host
    }

    fn read_slot(
        &self,
        level: PagingLevel,
        table: PhysicalPage<Size4K>,
        byte_offset: u64,
        va: VirtualAddress,
    ) -> (u64, PhysicalAddress) {
        let location = table.base() + byte_offset;
        let bits = self.host.read_u64(location);
        log::trace!("{level} for {va} at {location}: {bits:#018x}");
        (bits, location)
    }

    /// Read the PML4E for `va`. Always succeeds; the PML4 itself is present
    /// by definition.
    pub fn read_pml4e(&self, va: VirtualAddress) -> EntryRead<Pml4e> {
        let root = self.host.pml4_base();
        let (bits, location) =
            self.read_slot(PagingLevel::Pml4, root, L4Index::from(va).byte_offset(), va);
        EntryRead {
            entry: Pml4e::from_bits(bits),
            location,
        }
    }

    /// Read the PDPTE for `va`.
    ///
    /// # Errors
    /// [`WalkError::NotPresent`] at [`PagingLevel::Pml4`] if the PML4E is not present.
    pub fn read_pdpte(&self, va: VirtualAddress) -> Result<EntryRead<Pdpte>, WalkError> {
        let pml4e = self.read_pml4e(va).entry;
        if !pml4e.present() {
            return Err(not_present(PagingLevel::Pml4, va));
        }

        let (bits, location) = self.read_slot(
            PagingLevel::Pdpt,
            pml4e.next_table(),
            L3Index::from(va).byte_offset(),
            va,
        );
        Ok(EntryRead {
            entry: Pdpte::from_bits(bits),
            location,
        })
    }

    /// Read the PDE for `va`, decoded by its `PS` bit.
    ///
    /// # Errors
    /// - [`WalkError::NotPresent`] at the first non-present level above the PD.
    /// - [`WalkError::LargePageMismatch`] at [`PagingLevel::Pdpt`] if `va` lies in a 1 GiB page.
    pub fn read_pde(&self, va: VirtualAddress) -> Result<EntryRead<PdEntry>, WalkError> {
        let pdpte = self.read_pdpte(va)?.entry;
        let pd = match pdpte.kind() {
            None => return Err(not_present(PagingLevel::Pdpt, va)),
            Some(PdptEntryKind::Leaf1GiB(_)) => {
                return Err(large_page(PagingLevel::Pdpt, va));
            }
            Some(PdptEntryKind::NextPageDirectory(pd)) => pd,
        };

        let (bits, location) =
            self.read_slot(PagingLevel::Pd, pd, L2Index::from(va).byte_offset(), va);
        Ok(EntryRead {
            entry: PdEntry::from_bits(bits),
            location,
        })
    }

    /// Read the PTE for `va`.
    ///
    /// The PTE itself is returned whether or not it is present; only the
    /// levels above it must be.
    ///
    /// # Errors
    /// - [`WalkError::NotPresent`] at the first non-present level above the PT.
    /// - [`WalkError::LargePageMismatch`] at the level holding a large page.
    pub fn read_pte(&self, va: VirtualAddress) -> Result<EntryRead<Pte>, WalkError> {
        let pde = self.read_pde(va)?.entry;
        let pt = match pde {
            PdEntry::Table(e) if e.present() => e.next_table(),
            PdEntry::Leaf2M(e) if e.present() => return Err(large_page(PagingLevel::Pd, va)),
            _ => return Err(not_present(PagingLevel::Pd, va)),
        };

        let (bits, location) =
            self.read_slot(PagingLevel::Pt, pt, L1Index::from(va).byte_offset(), va);
        Ok(EntryRead {
            entry: Pte::from_bits(bits),
            location,
        })
    }

    /// Read the entry for `va` at `level`.
    ///
    /// # Errors
    /// See the per-level readers.
    pub fn read_entry(
        &self,
        level: PagingLevel,
        va: VirtualAddress,
    ) -> Result<EntryRead<PagingEntry>, WalkError> {
        Ok(match level {
            PagingLevel::Pml4 => self.read_pml4e(va).map(PagingEntry::Pml4),
            PagingLevel::Pdpt => self.read_pdpte(va)?.map(PagingEntry::Pdpt),
            PagingLevel::Pd => self.read_pde(va)?.map(PagingEntry::Pd),
            PagingLevel::Pt => self.read_pte(va)?.map(PagingEntry::Pt),
        })
    }
}

#[cold]
fn not_present(level: PagingLevel, va: VirtualAddress) -> WalkError {
    log::debug!("walk for {va} stopped: {level} not present");
    WalkError::NotPresent { level, va }
}

#[cold]
fn large_page(level: PagingLevel, va: VirtualAddress) -> WalkError {
    log::debug!("walk for {va} stopped: {level} maps a large page");
    WalkError::LargePageMismatch { level, va }
}
