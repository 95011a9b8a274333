//! # Translation Utility
//!
//! Virtual to physical translation for 4 KiB and 2 MiB pages.

use crate::error::WalkError;
use crate::page_table::PagingLevel;
use crate::walk::PagingReader;
use crate::{MachineMetadata, PhysicalMemory};
use pmem_addresses::{PhysicalAddress, Size2M, Size4K, VirtualAddress};

impl<H> PagingReader<'_, H>
where
    H: MachineMetadata + PhysicalMemory + ?Sized,
{
    /// Resolve `va` to the physical address backing it.
    ///
    /// The 4 KiB leaf is tried first. If that walk fails, a present 2 MiB PDE
    /// still resolves the address; any other failure is returned exactly as
    /// the 4 KiB walk reported it.
    ///
    /// # Errors
    /// The [`WalkError`] of the 4 KiB walk, or [`WalkError::NotPresent`] at
    /// [`PagingLevel::Pt`] if the walk reached a PTE that is not present.
    pub fn translate(&self, va: VirtualAddress) -> Result<PhysicalAddress, WalkError> {
        let err = match self.read_pte(va) {
            Ok(pte) if pte.entry.present() => {
                return Ok(pte.entry.physical_page().join(va.offset::<Size4K>()));
            }
            Ok(_) => WalkError::NotPresent {
                level: PagingLevel::Pt,
                va,
            },
            Err(err) => err,
        };

        if let Ok(pde) = self.read_pde(va)
            && let Some(leaf) = pde.entry.present_leaf()
        {
            return Ok(leaf.physical_page().join(va.offset::<Size2M>()));
        }

        log::debug!("no translation for {va}: {err}");
        Err(err)
    }
}
