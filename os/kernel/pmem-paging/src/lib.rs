//! # x86-64 Paging-Structure Access
//!
//! Reads the live paging hierarchy of the running kernel: typed entries for
//! every level, a walker that reports each entry together with its physical
//! location, and virtual-to-physical translation.
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! Each 48-bit virtual address is divided into five fields:
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! The fields are indices into four levels of tables of 512 entries of
//! 8 bytes each. The walk can end early:
//!
//! ```text
//!  PML4  →  PDPT  →  PD  →  PT  →  Physical Page
//!   │        │        │        │
//!   │        │        │        └───► PTE   → maps 4 KiB page
//!   │        │        └────────────► PDE   → PS=1 → 2 MiB page (offset is VA[20:0])
//!   │        └─────────────────────► PDPTE → PS=1 → 1 GiB page
//!   └──────────────────────────────► PML4E
//! ```
//!
//! ## Host interface
//!
//! The crate never touches memory on its own. A host provides:
//! - [`MachineMetadata`]: where the current PML4 lives, asked on every walk.
//! - [`PhysicalMemory`]: 64-bit reads and writes at physical addresses.
//!
//! [`DirectMap`] implements [`PhysicalMemory`] over a linear physmap, and
//! [`CurrentCr3`] (feature `asm`) implements [`MachineMetadata`] from `CR3`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod direct_map;
mod error;
pub mod page_table;
mod translate;
mod walk;

pub use crate::direct_map::DirectMap;
pub use crate::error::WalkError;
pub use crate::page_table::pd::{PdEntry, Pde, Pde2M};
pub use crate::page_table::pdpt::{PdptEntryKind, Pdpte};
pub use crate::page_table::pml4::Pml4e;
pub use crate::page_table::pt::Pte;
pub use crate::page_table::{PagingEntry, PagingLevel};
pub use crate::walk::{EntryRead, PagingReader};

use pmem_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Processor state needed to start a walk.
pub trait MachineMetadata {
    /// The PML4 of the address space the caller currently runs in.
    fn pml4_base(&self) -> PhysicalPage<Size4K>;
}

/// Unconditional access to physical memory.
pub trait PhysicalMemory {
    /// Read the 64-bit value at `pa`.
    fn read_u64(&self, pa: PhysicalAddress) -> u64;

    /// Write the 64-bit value at `pa`.
    ///
    /// # Safety
    /// Nothing protects the target. The caller must own whatever lives at
    /// `pa`, or be restoring a value it previously read from there.
    unsafe fn write_u64(&self, pa: PhysicalAddress, value: u64);
}

impl<T: MachineMetadata + ?Sized> MachineMetadata for &T {
    #[inline]
    fn pml4_base(&self) -> PhysicalPage<Size4K> {
        (**self).pml4_base()
    }
}

impl<T: PhysicalMemory + ?Sized> PhysicalMemory for &T {
    #[inline]
    fn read_u64(&self, pa: PhysicalAddress) -> u64 {
        (**self).read_u64(pa)
    }

    #[inline]
    unsafe fn write_u64(&self, pa: PhysicalAddress, value: u64) {
        unsafe { (**self).write_u64(pa, value) }
    }
}

/// [`MachineMetadata`] of the executing processor, read from `CR3`.
#[cfg(feature = "asm")]
#[derive(Copy, Clone, Debug)]
pub struct CurrentCr3 {
    _private: (),
}

#[cfg(feature = "asm")]
impl CurrentCr3 {
    /// # Safety
    /// [`pml4_base`](MachineMetadata::pml4_base) executes `mov reg, cr3`,
    /// which faults outside of CPL0.
    #[inline]
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(feature = "asm")]
impl MachineMetadata for CurrentCr3 {
    #[inline]
    fn pml4_base(&self) -> PhysicalPage<Size4K> {
        use pmem_registers::LoadRegisterUnsafe;
        use pmem_registers::cr3::Cr3;

        // SAFETY: construction of `CurrentCr3` asserts CPL0.
        unsafe { Cr3::load_unsafe() }.pml4()
    }
}
