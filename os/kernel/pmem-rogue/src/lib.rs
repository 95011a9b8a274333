//! # Rogue Page Physical Memory Access
//!
//! Reads and writes arbitrary physical memory by borrowing one scratch page
//! of kernel address space and pointing its leaf translation at the frame of
//! interest:
//!
//! ```text
//!   reserve VA ─► touch ─► read leaf ─► save ─► rewrite frame ─► invlpg
//!        ▲                                                         │
//!        │                  copy bytes through VA  ◄───────────────┘
//!        │                         │
//!   release VA ◄─ invlpg ◄─ restore saved leaf
//! ```
//!
//! The leaf is a PTE for a 4 KiB scratch page or a PDE for a 2 MiB one, see
//! [`ScratchPageSize`]. The rewritten entry only lives as long as the
//! [`RoguePage`] guard returned by [`RogueMapper::create`]; dropping the guard
//! restores it.
//!
//! [`PmemDevice`] is the entry point for callers: byte-range reads and writes
//! over physical memory, translation, and a metadata snapshot.
//!
//! ## Host interface
//!
//! Besides the paging access of [`pmem_paging`] ([`MachineMetadata`] and
//! [`PhysicalMemory`]), a host supplies:
//! - [`ScratchAllocator`]: anonymous kernel pages to hijack.
//! - [`TlbInvalidate`]: dropping stale translations of the scratch page.
//! - [`BufferTransfer`] (per request): the caller's buffer.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod config;
mod copy;
mod device;
mod error;
pub mod hw;
mod mapping;

pub use crate::config::{RogueConfig, ScratchPageSize, TlbShootdown};
pub use crate::copy::{Direction, MAX_PHYSICAL_ADDRESS, copy};
pub use crate::device::{DeviceInfo, PmemDevice, Request};
pub use crate::error::{CopyError, HostStatus, MappingError};
pub use crate::mapping::{RogueMapper, RogueMapping, RoguePage, SavedLeaf};

pub use pmem_paging::{MachineMetadata, PhysicalMemory};

use pmem_addresses::VirtualAddress;

/// Source of throwaway kernel pages.
///
/// Implementations must be callable from several threads at once.
pub trait ScratchAllocator {
    /// Reserve one anonymous page of `size` anywhere in kernel space. A
    /// [`Large`](ScratchPageSize::Large) page must be 2 MiB aligned and
    /// backed by a single PDE.
    ///
    /// # Errors
    /// The host's status code.
    fn reserve(&self, size: ScratchPageSize) -> Result<VirtualAddress, HostStatus>;

    /// Give back a page returned by [`reserve`](Self::reserve).
    ///
    /// # Errors
    /// The host's status code.
    fn release(&self, va: VirtualAddress, size: ScratchPageSize) -> Result<(), HostStatus>;

    /// Write one word to a freshly reserved page so the host builds its
    /// paging structures.
    ///
    /// # Safety
    /// `va` must come from [`reserve`](Self::reserve) and not be released yet.
    unsafe fn touch(&self, va: VirtualAddress) {
        unsafe { va.as_mut_ptr::<u32>().write_volatile(0x0101_0101) }
    }
}

/// Translation-cache invalidation for a single address.
pub trait TlbInvalidate {
    /// Drop the translation of `va` on the executing processor.
    fn invalidate_local(&self, va: VirtualAddress);

    /// Drop the translation of `va` on every processor.
    ///
    /// Hosts that cannot interrupt other processors keep this default,
    /// which only invalidates locally.
    fn invalidate_all_cpus(&self, va: VirtualAddress) {
        self.invalidate_local(va);
    }
}

/// The caller's side of a copy: a buffer with a cursor, like a `uio`.
pub trait BufferTransfer {
    /// Move up to `len` bytes between the buffer's cursor and `kernel_va` and
    /// advance the cursor by the number of bytes moved, which is returned.
    ///
    /// # Safety
    /// `kernel_va .. kernel_va + len` must be mapped in the current address
    /// space for the duration of the call.
    unsafe fn transfer(&mut self, direction: Direction, kernel_va: VirtualAddress, len: usize)
    -> usize;
}

impl<B: BufferTransfer + ?Sized> BufferTransfer for &mut B {
    unsafe fn transfer(
        &mut self,
        direction: Direction,
        kernel_va: VirtualAddress,
        len: usize,
    ) -> usize {
        unsafe { (**self).transfer(direction, kernel_va, len) }
    }
}

/// Everything the engine needs from the host kernel.
pub trait PmemHost: MachineMetadata + PhysicalMemory + ScratchAllocator + TlbInvalidate {}

impl<T> PmemHost for T where
    T: MachineMetadata + PhysicalMemory + ScratchAllocator + TlbInvalidate + ?Sized
{
}

impl<T: ScratchAllocator + ?Sized> ScratchAllocator for &T {
    fn reserve(&self, size: ScratchPageSize) -> Result<VirtualAddress, HostStatus> {
        (**self).reserve(size)
    }

    fn release(&self, va: VirtualAddress, size: ScratchPageSize) -> Result<(), HostStatus> {
        (**self).release(va, size)
    }

    unsafe fn touch(&self, va: VirtualAddress) {
        unsafe { (**self).touch(va) }
    }
}

impl<T: TlbInvalidate + ?Sized> TlbInvalidate for &T {
    fn invalidate_local(&self, va: VirtualAddress) {
        (**self).invalidate_local(va);
    }

    fn invalidate_all_cpus(&self, va: VirtualAddress) {
        (**self).invalidate_all_cpus(va);
    }
}
