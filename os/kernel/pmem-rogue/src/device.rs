//! Entry points for callers of the engine.

use crate::config::{RogueConfig, ScratchPageSize, TlbShootdown};
use crate::copy::{Direction, copy};
use crate::error::CopyError;
use crate::mapping::RogueMapper;
use crate::{BufferTransfer, PmemHost};
use pmem_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use pmem_paging::{PagingReader, WalkError};

/// A byte range of physical memory.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Request {
    pub offset: i64,
    pub length: u64,
}

impl Request {
    #[must_use]
    pub const fn new(offset: i64, length: u64) -> Self {
        Self { offset, length }
    }
}

/// Snapshot of the machine state an acquisition needs to interpret the image.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeviceInfo {
    /// The PML4 of the calling context (its directory table base).
    pub dtb: PhysicalPage<Size4K>,
    pub page_size: ScratchPageSize,
    pub shootdown: TlbShootdown,
}

/// Physical memory as a device. Every request builds its own mappings, so
/// a shared `PmemDevice` serves concurrent callers.
pub struct PmemDevice<H> {
    host: H,
    config: RogueConfig,
}

impl<H: PmemHost> PmemDevice<H> {
    pub const fn new(host: H, config: RogueConfig) -> Self {
        Self { host, config }
    }

    #[inline]
    pub const fn host(&self) -> &H {
        &self.host
    }

    #[inline]
    pub const fn config(&self) -> RogueConfig {
        self.config
    }

    /// Read `request` from physical memory into `buffer`.
    ///
    /// # Errors
    /// See [`copy`].
    pub fn read<B>(&self, request: &Request, buffer: &mut B) -> Result<u64, CopyError>
    where
        B: BufferTransfer + ?Sized,
    {
        self.transfer(Direction::ToBuffer, request, buffer)
    }

    /// Write `buffer` to physical memory at `request`.
    ///
    /// # Errors
    /// See [`copy`].
    pub fn write<B>(&self, request: &Request, buffer: &mut B) -> Result<u64, CopyError>
    where
        B: BufferTransfer + ?Sized,
    {
        self.transfer(Direction::FromBuffer, request, buffer)
    }

    fn transfer<B>(
        &self,
        direction: Direction,
        request: &Request,
        buffer: &mut B,
    ) -> Result<u64, CopyError>
    where
        B: BufferTransfer + ?Sized,
    {
        log::trace!(
            "{direction:?} {} bytes at {:#x}",
            request.length,
            request.offset
        );
        let mut mapper = RogueMapper::new(&self.host, self.config);
        copy(
            &mut mapper,
            direction,
            request.offset,
            request.length,
            buffer,
        )
    }

    /// Physical address backing `va` in the caller's address space.
    ///
    /// # Errors
    /// See [`PagingReader::translate`].
    pub fn translate(&self, va: VirtualAddress) -> Result<PhysicalAddress, WalkError> {
        PagingReader::new(&self.host).translate(va)
    }

    #[must_use]
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            dtb: self.host.pml4_base(),
            page_size: self.config.page_size,
            shootdown: self.config.shootdown,
        }
    }
}
