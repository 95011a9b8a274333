//! # Rogue Mapping Manager
//!
//! A [`RogueMapper`] owns at most one rewritten leaf at a time. Creating a
//! mapping mutably borrows the mapper for as long as the returned
//! [`RoguePage`] lives, so a second mapping can only be created after the
//! first one was torn down.

use crate::PmemHost;
use crate::config::{RogueConfig, ScratchPageSize, TlbShootdown};
use crate::copy::MAX_PHYSICAL_ADDRESS;
use crate::error::MappingError;
use pmem_addresses::{PhysicalAddress, Size2M, Size4K, VirtualAddress};
use pmem_paging::{PagingLevel, PagingReader, PdEntry, Pde2M, Pte, WalkError};

/// The leaf entry of a scratch page as it was before it got rewritten.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SavedLeaf {
    Pte {
        location: PhysicalAddress,
        original: Pte,
    },
    Pde2M {
        location: PhysicalAddress,
        original: Pde2M,
    },
}

impl SavedLeaf {
    #[must_use]
    pub const fn location(&self) -> PhysicalAddress {
        match *self {
            Self::Pte { location, .. } | Self::Pde2M { location, .. } => location,
        }
    }

    #[must_use]
    pub const fn original_bits(&self) -> u64 {
        match *self {
            Self::Pte { original, .. } => original.into_bits(),
            Self::Pde2M { original, .. } => original.into_bits(),
        }
    }
}

/// State of a [`RogueMapper`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RogueMapping {
    #[default]
    Empty,
    /// `vaddr` is held, its leaf points at `target` and the stale
    /// translation was invalidated.
    Active {
        target: PhysicalAddress,
        vaddr: VirtualAddress,
        page_size: ScratchPageSize,
        saved: SavedLeaf,
    },
}

impl RogueMapping {
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// Creates and tears down the rogue page of one copy operation.
pub struct RogueMapper<'h, H: ?Sized> {
    host: &'h H,
    config: RogueConfig,
    state: RogueMapping,
}

impl<'h, H: PmemHost + ?Sized> RogueMapper<'h, H> {
    #[must_use]
    pub const fn new(host: &'h H, config: RogueConfig) -> Self {
        Self {
            host,
            config,
            state: RogueMapping::Empty,
        }
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> RogueConfig {
        self.config
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> &RogueMapping {
        &self.state
    }

    /// Point a fresh scratch page at the page containing `target`.
    ///
    /// `target` is rounded down to the configured page size. On failure the
    /// scratch page is released again and the mapper stays empty.
    ///
    /// # Errors
    /// - [`MappingError::TargetOutOfRange`] if `target` is not below
    ///   [`MAX_PHYSICAL_ADDRESS`]. Nothing is reserved in that case.
    /// - [`MappingError::AllocationFailed`] if the host has no scratch page.
    /// - [`MappingError::LeafNotFound`] if the scratch page has no reachable leaf.
    /// - [`MappingError::LargePageExpected`] if a 2 MiB scratch page is not
    ///   backed by a 2 MiB PDE.
    pub fn create(
        &mut self,
        target: PhysicalAddress,
    ) -> Result<RoguePage<'_, 'h, H>, MappingError> {
        if target.as_u64() >= MAX_PHYSICAL_ADDRESS {
            log::error!("refusing rogue mapping for {target}");
            return Err(MappingError::TargetOutOfRange { target });
        }

        if self.state.is_active() {
            // Only reachable if a guard was leaked.
            log::error!("rogue mapping still active, tearing it down first");
            self.teardown()?;
        }

        let page_size = self.config.page_size;
        let target = PhysicalAddress::new(page_size.align_down(target.as_u64()));

        let vaddr = self.host.reserve(page_size).map_err(|status| {
            log::error!("could not reserve a {page_size} scratch page: {status}");
            MappingError::AllocationFailed {
                size: page_size,
                status,
            }
        })?;

        // SAFETY: `vaddr` was just reserved.
        unsafe { self.host.touch(vaddr) };

        let saved = match self.rewrite_leaf(vaddr, target) {
            Ok(saved) => saved,
            Err(e) => {
                log::error!("could not build rogue mapping for {target}: {e}");
                if let Err(status) = self.host.release(vaddr, page_size) {
                    log::error!("could not release scratch page {vaddr}: {status}");
                }
                return Err(e);
            }
        };

        self.invalidate(vaddr);
        log::debug!("rogue page {vaddr} ({page_size}) now maps {target}");

        self.state = RogueMapping::Active {
            target,
            vaddr,
            page_size,
            saved,
        };
        Ok(RoguePage {
            mapper: self,
            target,
            vaddr,
            page_size,
        })
    }

    /// Save the leaf of `vaddr` and point it at `target`.
    fn rewrite_leaf(
        &self,
        vaddr: VirtualAddress,
        target: PhysicalAddress,
    ) -> Result<SavedLeaf, MappingError> {
        let reader = PagingReader::new(self.host);
        let leaf_not_found = |source| MappingError::LeafNotFound { va: vaddr, source };

        let (saved, rewritten) = match self.config.page_size {
            ScratchPageSize::Regular => {
                let read = reader.read_pte(vaddr).map_err(leaf_not_found)?;
                if !read.entry.present() {
                    return Err(leaf_not_found(WalkError::NotPresent {
                        level: PagingLevel::Pt,
                        va: vaddr,
                    }));
                }
                let rewritten = read
                    .entry
                    .with_physical_page(target.page::<Size4K>())
                    .with_global(false);
                let saved = SavedLeaf::Pte {
                    location: read.location,
                    original: read.entry,
                };
                (saved, rewritten.into_bits())
            }
            ScratchPageSize::Large => {
                let read = reader.read_pde(vaddr).map_err(leaf_not_found)?;
                let original = match read.entry {
                    PdEntry::Leaf2M(e) if e.present() => e,
                    PdEntry::Table(e) if e.present() => {
                        return Err(MappingError::LargePageExpected { va: vaddr });
                    }
                    _ => {
                        return Err(leaf_not_found(WalkError::NotPresent {
                            level: PagingLevel::Pd,
                            va: vaddr,
                        }));
                    }
                };
                let rewritten = original.with_physical_page(target.page::<Size2M>());
                let saved = SavedLeaf::Pde2M {
                    location: read.location,
                    original,
                };
                (saved, rewritten.into_bits())
            }
        };

        // SAFETY: the entry belongs to the scratch page this mapper holds.
        unsafe { self.host.write_u64(saved.location(), rewritten) };
        Ok(saved)
    }

    /// Restore the saved leaf and release the scratch page.
    ///
    /// A no-op on an empty mapper. The mapper is empty afterwards even if the
    /// release fails; the leaf is restored by then.
    ///
    /// # Errors
    /// [`MappingError::DeallocationFailed`] if the host refuses the release.
    pub fn teardown(&mut self) -> Result<(), MappingError> {
        let RogueMapping::Active {
            vaddr,
            page_size,
            saved,
            ..
        } = core::mem::take(&mut self.state)
        else {
            return Ok(());
        };

        // SAFETY: writing back the value read from this very location.
        unsafe { self.host.write_u64(saved.location(), saved.original_bits()) };
        self.invalidate(vaddr);

        self.host.release(vaddr, page_size).map_err(|status| {
            log::error!("could not release scratch page {vaddr}: {status}");
            MappingError::DeallocationFailed { va: vaddr, status }
        })?;

        log::debug!("rogue page {vaddr} restored and released");
        Ok(())
    }

    fn invalidate(&self, vaddr: VirtualAddress) {
        match self.config.shootdown {
            TlbShootdown::LocalOnly => self.host.invalidate_local(vaddr),
            TlbShootdown::Broadcast => self.host.invalidate_all_cpus(vaddr),
        }
    }
}

/// An active rogue mapping. Dropping it restores the original leaf.
pub struct RoguePage<'m, 'h, H: PmemHost + ?Sized> {
    mapper: &'m mut RogueMapper<'h, H>,
    target: PhysicalAddress,
    vaddr: VirtualAddress,
    page_size: ScratchPageSize,
}

impl<H: PmemHost + ?Sized> RoguePage<'_, '_, H> {
    /// Kernel virtual address of the start of the mapped page.
    #[must_use]
    pub const fn virt_addr(&self) -> VirtualAddress {
        self.vaddr
    }

    /// Physical address of the start of the mapped page.
    #[must_use]
    pub const fn target(&self) -> PhysicalAddress {
        self.target
    }

    #[must_use]
    pub const fn page_size(&self) -> ScratchPageSize {
        self.page_size
    }

    /// Tear the mapping down and report the outcome.
    ///
    /// # Errors
    /// See [`RogueMapper::teardown`].
    pub fn destroy(self) -> Result<(), MappingError> {
        self.mapper.teardown()
    }
}

impl<H: PmemHost + ?Sized> Drop for RoguePage<'_, '_, H> {
    fn drop(&mut self) {
        if let Err(e) = self.mapper.teardown() {
            log::error!("rogue page teardown failed: {e}");
        }
    }
}
