//! Per-mapper configuration.

use core::fmt;

/// Size of the scratch page a rogue mapping is built on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ScratchPageSize {
    /// 4 KiB page; the PTE is rewritten.
    Regular,
    /// 2 MiB page; the PDE is rewritten.
    Large,
}

impl ScratchPageSize {
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u64 {
        match self {
            Self::Regular => 4096,
            Self::Large => 2 * 1024 * 1024,
        }
    }

    /// Round `addr` down to the start of its page.
    #[inline]
    #[must_use]
    pub const fn align_down(self, addr: u64) -> u64 {
        addr & !(self.bytes() - 1)
    }
}

impl Default for ScratchPageSize {
    fn default() -> Self {
        if cfg!(feature = "large-pages") {
            Self::Large
        } else {
            Self::Regular
        }
    }
}

impl fmt::Display for ScratchPageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => f.write_str("4K"),
            Self::Large => f.write_str("2M"),
        }
    }
}

/// Which processors drop the stale translation after a leaf is rewritten.
///
/// With [`LocalOnly`](Self::LocalOnly), another CPU that cached the scratch
/// page earlier can still reach the previous frame through it until its own
/// TLB entry is evicted.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum TlbShootdown {
    #[cfg_attr(not(feature = "broadcast-invalidation"), default)]
    LocalOnly,
    /// Asks the host to invalidate on every processor. Hosts that cannot
    /// reach other processors fall back to local invalidation; `LocalTlb`
    /// does so and logs a warning the first time.
    #[cfg_attr(feature = "broadcast-invalidation", default)]
    Broadcast,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RogueConfig {
    pub page_size: ScratchPageSize,
    pub shootdown: TlbShootdown,
}

impl RogueConfig {
    #[must_use]
    pub const fn new(page_size: ScratchPageSize, shootdown: TlbShootdown) -> Self {
        Self {
            page_size,
            shootdown,
        }
    }

    #[must_use]
    pub const fn with_page_size(self, page_size: ScratchPageSize) -> Self {
        Self { page_size, ..self }
    }

    #[must_use]
    pub const fn with_shootdown(self, shootdown: TlbShootdown) -> Self {
        Self { shootdown, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_follows_the_page_size() {
        assert_eq!(ScratchPageSize::Regular.align_down(0x0020_1FFF), 0x0020_1000);
        assert_eq!(ScratchPageSize::Large.align_down(0x0020_1FFF), 0x0020_0000);
    }

    #[test]
    fn builders_override_one_field() {
        let c = RogueConfig::new(ScratchPageSize::Regular, TlbShootdown::LocalOnly)
            .with_page_size(ScratchPageSize::Large);
        assert_eq!(c.page_size, ScratchPageSize::Large);
        assert_eq!(c.shootdown, TlbShootdown::LocalOnly);
    }

    #[test]
    #[cfg(not(any(feature = "large-pages", feature = "broadcast-invalidation")))]
    fn defaults_are_regular_and_local() {
        assert_eq!(
            RogueConfig::default(),
            RogueConfig::new(ScratchPageSize::Regular, TlbShootdown::LocalOnly)
        );
    }
}
