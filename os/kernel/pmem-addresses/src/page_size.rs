use core::fmt;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// Marker trait for the x86-64 page sizes.
///
/// Sealed; only [`Size4K`], [`Size2M`] and [`Size1G`] implement it.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Display + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// `log2(SIZE)`, i.e. the number of in-page offset bits.
    const SHIFT: u32;
    /// Mask selecting the in-page offset bits.
    const OFFSET_MASK: u64 = Self::SIZE - 1;

    fn as_str() -> &'static str;
}

/// 4 KiB page, mapped by a PTE.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size4K;

/// 2 MiB page, mapped by a PDE with `PS=1`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size2M;

/// 1 GiB page, mapped by a PDPTE with `PS=1`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size1G;

macro_rules! page_size {
    ($ty:ident, $size:expr, $shift:expr, $name:literal) => {
        impl sealed::Sealed for $ty {}

        impl PageSize for $ty {
            const SIZE: u64 = $size;
            const SHIFT: u32 = $shift;

            fn as_str() -> &'static str {
                $name
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(Self::as_str())
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }
    };
}

page_size!(Size4K, 4096, 12, "4K");
page_size!(Size2M, 2 * 1024 * 1024, 21, "2M");
page_size!(Size1G, 1024 * 1024 * 1024, 30, "1G");

const _: () = {
    assert!(Size4K::SIZE == 1 << Size4K::SHIFT);
    assert!(Size2M::SIZE == 1 << Size2M::SHIFT);
    assert!(Size1G::SIZE == 1 << Size1G::SHIFT);
};
