//! # Physical and Virtual Address Types
//!
//! Zero-cost newtypes that keep the two address kinds handled by the
//! acquisition engine apart:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | An address in the running kernel's own address space. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | A raw machine address with no translation applied. |
//! | [`MemoryAddressOffset<S>`] | The byte offset inside a page of size `S`. |
//!
//! The page size is carried at the type level through the [`PageSize`]
//! markers [`Size4K`], [`Size2M`] and [`Size1G`]. Splitting an address into
//! `(page, offset)` and joining it back is always explicit about which page
//! size applies, which matters because the same virtual address is split at
//! bit 12 for an ordinary leaf and at bit 21 for a 2 MiB leaf.
//!
//! ```rust
//! # use pmem_addresses::*;
//! let va = VirtualAddress::new(0xFFFF_FF80_0020_1234);
//!
//! let (page, off) = va.split::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0xFFFF_FF80_0020_1000);
//! assert_eq!(off.as_u64(), 0x234);
//!
//! let (large, large_off) = va.split::<Size2M>();
//! assert_eq!(large.base().as_u64(), 0xFFFF_FF80_0020_0000);
//! assert_eq!(large_off.as_u64(), 0x1234);
//!
//! let pa = PhysicalAddress::new(0x1000).page::<Size4K>().join(off);
//! assert_eq!(pa.as_u64(), 0x1234);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod memory_address;
mod page_size;
mod physical_address;
mod virtual_address;

pub use crate::memory_address::{MemoryAddress, MemoryAddressOffset, MemoryPage};
pub use crate::page_size::{PageSize, Size1G, Size2M, Size4K};
pub use crate::physical_address::{PhysicalAddress, PhysicalPage};
pub use crate::virtual_address::{VirtualAddress, VirtualPage};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_4k() {
        let pa = PhysicalAddress::new(0x0000_0010_2000_0042);
        let (page, off) = pa.split::<Size4K>();
        assert_eq!(page.base().as_u64(), 0x0000_0010_2000_0000);
        assert_eq!(off.as_u64(), 0x42);
        assert_eq!(page.join(off), pa);
    }

    #[test]
    fn split_and_join_2m() {
        let va = VirtualAddress::new(0xFFFF_8000_0034_5678);
        let (page, off) = va.split::<Size2M>();
        assert_eq!(page.base().as_u64(), 0xFFFF_8000_0020_0000);
        assert_eq!(off.as_u64(), 0x14_5678);
        assert_eq!(page.join(off), va);
    }

    #[test]
    fn frame_numbers_follow_the_page_size() {
        let pa = PhysicalAddress::new(0x0040_1000);
        assert_eq!(pa.page::<Size4K>().frame_number(), 0x401);
        assert_eq!(pa.page::<Size2M>().frame_number(), 0x2);
        assert_eq!(PhysicalPage::<Size4K>::from_frame_number(0x401).base(), pa);
    }

    #[test]
    fn checked_add_reports_overflow() {
        let pa = PhysicalAddress::new(u64::MAX - 1);
        assert_eq!(pa.checked_add(1), Some(PhysicalAddress::new(u64::MAX)));
        assert_eq!(pa.checked_add(2), None);
    }

    #[test]
    fn display_is_zero_padded_hex() {
        let va = VirtualAddress::new(0x1000);
        assert_eq!(format!("{va}"), "0x0000000000001000");
        assert_eq!(format!("{va:?}"), "VA(0x0000000000001000)");
        let pa = PhysicalAddress::new(0xAB);
        assert_eq!(format!("{pa:?}"), "PA(0x00000000000000AB)");
    }
}
