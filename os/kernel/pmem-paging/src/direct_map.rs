//! Physical memory access through a linear direct map.

use crate::PhysicalMemory;
use pmem_addresses::{PhysicalAddress, VirtualAddress};

/// Physical memory reached at `base + pa` in the current address space, the
/// way a host kernel's physmap (or an identity map, with `base = 0`) exposes it.
#[derive(Copy, Clone, Debug)]
pub struct DirectMap {
    base: VirtualAddress,
}

impl DirectMap {
    /// # Safety
    /// Every physical address this map is asked for must be mapped, readable
    /// and writable at `base + pa` for as long as the `DirectMap` is used.
    #[inline]
    #[must_use]
    pub const unsafe fn new(base: VirtualAddress) -> Self {
        Self { base }
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    #[inline]
    fn slot(&self, pa: PhysicalAddress) -> *mut u64 {
        (self.base + pa.as_u64()).as_mut_ptr::<u64>()
    }
}

impl PhysicalMemory for DirectMap {
    #[inline]
    fn read_u64(&self, pa: PhysicalAddress) -> u64 {
        // SAFETY: `new` requires `base + pa` to be mapped.
        unsafe { self.slot(pa).read_volatile() }
    }

    #[inline]
    unsafe fn write_u64(&self, pa: PhysicalAddress, value: u64) {
        // SAFETY: mapped per `new`; ownership of the location is on the caller.
        unsafe { self.slot(pa).write_volatile(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(4096))]
    struct Frame([u64; 512]);

    #[test]
    fn reads_and_writes_at_base_plus_offset() {
        let mut frame = Frame([0; 512]);
        frame.0[3] = 0xDEAD_BEEF;
        let base = VirtualAddress::from_ptr(frame.0.as_mut_ptr());

        // SAFETY: the test only touches the first 4 KiB past `base`.
        let map = unsafe { DirectMap::new(base) };
        assert_eq!(map.read_u64(PhysicalAddress::new(0x18)), 0xDEAD_BEEF);

        unsafe { map.write_u64(PhysicalAddress::new(0x20), 0x1234) };
        assert_eq!(frame.0[4], 0x1234);
    }
}
