//! Host pieces that do not depend on a particular kernel.

use crate::BufferTransfer;
use crate::copy::Direction;
#[cfg(feature = "asm")]
use crate::TlbInvalidate;
#[cfg(any(feature = "asm", test))]
use core::sync::atomic::{AtomicBool, Ordering};
use pmem_addresses::VirtualAddress;

/// `invlpg` on the executing processor.
///
/// Has no way to reach other processors; a [`Broadcast`](crate::TlbShootdown::Broadcast)
/// request falls back to local invalidation and warns once.
#[cfg(feature = "asm")]
#[derive(Copy, Clone, Debug)]
pub struct LocalTlb {
    _private: (),
}

#[cfg(feature = "asm")]
impl LocalTlb {
    /// # Safety
    /// Invalidation runs `invlpg`, which faults outside of CPL0.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(feature = "asm")]
impl TlbInvalidate for LocalTlb {
    #[inline]
    fn invalidate_local(&self, va: VirtualAddress) {
        // SAFETY: construction asserts CPL0.
        unsafe { pmem_registers::tlb::invalidate_page(va) }
    }

    fn invalidate_all_cpus(&self, va: VirtualAddress) {
        static FALLBACK: WarnOnce = WarnOnce::new();
        if FALLBACK.first() {
            log::warn!("no cross-processor invalidation available, invalidating locally only");
        }
        self.invalidate_local(va);
    }
}

/// A latch that reports `true` exactly once.
#[cfg(any(feature = "asm", test))]
#[derive(Debug)]
pub(crate) struct WarnOnce(AtomicBool);

#[cfg(any(feature = "asm", test))]
impl WarnOnce {
    pub(crate) const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub(crate) fn first(&self) -> bool {
        !self.0.swap(true, Ordering::Relaxed)
    }
}

/// Source buffer in kernel memory. Only supports [`Direction::FromBuffer`].
#[derive(Debug)]
pub struct SliceBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceBuffer<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }
}

impl BufferTransfer for SliceBuffer<'_> {
    unsafe fn transfer(
        &mut self,
        direction: Direction,
        kernel_va: VirtualAddress,
        len: usize,
    ) -> usize {
        if direction != Direction::FromBuffer {
            return 0;
        }
        let n = len.min(self.data.len() - self.pos);
        // SAFETY: `kernel_va` is mapped for `len >= n` bytes per the trait
        // contract, and cannot alias a shared slice we hold.
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.data[self.pos..].as_ptr(),
                kernel_va.as_mut_ptr::<u8>(),
                n,
            );
        }
        self.pos += n;
        n
    }
}

/// Destination (or source) buffer in kernel memory.
#[derive(Debug)]
pub struct SliceBufferMut<'a> {
    data: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceBufferMut<'a> {
    #[must_use]
    pub const fn new(data: &'a mut [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes filled or consumed so far.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn into_inner(self) -> &'a mut [u8] {
        self.data
    }
}

impl BufferTransfer for SliceBufferMut<'_> {
    unsafe fn transfer(
        &mut self,
        direction: Direction,
        kernel_va: VirtualAddress,
        len: usize,
    ) -> usize {
        let n = len.min(self.data.len() - self.pos);
        let ours = self.data[self.pos..].as_mut_ptr();
        let theirs = kernel_va.as_mut_ptr::<u8>();
        // SAFETY: `kernel_va` is mapped for `len >= n` bytes per the trait
        // contract. `copy` tolerates the two ranges overlapping.
        unsafe {
            match direction {
                Direction::ToBuffer => core::ptr::copy(theirs, ours, n),
                Direction::FromBuffer => core::ptr::copy(ours, theirs, n),
            }
        }
        self.pos += n;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_once_fires_a_single_time() {
        let latch = WarnOnce::new();
        assert!(latch.first());
        assert!(!latch.first());
        assert!(!latch.first());
    }

    #[test]
    fn mutable_buffer_reads_then_writes() {
        let mut kernel = [0xAAu8; 64];
        let va = VirtualAddress::from_ptr(kernel.as_mut_ptr());
        let mut out = [0u8; 48];
        let mut buf = SliceBufferMut::new(&mut out);

        assert_eq!(unsafe { buf.transfer(Direction::ToBuffer, va, 32) }, 32);
        // Capped by what is left in the buffer.
        assert_eq!(unsafe { buf.transfer(Direction::ToBuffer, va, 32) }, 16);
        assert_eq!(buf.position(), 48);
        assert!(buf.into_inner().iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn shared_buffer_only_writes() {
        let mut kernel = [0u8; 16];
        let va = VirtualAddress::from_ptr(kernel.as_mut_ptr());
        let src = [1u8, 2, 3, 4];
        let mut buf = SliceBuffer::new(&src);

        assert_eq!(unsafe { buf.transfer(Direction::ToBuffer, va, 4) }, 0);
        assert_eq!(unsafe { buf.transfer(Direction::FromBuffer, va + 2, 8) }, 4);
        assert_eq!(buf.position(), 4);
        assert_eq!(kernel[..6], [0, 0, 1, 2, 3, 4]);
    }
}
