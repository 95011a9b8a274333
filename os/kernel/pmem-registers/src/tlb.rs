//! Translation-cache maintenance for the executing processor.
//!
//! `invlpg` only drops the translation cached by the CPU that executes it.
//! Other processors keep whatever they cached until they invalidate on their
//! own; a cross-CPU shootdown needs an IPI and belongs to the host kernel.

use pmem_addresses::VirtualAddress;

/// Invalidate any TLB entry for the page containing `va` on the current CPU.
///
/// # Safety
/// Must run at CPL0. Invalidating is harmless for the paging state itself,
/// but the instruction faults outside of ring 0.
#[cfg(feature = "asm")]
#[inline]
pub unsafe fn invalidate_page(va: VirtualAddress) {
    let addr = va.as_u64();
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) addr, options(nostack, preserves_flags));
    }
}
