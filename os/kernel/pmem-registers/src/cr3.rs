use crate::LoadRegisterUnsafe;
use bitfield_struct::bitfield;
use pmem_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// CR3: Page-Map Level-4 Base Register (IA-32e, 4-level paging).
///
/// Holds the physical base of the PML4 table. With `CR4.PCIDE = 1` the low
/// twelve bits carry the current PCID instead of PWT/PCD; the base field is
/// the same in both layouts, which is the only part a paging walk needs.
#[bitfield(u64)]
pub struct Cr3 {
    /// Bits 0–2: Reserved (PCID bits when PCIDE=1).
    #[bits(3)]
    pub reserved0: u8,

    /// Bit 3: PWT: Page-level Write-Through for the PML4.
    pub pwt: bool,

    /// Bit 4: PCD: Page-level Cache Disable for the PML4.
    pub pcd: bool,

    /// Bits 5–11: Reserved (PCID bits when PCIDE=1).
    #[bits(7)]
    pub reserved1: u8,

    /// Bits 12–51: PML4 physical base >> 12.
    #[bits(40)]
    pml4_base_4k: u64,

    /// Bits 52–62: Reserved.
    #[bits(11)]
    pub reserved2: u16,

    /// Bit 63: no-flush hint on writes when PCIDE=1; reads as 0.
    pub no_flush: bool,
}

impl Cr3 {
    /// Build a `Cr3` value pointing at `pml4`.
    #[must_use]
    pub const fn from_pml4(pml4: PhysicalPage<Size4K>) -> Self {
        Self::new().with_pml4_base_4k(pml4.frame_number())
    }

    /// The frame holding the PML4 table.
    #[must_use]
    pub const fn pml4(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_frame_number(self.pml4_base_4k())
    }

    /// Physical address of the PML4 table.
    #[must_use]
    pub const fn pml4_phys(&self) -> PhysicalAddress {
        self.pml4().base()
    }
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}
