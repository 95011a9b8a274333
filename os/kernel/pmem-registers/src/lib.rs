//! # Typed x86-64 Control State
//!
//! The two pieces of processor state the acquisition engine touches:
//!
//! - [`Cr3`](cr3::Cr3): the PML4 base every paging walk starts from.
//! - [`tlb`]: single-address translation-cache invalidation (`invlpg`).
//!
//! The register layouts are plain bitfields and can be decoded anywhere;
//! the instructions that load or invalidate are gated behind the `asm`
//! feature and require CPL0.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "tlb")]
pub mod tlb;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Loading control registers is privileged and requires kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}
