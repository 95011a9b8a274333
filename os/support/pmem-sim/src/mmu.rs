//! The simulated processor's view of the paging structures.
//!
//! Deliberately written against raw bits instead of the typed entries of
//! `pmem-paging`, so the engine is checked against an independent walker.

use crate::ram::Ram;
use std::collections::HashMap;

pub(crate) const PRESENT: u64 = 1 << 0;
pub(crate) const WRITABLE: u64 = 1 << 1;
pub(crate) const PAGE_SIZE: u64 = 1 << 7;
pub(crate) const GLOBAL: u64 = 1 << 8;
pub(crate) const NO_EXECUTE: u64 = 1 << 63;

pub(crate) const TABLE_MASK: u64 = 0x000F_FFFF_FFFF_F000;
const MASK_2M: u64 = 0x000F_FFFF_FFE0_0000;
const MASK_1G: u64 = 0x000F_FFFF_C000_0000;

pub(crate) const SIZE_4K: u64 = 1 << 12;
pub(crate) const SIZE_2M: u64 = 1 << 21;
pub(crate) const SIZE_1G: u64 = 1 << 30;

#[inline]
pub(crate) const fn index(va: u64, shift: u32) -> u64 {
    (va >> shift) & 0x1FF
}

/// One cached translation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Translation {
    pub va_base: u64,
    pub pa_base: u64,
    pub size: u64,
}

impl Translation {
    pub(crate) const fn apply(&self, va: u64) -> u64 {
        self.pa_base + (va - self.va_base)
    }
}

/// Where a leaf entry lives and what it holds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Leaf {
    pub location: u64,
    pub value: u64,
    pub size: u64,
}

/// Find the present leaf entry for `va`, the way the page walker does.
pub(crate) fn find_leaf(ram: &Ram, root: u64, va: u64) -> Option<Leaf> {
    let mut table = root;
    for (shift, size) in [(39, 0), (30, SIZE_1G), (21, SIZE_2M), (12, SIZE_4K)] {
        let location = table + index(va, shift) * 8;
        let value = ram.read_u64(location);
        if value & PRESENT == 0 {
            return None;
        }
        let is_leaf = shift == 12 || (size != 0 && value & PAGE_SIZE != 0);
        if is_leaf {
            return Some(Leaf {
                location,
                value,
                size,
            });
        }
        table = value & TABLE_MASK;
    }
    None
}

pub(crate) fn walk(ram: &Ram, root: u64, va: u64) -> Option<Translation> {
    let leaf = find_leaf(ram, root, va)?;
    let mask = match leaf.size {
        SIZE_1G => MASK_1G,
        SIZE_2M => MASK_2M,
        _ => TABLE_MASK,
    };
    Some(Translation {
        va_base: va & !(leaf.size - 1),
        pa_base: leaf.value & mask,
        size: leaf.size,
    })
}

/// Translation lookaside buffer of one processor.
#[derive(Default)]
pub(crate) struct Tlb {
    entries: HashMap<u64, Translation>,
}

impl Tlb {
    pub(crate) fn lookup(&self, va: u64) -> Option<Translation> {
        [SIZE_4K, SIZE_2M, SIZE_1G].into_iter().find_map(|size| {
            self.entries
                .get(&(va & !(size - 1)))
                .filter(|t| t.size == size)
                .copied()
        })
    }

    pub(crate) fn insert(&mut self, t: Translation) {
        self.entries.insert(t.va_base, t);
    }

    /// `invlpg`: drop whatever translation covers `va`.
    pub(crate) fn invalidate(&mut self, va: u64) {
        if let Some(t) = self.lookup(va) {
            self.entries.remove(&t.va_base);
        }
    }

    pub(crate) fn flush(&mut self) {
        self.entries.clear();
    }
}
