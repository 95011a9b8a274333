//! # Simulated x86-64 Machine
//!
//! Test support for the acquisition engine: a software machine that behaves
//! like the host kernel the engine expects, down to the paging structures.
//!
//! - Physical memory is sparse and zero-filled ([`SimMachine::write_phys`],
//!   [`SimMachine::read_phys`]).
//! - Address spaces are real 4-level tables in that memory; page-table and
//!   backing frames come from a bump allocator starting at [`FRAME_POOL_START`],
//!   leaving everything below free for test data.
//! - Scratch pages are reserved in a dedicated kernel range starting at
//!   [`SCRATCH_BASE`] and only get paging structures when first touched,
//!   like a demand-paged kernel map. Touching also loads the translation into
//!   the TLB, so a missing invalidation is observable.
//! - Each simulated CPU has its own TLB. Engine accesses run on CPU 0; other
//!   CPUs can be made to cache translations with [`SimMachine::cpu_access`].
//! - Host failures can be injected ([`SimMachine::fail_reserve`],
//!   [`SimMachine::fail_release`], ...).
//!
//! The machine is `Sync`; all state sits behind one lock.

mod buffer;
mod mmu;
mod ram;

pub use crate::buffer::SimBuffer;

use crate::mmu::{
    GLOBAL, Leaf, NO_EXECUTE, PAGE_SIZE, PRESENT, SIZE_1G, SIZE_2M, SIZE_4K, TABLE_MASK, Tlb,
    WRITABLE, find_leaf, index, walk,
};
use crate::ram::Ram;
use log::LevelFilter;
use pmem_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use pmem_log::{HostLogger, LogSink};
use pmem_paging::{MachineMetadata, PhysicalMemory};
use pmem_rogue::{HostStatus, ScratchAllocator, ScratchPageSize, TlbInvalidate};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// First physical address handed out for tables and scratch backing.
pub const FRAME_POOL_START: u64 = 0x4000_0000;

/// Start of the kernel range scratch pages are reserved from.
pub const SCRATCH_BASE: u64 = 0xFFFF_FF80_0000_0000;

/// Status returned when releasing an address that was never reserved.
pub const STATUS_INVALID_ADDRESS: i32 = 1;

/// Host call counters.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SimStats {
    pub reserves: usize,
    pub releases: usize,
    pub touches: usize,
    pub local_invalidations: usize,
    pub broadcast_invalidations: usize,
    pub pml4_reads: usize,
}

/// What a scratch page's leaf looked like over its lifetime.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReleaseRecord {
    pub va: VirtualAddress,
    pub size: ScratchPageSize,
    /// The leaf written when the page was first touched.
    pub leaf_at_fault: Option<u64>,
    /// The leaf found when the page was released.
    pub leaf_at_release: Option<u64>,
}

impl ReleaseRecord {
    /// Whether the page came back with the leaf it was created with.
    #[must_use]
    pub fn leaf_restored(&self) -> bool {
        self.leaf_at_fault.is_some() && self.leaf_at_fault == self.leaf_at_release
    }
}

#[derive(Copy, Clone)]
struct Countdown {
    ok_left: usize,
    status: i32,
}

impl Countdown {
    /// Once tripped, keeps failing.
    fn trip(slot: &mut Option<Self>) -> Option<HostStatus> {
        let c = slot.as_mut()?;
        if c.ok_left == 0 {
            Some(HostStatus(c.status))
        } else {
            c.ok_left -= 1;
            None
        }
    }
}

#[derive(Default)]
struct Faults {
    reserve: Option<Countdown>,
    release: Option<Countdown>,
    small_backing_for_large: bool,
    touch_without_fault: bool,
    ignore_invalidations: bool,
}

struct ScratchPage {
    size: ScratchPageSize,
    leaf_at_fault: Option<u64>,
}

struct State {
    ram: Ram,
    root: u64,
    next_frame: u64,
    next_scratch: u64,
    scratch: BTreeMap<u64, ScratchPage>,
    released: Vec<ReleaseRecord>,
    tlbs: Vec<Tlb>,
    stats: SimStats,
    faults: Faults,
}

impl State {
    fn alloc(&mut self, size: u64) -> u64 {
        let base = self.next_frame.next_multiple_of(size);
        self.next_frame = base + size;
        base
    }

    /// Follow or create the table `table[index]` points to.
    fn ensure_table(&mut self, table: u64, index: u64) -> u64 {
        let location = table + index * 8;
        let entry = self.ram.read_u64(location);
        if entry & PRESENT != 0 {
            assert_eq!(
                entry & PAGE_SIZE,
                0,
                "large page at {location:#x} is in the way"
            );
            return entry & TABLE_MASK;
        }
        let next = self.alloc(SIZE_4K);
        self.ram.write_u64(location, next | PRESENT | WRITABLE);
        next
    }

    /// Install a leaf of `size` for `va` and return it.
    fn map(&mut self, va: u64, pa: u64, size: u64, flags: u64) -> Leaf {
        assert_eq!(va % size, 0, "unaligned virtual address {va:#x}");
        assert_eq!(pa % size, 0, "unaligned physical address {pa:#x}");

        let mut table = self.ensure_table(self.root, index(va, 39));
        let mut shift = 30;
        let mut leaf_size = SIZE_1G;
        while leaf_size != size {
            table = self.ensure_table(table, index(va, shift));
            shift -= 9;
            leaf_size >>= 9;
        }

        let ps = if size == SIZE_4K { 0 } else { PAGE_SIZE };
        let location = table + index(va, shift) * 8;
        let value = pa | PRESENT | WRITABLE | ps | flags;
        self.ram.write_u64(location, value);
        Leaf {
            location,
            value,
            size,
        }
    }

    fn scratch_page_of(&self, va: u64) -> Option<(u64, ScratchPageSize)> {
        let (&base, page) = self.scratch.range(..=va).next_back()?;
        (va < base + page.size.bytes()).then_some((base, page.size))
    }

    /// The host's page-fault handler for the scratch range.
    fn demand_fault(&mut self, va: u64) -> bool {
        let Some((base, size)) = self.scratch_page_of(va) else {
            return false;
        };
        let leaf = match size {
            ScratchPageSize::Large if !self.faults.small_backing_for_large => {
                let block = self.alloc(SIZE_2M);
                self.map(base, block, SIZE_2M, GLOBAL | NO_EXECUTE)
            }
            _ => {
                let frame = self.alloc(SIZE_4K);
                self.map(va & !(SIZE_4K - 1), frame, SIZE_4K, GLOBAL | NO_EXECUTE)
            }
        };
        log::trace!("sim: demand fault at {va:#x}, leaf {:#018x}", leaf.value);
        if let Some(page) = self.scratch.get_mut(&base) {
            page.leaf_at_fault.get_or_insert(leaf.value);
        }
        true
    }

    fn translate_on(&mut self, cpu: usize, va: u64) -> Option<u64> {
        if let Some(t) = self.tlbs[cpu].lookup(va) {
            return Some(t.apply(va));
        }
        let walked = walk(&self.ram, self.root, va);
        let t = match walked {
            Some(t) => t,
            None if cpu == 0 && self.demand_fault(va) => walk(&self.ram, self.root, va)?,
            None => return None,
        };
        self.tlbs[cpu].insert(t);
        Some(t.apply(va))
    }

    /// Visit `len` bytes at kernel `va` as physical pieces, translating on CPU 0.
    fn kernel_pieces(
        &mut self,
        va: u64,
        len: usize,
        mut f: impl FnMut(&mut Ram, u64, std::ops::Range<usize>),
    ) {
        let mut done = 0usize;
        while done < len {
            let addr = va + done as u64;
            let Some(pa) = self.translate_on(0, addr) else {
                panic!("sim: kernel page fault at {addr:#x}");
            };
            let in_page = (addr % SIZE_4K) as usize;
            let n = (len - done).min(SIZE_4K as usize - in_page);
            f(&mut self.ram, pa, done..done + n);
            done += n;
        }
    }
}

/// A simulated machine implementing every host interface of the engine.
pub struct SimMachine {
    state: Mutex<State>,
}

impl Default for SimMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimMachine {
    /// A machine with two CPUs and an empty address space.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cpus(2)
    }

    #[must_use]
    pub fn with_cpus(cpus: usize) -> Self {
        assert!(cpus > 0, "a machine needs a CPU");
        let mut state = State {
            ram: Ram::default(),
            root: 0,
            next_frame: FRAME_POOL_START,
            next_scratch: SCRATCH_BASE,
            scratch: BTreeMap::new(),
            released: Vec::new(),
            tlbs: (0..cpus).map(|_| Tlb::default()).collect(),
            stats: SimStats::default(),
            faults: Faults::default(),
        };
        state.root = state.alloc(SIZE_4K);
        Self {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The PML4 currently in CR3, without counting as a host query.
    #[must_use]
    pub fn root(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.state().root))
    }

    /// Allocate an empty PML4. Does not switch to it.
    #[must_use]
    pub fn create_address_space(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.state().alloc(SIZE_4K)))
    }

    /// Load CR3 with `root`, flushing every TLB.
    pub fn switch_address_space(&self, root: PhysicalPage<Size4K>) {
        let mut s = self.state();
        s.root = root.base().as_u64();
        s.tlbs.iter_mut().for_each(Tlb::flush);
    }

    pub fn map_4k(&self, va: VirtualAddress, pa: PhysicalAddress) -> PhysicalAddress {
        self.map(va, pa, SIZE_4K)
    }

    pub fn map_2m(&self, va: VirtualAddress, pa: PhysicalAddress) -> PhysicalAddress {
        self.map(va, pa, SIZE_2M)
    }

    pub fn map_1g(&self, va: VirtualAddress, pa: PhysicalAddress) -> PhysicalAddress {
        self.map(va, pa, SIZE_1G)
    }

    /// Map one page and return the physical location of its leaf entry.
    fn map(&self, va: VirtualAddress, pa: PhysicalAddress, size: u64) -> PhysicalAddress {
        let leaf = self.state().map(va.as_u64(), pa.as_u64(), size, 0);
        PhysicalAddress::new(leaf.location)
    }

    pub fn write_phys(&self, pa: PhysicalAddress, data: &[u8]) {
        self.state().ram.write(pa.as_u64(), data);
    }

    pub fn fill_phys(&self, pa: PhysicalAddress, len: usize, byte: u8) {
        self.write_phys(pa, &vec![byte; len]);
    }

    #[must_use]
    pub fn read_phys(&self, pa: PhysicalAddress, len: usize) -> Vec<u8> {
        let mut out = vec![0; len];
        self.state().ram.read(pa.as_u64(), &mut out);
        out
    }

    /// Read kernel virtual memory on CPU 0.
    ///
    /// # Panics
    /// On an access the simulated kernel would fault on.
    pub fn kernel_read(&self, va: VirtualAddress, out: &mut [u8]) {
        self.state()
            .kernel_pieces(va.as_u64(), out.len(), |ram, pa, range| {
                ram.read(pa, &mut out[range]);
            });
    }

    /// Write kernel virtual memory on CPU 0.
    ///
    /// # Panics
    /// On an access the simulated kernel would fault on.
    pub fn kernel_write(&self, va: VirtualAddress, data: &[u8]) {
        self.state()
            .kernel_pieces(va.as_u64(), data.len(), |ram, pa, range| {
                ram.write(pa, &data[range]);
            });
    }

    /// Translate `va` on `cpu`, caching the result in that CPU's TLB.
    #[must_use]
    pub fn cpu_access(&self, cpu: usize, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.state()
            .translate_on(cpu, va.as_u64())
            .map(PhysicalAddress::new)
    }

    /// What `cpu` has cached for `va`, if anything.
    #[must_use]
    pub fn tlb_lookup(&self, cpu: usize, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.state().tlbs[cpu]
            .lookup(va.as_u64())
            .map(|t| PhysicalAddress::new(t.apply(va.as_u64())))
    }

    #[must_use]
    pub fn stats(&self) -> SimStats {
        self.state().stats
    }

    #[must_use]
    pub fn released(&self) -> Vec<ReleaseRecord> {
        self.state().released.clone()
    }

    /// Scratch pages reserved and not yet released.
    #[must_use]
    pub fn outstanding_scratch_pages(&self) -> usize {
        self.state().scratch.len()
    }

    /// Let `after_ok` reservations succeed, then fail every one with `status`.
    pub fn fail_reserve(&self, after_ok: usize, status: i32) {
        self.state().faults.reserve = Some(Countdown {
            ok_left: after_ok,
            status,
        });
    }

    /// Let `after_ok` releases succeed, then fail every one with `status`.
    pub fn fail_release(&self, after_ok: usize, status: i32) {
        self.state().faults.release = Some(Countdown {
            ok_left: after_ok,
            status,
        });
    }

    /// Back 2 MiB scratch reservations with 4 KiB pages.
    pub fn back_large_pages_with_small(&self, enabled: bool) {
        self.state().faults.small_backing_for_large = enabled;
    }

    /// Let `touch` return without faulting the scratch page in, so its
    /// leaf stays unmapped.
    pub fn touch_without_fault(&self, enabled: bool) {
        self.state().faults.touch_without_fault = enabled;
    }

    /// Make `invlpg` and shootdowns do nothing.
    pub fn ignore_invalidations(&self, enabled: bool) {
        self.state().faults.ignore_invalidations = enabled;
    }

    pub fn clear_faults(&self) {
        self.state().faults = Faults::default();
    }
}

impl MachineMetadata for SimMachine {
    fn pml4_base(&self) -> PhysicalPage<Size4K> {
        let mut s = self.state();
        s.stats.pml4_reads += 1;
        PhysicalPage::from_addr(PhysicalAddress::new(s.root))
    }
}

impl PhysicalMemory for SimMachine {
    fn read_u64(&self, pa: PhysicalAddress) -> u64 {
        self.state().ram.read_u64(pa.as_u64())
    }

    unsafe fn write_u64(&self, pa: PhysicalAddress, value: u64) {
        self.state().ram.write_u64(pa.as_u64(), value);
    }
}

impl ScratchAllocator for SimMachine {
    fn reserve(&self, size: ScratchPageSize) -> Result<VirtualAddress, HostStatus> {
        let mut s = self.state();
        if let Some(status) = Countdown::trip(&mut s.faults.reserve) {
            return Err(status);
        }
        let va = s.next_scratch.next_multiple_of(size.bytes());
        s.next_scratch = va + size.bytes();
        s.scratch.insert(
            va,
            ScratchPage {
                size,
                leaf_at_fault: None,
            },
        );
        s.stats.reserves += 1;
        Ok(VirtualAddress::new(va))
    }

    fn release(&self, va: VirtualAddress, size: ScratchPageSize) -> Result<(), HostStatus> {
        let mut s = self.state();
        if let Some(status) = Countdown::trip(&mut s.faults.release) {
            return Err(status);
        }
        let base = va.as_u64();
        if !matches!(s.scratch.get(&base), Some(page) if page.size == size) {
            return Err(HostStatus(STATUS_INVALID_ADDRESS));
        }
        let leaf_at_fault = s.scratch.remove(&base).and_then(|page| page.leaf_at_fault);

        // Unmap without touching any TLB; invalidation is the caller's job.
        let leaf = find_leaf(&s.ram, s.root, base);
        if let Some(leaf) = leaf {
            s.ram.write_u64(leaf.location, 0);
        }
        s.released.push(ReleaseRecord {
            va,
            size,
            leaf_at_fault,
            leaf_at_release: leaf.map(|l| l.value),
        });
        s.stats.releases += 1;
        Ok(())
    }

    unsafe fn touch(&self, va: VirtualAddress) {
        {
            let mut s = self.state();
            s.stats.touches += 1;
            if s.faults.touch_without_fault {
                return;
            }
        }
        self.kernel_write(va, &0x0101_0101u32.to_le_bytes());
    }
}

impl TlbInvalidate for SimMachine {
    fn invalidate_local(&self, va: VirtualAddress) {
        let mut s = self.state();
        s.stats.local_invalidations += 1;
        if !s.faults.ignore_invalidations {
            s.tlbs[0].invalidate(va.as_u64());
        }
    }

    fn invalidate_all_cpus(&self, va: VirtualAddress) {
        let mut s = self.state();
        s.stats.broadcast_invalidations += 1;
        if !s.faults.ignore_invalidations {
            s.tlbs
                .iter_mut()
                .for_each(|tlb| tlb.invalidate(va.as_u64()));
        }
    }
}

/// Log sink writing to standard error, where the test harness captures it.
pub struct Stderr;

impl LogSink for Stderr {
    fn write_line(&self, line: &str) {
        eprint!("{line}");
    }
}

static LOGGER: HostLogger<Stderr> = HostLogger::new(Stderr, LevelFilter::Trace);

/// Route engine logs to the test output. Safe to call from every test.
pub fn init_logging() {
    // Another test may have installed it already.
    let _ = LOGGER.install();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_pages_fault_in_on_touch() {
        let m = SimMachine::new();
        let va = m.reserve(ScratchPageSize::Regular).unwrap();
        assert_eq!(va.as_u64(), SCRATCH_BASE);
        assert_eq!(m.cpu_access(1, va), None, "only CPU 0 faults pages in");

        unsafe { m.touch(va) };
        let pa = m.tlb_lookup(0, va).expect("touch caches the translation");
        assert!(pa.as_u64() >= FRAME_POOL_START);
        assert_eq!(m.read_phys(pa, 4), [1, 1, 1, 1]);
    }

    #[test]
    fn large_reservations_are_2m_aligned_and_mapped_by_a_pde() {
        let m = SimMachine::new();
        let small = m.reserve(ScratchPageSize::Regular).unwrap();
        let large = m.reserve(ScratchPageSize::Large).unwrap();
        assert!(large.as_u64() > small.as_u64());
        assert_eq!(large.as_u64() % SIZE_2M, 0);

        unsafe { m.touch(large) };
        let s = m.state();
        let leaf = find_leaf(&s.ram, s.root, large.as_u64()).unwrap();
        assert_eq!(leaf.size, SIZE_2M);
        assert_ne!(leaf.value & GLOBAL, 0);
    }

    #[test]
    fn release_records_the_leaf_and_unmaps() {
        let m = SimMachine::new();
        let va = m.reserve(ScratchPageSize::Regular).unwrap();
        unsafe { m.touch(va) };
        m.release(va, ScratchPageSize::Regular).unwrap();

        let record = m.released()[0];
        assert!(record.leaf_restored());
        {
            let s = m.state();
            assert!(find_leaf(&s.ram, s.root, va.as_u64()).is_none());
        }
        assert_eq!(
            m.release(va, ScratchPageSize::Regular),
            Err(HostStatus(STATUS_INVALID_ADDRESS))
        );
    }

    #[test]
    fn injected_failures_trip_after_the_allowance() {
        let m = SimMachine::new();
        m.fail_reserve(1, -7);
        assert!(m.reserve(ScratchPageSize::Regular).is_ok());
        assert_eq!(m.reserve(ScratchPageSize::Regular), Err(HostStatus(-7)));
        assert_eq!(m.reserve(ScratchPageSize::Regular), Err(HostStatus(-7)));
        m.clear_faults();
        assert!(m.reserve(ScratchPageSize::Regular).is_ok());
    }

    #[test]
    fn map_helpers_build_real_tables() {
        let m = SimMachine::new();
        let va = VirtualAddress::new(0xFFFF_8000_0020_1000);
        m.map_4k(va, PhysicalAddress::new(0x7000));
        assert_eq!(
            m.cpu_access(1, va + 0x10),
            Some(PhysicalAddress::new(0x7010))
        );
    }
}
