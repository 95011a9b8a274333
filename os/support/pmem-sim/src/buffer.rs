use crate::SimMachine;
use pmem_addresses::VirtualAddress;
use pmem_rogue::{BufferTransfer, Direction};

/// A caller buffer that reaches kernel memory through the simulated MMU.
pub struct SimBuffer<'m> {
    machine: &'m SimMachine,
    data: Vec<u8>,
    pos: usize,
    fail_after: Option<usize>,
    transfers: usize,
}

impl<'m> SimBuffer<'m> {
    /// A zeroed buffer of `len` bytes to read into.
    #[must_use]
    pub fn zeroed(machine: &'m SimMachine, len: usize) -> Self {
        Self::from_bytes(machine, vec![0; len])
    }

    /// A buffer holding `data`, to write from.
    #[must_use]
    pub fn from_bytes(machine: &'m SimMachine, data: Vec<u8>) -> Self {
        Self {
            machine,
            data,
            pos: 0,
            fail_after: None,
            transfers: 0,
        }
    }

    /// Stop moving bytes once `n` bytes in total went through.
    #[must_use]
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Number of `transfer` calls, one per chunk.
    #[must_use]
    pub const fn transfers(&self) -> usize {
        self.transfers
    }
}

impl BufferTransfer for SimBuffer<'_> {
    unsafe fn transfer(
        &mut self,
        direction: Direction,
        kernel_va: VirtualAddress,
        len: usize,
    ) -> usize {
        self.transfers += 1;
        let mut n = len.min(self.data.len() - self.pos);
        if let Some(limit) = self.fail_after {
            n = n.min(limit.saturating_sub(self.pos));
        }

        let ours = &mut self.data[self.pos..self.pos + n];
        match direction {
            Direction::ToBuffer => self.machine.kernel_read(kernel_va, ours),
            Direction::FromBuffer => self.machine.kernel_write(kernel_va, ours),
        }
        self.pos += n;
        n
    }
}
