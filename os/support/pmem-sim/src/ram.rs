use std::collections::HashMap;

const FRAME: u64 = 4096;

/// Sparse physical memory. Frames that were never written read as zero.
#[derive(Default)]
pub(crate) struct Ram {
    frames: HashMap<u64, Box<[u8; FRAME as usize]>>,
}

impl Ram {
    /// Visit `len` bytes starting at `pa` one frame-bounded piece at a time.
    fn pieces(pa: u64, len: usize, mut f: impl FnMut(u64, usize, std::ops::Range<usize>)) {
        let mut done = 0usize;
        while done < len {
            let addr = pa + done as u64;
            let frame = addr / FRAME;
            let offset = (addr % FRAME) as usize;
            let n = (len - done).min(FRAME as usize - offset);
            f(frame, offset, done..done + n);
            done += n;
        }
    }

    pub(crate) fn read(&self, pa: u64, out: &mut [u8]) {
        Self::pieces(pa, out.len(), |frame, offset, range| {
            let dst = &mut out[range.clone()];
            match self.frames.get(&frame) {
                Some(bytes) => dst.copy_from_slice(&bytes[offset..offset + range.len()]),
                None => dst.fill(0),
            }
        });
    }

    pub(crate) fn write(&mut self, pa: u64, data: &[u8]) {
        Self::pieces(pa, data.len(), |frame, offset, range| {
            let bytes = self
                .frames
                .entry(frame)
                .or_insert_with(|| Box::new([0; FRAME as usize]));
            bytes[offset..offset + range.len()].copy_from_slice(&data[range]);
        });
    }

    pub(crate) fn read_u64(&self, pa: u64) -> u64 {
        let mut bytes = [0; 8];
        self.read(pa, &mut bytes);
        u64::from_le_bytes(bytes)
    }

    pub(crate) fn write_u64(&mut self, pa: u64, value: u64) {
        self.write(pa, &value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_memory_reads_as_zero() {
        let ram = Ram::default();
        assert_eq!(ram.read_u64(0x1234_5000), 0);
    }

    #[test]
    fn writes_may_straddle_frames() {
        let mut ram = Ram::default();
        ram.write(0x0FFC, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut out = [0; 8];
        ram.read(0x0FFC, &mut out);
        assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(ram.read_u64(0x1000), 0x0807_0605);
    }
}
