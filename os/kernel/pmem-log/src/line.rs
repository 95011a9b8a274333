use core::fmt;

/// Maximum length of one formatted line, newline included.
pub const LINE_CAPACITY: usize = 256;

/// A fixed-size line that silently drops what does not fit.
#[derive(Debug)]
pub struct LineBuffer<const N: usize = LINE_CAPACITY> {
    buf: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> LineBuffer<N> {
    const ROOM: usize = {
        assert!(N > 0, "a line needs room for its newline");
        N - 1
    };

    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            truncated: false,
        }
    }

    /// Whether anything was dropped.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Terminate the line with `\n` and return it.
    pub fn finish(&mut self) -> &str {
        self.buf[self.len] = b'\n';
        // Only whole characters are ever copied in.
        core::str::from_utf8(&self.buf[..=self.len]).unwrap_or("\n")
    }
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for LineBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = Self::ROOM - self.len;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        self.truncated |= take < s.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    #[test]
    fn short_lines_pass_through() {
        let mut line = LineBuffer::<32>::new();
        write!(line, "[{}] {}", "DEBUG", 42).unwrap();
        assert!(!line.is_truncated());
        assert_eq!(line.finish(), "[DEBUG] 42\n");
    }

    #[test]
    fn long_lines_keep_their_newline() {
        let mut line = LineBuffer::<8>::new();
        line.write_str("0123456789").unwrap();
        assert!(line.is_truncated());
        assert_eq!(line.finish(), "0123456\n");
    }

    #[test]
    fn cuts_at_a_character_boundary() {
        let mut line = LineBuffer::<5>::new();
        // One byte is left after "abc"; '€' needs three.
        line.write_str("abc€").unwrap();
        assert!(line.is_truncated());
        assert_eq!(line.finish(), "abc\n");
    }
}
