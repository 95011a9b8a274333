//! # Physical Copy Path
//!
//! Splits a physical byte range at page boundaries and moves every piece
//! through its own rogue mapping:
//!
//! ```text
//!  offset                                              offset + length
//!    │◄── chunk 0 ──►│◄────── chunk 1 ──────►│◄ chunk 2 ►│
//!  ──┼───────────────┼───────────────────────┼───────────┼──
//!    page n          page n+1                page n+2
//! ```

use crate::error::CopyError;
use crate::mapping::RogueMapper;
use crate::{BufferTransfer, PmemHost};
use pmem_addresses::PhysicalAddress;

/// Physical addresses are at most 52 bits wide on x86-64.
pub const MAX_PHYSICAL_ADDRESS: u64 = 1 << 52;

/// Which way bytes move relative to physical memory.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    /// Physical memory into the caller's buffer (a read).
    ToBuffer,
    /// The caller's buffer into physical memory (a write).
    FromBuffer,
}

/// Check a requested range and return its start.
fn validate(offset: i64, length: u64) -> Result<u64, CopyError> {
    let invalid = CopyError::InvalidOffset { offset, length };
    let start = u64::try_from(offset).map_err(|_| invalid)?;
    match start.checked_add(length) {
        Some(end) if end <= MAX_PHYSICAL_ADDRESS => Ok(start),
        _ => Err(invalid),
    }
}

/// Copy `length` bytes at physical `offset` to or from `buffer`.
///
/// Every chunk gets its own mapping, created right before and destroyed
/// right after its transfer. Returns the number of bytes moved, which is
/// `length` on success.
///
/// # Errors
/// - [`CopyError::InvalidOffset`] for a negative offset or a range past the
///   end of the physical address space. Nothing is mapped in that case.
/// - [`CopyError::Mapping`] if a mapping cannot be created or destroyed.
/// - [`CopyError::TransferFailed`] if the buffer accepts fewer bytes than
///   asked for. The current mapping is still torn down.
pub fn copy<H, B>(
    mapper: &mut RogueMapper<'_, H>,
    direction: Direction,
    offset: i64,
    length: u64,
    buffer: &mut B,
) -> Result<u64, CopyError>
where
    H: PmemHost + ?Sized,
    B: BufferTransfer + ?Sized,
{
    let mut cursor = validate(offset, length).inspect_err(|e| log::error!("{e}"))?;
    let mut remaining = length;
    let page_bytes = mapper.config().page_size.bytes();

    while remaining > 0 {
        let page = mapper.create(PhysicalAddress::new(cursor))?;
        let in_page = cursor - page.target().as_u64();
        let chunk = remaining.min(page_bytes - in_page);

        // SAFETY: the whole page behind `virt_addr` is mapped until `page`
        // is destroyed, and `in_page + chunk` stays inside it.
        #[allow(clippy::cast_possible_truncation)]
        let moved = unsafe { buffer.transfer(direction, page.virt_addr() + in_page, chunk as usize) }
            as u64;

        if moved != chunk {
            if let Err(e) = page.destroy() {
                log::error!("teardown after failed transfer: {e}");
            }
            let err = CopyError::TransferFailed {
                offset: cursor,
                moved,
                expected: chunk,
            };
            log::error!("{err}");
            return Err(err);
        }

        page.destroy()?;
        cursor += chunk;
        remaining -= chunk;
    }

    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_offsets_are_rejected() {
        assert_eq!(
            validate(-1, 16),
            Err(CopyError::InvalidOffset {
                offset: -1,
                length: 16
            })
        );
    }

    #[test]
    fn ranges_must_end_inside_the_physical_space() {
        assert_eq!(validate(0x1000, 0x1000), Ok(0x1000));
        assert!(validate(0, MAX_PHYSICAL_ADDRESS).is_ok());
        assert!(validate(1, MAX_PHYSICAL_ADDRESS).is_err());
        assert!(validate(i64::MAX, u64::MAX).is_err());
    }

    #[test]
    fn empty_range_at_zero_is_valid() {
        assert_eq!(validate(0, 0), Ok(0));
    }
}
