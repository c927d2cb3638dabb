use crate::{PsramError, Result};

/// Validates that `[offset, offset + len)` lies within `[0, capacity)` and returns the range as
/// `usize` indices.
pub fn checked_range(offset: u64, len: usize, capacity: u64) -> Result<std::ops::Range<usize>> {
    let end = offset
        .checked_add(len as u64)
        .ok_or(PsramError::OffsetOverflow)?;
    if end > capacity {
        return Err(PsramError::OutOfBounds {
            offset,
            len,
            capacity,
        });
    }
    let start = usize::try_from(offset).map_err(|_| PsramError::OffsetOverflow)?;
    let end = usize::try_from(end).map_err(|_| PsramError::OffsetOverflow)?;
    Ok(start..end)
}

/// Byte offset of `offset` bytes into block `block`.
pub fn block_offset(block: u32, block_size: u32, offset: usize) -> Result<u64> {
    (block as u64)
        .checked_mul(block_size as u64)
        .and_then(|start| start.checked_add(offset as u64))
        .ok_or(PsramError::OffsetOverflow)
}
