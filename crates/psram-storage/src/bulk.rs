//! Bulk byte operations used by every region access path.
//!
//! The slice forms are what the rest of the crate uses. [`raw`] keeps the unchecked
//! `(address, count)` contract for callers that only have hardware addresses.

/// Copies `min(dest.len(), src.len())` bytes from `src` into `dest` and returns the count.
#[inline]
pub fn copy(dest: &mut [u8], src: &[u8]) -> usize {
    let n = dest.len().min(src.len());
    dest[..n].copy_from_slice(&src[..n]);
    n
}

/// Writes `value` into every byte of `dest`.
#[inline]
pub fn fill(dest: &mut [u8], value: u8) {
    dest.fill(value);
}

/// Returns the 1-based position of the first `target` byte in `haystack`, or `haystack.len()` if
/// there is none.
///
/// Either way the result is the number of bytes a line-oriented reader should consume.
#[inline]
pub fn find_byte(haystack: &[u8], target: u8) -> usize {
    haystack
        .iter()
        .position(|&b| b == target)
        .map_or(haystack.len(), |i| i + 1)
}

/// Unchecked pointer forms of the bulk operations.
pub mod raw {
    /// Copies `n` bytes from `src` to `dest` and returns `n`.
    ///
    /// # Safety
    ///
    /// `src` must be valid for `n` byte reads and `dest` valid for `n` byte writes. The ranges may
    /// overlap.
    #[inline]
    pub unsafe fn copy(dest: *mut u8, src: *const u8, n: usize) -> usize {
        // SAFETY: upheld by the caller.
        unsafe { core::ptr::copy(src, dest, n) };
        n
    }

    /// Writes `value` into `n` bytes starting at `dest`.
    ///
    /// # Safety
    ///
    /// `dest` must be valid for `n` byte writes.
    #[inline]
    pub unsafe fn fill(dest: *mut u8, value: u8, n: usize) {
        // SAFETY: upheld by the caller.
        unsafe { core::ptr::write_bytes(dest, value, n) };
    }

    /// Pointer form of [`super::find_byte`].
    ///
    /// # Safety
    ///
    /// `addr` must be valid for `n` byte reads.
    #[inline]
    pub unsafe fn find_byte(addr: *const u8, n: usize, target: u8) -> usize {
        if n == 0 {
            return 0;
        }
        // SAFETY: upheld by the caller.
        let haystack = unsafe { core::slice::from_raw_parts(addr, n) };
        super::find_byte(haystack, target)
    }
}
