//! Power-of-two alignment arithmetic over `usize` addresses and sizes.

/// Rounds `n` up to the next multiple of `alignment`.
///
/// If `n` is already aligned, it is returned unchanged.
///
/// # Examples
///
/// ```
/// use pixmem_bytes::align::align_up;
///
/// assert_eq!(align_up(0, 64), 0);
/// assert_eq!(align_up(1, 64), 64);
/// assert_eq!(align_up(64, 64), 64);
/// assert_eq!(align_up(65, 64), 128);
/// ```
///
/// # Panics
///
/// Panics in debug builds if `alignment` is not a power of two, or if the
/// result does not fit in `usize`. Use [`checked_align_up`] when `n` comes
/// from an untrusted size computation.
#[inline]
pub fn align_up(n: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (n + alignment - 1) & !(alignment - 1)
}

/// Rounds `n` up to the next multiple of `alignment`, returning `None` when the
/// rounded value cannot be represented.
///
/// # Examples
///
/// ```
/// use pixmem_bytes::align::checked_align_up;
///
/// assert_eq!(checked_align_up(4097, 4096), Some(8192));
/// assert_eq!(checked_align_up(usize::MAX, 4096), None);
/// ```
#[inline]
pub fn checked_align_up(n: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    n.checked_add(alignment - 1).map(|n| n & !(alignment - 1))
}

/// Checks whether `n` lies on an `alignment` boundary.
#[inline]
pub fn is_aligned(n: usize, alignment: usize) -> bool {
    debug_assert!(alignment.is_power_of_two());
    (n & (alignment - 1)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up_page() {
        assert_eq!(align_up(1, 4096), 4096);
        assert_eq!(align_up(4096, 4096), 4096);
        assert_eq!(align_up(4096 * 3 + 100, 4096), 4096 * 4);
    }

    #[test]
    fn test_checked_align_up_near_max() {
        let max_aligned = usize::MAX & !63;
        assert_eq!(checked_align_up(max_aligned, 64), Some(max_aligned));
        assert_eq!(checked_align_up(max_aligned + 1, 64), None);
        assert_eq!(checked_align_up(0, 4096), Some(0));
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned(0, 16));
        assert!(is_aligned(32, 16));
        assert!(!is_aligned(33, 16));
        assert!(is_aligned(8192, 4096));
        assert!(!is_aligned(72, 16));
    }
}
