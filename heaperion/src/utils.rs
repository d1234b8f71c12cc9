/// Align `addr` upwards to `align`.
///
/// Requires that `align` is a power of two.
#[inline]
pub const fn align_up(addr: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (addr + align - 1) & !(align - 1)
}

/// Number of `block_size` blocks needed to hold `len` bytes.
#[inline]
pub const fn blocks_for(len: usize, block_size: usize) -> usize {
    len.div_ceil(block_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(129, 128), 256);
    }

    #[test]
    fn test_blocks_for() {
        assert_eq!(blocks_for(1, 128), 1);
        assert_eq!(blocks_for(128, 128), 1);
        assert_eq!(blocks_for(129, 128), 2);
        assert_eq!(blocks_for(1000, 128), 8);
    }
}
