//! Utility functions for pmwal
//!
//! Small helpers shared by the persistence code.

/// Check if a value is a power of two
#[inline]
pub const fn is_power_of_two(n: u64) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Round `addr` down to the start of its `alignment`-sized block
#[inline]
pub const fn align_down(addr: usize, alignment: usize) -> usize {
    debug_assert!(is_power_of_two(alignment as u64));
    addr & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_power_of_two() {
        assert!(!is_power_of_two(0));
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(2));
        assert!(!is_power_of_two(3));
        assert!(is_power_of_two(64));
        assert!(!is_power_of_two(1023));
    }

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(0, 64), 0);
        assert_eq!(align_down(63, 64), 0);
        assert_eq!(align_down(64, 64), 64);
        assert_eq!(align_down(200, 64), 192);
    }
}
