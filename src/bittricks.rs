// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
size arithmetic.
*/

/// Rounds `value` up to the next multiple of `alignment`.
///
/// An alignment of 0 means "unaligned" and returns `value` unchanged.
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Smallest power of two greater than or equal to `value`.  `next_pow2(0) == 1`.
///
/// Saturates at `u64::MAX` past the largest power of two, which no device can allocate.
pub const fn next_pow2(value: u64) -> u64 {
    match value.checked_next_power_of_two() {
        Some(pow2) => pow2,
        None => u64::MAX,
    }
}

/// Human-readable byte count, e.g. `4.0 MB`.
pub fn pretty_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];
    if size < 1024 {
        return format!("{size} bytes");
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(13, 0), 13);
    }

    #[test]
    fn pow2() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(3), 4);
        assert_eq!(next_pow2(4 * 1024 * 1024 + 1), 8 * 1024 * 1024);
        assert_eq!(next_pow2((1 << 63) + 1), u64::MAX);
    }

    #[test]
    fn pretty() {
        assert_eq!(pretty_size(12), "12 bytes");
        assert_eq!(pretty_size(1536), "1.5 KB");
        assert_eq!(pretty_size(4 * 1024 * 1024), "4.0 MB");
    }
}
