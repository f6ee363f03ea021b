//! Bernstein (djb2) hash over raw key bytes.

/// Starting value of the running hash.
pub const SEED: u32 = 5381;

/// Hash `key` with `h = h * 33 + c` over each byte, wrapping on overflow.
///
/// Pure and deterministic: no per-process seed, so a key lands in the same
/// bucket for the lifetime of a table (and across tables of equal capacity).
#[inline]
pub fn bernstein_hash(key: &[u8]) -> u32 {
    key.iter()
        .fold(SEED, |h, &c| h.wrapping_mul(33).wrapping_add(u32::from(c)))
}
