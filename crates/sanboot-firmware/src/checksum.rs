//! Byte checksums used by ACPI-style firmware tables.

/// Wrapping sum of every byte in `bytes`.
pub fn byte_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// A region is valid when all of its bytes (including the checksum byte) sum to zero.
pub fn checksum_valid(bytes: &[u8]) -> bool {
    byte_sum(bytes) == 0
}

/// Rewrite the checksum byte at `checksum_offset` so that `bytes` sums to zero.
///
/// Does nothing if `checksum_offset` is outside `bytes`.
pub fn checksum_fixup(bytes: &mut [u8], checksum_offset: usize) {
    let Some(slot) = bytes.get_mut(checksum_offset) else {
        return;
    };
    *slot = 0;
    let sum = byte_sum(bytes);
    bytes[checksum_offset] = 0u8.wrapping_sub(sum);
}
