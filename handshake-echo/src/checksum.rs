//! One's-complement payload checksum.

/// Compute the one's-complement checksum of `data`.
///
/// Consecutive bytes are paired into big-endian 16-bit words and summed,
/// folding any carry above bit 15 back into the low word.  An odd trailing
/// byte is added as-is.  The result is the bitwise complement of the sum.
///
/// Callers pass exactly the `len` payload bytes, never slot padding.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum = fold(sum + u32::from(u16::from_be_bytes([word[0], word[1]])));
    }
    if let [last] = words.remainder() {
        sum = fold(sum + u32::from(*last));
    }

    !(sum as u16)
}

#[inline]
fn fold(mut sum: u32) -> u32 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum
}
