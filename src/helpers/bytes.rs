//! Little-endian integer decoding for the binary workbook readers.
//!
//! Inputs shorter than the target width are zero-padded, so a truncated
//! record reads as zeros instead of panicking. Callers check lengths where it
//! matters.

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buffer = [0u8; N];
    let size = N.min(bytes.len());
    buffer[..size].copy_from_slice(&bytes[..size]);
    buffer
}

#[inline]
pub(crate) fn to_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes(le(bytes))
}

#[inline]
pub(crate) fn to_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(le(bytes))
}

#[inline]
pub(crate) fn to_u64(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(le(bytes))
}

#[inline]
pub(crate) fn to_f64(bytes: &[u8]) -> f64 {
    f64::from_le_bytes(le(bytes))
}

#[inline]
pub(crate) fn to_usize(bytes: &[u8]) -> usize {
    to_u32(bytes) as usize
}

/// Splits bytes into 4-byte little-endian words; a trailing partial word is dropped.
pub(crate) fn to_usize_iter(bytes: &[u8]) -> impl Iterator<Item = usize> + '_ {
    bytes.chunks_exact(4).map(to_usize)
}
