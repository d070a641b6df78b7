//! Byte-level helpers shared across the protocol engine.
//!
//! The NTAG 424 command set leans on a handful of small bit tricks:
//! nibble-packed permissions, single-byte rotations during authentication,
//! 24-bit little-endian lengths and offsets, and ISO/IEC 9797-1 padding
//! method 2 for the encrypted communication mode.

/// High nibble of a byte.
pub const fn left_nibble(byte: u8) -> u8 {
    byte >> 4
}

/// Low nibble of a byte.
pub const fn right_nibble(byte: u8) -> u8 {
    byte & 0x0f
}

/// Test a bit by its LSB-first index.
pub const fn bit_lsb(byte: u8, index: u8) -> bool {
    byte & (1 << index) != 0
}

/// Rotate a byte string left by one position (first byte moves to the end).
pub fn rotate_left(value: &[u8]) -> Vec<u8> {
    if value.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(value.len());
    out.extend_from_slice(&value[1..]);
    out.push(value[0]);
    out
}

/// Rotate a byte string right by one position (last byte moves to the front).
pub fn rotate_right(value: &[u8]) -> Vec<u8> {
    if value.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(value.len());
    out.push(value[value.len() - 1]);
    out.extend_from_slice(&value[..value.len() - 1]);
    out
}

/// Byte-wise XOR of two equal-length slices.
///
/// Panics in debug builds if the lengths differ; callers validate lengths
/// before reaching this point.
pub fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

/// Read a 24-bit little-endian value.
pub const fn read_le24(bytes: &[u8; 3]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}

/// Write the low 24 bits of a value as little-endian bytes.
pub const fn write_le24(value: u32) -> [u8; 3] {
    let b = value.to_le_bytes();
    [b[0], b[1], b[2]]
}

/// Pad a message per ISO/IEC 9797-1 padding method 2: append 0x80, then
/// zeros up to the next 16-byte boundary. A full padding block is added when
/// the message is already block-aligned.
pub fn pad_message(message: &[u8]) -> Vec<u8> {
    let blocks = message.len() / 16 + 1;
    let mut out = vec![0u8; blocks * 16];
    out[..message.len()].copy_from_slice(message);
    out[message.len()] = 0x80;
    out
}

/// Strip ISO/IEC 9797-1 method-2 padding: trailing zeros, then the 0x80
/// marker. Returns `None` when the marker is absent.
pub fn unpad_message(message: &[u8]) -> Option<&[u8]> {
    let mut end = message.len();
    while end > 0 && message[end - 1] == 0x00 {
        end -= 1;
    }
    if end > 0 && message[end - 1] == 0x80 {
        Some(&message[..end - 1])
    } else {
        None
    }
}
