//! Fixed-width base-62 encoding of `u64` values.

const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const BASE: u64 = ALPHABET.len() as u64;

/// Number of digits needed for any `u64` (62^11 > 2^64).
pub const ENCODED_LEN: usize = 11;

/// Encodes `value` least-significant digit first.
///
/// Short values are padded with the zero digit (`'a'`), so the output is
/// always [`ENCODED_LEN`] characters long.
pub fn encode(mut value: u64) -> String {
    let mut encoded = String::with_capacity(ENCODED_LEN);
    for _ in 0..ENCODED_LEN {
        encoded.push(ALPHABET[(value % BASE) as usize] as char);
        value /= BASE;
    }
    encoded
}
