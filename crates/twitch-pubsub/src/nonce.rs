//! Request nonce generation.
//!
//! Every LISTEN/UNLISTEN request carries an 8-character alphanumeric nonce
//! that the server echoes back in its RESPONSE envelope. Uniqueness against
//! the live pending set is enforced by the session registry, which
//! regenerates on collision.

use rand::Rng;

pub(crate) const NONCE_LENGTH: usize = 8;

const NONCE_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a fresh request nonce.
pub(crate) fn generate() -> String {
    let mut rng = rand::rng();
    (0..NONCE_LENGTH)
        .map(|_| NONCE_CHARS[rng.random_range(0..NONCE_CHARS.len())] as char)
        .collect()
}
