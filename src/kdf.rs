//! Password-based key derivation using PBKDF2-HMAC-SHA256.
//!
//! The hash, iteration count and output length are part of the container
//! format: a container can only be opened with exactly the parameters it was
//! sealed with, and the format has no field recording them.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Length of salt in bytes
pub const SALT_LEN: usize = 16;

/// Length of derived key in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// PBKDF2 iteration count
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// A derived AES-256 key, wiped from memory on drop.
pub type DerivedKey = Zeroizing<[u8; KEY_LEN]>;

/// Derive a 32-byte key from a password and salt.
///
/// Deterministic: the same password and salt always give the same key. Any
/// password is accepted, including the empty one.
pub fn derive_key(password: &[u8], salt: &[u8; SALT_LEN]) -> DerivedKey {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ROUNDS, &mut *key);
    key
}
