//! Encryption/decryption using PBKDF2 + AES-256-CBC
//!
//! This module implements password-based encryption using:
//! - PBKDF2-HMAC-SHA256 (100,000 rounds) for key derivation from the password
//! - AES-256 in CBC mode with PKCS#7 padding
//!
//! The binary format is:
//! - salt: 16 bytes
//! - iv: 16 bytes
//! - ciphertext: variable length, a multiple of 16 bytes
//!
//! There is no magic number, version or length field; a container is
//! recognised purely by its shape. There is also no authentication tag, so
//! tampering with the ciphertext is only noticed when it happens to break
//! the padding of the final block.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{ErrorCategory, ErrorKind, ImagecryptError, Result};
use crate::kdf::{self, KEY_LEN, SALT_LEN};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Length of the CBC initialization vector in bytes
pub const IV_LEN: usize = 16;

/// AES block size in bytes
pub const BLOCK_LEN: usize = 16;

/// Length of the salt + iv header
pub const HEADER_LEN: usize = SALT_LEN + IV_LEN;

/// An encrypted file: `salt || iv || ciphertext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container(Vec<u8>);

impl Container {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the salt, iv and ciphertext. Containers built by this module
    /// always have a valid shape.
    pub fn parts(&self) -> Result<ContainerParts<'_>> {
        ContainerParts::parse(&self.0)
    }
}

impl AsRef<[u8]> for Container {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Container> for Vec<u8> {
    fn from(container: Container) -> Self {
        container.0
    }
}

/// Borrowed view of a container's three fields.
#[derive(Debug, Clone, Copy)]
pub struct ContainerParts<'a> {
    pub salt: &'a [u8; SALT_LEN],
    pub iv: &'a [u8; IV_LEN],
    pub ciphertext: &'a [u8],
}

impl<'a> ContainerParts<'a> {
    /// Split raw bytes into salt, iv and ciphertext, checking only the shape.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let too_short = || {
            ImagecryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::MalformedContainer,
                format!(
                    "input too short to be an encrypted file: {} bytes, need at least {}",
                    bytes.len(),
                    HEADER_LEN
                ),
            )
        };

        let (salt, rest) = bytes.split_first_chunk::<SALT_LEN>().ok_or_else(too_short)?;
        let (iv, ciphertext) = rest.split_first_chunk::<IV_LEN>().ok_or_else(too_short)?;

        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(ImagecryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::MalformedContainer,
                format!(
                    "truncated or corrupt input; ciphertext length {} is not a multiple of {}",
                    ciphertext.len(),
                    BLOCK_LEN
                ),
            ));
        }

        Ok(Self {
            salt,
            iv,
            ciphertext,
        })
    }
}

/// Size of the container produced for a plaintext of `plaintext_len` bytes.
///
/// Padding always adds between 1 and 16 bytes, so block-aligned input grows
/// by a full block.
pub fn container_len(plaintext_len: usize) -> usize {
    HEADER_LEN + (plaintext_len / BLOCK_LEN + 1) * BLOCK_LEN
}

/// Encrypt plaintext with a password using random salt and iv
pub fn encrypt(plaintext: &[u8], password: &[u8]) -> Result<Container> {
    let mut salt = [0u8; SALT_LEN];
    fill_random(&mut salt)?;

    let mut iv = [0u8; IV_LEN];
    fill_random(&mut iv)?;

    Ok(encrypt_deterministic(plaintext, password, &salt, &iv))
}

/// Encrypt plaintext with a password using the provided salt and iv
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - reusing a salt/iv pair under one password
/// leaks plaintext relationships. Use `encrypt()` instead.
pub fn encrypt_deterministic(
    plaintext: &[u8],
    password: &[u8],
    salt: &[u8; SALT_LEN],
    iv: &[u8; IV_LEN],
) -> Container {
    let key = kdf::derive_key(password, salt);
    let ciphertext = seal(&key, iv, plaintext);

    let mut output = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    output.extend_from_slice(salt);
    output.extend_from_slice(iv);
    output.extend_from_slice(&ciphertext);

    Container(output)
}

/// Decrypt a container with a password
///
/// The shape is checked before the (slow) key derivation runs.
pub fn decrypt(container: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    let parts = ContainerParts::parse(container)?;
    let key = kdf::derive_key(password, parts.salt);
    open(&key, parts.iv, parts.ciphertext)
}

fn seal(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(&(*key).into(), &(*iv).into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

fn open(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    // No final block means no padding to validate.
    if ciphertext.is_empty() {
        return Err(padding_error());
    }

    Aes256CbcDec::new(&(*key).into(), &(*iv).into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| padding_error())
}

fn padding_error() -> ImagecryptError {
    ImagecryptError::with_kind(
        ErrorCategory::User,
        ErrorKind::PaddingError,
        "decryption failed: wrong password or corrupted data",
    )
}

pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        ImagecryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::EntropyUnavailable,
            "failed to read from the OS random source",
            e,
        )
    })
}
