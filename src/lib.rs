//! imagecrypt - Password-based file encryption using PBKDF2 and AES-256-CBC
//!
//! Files are sealed into a self-describing container,
//! `salt(16) || iv(16) || AES-256-CBC(PKCS#7(plaintext))`, so that the
//! password alone is enough to open them again. The container carries no
//! authentication tag.

#![forbid(unsafe_code)]

pub mod container;
pub mod error;
pub mod file_ops;
pub mod kdf;
pub mod operation;
pub mod passphrase;
#[cfg(feature = "web")]
pub mod web;

pub use container::{Container, decrypt, encrypt};
pub use error::{ErrorCategory, ErrorKind, ImagecryptError, Result};
pub use operation::{Operation, output_name};
