//! The encrypt/decrypt choice and the output naming convention

use std::fmt;
use std::str::FromStr;

use crate::container::{self, Container};
use crate::error::{ErrorCategory, ErrorKind, ImagecryptError, Result};

/// What to do with a submitted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Encrypt,
    Decrypt,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Encrypt => "encrypt",
            Operation::Decrypt => "decrypt",
        }
    }

    /// Suffix inserted between the base name and the extension of an output.
    pub fn suffix(self) -> &'static str {
        match self {
            Operation::Encrypt => "_encryption",
            Operation::Decrypt => "_decryption",
        }
    }

    /// Run the operation on an in-memory buffer.
    pub fn apply(self, input: &[u8], password: &[u8]) -> Result<Vec<u8>> {
        match self {
            Operation::Encrypt => container::encrypt(input, password).map(Container::into_bytes),
            Operation::Decrypt => container::decrypt(input, password),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ImagecryptError;

    /// Only the exact lowercase names are accepted.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "encrypt" => Ok(Operation::Encrypt),
            "decrypt" => Ok(Operation::Decrypt),
            _ => Err(ImagecryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::UnknownOperation,
                format!("unknown operation {:?}; expected \"encrypt\" or \"decrypt\"", s),
            )),
        }
    }
}

/// Final path component of `name`, accepting both `/` and `\` separators.
pub fn base_name(name: &str) -> &str {
    match name.rfind(['/', '\\']) {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

/// Split `name` into base and extension at the last dot of its final
/// component. Leading dots do not start an extension, so `.bashrc` has
/// none, while `file.` has the extension `.`.
pub fn split_name(name: &str) -> (&str, &str) {
    let file_start = name.len() - base_name(name).len();
    if let Some(dot) = name.rfind('.') {
        if dot >= file_start && name[file_start..dot].bytes().any(|b| b != b'.') {
            return name.split_at(dot);
        }
    }
    (name, "")
}

/// Suggested name for the result of applying `op` to a file called `name`:
/// `<base>_encryption<ext>` or `<base>_decryption<ext>`.
pub fn output_name(name: &str, op: Operation) -> String {
    let (base, ext) = split_name(name);
    format!("{}{}{}", base, op.suffix(), ext)
}
