//! File encryption/decryption operations
//!
//! This module provides high-level file operations for encrypting and
//! decrypting files on disk using the container format.

use crate::error::{ErrorCategory, ErrorKind, ImagecryptError, Result};
use crate::operation::{self, Operation};
use crate::passphrase::PassphraseReader;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Encrypt a file with a password
///
/// Reads plaintext from `input_path`, encrypts it using a password from
/// `passphrase_reader`, and writes the container to `output_path`.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn encrypt_file(
    input_path: &Path,
    output_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
) -> Result<()> {
    process_file(Operation::Encrypt, input_path, output_path, passphrase_reader)
}

/// Decrypt a file with a password
///
/// Reads a container from `input_path`, decrypts it using a password from
/// `passphrase_reader`, and writes the plaintext to `output_path`. Nothing
/// is written when decryption fails.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn decrypt_file(
    input_path: &Path,
    output_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
) -> Result<()> {
    process_file(Operation::Decrypt, input_path, output_path, passphrase_reader)
}

/// Apply `op` to the file at `input_path` and write the result to `output_path`.
pub fn process_file(
    op: Operation,
    input_path: &Path,
    output_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
) -> Result<()> {
    let input = fs::read(input_path).map_err(|e| read_error(input_path, e))?;
    let passphrase = passphrase_reader.read_passphrase()?;

    debug!(%op, input = %input_path.display(), bytes = input.len(), "processing file");
    let output = op
        .apply(&input, &passphrase)
        .map_err(|e| e.with_context(format!("failed to {}", op)))?;

    write_file_atomic(output_path, &output)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    info!(%op, output = %output_path.display(), bytes = output.len(), "wrote output");

    Ok(())
}

/// Where the result of `op` on `input_path` goes when no output is given:
/// the same directory, named by [`operation::output_name`].
pub fn default_output_path(input_path: &Path, op: Operation) -> Result<PathBuf> {
    let file_name = input_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            ImagecryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidName,
                format!(
                    "cannot derive an output name from {}; pass --output",
                    input_path.display()
                ),
            )
        })?;

    Ok(input_path.with_file_name(operation::output_name(file_name, op)))
}

/// Write `contents` to `path` atomically (tempfile + fsync + rename).
///
/// Either the previous file or the complete new file exists at `path`,
/// never a partial one. The new file has mode 0o600 on Unix.
pub fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => {
            return Err(ImagecryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("{} has no parent directory", path.display()),
            ));
        }
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        ImagecryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to create tempfile in {}", dir.display()),
            e,
        )
    })?;

    temp_file.write_all(contents).map_err(|e| {
        ImagecryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write to tempfile",
            e,
        )
    })?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file.flush().map_err(|e| {
        ImagecryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush tempfile",
            e,
        )
    })?;
    temp_file.as_file().sync_all().map_err(|e| {
        ImagecryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    // NamedTempFile already creates 0o600 files on Unix; make it explicit
    // since the rename keeps whatever mode the tempfile has.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| {
                ImagecryptError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to set tempfile permissions",
                    e,
                )
            })?;
    }

    temp_file.persist(path).map_err(|e| {
        ImagecryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

fn read_error(path: &Path, err: io::Error) -> ImagecryptError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    ImagecryptError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container;
    use crate::passphrase::ConstantPassphraseReader;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.png");
        let crypt_path = temp_dir.path().join("plain_encryption.png");
        let decrypted_path = temp_dir.path().join("plain_encryption_decryption.png");

        let plaintext = b"\x89PNG\r\n\x1a\nnot really an image";
        fs::write(&plain_path, plaintext).unwrap();

        let mut reader = ConstantPassphraseReader::new(b"test password".to_vec());
        encrypt_file(&plain_path, &crypt_path, &mut reader).unwrap();
        assert_eq!(
            fs::metadata(&crypt_path).unwrap().len() as usize,
            container::container_len(plaintext.len())
        );

        let mut reader = ConstantPassphraseReader::new(b"test password".to_vec());
        decrypt_file(&crypt_path, &decrypted_path, &mut reader).unwrap();
        let decrypted = fs::read(&decrypted_path).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_wrong_passphrase_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let crypt_path = temp_dir.path().join("crypt.bin");
        let decrypted_path = temp_dir.path().join("decrypted.txt");

        let sealed = container::encrypt_deterministic(
            b"secret data",
            b"correct",
            &[0x42; crate::kdf::SALT_LEN],
            &[0x24; container::IV_LEN],
        );
        fs::write(&crypt_path, sealed.as_bytes()).unwrap();

        let mut reader = ConstantPassphraseReader::new(b"wrong".to_vec());
        let err = decrypt_file(&crypt_path, &decrypted_path, &mut reader).unwrap_err();

        assert_eq!(err.kind, Some(ErrorKind::PaddingError));
        assert_eq!(err.to_string(), "failed to decrypt");
        assert!(!decrypted_path.exists());
    }

    #[test]
    fn test_decrypt_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let crypt_path = temp_dir.path().join("not-encrypted.txt");
        let decrypted_path = temp_dir.path().join("out.txt");

        fs::write(&crypt_path, b"just some text").unwrap();

        let mut reader = ConstantPassphraseReader::new(b"test".to_vec());
        let err = decrypt_file(&crypt_path, &decrypted_path, &mut reader).unwrap_err();

        assert_eq!(err.kind, Some(ErrorKind::MalformedContainer));
        assert!(!decrypted_path.exists());
    }

    #[test]
    fn test_missing_input_is_user_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.jpg");

        let mut reader = ConstantPassphraseReader::new(b"test".to_vec());
        let err = encrypt_file(&missing, &temp_dir.path().join("out"), &mut reader).unwrap_err();

        assert_eq!(err.category, ErrorCategory::User);
        assert_eq!(err.kind, Some(ErrorKind::Io));
    }

    #[test]
    #[cfg(unix)]
    fn test_file_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        let crypt_path = temp_dir.path().join("plain_encryption.txt");

        fs::write(&plain_path, b"test").unwrap();

        let mut reader = ConstantPassphraseReader::new(b"test".to_vec());
        encrypt_file(&plain_path, &crypt_path, &mut reader).unwrap();

        let metadata = fs::metadata(&crypt_path).unwrap();
        let permissions = metadata.permissions();
        assert_eq!(permissions.mode() & 0o777, 0o600);
    }

    #[test]
    fn test_overwrites_existing_output() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.bin");

        fs::write(&path, b"old contents that are longer").unwrap();
        write_file_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("empty.txt");
        let crypt_path = temp_dir.path().join("empty_encryption.txt");
        let decrypted_path = temp_dir.path().join("empty_decryption.txt");

        fs::write(&plain_path, b"").unwrap();

        let mut reader = ConstantPassphraseReader::new(b"test".to_vec());
        encrypt_file(&plain_path, &crypt_path, &mut reader).unwrap();
        assert_eq!(fs::metadata(&crypt_path).unwrap().len(), 48);

        let mut reader = ConstantPassphraseReader::new(b"test".to_vec());
        decrypt_file(&crypt_path, &decrypted_path, &mut reader).unwrap();

        let decrypted = fs::read(&decrypted_path).unwrap();
        assert_eq!(decrypted, b"");
    }

    #[test]
    fn test_default_output_path() {
        let path = default_output_path(Path::new("/tmp/pics/cat.jpeg"), Operation::Encrypt).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/pics/cat_encryption.jpeg"));

        let path = default_output_path(Path::new("cat_encryption.jpeg"), Operation::Decrypt).unwrap();
        assert_eq!(path, PathBuf::from("cat_encryption_decryption.jpeg"));

        let err = default_output_path(Path::new("/"), Operation::Encrypt).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::InvalidName));
    }
}
