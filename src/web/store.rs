//! Output storage for the web front end.
//!
//! Each result of `/process` is written to `{dir}/{token}/{name}`, where the
//! token is fresh randomness for that request. Two uploads with the same
//! file name therefore never share a path, and a result can only be fetched
//! by whoever got its token back. Entries older than the retention period
//! are removed by [`OutputStore::remove_expired`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use tracing::{debug, warn};

use crate::container;
use crate::error::{ErrorCategory, ErrorKind, ImagecryptError, Result};
use crate::file_ops;

/// Random bytes behind each token.
const TOKEN_BYTES: usize = 16;

/// Length of an encoded token (unpadded URL-safe base64 of [`TOKEN_BYTES`]).
pub const TOKEN_LEN: usize = 22;

#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: Arc<PathBuf>,
}

/// Where [`OutputStore::save`] put a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOutput {
    pub token: String,
    pub name: String,
    pub path: PathBuf,
}

impl OutputStore {
    /// Use `dir` for outputs, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            ImagecryptError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to create output directory {}", dir.display()),
                e,
            )
        })?;
        Ok(Self { dir: Arc::new(dir) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the output `name` stored under `token`. Only bare file names
    /// and well-formed tokens are accepted.
    pub fn resolve(&self, token: &str, name: &str) -> Result<PathBuf> {
        validate_token(token)?;
        validate_name(name)?;
        Ok(self.dir.join(token).join(name))
    }

    /// Store `contents` as `name` under a new token.
    pub fn save(&self, name: &str, contents: &[u8]) -> Result<StoredOutput> {
        validate_name(name)?;

        let token = new_token()?;
        let entry = self.dir.join(&token);
        fs::create_dir(&entry).map_err(|e| {
            ImagecryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to create {}", entry.display()),
                e,
            )
        })?;

        let path = entry.join(name);
        file_ops::write_file_atomic(&path, contents)?;
        Ok(StoredOutput {
            token,
            name: name.to_string(),
            path,
        })
    }

    /// Delete every stored entry last modified at least `max_age` ago.
    /// Returns the number of entries removed. Anything in the directory that
    /// does not look like a token entry is left alone.
    pub fn remove_expired(&self, max_age: Duration) -> Result<usize> {
        let entries = fs::read_dir(self.dir.as_path()).map_err(|e| {
            ImagecryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to list {}", self.dir.display()),
                e,
            )
        })?;

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_token_dir = entry.file_type().is_ok_and(|t| t.is_dir())
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| validate_token(name).is_ok());
            if !is_token_dir {
                continue;
            }

            let age = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => now.duration_since(modified).unwrap_or_default(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot stat stored output");
                    continue;
                }
            };
            if age < max_age {
                continue;
            }

            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "removed expired output");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove expired output"),
            }
        }
        Ok(removed)
    }
}

fn new_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    container::fill_random(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn validate_token(token: &str) -> Result<()> {
    let valid = token.len() == TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if !valid {
        return Err(ImagecryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidName,
            format!("invalid download token {:?}", token),
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);

    if invalid {
        return Err(ImagecryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidName,
            format!("invalid file name {:?}", name),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_resolve() {
        let temp_dir = TempDir::new().unwrap();
        let store = OutputStore::new(temp_dir.path().join("output")).unwrap();
        assert!(store.dir().is_dir());

        let stored = store.save("cat_encryption.png", b"data").unwrap();
        assert_eq!(stored.token.len(), TOKEN_LEN);
        assert_eq!(stored.name, "cat_encryption.png");
        assert_eq!(
            stored.path,
            store.resolve(&stored.token, "cat_encryption.png").unwrap()
        );
        assert_eq!(fs::read(&stored.path).unwrap(), b"data");
    }

    #[test]
    fn test_same_name_gets_separate_entries() {
        let temp_dir = TempDir::new().unwrap();
        let store = OutputStore::new(temp_dir.path()).unwrap();

        let first = store.save("photo_decryption.jpg", b"first").unwrap();
        let second = store.save("photo_decryption.jpg", b"second").unwrap();

        assert_ne!(first.token, second.token);
        assert_ne!(first.path, second.path);
        assert_eq!(fs::read(&first.path).unwrap(), b"first");
        assert_eq!(fs::read(&second.path).unwrap(), b"second");
    }

    #[test]
    fn test_rejects_path_like_names() {
        let temp_dir = TempDir::new().unwrap();
        let store = OutputStore::new(temp_dir.path()).unwrap();
        let token = "A".repeat(TOKEN_LEN);

        for name in ["", ".", "..", "../escape", "a/b", r"a\b", "nul\0byte"] {
            let err = store.resolve(&token, name).unwrap_err();
            assert_eq!(err.kind, Some(ErrorKind::InvalidName), "name {:?}", name);
        }
        assert!(store.save("../escape", b"x").is_err());
        assert!(!temp_dir.path().parent().unwrap().join("escape").exists());
    }

    #[test]
    fn test_rejects_control_characters() {
        let temp_dir = TempDir::new().unwrap();
        let store = OutputStore::new(temp_dir.path()).unwrap();
        let token = "A".repeat(TOKEN_LEN);

        for name in ["bell\x07.png", "line\nbreak.png", "tab\t.png", "del\x7f.png"] {
            let err = store.resolve(&token, name).unwrap_err();
            assert_eq!(err.kind, Some(ErrorKind::InvalidName), "name {:?}", name);
            assert_eq!(err.category, ErrorCategory::User);
        }
        assert!(store.save("line\nbreak.png", b"x").is_err());
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        let temp_dir = TempDir::new().unwrap();
        let store = OutputStore::new(temp_dir.path()).unwrap();

        let too_short = "A".repeat(TOKEN_LEN - 1);
        let traversal = format!("..{}", "A".repeat(TOKEN_LEN - 2));
        let dotted = format!("{}.", "A".repeat(TOKEN_LEN - 1));
        for token in ["", too_short.as_str(), traversal.as_str(), dotted.as_str()] {
            let err = store.resolve(token, "cat.png").unwrap_err();
            assert_eq!(err.kind, Some(ErrorKind::InvalidName), "token {:?}", token);
        }
    }

    #[test]
    fn test_dotted_names_are_fine() {
        let temp_dir = TempDir::new().unwrap();
        let store = OutputStore::new(temp_dir.path()).unwrap();
        let token = "A".repeat(TOKEN_LEN);

        assert!(store.resolve(&token, ".._encryption").is_ok());
        assert!(store.resolve(&token, ".hidden_decryption").is_ok());
    }

    #[test]
    fn test_remove_expired() {
        let temp_dir = TempDir::new().unwrap();
        let store = OutputStore::new(temp_dir.path()).unwrap();
        let stored = store.save("cat_encryption.png", b"data").unwrap();
        fs::write(temp_dir.path().join("keep.txt"), b"not ours").unwrap();

        assert_eq!(store.remove_expired(Duration::from_secs(3600)).unwrap(), 0);
        assert!(stored.path.exists());

        assert_eq!(store.remove_expired(Duration::ZERO).unwrap(), 1);
        assert!(!stored.path.exists());
        assert!(!temp_dir.path().join(&stored.token).exists());
        assert!(temp_dir.path().join("keep.txt").exists());
    }
}
