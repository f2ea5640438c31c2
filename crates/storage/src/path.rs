//! Path validation.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path: relative, non-empty, no `..` components and no
/// null bytes. `.` components and repeated separators are dropped.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use folio_storage::validate_path;
///
/// assert_eq!(validate_path("covers/./17.jpg").unwrap(), Path::new("covers/17.jpg"));
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("covers/../17.jpg").is_err());
/// assert!(validate_path("").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(path.to_path_buf());
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) if !part.as_encoded_bytes().contains(&0) => normalized.push(part),
            Component::CurDir => {},
            _ => exn::bail!(invalid()),
        }
    }
    if normalized.as_os_str().is_empty() {
        exn::bail!(invalid());
    }
    Ok(normalized)
}
