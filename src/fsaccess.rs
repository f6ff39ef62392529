//! Abstracted filesystem access for output verification.
//!
//! The comparator checks file existence, contents, checksums, and sizes
//! through this capability so it can be tested without touching disk and
//! extended to non-local storage.

use std::fs;
use std::io::Read;
use std::path::Path;

/// Filesystem operations the comparator needs.
///
/// Paths may be plain paths or `file://` URIs; implementations resolve
/// them against their own base directory.
pub trait FsAccess {
    /// Whether the resource is an existing regular file.
    fn is_file(&self, path: &str) -> bool;

    /// Whether the resource is an existing directory.
    fn is_dir(&self, path: &str) -> bool;

    /// Open the resource for reading.
    fn open(&self, path: &str) -> std::io::Result<Box<dyn Read>>;

    /// Size of the resource in bytes.
    fn size(&self, path: &str) -> std::io::Result<u64>;
}

/// Determine an absolute local path from a plain path or `file://` URI,
/// resolving relative paths against `basedir`.
pub fn abspath(src: &str, basedir: &str) -> String {
    if let Some(rest) = src.strip_prefix("file://") {
        return rest.to_string();
    }
    if Path::new(src).is_absolute() || basedir.is_empty() {
        return src.to_string();
    }
    Path::new(basedir).join(src).display().to_string()
}

/// Local-disk implementation.
pub struct StdFsAccess {
    basedir: String,
}

impl StdFsAccess {
    /// Operate with respect to a base directory (may be empty).
    pub fn new(basedir: impl Into<String>) -> Self {
        StdFsAccess {
            basedir: basedir.into(),
        }
    }

    fn abs(&self, path: &str) -> String {
        abspath(path, &self.basedir)
    }
}

impl FsAccess for StdFsAccess {
    fn is_file(&self, path: &str) -> bool {
        Path::new(&self.abs(path)).is_file()
    }

    fn is_dir(&self, path: &str) -> bool {
        Path::new(&self.abs(path)).is_dir()
    }

    fn open(&self, path: &str) -> std::io::Result<Box<dyn Read>> {
        let file = fs::File::open(self.abs(path))?;
        Ok(Box::new(file))
    }

    fn size(&self, path: &str) -> std::io::Result<u64> {
        Ok(fs::metadata(self.abs(path))?.len())
    }
}
