//! Scoped scratch directories.

use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, warn};
use whorl_core::{Error, Result};

const SCRATCH_PREFIX: &str = "whorl-";

/// Temporary directory removed when dropped.
///
/// Removal failures are logged, never raised.
///
/// # Examples
///
/// ```
/// use whorl_package::ScratchDir;
///
/// let scratch = ScratchDir::new().unwrap();
/// let path = scratch.path().to_path_buf();
/// assert!(path.is_dir());
/// drop(scratch);
/// assert!(!path.exists());
/// ```
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
}

impl ScratchDir {
    /// Creates a new scratch directory under the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be created.
    pub fn new() -> Result<Self> {
        Self::new_in(std::env::temp_dir())
    }

    /// Creates a new scratch directory under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be created.
    pub fn new_in(parent: impl AsRef<Path>) -> Result<Self> {
        let parent = parent.as_ref();
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(parent)
            .map_err(|e| Error::io(parent, e))?;
        debug!(path = %dir.path().display(), "scratch directory created");
        Ok(Self { dir: Some(dir) })
    }

    /// Path of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.as_ref().map_or_else(|| Path::new(""), TempDir::path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(path = %path.display(), "scratch directory removed"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove scratch directory"),
            }
        }
    }
}
