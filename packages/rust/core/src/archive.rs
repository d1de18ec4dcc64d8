//! Archiver: best-effort audit copies of processed files.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use formpipe_shared::{FormPipeError, Result};

/// Copies files into the archive directory under their original names.
///
/// Archiving a name twice overwrites the earlier copy.
#[derive(Debug, Clone)]
pub struct Archiver {
    dir: PathBuf,
}

impl Archiver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Copy `path` into the archive and return the archive copy's path.
    /// The source is left in place.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn archive(&self, path: &Path) -> Result<PathBuf> {
        let name = path.file_name().ok_or_else(|| {
            FormPipeError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;

        std::fs::create_dir_all(&self.dir).map_err(|e| FormPipeError::io(&self.dir, e))?;
        let destination = self.dir.join(name);
        std::fs::copy(path, &destination).map_err(|e| FormPipeError::io(path, e))?;

        debug!(to = %destination.display(), "archived");
        Ok(destination)
    }

    /// Archive `path`, then delete it from its working location.
    pub fn archive_and_remove(&self, path: &Path) -> Result<PathBuf> {
        let destination = self.archive(path)?;
        std::fs::remove_file(path).map_err(|e| FormPipeError::io(path, e))?;
        Ok(destination)
    }
}
