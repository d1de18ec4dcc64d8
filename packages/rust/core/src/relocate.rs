//! Output relocator: renames filled documents and moves them to the output
//! directory.
//!
//! The tool's output directory is treated as an unordered set. Names are made
//! unique by bumping the timestamp suffix, so the result does not depend on
//! listing order.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use formpipe_shared::{FormPipeError, Result};

/// Moves filled artifacts from the tool's output directory to their final home.
#[derive(Debug, Clone)]
pub struct Relocator {
    tool_output_dir: PathBuf,
    output_dir: PathBuf,
}

impl Relocator {
    pub fn new(tool_output_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool_output_dir: tool_output_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Relocate every artifact produced for `csv`, stamped with the current time.
    pub fn relocate_all(&self, csv: &Path) -> Result<Vec<PathBuf>> {
        self.relocate_all_at(csv, chrono::Utc::now().timestamp())
    }

    /// Relocate every artifact, stamping names with `epoch_secs` (or later).
    #[instrument(skip_all, fields(csv = %csv.display()))]
    pub fn relocate_all_at(&self, csv: &Path, epoch_secs: i64) -> Result<Vec<PathBuf>> {
        let artifacts = self.list_artifacts()?;
        if artifacts.is_empty() {
            return Err(FormPipeError::tool(
                "fill",
                format!("no filled documents found in {}", self.tool_output_dir.display()),
            ));
        }

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| FormPipeError::io(&self.output_dir, e))?;

        let csv_name = csv
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut relocated = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            relocated.push(self.relocate_one(&artifact, &csv_name, epoch_secs)?);
        }

        info!(count = relocated.len(), "relocated filled documents");
        Ok(relocated)
    }

    /// Fail if the tool output directory still holds files.
    ///
    /// Leftovers come from an earlier fill that did not reach relocation;
    /// relocating them now would credit another file's data to the next CSV.
    #[instrument(skip_all)]
    pub fn ensure_clean(&self) -> Result<()> {
        let leftovers = self.list_artifacts()?;
        if leftovers.is_empty() {
            return Ok(());
        }

        let names: Vec<String> = leftovers
            .iter()
            .map(|p| {
                p.strip_prefix(&self.tool_output_dir)
                    .unwrap_or(p)
                    .display()
                    .to_string()
            })
            .collect();
        warn!(count = names.len(), dir = %self.tool_output_dir.display(), "tool output directory is not empty");
        Err(FormPipeError::io(
            &self.tool_output_dir,
            std::io::Error::other(format!(
                "tool output directory holds files from an earlier fill: {}",
                names.join(", ")
            )),
        ))
    }

    fn relocate_one(&self, artifact: &Path, csv_name: &str, epoch_secs: i64) -> Result<PathBuf> {
        let artifact_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent = artifact.parent().unwrap_or(&self.tool_output_dir);

        let mut stamp = epoch_secs;
        let name = loop {
            let candidate = relocated_name(&artifact_name, csv_name, stamp);
            if !parent.join(&candidate).exists() && !self.output_dir.join(&candidate).exists() {
                break candidate;
            }
            stamp += 1;
        };

        let renamed = parent.join(&name);
        std::fs::rename(artifact, &renamed).map_err(|e| FormPipeError::io(artifact, e))?;
        debug!(from = %artifact.display(), to = %renamed.display(), "renamed artifact");

        let destination = self.output_dir.join(&name);
        move_file(&renamed, &destination)?;
        debug!(to = %destination.display(), "moved artifact to output");

        Ok(destination)
    }

    fn list_artifacts(&self) -> Result<Vec<PathBuf>> {
        if !self.tool_output_dir.exists() {
            return Ok(Vec::new());
        }

        let mut artifacts = Vec::new();
        for entry in WalkDir::new(&self.tool_output_dir) {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.tool_output_dir.clone());
                FormPipeError::io(path, std::io::Error::from(e))
            })?;
            if entry.file_type().is_file() {
                artifacts.push(entry.into_path());
            }
        }
        Ok(artifacts)
    }
}

/// `<artifact stem>_<csv stem><epoch>.pdf`, where the artifact stem is the
/// text before its first `.`.
pub fn relocated_name(artifact_name: &str, csv_name: &str, epoch_secs: i64) -> String {
    let stem = artifact_name.split('.').next().unwrap_or_default();
    let csv_stem = csv_name.strip_suffix(".csv").unwrap_or(csv_name);
    format!("{stem}_{csv_stem}{epoch_secs}.pdf")
}

/// Rename, falling back to copy + delete when a rename is not possible
/// (e.g. across filesystems).
pub(crate) fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    warn!(from = %from.display(), to = %to.display(), "rename failed, copying instead");
    std::fs::copy(from, to).map_err(|e| FormPipeError::io(to, e))?;
    std::fs::remove_file(from).map_err(|e| FormPipeError::io(from, e))?;
    Ok(())
}
