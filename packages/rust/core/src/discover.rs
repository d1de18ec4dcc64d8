//! Input discovery: find spreadsheets under the input root.

use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use formpipe_shared::{FormPipeError, InputFile, PipelineConfig, Result};

/// Prefix of the lock files office suites leave next to open workbooks.
const LOCK_FILE_PREFIX: &str = "~$";

/// Walk the input root and return every eligible spreadsheet, sorted by path.
///
/// A file is eligible when its extension is configured and its parent
/// directory names a configured document type. An unreadable root is an
/// error; unreadable entries below it are skipped.
pub fn discover_inputs(config: &PipelineConfig) -> Result<Vec<InputFile>> {
    let root = &config.paths.input_dir;
    if !root.exists() {
        warn!(root = %root.display(), "input directory does not exist, nothing to do");
        return Ok(Vec::new());
    }

    let mut inputs = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(FormPipeError::io(root, std::io::Error::from(e)));
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !has_extension(path, &config.extensions) || is_lock_file(path) {
            continue;
        }

        let Some(document_type) = parent_name(path) else {
            continue;
        };
        if config.document_type(&document_type).is_none() {
            debug!(path = %path.display(), %document_type, "no document type for directory, skipping");
            continue;
        }

        inputs.push(InputFile {
            path: path.to_path_buf(),
            document_type,
        });
    }

    info!(count = inputs.len(), root = %root.display(), "discovered input files");
    Ok(inputs)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| extensions.iter().any(|e| *e == ext))
}

fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with(LOCK_FILE_PREFIX))
}

fn parent_name(path: &Path) -> Option<String> {
    path.parent()?
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}
