//! `pdfforms` command-line driver.
//!
//! The tool is spawned in the project root: `inspect` writes its state file
//! there and `fill` writes filled documents into the tool output directory.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, instrument};

use formpipe_shared::{FormPipeError, PipelineConfig, Result, ToolSettings};

use crate::FormTool;
use crate::process::run_tool;

/// Flag that keeps filled forms editable.
pub const NO_FLATTEN_FLAG: &str = "--no-flatten";

/// [`FormTool`] that shells out to `pdfforms` (or a compatible command).
#[derive(Debug, Clone)]
pub struct PdfFormsTool {
    command: String,
    working_dir: PathBuf,
    state_file: PathBuf,
    timeout: Option<Duration>,
    verify_state_key: bool,
}

impl PdfFormsTool {
    pub fn new(
        settings: &ToolSettings,
        working_dir: impl Into<PathBuf>,
        state_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            command: settings.command.clone(),
            working_dir: working_dir.into(),
            state_file: state_file.into(),
            timeout: settings.timeout,
            verify_state_key: settings.verify_state_key,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.tool, &config.root, &config.paths.state_file)
    }

    /// The state file must list the inspected document as a top-level key,
    /// since the fill step looks fields up by the CSV's header key.
    fn verify_state_key(&self, document: &str) -> Result<()> {
        if !self.state_file.exists() {
            debug!(state_file = %self.state_file.display(), "no state file to verify");
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.state_file)
            .map_err(|e| FormPipeError::io(&self.state_file, e))?;
        let state: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            FormPipeError::tool("inspect", format!("state file is not valid JSON: {e}"))
        })?;
        let keys = state.as_object().ok_or_else(|| {
            FormPipeError::tool("inspect", "state file is not a JSON object")
        })?;

        if keys.contains_key(document) {
            Ok(())
        } else {
            let known: Vec<&str> = keys.keys().map(String::as_str).collect();
            Err(FormPipeError::tool(
                "inspect",
                format!("state file has no entry for '{document}' (found: {known:?})"),
            ))
        }
    }
}

impl FormTool for PdfFormsTool {
    #[instrument(skip(self), fields(command = %self.command))]
    fn inspect(&self, document: &str) -> Result<()> {
        info!("inspecting document");
        run_tool(
            "inspect",
            &self.command,
            &[OsStr::new("inspect"), OsStr::new(document)],
            &self.working_dir,
            self.timeout,
        )?;

        if self.verify_state_key {
            self.verify_state_key(document)?;
        }
        info!("inspection succeeded");
        Ok(())
    }

    #[instrument(skip(self, csv), fields(command = %self.command, csv = %csv.display()))]
    fn fill(&self, csv: &Path) -> Result<()> {
        info!("filling document");
        run_tool(
            "fill",
            &self.command,
            &[OsStr::new("fill"), csv.as_os_str(), OsStr::new(NO_FLATTEN_FLAG)],
            &self.working_dir,
            self.timeout,
        )?;

        // The tool never refreshes this file, so a stale copy would poison
        // the next inspect/fill cycle.
        std::fs::remove_file(&self.state_file)
            .map_err(|e| FormPipeError::io(&self.state_file, e))?;
        debug!(state_file = %self.state_file.display(), "removed tool state file");

        info!("fill succeeded");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use formpipe_shared::ErrorKind;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "formpipe-pdfforms-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Runs as `sh inspect ...` / `sh fill ...`, so scripts named `inspect`
    /// and `fill` in the working dir stand in for the real tool.
    fn fake_tool(dir: &Path, inspect: &str, fill: &str, timeout: Option<Duration>) -> PdfFormsTool {
        std::fs::write(dir.join("inspect"), inspect).unwrap();
        std::fs::write(dir.join("fill"), fill).unwrap();
        let settings = ToolSettings {
            command: "sh".into(),
            timeout,
            verify_state_key: true,
        };
        PdfFormsTool::new(&settings, dir, dir.join("fields.json"))
    }

    #[test]
    fn inspect_succeeds_on_zero_exit() {
        let tmp = temp_dir();
        let tool = fake_tool(
            &tmp,
            "printf '{\"%s\": {}}' \"$1\" > fields.json",
            "exit 0",
            Some(Duration::from_secs(10)),
        );

        tool.inspect("form.pdf").unwrap();
        let state = std::fs::read_to_string(tmp.join("fields.json")).unwrap();
        assert!(state.contains("form.pdf"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn inspect_non_zero_exit_is_tool_error() {
        let tmp = temp_dir();
        let tool = fake_tool(&tmp, "echo 'bad pdf' >&2; exit 1", "exit 0", None);

        let err = tool.inspect("form.pdf").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tool);
        assert!(err.to_string().contains("bad pdf"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn inspect_rejects_state_for_another_document() {
        let tmp = temp_dir();
        let tool = fake_tool(
            &tmp,
            "echo '{\"other.pdf\": {}}' > fields.json",
            "exit 0",
            None,
        );

        let err = tool.inspect("form.pdf").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tool);
        assert!(err.to_string().contains("other.pdf"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn inspect_timeout_is_fatal() {
        let tmp = temp_dir();
        let tool = fake_tool(&tmp, "exec sleep 5", "exit 0", Some(Duration::from_millis(200)));

        let err = tool.inspect("form.pdf").unwrap_err();
        assert!(err.is_fatal());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn fill_passes_no_flatten_and_removes_state_file() {
        let tmp = temp_dir();
        let tool = fake_tool(&tmp, "exit 0", "echo \"$1 $2\" > fill-args.txt", None);
        std::fs::write(tmp.join("fields.json"), "{}").unwrap();
        let csv = tmp.join("Doe.csv");

        tool.fill(&csv).unwrap();

        let args = std::fs::read_to_string(tmp.join("fill-args.txt")).unwrap();
        assert_eq!(args.trim(), format!("{} --no-flatten", csv.display()));
        assert!(!tmp.join("fields.json").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn fill_without_state_file_is_filesystem_error() {
        let tmp = temp_dir();
        let tool = fake_tool(&tmp, "exit 0", "exit 0", None);

        let err = tool.fill(&tmp.join("Doe.csv")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Filesystem);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn failed_fill_keeps_state_file() {
        let tmp = temp_dir();
        let tool = fake_tool(&tmp, "exit 0", "exit 2", None);
        std::fs::write(tmp.join("fields.json"), "{}").unwrap();

        let err = tool.fill(&tmp.join("Doe.csv")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tool);
        assert!(tmp.join("fields.json").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
