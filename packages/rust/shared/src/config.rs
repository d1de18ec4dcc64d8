//! Application configuration for formpipe.
//!
//! Config is looked up in this order: an explicit path (flag or
//! `FORMPIPE_CONFIG`), `./formpipe.toml`, `~/.formpipe/formpipe.toml`.
//! Missing everywhere means built-in defaults. Relative paths in the file are
//! resolved against the project root when the runtime config is built.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FormPipeError, Result};
use crate::types::FieldIndex;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "formpipe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".formpipe";

// ---------------------------------------------------------------------------
// Config structs (matching formpipe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fixed directory layout.
    #[serde(default)]
    pub paths: PathsConfig,

    /// External form tool settings.
    #[serde(default)]
    pub tool: ToolConfig,

    /// Run behavior.
    #[serde(default)]
    pub run: RunSection,

    /// Registered document types.
    #[serde(default)]
    pub document_types: Vec<DocumentTypeConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            tool: ToolConfig::default(),
            run: RunSection::default(),
            document_types: vec![DocumentTypeConfig {
                name: "NOA_GA".into(),
                document: "static/pdfs/NOA GA.pdf".into(),
                template: "static/templates/NOA_GA_CSV_Template.csv".into(),
                identifier_field: 0,
            }],
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root scanned recursively for spreadsheets.
    #[serde(default = "default_input_dir")]
    pub input_dir: String,

    /// Root for generated intermediate CSVs (one subdirectory per document type).
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Directory the tool writes filled documents into.
    #[serde(default = "default_tool_output_dir")]
    pub tool_output_dir: String,

    /// Final destination for renamed documents.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Copies of processed spreadsheets and CSVs.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,

    /// Per-run log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// State file the tool leaves behind after inspecting a document.
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            work_dir: default_work_dir(),
            tool_output_dir: default_tool_output_dir(),
            output_dir: default_output_dir(),
            archive_dir: default_archive_dir(),
            log_dir: default_log_dir(),
            state_file: default_state_file(),
        }
    }
}

fn default_input_dir() -> String {
    "input".into()
}
fn default_work_dir() -> String {
    "input".into()
}
fn default_tool_output_dir() -> String {
    "filled".into()
}
fn default_output_dir() -> String {
    "output".into()
}
fn default_archive_dir() -> String {
    "archive".into()
}
fn default_log_dir() -> String {
    "temp/logs".into()
}
fn default_state_file() -> String {
    "fields.json".into()
}

/// `[tool]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Executable invoked as `<command> inspect ...` / `<command> fill ...`.
    #[serde(default = "default_tool_command")]
    pub command: String,

    /// Per-invocation timeout in seconds. `0` disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Check that the inspect state file is keyed by the document path.
    #[serde(default = "default_true")]
    pub verify_state_key: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: default_tool_command(),
            timeout_secs: default_timeout_secs(),
            verify_state_key: true,
        }
    }
}

fn default_tool_command() -> String {
    "pdfforms".into()
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

/// What a failed file means for the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and move on to the next file.
    #[default]
    Continue,
    /// Stop the run at the first failed file.
    Abort,
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Spreadsheet extensions picked up during discovery (without the dot).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            extensions: default_extensions(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["xls".into(), "xlsx".into()]
}

/// `[[document_types]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTypeConfig {
    /// Matches the input spreadsheet's parent directory name.
    pub name: String,
    /// The blank form. Its path is also the CSV header key.
    pub document: String,
    /// Field mapping table.
    pub template: String,
    /// Field whose value names the intermediate CSV.
    #[serde(default)]
    pub identifier_field: u32,
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, resolved against the project root)
// ---------------------------------------------------------------------------

/// Absolute locations used by a run.
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub input_dir: PathBuf,
    pub work_dir: PathBuf,
    pub tool_output_dir: PathBuf,
    pub output_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub log_dir: PathBuf,
    pub state_file: PathBuf,
}

/// Runtime tool settings.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub command: String,
    pub timeout: Option<Duration>,
    pub verify_state_key: bool,
}

/// A document type with its paths resolved.
#[derive(Debug, Clone)]
pub struct DocumentType {
    pub name: String,
    pub document: PathBuf,
    pub template: PathBuf,
    pub identifier_field: FieldIndex,
}

impl DocumentType {
    /// The exact string passed to `inspect` and written as the CSV header key.
    pub fn document_key(&self) -> String {
        self.document.display().to_string()
    }
}

/// Runtime pipeline configuration, built from [`AppConfig`] and a root.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory relative paths were resolved against; the tool runs here.
    pub root: PathBuf,
    pub paths: ResolvedPaths,
    pub tool: ToolSettings,
    pub failure_policy: FailurePolicy,
    pub extensions: Vec<String>,
    pub document_types: Vec<DocumentType>,
}

impl PipelineConfig {
    pub fn document_type(&self, name: &str) -> Option<&DocumentType> {
        self.document_types.iter().find(|d| d.name == name)
    }

    /// Working directory for one document type's intermediate CSVs.
    pub fn work_dir_for(&self, document_type: &str) -> PathBuf {
        self.paths.work_dir.join(document_type)
    }
}

impl AppConfig {
    /// Validate and resolve every path against `root`.
    pub fn resolve(&self, root: &Path) -> Result<PipelineConfig> {
        let resolve = |p: &str| -> PathBuf {
            let path = Path::new(p);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                root.join(path)
            }
        };

        let paths = ResolvedPaths {
            input_dir: resolve(&self.paths.input_dir),
            work_dir: resolve(&self.paths.work_dir),
            tool_output_dir: resolve(&self.paths.tool_output_dir),
            output_dir: resolve(&self.paths.output_dir),
            archive_dir: resolve(&self.paths.archive_dir),
            log_dir: resolve(&self.paths.log_dir),
            state_file: resolve(&self.paths.state_file),
        };

        if self.tool.command.trim().is_empty() {
            return Err(FormPipeError::config("tool.command must not be empty"));
        }

        let extensions: Vec<String> = self
            .run
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        if extensions.is_empty() {
            return Err(FormPipeError::config("run.extensions must list at least one extension"));
        }

        let mut seen = HashSet::new();
        let mut document_types = Vec::with_capacity(self.document_types.len());
        for entry in &self.document_types {
            if entry.name.trim().is_empty() {
                return Err(FormPipeError::config("document type name must not be empty"));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(FormPipeError::config(format!(
                    "document type '{}' is defined more than once",
                    entry.name
                )));
            }
            document_types.push(DocumentType {
                name: entry.name.clone(),
                document: resolve(&entry.document),
                template: resolve(&entry.template),
                identifier_field: FieldIndex(entry.identifier_field),
            });
        }

        let timeout = match self.tool.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(PipelineConfig {
            root: root.to_path_buf(),
            paths,
            tool: ToolSettings {
                command: self.tool.command.clone(),
                timeout,
                verify_state_key: self.tool.verify_state_key,
            },
            failure_policy: self.run.failure_policy,
            extensions,
            document_types,
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the user config directory (`~/.formpipe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FormPipeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Find the config file to use, if any.
///
/// An explicit path must exist. Otherwise the current directory is checked
/// before the user config directory.
pub fn locate_config(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(FormPipeError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(Some(local));
    }

    match config_dir() {
        Ok(dir) => {
            let user = dir.join(CONFIG_FILE_NAME);
            Ok(user.exists().then_some(user))
        }
        Err(e) => {
            tracing::debug!(error = %e, "skipping user config lookup");
            Ok(None)
        }
    }
}

/// Load the application config. Returns defaults if no file is found.
pub fn load_config(explicit: Option<&Path>) -> Result<(AppConfig, Option<PathBuf>)> {
    match locate_config(explicit)? {
        Some(path) => {
            let config = load_config_from(&path)?;
            Ok((config, Some(path)))
        }
        None => {
            tracing::debug!("config file not found, using defaults");
            Ok((AppConfig::default(), None))
        }
    }
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FormPipeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FormPipeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file to `path`. Refuses to overwrite.
pub fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(FormPipeError::config(format!(
            "{} already exists",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| FormPipeError::io(parent, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| FormPipeError::config(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| FormPipeError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}
