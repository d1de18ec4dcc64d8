//! Shared types, error model, and configuration for formpipe.
//!
//! This crate is the foundation depended on by all other formpipe crates.
//! It provides:
//! - [`FormPipeError`] and [`ErrorKind`]: the unified error taxonomy
//! - Domain types ([`Template`], [`Record`], [`InputFile`], [`FileStatus`], [`RunId`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CONFIG_FILE_NAME, DocumentType, DocumentTypeConfig, FailurePolicy, PathsConfig,
    PipelineConfig, ResolvedPaths, RunSection, ToolConfig, ToolSettings, config_dir, init_config,
    load_config, load_config_from, locate_config,
};
pub use error::{ErrorKind, FormPipeError, Result};
pub use types::{
    FieldDef, FieldIndex, FileStatus, InputFile, Record, RecordEntry, RunId, SplitRule, Stage,
    Template,
};
