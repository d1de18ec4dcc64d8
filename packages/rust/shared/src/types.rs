//! Core domain types for formpipe runs.

use std::path::PathBuf;

use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// Numeric form-field index from the template's first column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldIndex(pub u32);

impl std::fmt::Display for FieldIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a "Last, First Middle" style value is cut before it lands in a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitRule {
    /// Text before the first separator.
    Last,
    /// Segment after the first separator.
    First,
    /// Segment after the second separator, empty when there is none.
    Middle,
}

impl SplitRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Last => "last",
            Self::First => "first",
            Self::Middle => "middle",
        }
    }
}

impl std::str::FromStr for SplitRule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last" => Ok(Self::Last),
            "first" => Ok(Self::First),
            "middle" => Ok(Self::Middle),
            other => Err(format!(
                "unknown split rule '{other}': expected 'last', 'first' or 'middle'"
            )),
        }
    }
}

/// One row of a template: which spreadsheet column feeds which form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub index: FieldIndex,
    /// Spreadsheet column header the value is read from.
    pub source_column: String,
    pub split: Option<SplitRule>,
}

/// Ordered field definitions for one document type. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Template {
    pub document_type: String,
    pub fields: Vec<FieldDef>,
}

impl Template {
    /// Position of the field with the given index, if the template has it.
    pub fn position_of(&self, index: FieldIndex) -> Option<usize> {
        self.fields.iter().position(|f| f.index == index)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A single value bound to a form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub index: FieldIndex,
    /// The source column name, written to the CSV's description column.
    pub description: String,
    pub value: String,
}

/// The normalized record handed to the fill tool.
///
/// `document_key` becomes the CSV's first header cell and must equal the
/// document path the tool was inspected with.
#[derive(Debug, Clone)]
pub struct Record {
    pub document_key: String,
    /// Aligned index-for-index with the template's fields.
    pub entries: Vec<RecordEntry>,
}

impl Record {
    pub fn value(&self, index: FieldIndex) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.index == index)
            .map(|e| e.value.as_str())
    }
}

// ---------------------------------------------------------------------------
// Input files & lifecycle
// ---------------------------------------------------------------------------

/// A spreadsheet discovered under the input root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    /// Name of the immediate parent directory, which selects the template.
    pub document_type: String,
}

/// Where a file is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Discovered,
    Transformed,
    Inspected,
    Filled,
    Relocated,
    Archived,
    CleanedUp,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Transformed => "transformed",
            Self::Inspected => "inspected",
            Self::Filled => "filled",
            Self::Relocated => "relocated",
            Self::Archived => "archived",
            Self::CleanedUp => "cleaned_up",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline stage. Each stage moves a file one status forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transform,
    Inspect,
    Fill,
    Relocate,
    ArchiveIntermediate,
    ArchiveInput,
}

impl Stage {
    /// Status reached once this stage succeeds.
    pub fn reached(&self) -> FileStatus {
        match self {
            Self::Transform => FileStatus::Transformed,
            Self::Inspect => FileStatus::Inspected,
            Self::Fill => FileStatus::Filled,
            Self::Relocate => FileStatus::Relocated,
            Self::ArchiveIntermediate => FileStatus::Archived,
            Self::ArchiveInput => FileStatus::CleanedUp,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Inspect => "inspect",
            Self::Fill => "fill",
            Self::Relocate => "relocate",
            Self::ArchiveIntermediate => "archive_intermediate",
            Self::ArchiveInput => "archive_input",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
