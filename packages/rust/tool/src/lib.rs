//! External form tool gateway for formpipe.
//!
//! Each call is a single blocking attempt. Failures come back as typed
//! [`FormPipeError`](formpipe_shared::FormPipeError)s; nothing is retried.

pub mod pdfforms;
mod process;

use std::path::Path;

use formpipe_shared::Result;

pub use pdfforms::{NO_FLATTEN_FLAG, PdfFormsTool};

/// The inspect/fill protocol of the form tool.
pub trait FormTool {
    /// Inspect the blank document so its fields can be filled.
    fn inspect(&self, document: &str) -> Result<()>;

    /// Fill from an intermediate CSV, leaving the result editable, and clear
    /// the tool's transient state file.
    fn fill(&self, csv: &Path) -> Result<()>;
}
