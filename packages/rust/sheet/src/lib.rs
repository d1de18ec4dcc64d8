//! Spreadsheet row access for formpipe.
//!
//! The pipeline only ever needs the first data row of the first worksheet,
//! keyed by the header row. [`RowReader`] is the seam the orchestrator
//! depends on; [`CalamineReader`] is the production implementation.

use std::path::Path;

use calamine::{Data, DataType, Reader, open_workbook_auto};
use tracing::{debug, instrument};

use formpipe_shared::{FormPipeError, Result};

/// Header → value pairs for one spreadsheet row, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRow {
    cells: Vec<(String, String)>,
}

impl SheetRow {
    pub fn new(cells: Vec<(String, String)>) -> Self {
        Self { cells }
    }

    /// Value under the given header. The first column wins on duplicates.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SheetRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Reads the first data row of a spreadsheet.
pub trait RowReader {
    fn first_row(&self, path: &Path) -> Result<SheetRow>;
}

/// [`RowReader`] backed by calamine (xls, xlsx, xlsm, xlsb, ods).
#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineReader;

impl RowReader for CalamineReader {
    #[instrument(skip_all, fields(path = %path.display()))]
    fn first_row(&self, path: &Path) -> Result<SheetRow> {
        let mut workbook = open_workbook_auto(path).map_err(|e| {
            FormPipeError::data(format!("cannot open spreadsheet {}: {e}", path.display()))
        })?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| {
                FormPipeError::data(format!("{} has no worksheets", path.display()))
            })?
            .map_err(|e| {
                FormPipeError::data(format!("cannot read worksheet in {}: {e}", path.display()))
            })?;

        let mut rows = range.rows();
        let header = rows
            .next()
            .ok_or_else(|| FormPipeError::data(format!("{} is empty", path.display())))?;
        let data = rows
            .find(|row| row.iter().any(|cell| !cell.is_empty()))
            .ok_or_else(|| {
                FormPipeError::data(format!("{} has a header but no data rows", path.display()))
            })?;

        let row = row_from_cells(header, data);
        debug!(columns = row.len(), "read first data row");
        Ok(row)
    }
}

/// Pair header cells with data cells; blank headers are dropped.
fn row_from_cells(header: &[Data], data: &[Data]) -> SheetRow {
    header
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            let name = render_cell(h);
            if name.is_empty() {
                return None;
            }
            let value = data.get(i).map(render_cell).unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

/// Render a cell the way it should appear in a form field.
pub fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        // Whole numbers come back from Excel as floats.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) if dt.time() == chrono::NaiveTime::MIN => dt.format("%Y-%m-%d").to_string(),
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => cell.to_string(),
        },
        other => other.to_string(),
    }
}
