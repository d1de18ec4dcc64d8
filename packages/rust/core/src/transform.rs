//! Record transformer: template + spreadsheet row → intermediate CSV.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument};

use formpipe_sheet::SheetRow;
use formpipe_shared::{
    DocumentType, FieldIndex, FormPipeError, Record, RecordEntry, Result, SplitRule, Template,
};

/// Separator between the parts of a "Last, First Middle" value.
pub const NAME_SEPARATOR: char = ',';

/// Header of the CSV's description column.
const DESCRIPTION_HEADER: &str = "Description";

/// Characters dropped from the identifier before it becomes a file name.
static IDENTIFIER_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\s/\\:*?"<>|]+"#).expect("valid identifier pattern"));

/// An intermediate CSV that has been written to disk.
#[derive(Debug, Clone)]
pub struct Intermediate {
    pub record: Record,
    /// File stem of the CSV (e.g. the normalized surname).
    pub identifier: String,
    pub path: PathBuf,
}

/// Build the record for `row` and write it to `work_dir/<identifier>.csv`.
#[instrument(skip_all, fields(document_type = %document_type.name))]
pub fn transform(
    document_type: &DocumentType,
    template: &Template,
    row: &SheetRow,
    work_dir: &Path,
) -> Result<Intermediate> {
    let record = build_record(template, &document_type.document_key(), row)?;
    let identifier = derive_identifier(&record, document_type.identifier_field)?;
    let path = write_intermediate(&record, work_dir, &identifier)?;

    info!(path = %path.display(), fields = record.entries.len(), "wrote intermediate CSV");
    Ok(Intermediate {
        record,
        identifier,
        path,
    })
}

/// Map every template field onto the row.
///
/// All missing source columns are reported together so one run surfaces the
/// full mismatch between template and spreadsheet.
pub fn build_record(template: &Template, document_key: &str, row: &SheetRow) -> Result<Record> {
    let mut seen = HashSet::new();
    let missing: Vec<&str> = template
        .fields
        .iter()
        .map(|f| f.source_column.as_str())
        .filter(|column| !row.contains(column) && seen.insert(*column))
        .collect();
    if !missing.is_empty() {
        return Err(FormPipeError::data(format!(
            "spreadsheet is missing column(s) required by the {} template: {}",
            template.document_type,
            missing.join(", ")
        )));
    }

    let mut entries = Vec::with_capacity(template.fields.len());
    for field in &template.fields {
        let raw = row.get(&field.source_column).unwrap_or_default();
        let value = match field.split {
            Some(rule) => apply_split(rule, raw).map_err(|e| {
                FormPipeError::data(format!("field {} ({}): {e}", field.index, field.source_column))
            })?,
            None => raw.to_string(),
        };
        entries.push(RecordEntry {
            index: field.index,
            description: field.source_column.clone(),
            value,
        });
    }

    Ok(Record {
        document_key: document_key.to_string(),
        entries,
    })
}

/// Cut a "Last, First Middle" value according to `rule`.
pub fn apply_split(rule: SplitRule, value: &str) -> std::result::Result<String, String> {
    let mut segments = value.split(NAME_SEPARATOR);
    let part = match rule {
        SplitRule::Last => segments.next().filter(|_| value.contains(NAME_SEPARATOR)),
        SplitRule::First => segments.nth(1),
        SplitRule::Middle => Some(segments.nth(2).unwrap_or_default()),
    };
    part.map(|p| p.trim().to_string()).ok_or_else(|| {
        format!(
            "split rule '{}' expects '{NAME_SEPARATOR}' in '{value}'",
            rule.as_str()
        )
    })
}

/// File-name-safe identifier taken from the record's identifier field.
pub fn derive_identifier(record: &Record, field: FieldIndex) -> Result<String> {
    let value = record.value(field).ok_or_else(|| {
        FormPipeError::data(format!("identifier field {field} is not in the record"))
    })?;
    let identifier = IDENTIFIER_STRIP.replace_all(value, "").into_owned();
    if identifier.is_empty() || identifier.chars().all(|c| c == '.') {
        return Err(FormPipeError::data(format!(
            "identifier field {field} yields no usable file name (value '{value}')"
        )));
    }
    Ok(identifier)
}

/// Serialize `record` as `<dir>/<identifier>.csv`.
///
/// An existing CSV with the same name belongs to another file (usually one
/// that failed and was kept for inspection) and is never overwritten.
pub fn write_intermediate(record: &Record, dir: &Path, identifier: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| FormPipeError::io(dir, e))?;
    let path = dir.join(format!("{identifier}.csv"));
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => FormPipeError::io(
                &path,
                std::io::Error::new(
                    e.kind(),
                    "intermediate CSV already exists; archive or remove it before retrying",
                ),
            ),
            _ => FormPipeError::io(&path, e),
        })?;
    let csv_err = |e: csv::Error| FormPipeError::io(&path, std::io::Error::from(e));

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file);

    writer
        .write_record([record.document_key.as_str(), DESCRIPTION_HEADER, ""])
        .map_err(csv_err)?;
    for entry in &record.entries {
        let index = entry.index.to_string();
        writer
            .write_record([index.as_str(), entry.description.as_str(), entry.value.as_str()])
            .map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|e| FormPipeError::io(&path, e))?;

    debug!(path = %path.display(), "intermediate CSV flushed");
    Ok(path)
}
