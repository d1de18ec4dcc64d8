//! Template loading and validation.
//!
//! A template is a delimited table with a header row. Column 1 holds the
//! form-field index, column 2 the spreadsheet column it is filled from, and
//! an optional column 3 a split rule (`last`, `first`, `middle`).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, info};

use formpipe_shared::{
    DocumentType, FieldDef, FieldIndex, FormPipeError, PipelineConfig, Result, SplitRule, Template,
};

/// Load and validate the template for one document type.
pub fn load_template(document_type: &DocumentType) -> Result<Template> {
    let path = &document_type.template;
    let content = std::fs::read_to_string(path).map_err(|e| FormPipeError::io(path, e))?;
    let template = parse_template(&document_type.name, path, &content)?;

    if template.position_of(document_type.identifier_field).is_none() {
        return Err(FormPipeError::template(
            path,
            format!(
                "identifier field {} is not defined in the template",
                document_type.identifier_field
            ),
        ));
    }

    debug!(
        document_type = %document_type.name,
        fields = template.fields.len(),
        "loaded template"
    );
    Ok(template)
}

/// Load every configured template, keyed by document type name.
pub fn load_templates(config: &PipelineConfig) -> Result<HashMap<String, Template>> {
    let mut templates = HashMap::with_capacity(config.document_types.len());
    for document_type in &config.document_types {
        templates.insert(document_type.name.clone(), load_template(document_type)?);
    }
    info!(count = templates.len(), "templates loaded");
    Ok(templates)
}

/// Parse template text. `path` is only used in error messages.
pub fn parse_template(document_type: &str, path: &Path, content: &str) -> Result<Template> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut fields = Vec::new();
    let mut seen = HashSet::new();

    for record in reader.records() {
        let record = record.map_err(|e| FormPipeError::template(path, e.to_string()))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        if record.iter().all(str::is_empty) {
            continue;
        }

        let raw_index = record.get(0).unwrap_or_default();
        let index = raw_index.parse::<u32>().map(FieldIndex).map_err(|_| {
            FormPipeError::template(path, format!("line {line}: invalid field index '{raw_index}'"))
        })?;
        if !seen.insert(index) {
            return Err(FormPipeError::template(
                path,
                format!("line {line}: field index {index} is defined twice"),
            ));
        }

        let source_column = record.get(1).unwrap_or_default();
        if source_column.is_empty() {
            return Err(FormPipeError::template(
                path,
                format!("line {line}: field {index} has no source column"),
            ));
        }

        let split = match record.get(2).filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                raw.parse::<SplitRule>()
                    .map_err(|e| FormPipeError::template(path, format!("line {line}: {e}")))?,
            ),
            None => None,
        };

        fields.push(FieldDef {
            index,
            source_column: source_column.to_string(),
            split,
        });
    }

    if fields.is_empty() {
        return Err(FormPipeError::template(path, "template defines no fields"));
    }

    Ok(Template {
        document_type: document_type.to_string(),
        fields,
    })
}
