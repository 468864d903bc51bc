//! Artifact serialization and atomic persistence.
//!
//! Evidence files are written to a temp file in the destination directory and
//! renamed into place, so a reader either sees the previous complete file or
//! the new complete file, never a truncated one.
use crate::error::EvidenceError;
use crate::job::OutputFormat;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A persisted evidence file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub job_id: String,
    pub environment: String,
    pub path: PathBuf,
    pub format: OutputFormat,
    pub bytes: usize,
    pub sha256: String,
}

/// Serialize a drained result in the requested format.
pub fn render(value: &Value, format: OutputFormat) -> Result<Vec<u8>, EvidenceError> {
    match format {
        OutputFormat::Json => {
            let mut bytes = serde_json::to_vec_pretty(value)
                .map_err(|err| EvidenceError::parse("artifact", err.to_string()))?;
            bytes.push(b'\n');
            Ok(bytes)
        }
        OutputFormat::Csv => render_csv(value),
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(nested) => nested.to_string(),
    }
}

fn render_csv(value: &Value) -> Result<Vec<u8>, EvidenceError> {
    let rows = value.as_array().ok_or_else(|| {
        EvidenceError::parse("artifact", "csv output requires a JSON array of records")
    })?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let csv_error = |err: csv::Error| EvidenceError::parse("artifact", err.to_string());

    let mut columns: Vec<String> = Vec::new();
    let all_objects = rows.iter().all(Value::is_object);
    if all_objects {
        for row in rows {
            if let Value::Object(map) = row {
                for key in map.keys() {
                    if !columns.iter().any(|column| column == key) {
                        columns.push(key.clone());
                    }
                }
            }
        }
    } else {
        columns.push("value".to_string());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns).map_err(csv_error)?;
    for row in rows {
        let record: Vec<String> = match row {
            Value::Object(map) if all_objects => columns
                .iter()
                .map(|column| cell(map.get(column)))
                .collect(),
            other => vec![cell(Some(other))],
        };
        writer.write_record(&record).map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|err| EvidenceError::parse("artifact", err.to_string()))
}

/// Create `dir` and its parents if absent.
pub fn ensure_dir(dir: &Path) -> Result<(), EvidenceError> {
    fs::create_dir_all(dir).map_err(|err| EvidenceError::write(dir, err))
}

/// Replace `path` with `bytes` via a same-directory temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EvidenceError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("artifact");

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|err| EvidenceError::write(path, err))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|err| EvidenceError::write(path, err))?;
    tmp.persist(path)
        .map_err(|err| EvidenceError::write(path, err.error))?;
    Ok(())
}
