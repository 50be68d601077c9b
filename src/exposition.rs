use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde_json::Number;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

const METRIC_NAME: &str = "meter_consumption";
const HELP_LINE: &str = "# HELP meter_consumption The consumption value for a smart meter.";
const TYPE_LINE: &str = "# TYPE meter_consumption counter";

/// One exported sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterReading {
    pub meter_id: String,
    pub meter_type: Option<String>,
    pub consumption: Option<Number>,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to stage exposition file next to '{path}'. Error: {source}")]
    Stage { path: PathBuf, source: io::Error },

    #[error("Failed to replace exposition file '{path}'. Error: {source}")]
    Persist { path: PathBuf, source: io::Error },
}

/// Quote a label value using JSON string escaping.
fn quote(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// Render the exposition text. Samples keep the order of `readings`.
/// The text ends with a newline after the last sample.
pub fn render(readings: &[MeterReading]) -> String {
    let mut lines: Vec<String> = vec![HELP_LINE.into(), TYPE_LINE.into()];
    for reading in readings {
        let value = reading
            .consumption
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "NaN".into());
        lines.push(format!(
            "{}{{meter_id={}, meter_type={}}} {}",
            METRIC_NAME,
            quote(&reading.meter_id),
            quote(reading.meter_type.as_deref().unwrap_or_default()),
            value
        ));
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Replace `path` with `contents`. The text is staged in a temporary file in
/// the same directory and renamed into place.
pub fn write_atomically(path: &Path, contents: &str) -> Result<(), ExportError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let stage_err = |source: io::Error| ExportError::Stage {
        path: path.to_path_buf(),
        source,
    };
    let mut staged = NamedTempFile::new_in(&dir).map_err(stage_err)?;
    staged.write_all(contents.as_bytes()).map_err(stage_err)?;
    staged.flush().map_err(stage_err)?;

    staged.persist(path).map_err(|e| ExportError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Render `readings` and write them to `path`.
pub fn export(path: &Path, readings: &[MeterReading]) -> Result<(), ExportError> {
    let text = render(readings);
    debug!("Final file:\n{}", text);
    write_atomically(path, &text)?;
    info!("Wrote {} readings to '{}'.", readings.len(), path.display());
    Ok(())
}
