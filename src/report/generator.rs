//! Metrics report generation.
//!
//! Serializes a [`MetricsReport`] to pretty JSON and writes it to disk.

use crate::error::DispatchError;
use crate::models::MetricsReport;
use std::io::Write;
use std::path::Path;

/// Generate the JSON text for a metrics report.
pub fn generate_metrics_json(report: &MetricsReport) -> Result<String, DispatchError> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write a metrics report to a file, replacing any previous export.
pub fn write_metrics_report(report: &MetricsReport, path: &Path) -> Result<(), DispatchError> {
    let content = generate_metrics_json(report)?;

    let io_err = |source| DispatchError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::create(path).map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    file.write_all(b"\n").map_err(io_err)?;

    Ok(())
}
