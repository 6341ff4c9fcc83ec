//! Serialize a rendered report table to CSV or JSON bytes.

use serde_json::{Map, Value};

use crate::report_schedule::ReportFormat;
use crate::types::Timestamp;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A rendered report: column headers plus string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Encode the table in the requested format.
pub fn export(table: &ReportTable, format: ReportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ReportFormat::Csv => export_csv(table),
        ReportFormat::Json => export_json(table),
    }
}

fn export_csv(table: &ReportTable) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))
}

/// JSON is an array of objects keyed by column name. Missing trailing
/// cells become empty strings.
fn export_json(table: &ReportTable) -> Result<Vec<u8>, ExportError> {
    let records: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (idx, column) in table.columns.iter().enumerate() {
                let cell = row.get(idx).cloned().unwrap_or_default();
                object.insert(column.clone(), Value::String(cell));
            }
            Value::Object(object)
        })
        .collect();
    Ok(serde_json::to_vec_pretty(&records)?)
}

/// Attachment file name, e.g. `donation_summary-2026-05-01.csv`.
pub fn attachment_filename(kind: &str, period_end: Timestamp, format: ReportFormat) -> String {
    format!(
        "{kind}-{}.{}",
        period_end.format("%Y-%m-%d"),
        format.extension()
    )
}
