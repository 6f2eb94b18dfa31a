use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{GradeError, Result};
use crate::models::Value;

/// The uploaded grades file after blank/placeholder columns are dropped.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RawTable {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let header_record = reader.headers()?.clone();
        if header_record.is_empty() {
            return Err(GradeError::EmptyTable);
        }

        let mut kept = Vec::new();
        let mut headers = Vec::new();
        for (idx, header) in header_record.iter().enumerate() {
            if is_placeholder_header(header) {
                debug!(column = idx, header, "dropping unnamed column");
                continue;
            }
            kept.push(idx);
            headers.push(header.trim().to_string());
        }

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let row: Vec<Value> = kept
                .iter()
                .map(|&idx| record.get(idx).map(Value::parse).unwrap_or(Value::Missing))
                .collect();
            rows.push(row);
        }

        debug!(columns = headers.len(), rows = rows.len(), "loaded grades table");
        Ok(Self { headers, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Index of the student name column; its absence is fatal.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| GradeError::MissingNameColumn {
                column: name.to_string(),
            })
    }

    /// The optional NetID column, matched case-insensitively.
    pub fn net_id_index(&self) -> Option<usize> {
        self.headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case("netid"))
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// Warns about columns expected to hold scores that contain text.
    pub fn warn_non_numeric(&self, idx: usize) {
        let offending = self
            .column(idx)
            .filter(|value| matches!(value, Value::Text(_)))
            .count();
        if offending > 0 {
            warn!(
                column = %self.headers[idx],
                cells = offending,
                "non-numeric score cells will be scored as 0"
            );
        }
    }
}

fn is_placeholder_header(header: &str) -> bool {
    let trimmed = header.trim();
    trimmed.is_empty() || trimmed.starts_with("Unnamed:")
}
