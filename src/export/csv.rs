//! Delimited-text feature tables
//!
//! Rows are streamed to a temporary file next to the target and renamed
//! into place on `finish`, so an interrupted run never leaves a truncated
//! table under the final name.

use super::table::{columns, FeatureRow};
use super::RowSink;
use crate::error::ExportError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const DELIMITER: &str = ",";

pub struct CsvTableWriter {
    path: PathBuf,
    temp_path: PathBuf,
    writer: Option<BufWriter<File>>,
    has_split: bool,
    rows: usize,
}

impl CsvTableWriter {
    /// Create the temporary file and write the header row.
    pub fn create(path: &Path, has_split: bool) -> Result<Self, ExportError> {
        let temp_path = path.with_extension("csv.tmp");
        let file = File::create(&temp_path).map_err(|e| ExportError::write(path, e))?;

        let mut table = Self {
            path: path.to_path_buf(),
            temp_path,
            writer: Some(BufWriter::new(file)),
            has_split,
            rows: 0,
        };

        let header = columns(has_split).join(DELIMITER);
        table.write_line(&header)?;
        Ok(table)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn write_row(&mut self, row: &FeatureRow) -> Result<(), ExportError> {
        let line = format_row(row, self.has_split);
        self.write_line(&line)?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and move the table to its final name. Returns the row count.
    pub fn finish(mut self) -> Result<usize, ExportError> {
        let writer = match self.writer.take() {
            Some(w) => w,
            None => return Ok(self.rows),
        };

        let committed = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .and_then(|file| file.sync_all())
            .and_then(|_| std::fs::rename(&self.temp_path, &self.path));

        if let Err(e) = committed {
            let _ = std::fs::remove_file(&self.temp_path);
            return Err(ExportError::write(&self.path, e));
        }

        log::info!("Wrote {} rows to {}", self.rows, self.path.display());
        Ok(self.rows)
    }

    fn write_line(&mut self, line: &str) -> Result<(), ExportError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ExportError::write(&self.path, std::io::ErrorKind::BrokenPipe.into()))?;
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| ExportError::write(&self.path, e))
    }
}

impl Drop for CsvTableWriter {
    fn drop(&mut self) {
        // Abandoned before finish(): discard the partial table.
        if self.writer.take().is_some() {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

impl RowSink for CsvTableWriter {
    fn push(&mut self, row: FeatureRow) -> Result<(), ExportError> {
        self.write_row(&row)
    }
}

/// Write a complete table in one go.
pub fn export_table(rows: &[FeatureRow], path: &Path, has_split: bool) -> Result<usize, ExportError> {
    let mut table = CsvTableWriter::create(path, has_split)?;
    for row in rows {
        table.write_row(row)?;
    }
    table.finish()
}

fn format_row(row: &FeatureRow, has_split: bool) -> String {
    let mut fields: Vec<String> = row
        .features
        .values()
        .iter()
        .map(|v| format!("{}", v))
        .collect();
    fields.push(escape_field(&row.filename));
    if has_split {
        fields.push(row.split.map(|s| s.as_str()).unwrap_or("").to_string());
    }
    fields.push(row.label.as_str().to_string());
    fields.push(row.label_code().to_string());
    fields.join(DELIMITER)
}

/// Quote a text field when it contains the delimiter, quotes or line breaks.
fn escape_field(value: &str) -> String {
    if value.contains(DELIMITER) || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
