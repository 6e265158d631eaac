//! Feature tables and the run summary

pub mod csv;
pub mod summary;
pub mod table;

pub use self::csv::{export_table, CsvTableWriter};
pub use summary::{read_summary, write_summary, DatasetSummary, RunSummary};
pub use table::{columns, FeatureRow};

use crate::error::ExportError;

/// Destination for rows as the batch produces them.
pub trait RowSink {
    fn push(&mut self, row: FeatureRow) -> Result<(), ExportError>;
}

impl RowSink for Vec<FeatureRow> {
    fn push(&mut self, row: FeatureRow) -> Result<(), ExportError> {
        Vec::push(self, row);
        Ok(())
    }
}
