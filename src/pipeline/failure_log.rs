use crate::error::FailureLogError;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const PREFIX: &str = "Error processing ";

/// One failed file as read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub message: String,
}

/// Append-only log of files that produced no row.
///
/// Opened once per run; every record is a single `write_all` of a complete
/// line, so a failed append cannot damage earlier lines.
pub struct FailureLog {
    path: PathBuf,
    file: File,
    records: usize,
}

impl FailureLog {
    pub fn open(path: &Path) -> Result<Self, FailureLogError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| FailureLogError {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            records: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn record(&mut self, file_path: &Path, error: &dyn Display) -> Result<(), FailureLogError> {
        // Keep one record per line even if the message spans several.
        let message = error.to_string().replace(['\r', '\n'], " ");
        let line = format!("{}{}: {}\n", PREFIX, file_path.display(), message);
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|source| FailureLogError {
                path: self.path.clone(),
                source,
            })?;
        self.records += 1;
        Ok(())
    }
}

/// Parse a failure log back into records. Lines in another format are ignored.
pub fn read_records(path: &Path) -> std::io::Result<Vec<FailureRecord>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().filter_map(parse_line).collect())
}

/// Both the path and the message may contain ": ". The path ends at the
/// first separator whose left side has a file extension, or at the first
/// separator when none does.
fn parse_line(line: &str) -> Option<FailureRecord> {
    let rest = line.strip_prefix(PREFIX)?;
    let mut separators = rest.match_indices(": ").map(|(i, _)| i);
    let first = separators.next()?;
    let split = std::iter::once(first)
        .chain(separators)
        .find(|&i| Path::new(&rest[..i]).extension().is_some())
        .unwrap_or(first);
    Some(FailureRecord {
        path: PathBuf::from(&rest[..split]),
        message: rest[split + 2..].to_string(),
    })
}
