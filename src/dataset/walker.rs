//! Dataset traversal and counting

use crate::error::{PipelineError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Ground-truth class of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Fake,
    Real,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Fake, Label::Real];

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Fake => "fake",
            Label::Real => "real",
        }
    }

    /// Numeric class used by downstream classifiers.
    pub fn code(self) -> u8 {
        match self {
            Label::Fake => 0,
            Label::Real => 1,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partition of the split dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Split {
    Training,
    Validation,
    Testing,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Training, Split::Validation, Split::Testing];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Training => "training",
            Split::Validation => "validation",
            Split::Testing => "testing",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk arrangement of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `<base>/<split>/<label>/*`
    Split,
    /// `<base>/<label>/*`
    Flat,
}

/// One audio file together with its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetEntry {
    pub path: PathBuf,
    pub label: Label,
    pub split: Option<Split>,
}

impl DatasetEntry {
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Counts for one split/label directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountCell {
    pub split: Option<Split>,
    pub label: Label,
    /// Files with the recognized extension
    pub matched: usize,
    /// Regular files ignored because of their extension
    pub skipped: usize,
}

impl CountCell {
    pub fn name(&self) -> String {
        match self.split {
            Some(split) => format!("{}/{}", split, self.label),
            None => self.label.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetCounts {
    pub cells: Vec<CountCell>,
}

impl DatasetCounts {
    pub fn total(&self) -> usize {
        self.cells.iter().map(|c| c.matched).sum()
    }

    pub fn skipped(&self) -> usize {
        self.cells.iter().map(|c| c.skipped).sum()
    }

    pub fn get(&self, split: Option<Split>, label: Label) -> Option<&CountCell> {
        self.cells
            .iter()
            .find(|c| c.split == split && c.label == label)
    }
}

/// Files found directly inside one split/label directory.
#[derive(Debug, Default)]
struct CellListing {
    matched: Vec<PathBuf>,
    skipped: usize,
}

/// Enumerates a dataset in a fixed order: splits, then labels, then file
/// names sorted within each directory.
#[derive(Debug, Clone)]
pub struct DatasetWalker {
    base: PathBuf,
    layout: Layout,
    extension: String,
}

impl DatasetWalker {
    pub fn new(base: impl Into<PathBuf>, layout: Layout, extension: &str) -> Self {
        Self {
            base: base.into(),
            layout,
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Split/label combinations in traversal order.
    pub fn cells(&self) -> Vec<(Option<Split>, Label)> {
        match self.layout {
            Layout::Split => Split::ALL
                .iter()
                .flat_map(|&s| Label::ALL.iter().map(move |&l| (Some(s), l)))
                .collect(),
            Layout::Flat => Label::ALL.iter().map(|&l| (None, l)).collect(),
        }
    }

    pub fn cell_dir(&self, split: Option<Split>, label: Label) -> PathBuf {
        match split {
            Some(split) => self.base.join(split.as_str()).join(label.as_str()),
            None => self.base.join(label.as_str()),
        }
    }

    /// Every matching file as a dataset entry.
    pub fn entries(&self) -> Result<Vec<DatasetEntry>> {
        let mut entries = Vec::new();
        for (split, label) in self.cells() {
            let listing = self.list_cell(split, label)?;
            entries.extend(listing.matched.into_iter().map(|path| DatasetEntry {
                path,
                label,
                split,
            }));
        }
        Ok(entries)
    }

    /// Per-cell counts without touching file contents.
    pub fn count(&self) -> Result<DatasetCounts> {
        let mut counts = DatasetCounts::default();
        for (split, label) in self.cells() {
            let listing = self.list_cell(split, label)?;
            counts.cells.push(CountCell {
                split,
                label,
                matched: listing.matched.len(),
                skipped: listing.skipped,
            });
        }
        Ok(counts)
    }

    fn list_cell(&self, split: Option<Split>, label: Label) -> Result<CellListing> {
        let dir = self.cell_dir(split, label);
        let mut listing = CellListing::default();

        if !dir.is_dir() {
            log::debug!("{} does not exist, contributes no files", dir.display());
            return Ok(listing);
        }

        let walker = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| PipelineError::Walk {
                path: dir.clone(),
                source: e.into(),
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if self.matches_extension(path) {
                listing.matched.push(path.to_path_buf());
            } else {
                log::debug!("Ignoring {} (not .{})", path.display(), self.extension);
                listing.skipped += 1;
            }
        }

        Ok(listing)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn label_codes() {
        assert_eq!(Label::Fake.code(), 0);
        assert_eq!(Label::Real.code(), 1);
        assert_eq!(Label::Real.to_string(), "real");
    }

    #[test]
    fn split_layout_is_ordered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        touch(&base.join("testing/real/z.wav"));
        touch(&base.join("training/real/c.wav"));
        touch(&base.join("training/fake/b.wav"));
        touch(&base.join("training/fake/a.wav"));
        touch(&base.join("validation/fake/m.WAV"));

        let walker = DatasetWalker::new(base, Layout::Split, "wav");
        let entries = walker.entries().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.filename()).collect();
        assert_eq!(names, ["a.wav", "b.wav", "c.wav", "m.WAV", "z.wav"]);
        assert_eq!(entries[0].split, Some(Split::Training));
        assert_eq!(entries[0].label, Label::Fake);
        assert_eq!(entries[2].label, Label::Real);
        assert_eq!(entries[3].split, Some(Split::Validation));
        assert_eq!(entries[4].split, Some(Split::Testing));
    }

    #[test]
    fn counts_match_entries_with_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        touch(&base.join("training/fake/a.wav"));
        touch(&base.join("training/fake/notes.txt"));
        touch(&base.join("testing/real/b.wav"));
        fs::create_dir_all(base.join("training/fake/nested")).unwrap();

        let walker = DatasetWalker::new(base, Layout::Split, ".wav");
        let counts = walker.count().unwrap();
        assert_eq!(counts.cells.len(), 6);
        assert_eq!(counts.total(), 2);
        assert_eq!(counts.skipped(), 1);
        assert_eq!(counts.total(), walker.entries().unwrap().len());
        let cell = counts.get(Some(Split::Validation), Label::Fake).unwrap();
        assert_eq!(cell.matched, 0);
        assert_eq!(cell.name(), "validation/fake");
    }

    #[test]
    fn flat_layout_has_no_split() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("fake")).unwrap();
        touch(&base.join("real/x.wav"));

        let walker = DatasetWalker::new(base, Layout::Flat, "wav");
        let counts = walker.count().unwrap();
        assert_eq!(counts.get(None, Label::Fake).unwrap().matched, 0);
        assert_eq!(counts.get(None, Label::Real).unwrap().matched, 1);
        assert_eq!(counts.total(), 1);

        let entries = walker.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].split, None);
        assert_eq!(entries[0].label, Label::Real);
    }

    #[test]
    fn missing_base_is_empty() {
        let walker = DatasetWalker::new("/no/such/dataset", Layout::Split, "wav");
        assert_eq!(walker.count().unwrap().total(), 0);
        assert!(walker.entries().unwrap().is_empty());
    }
}
