//! Dataset definitions and traversal

pub mod walker;

pub use walker::{CountCell, DatasetCounts, DatasetEntry, DatasetWalker, Label, Layout, Split};

use std::path::PathBuf;

/// File name of the split corpus' feature table.
pub const FOR_NORM_CSV: &str = "for_norm_features.csv";
/// File name of the flat corpus' feature table.
pub const IN_THE_WILD_CSV: &str = "release_in_wild_features.csv";

/// A dataset to process: where it lives, how it is laid out and where its
/// table goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub name: String,
    pub base: PathBuf,
    pub layout: Layout,
    pub output_file: String,
}

impl Dataset {
    /// The training/validation/testing corpus.
    pub fn for_norm(base: impl Into<PathBuf>) -> Self {
        Self {
            name: "for-norm".to_string(),
            base: base.into(),
            layout: Layout::Split,
            output_file: FOR_NORM_CSV.to_string(),
        }
    }

    /// The flat real/fake corpus.
    pub fn in_the_wild(base: impl Into<PathBuf>) -> Self {
        Self {
            name: "release-in-the-wild".to_string(),
            base: base.into(),
            layout: Layout::Flat,
            output_file: IN_THE_WILD_CSV.to_string(),
        }
    }

    pub fn has_split(&self) -> bool {
        self.layout == Layout::Split
    }

    pub fn walker(&self, extension: &str) -> DatasetWalker {
        DatasetWalker::new(&self.base, self.layout, extension)
    }
}
