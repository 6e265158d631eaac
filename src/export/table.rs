use crate::audio::{FeatureVector, FEATURE_NAMES};
use crate::dataset::{DatasetEntry, Label, Split};

/// One table row: a file's features plus its bookkeeping columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub features: FeatureVector,
    pub filename: String,
    pub split: Option<Split>,
    pub label: Label,
}

impl FeatureRow {
    pub fn new(entry: &DatasetEntry, features: FeatureVector) -> Self {
        Self {
            features,
            filename: entry.filename(),
            split: entry.split,
            label: entry.label,
        }
    }

    pub fn label_code(&self) -> u8 {
        self.label.code()
    }
}

/// Column names in output order: features, filename, split (split datasets
/// only), label, labelCode.
pub fn columns(has_split: bool) -> Vec<&'static str> {
    let mut cols: Vec<&'static str> = FEATURE_NAMES.to_vec();
    cols.push("filename");
    if has_split {
        cols.push("split");
    }
    cols.push("label");
    cols.push("labelCode");
    cols
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn split_columns_follow_features() {
        let cols = columns(true);
        assert_eq!(cols.len(), 30);
        assert_eq!(cols[0], "chroma_stft");
        assert_eq!(cols[25], "mfcc20");
        assert_eq!(&cols[26..], ["filename", "split", "label", "labelCode"]);
    }

    #[test]
    fn flat_columns_have_no_split() {
        let cols = columns(false);
        assert_eq!(cols.len(), 29);
        assert_eq!(&cols[26..], ["filename", "label", "labelCode"]);
    }

    #[test]
    fn row_takes_bookkeeping_from_entry() {
        let entry = DatasetEntry {
            path: PathBuf::from("/data/training/real/c.wav"),
            label: Label::Real,
            split: Some(Split::Training),
        };
        let row = FeatureRow::new(&entry, FeatureVector::from_values([0.0; 26]));
        assert_eq!(row.filename, "c.wav");
        assert_eq!(row.label_code(), 1);
        assert_eq!(row.split, Some(Split::Training));
    }
}
