/// Number of cepstral coefficients in every vector.
pub const N_MFCC: usize = 20;

/// Number of scalar spectral/timbral descriptors ahead of the MFCCs.
pub const N_SCALAR: usize = 6;

pub const N_FEATURES: usize = N_SCALAR + N_MFCC;

/// Canonical feature order. Column order of every exported table.
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "chroma_stft",
    "rms",
    "spectral_centroid",
    "spectral_bandwidth",
    "rolloff",
    "zero_crossing_rate",
    "mfcc1",
    "mfcc2",
    "mfcc3",
    "mfcc4",
    "mfcc5",
    "mfcc6",
    "mfcc7",
    "mfcc8",
    "mfcc9",
    "mfcc10",
    "mfcc11",
    "mfcc12",
    "mfcc13",
    "mfcc14",
    "mfcc15",
    "mfcc16",
    "mfcc17",
    "mfcc18",
    "mfcc19",
    "mfcc20",
];

/// Per-file summary: every descriptor mean-reduced over its frames.
///
/// Values are stored in `FEATURE_NAMES` order, so a vector always carries
/// exactly the canonical key set.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    values: [f64; N_FEATURES],
}

/// Frame-mean scalar descriptors.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScalarFeatures {
    pub chroma_stft: f64,
    pub rms: f64,
    pub spectral_centroid: f64,
    pub spectral_bandwidth: f64,
    pub rolloff: f64,
    pub zero_crossing_rate: f64,
}

impl FeatureVector {
    pub fn new(scalars: ScalarFeatures, mfcc: [f64; N_MFCC]) -> Self {
        let mut values = [0.0; N_FEATURES];
        values[0] = scalars.chroma_stft;
        values[1] = scalars.rms;
        values[2] = scalars.spectral_centroid;
        values[3] = scalars.spectral_bandwidth;
        values[4] = scalars.rolloff;
        values[5] = scalars.zero_crossing_rate;
        values[N_SCALAR..].copy_from_slice(&mfcc);
        Self { values }
    }

    pub fn from_values(values: [f64; N_FEATURES]) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64; N_FEATURES] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| self.values[i])
    }

    /// 1-based cepstral coefficient, `mfcc(1)` ..= `mfcc(20)`.
    pub fn mfcc(&self, index: usize) -> Option<f64> {
        if (1..=N_MFCC).contains(&index) {
            Some(self.values[N_SCALAR + index - 1])
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    /// First value that is NaN or infinite, if any.
    pub fn first_non_finite(&self) -> Option<(&'static str, f64)> {
        self.iter().find(|(_, v)| !v.is_finite())
    }
}
