pub mod analysis;
pub mod decode;
pub mod features;
pub mod filters;

pub use analysis::{extract_features, AnalysisParams, FeatureExtractor};
pub use decode::{load_audio, AudioSample};
pub use features::{FeatureVector, FEATURE_NAMES, N_FEATURES, N_MFCC};
