use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::decode::AudioSample;
use super::features::{FeatureVector, ScalarFeatures, N_MFCC};
use super::filters::{chroma_filter_bank, dct_basis, fft_frequencies, hann_window, mel_filter_bank};
use crate::error::ExtractionError;

/// Floor applied to mel power before converting to decibels.
const AMIN: f64 = 1e-10;
/// Dynamic range kept below the loudest mel cell.
const TOP_DB: f64 = 80.0;
/// Samples this close to zero do not count as a sign change.
const ZCR_THRESHOLD: f64 = 1e-10;

#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisParams {
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub n_chroma: usize,
    pub rolloff_percent: f64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            n_chroma: 12,
            rolloff_percent: 0.85,
        }
    }
}

impl AnalysisParams {
    pub fn validate(&self) -> Result<(), ExtractionError> {
        let bad = |msg: String| Err(ExtractionError::InvalidParams(msg));
        if self.n_fft < 2 {
            return bad(format!("n_fft must be at least 2, got {}", self.n_fft));
        }
        if self.hop_length == 0 {
            return bad("hop_length must be positive".into());
        }
        if self.n_mels < N_MFCC {
            return bad(format!("n_mels must be at least {}, got {}", N_MFCC, self.n_mels));
        }
        if self.n_chroma == 0 {
            return bad("n_chroma must be positive".into());
        }
        if !(self.rolloff_percent > 0.0 && self.rolloff_percent < 1.0) {
            return bad(format!("rolloff_percent must be in (0, 1), got {}", self.rolloff_percent));
        }
        Ok(())
    }
}

/// Computes the canonical feature vector for one decoded file.
///
/// Holds the FFT plan and analysis window so a single instance can be shared
/// across worker threads for a whole run. Sample-rate dependent filterbanks
/// are built per call.
pub struct FeatureExtractor {
    params: AnalysisParams,
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
}

impl FeatureExtractor {
    pub fn new(params: AnalysisParams) -> Result<Self, ExtractionError> {
        params.validate()?;
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(params.n_fft);
        let window = hann_window(params.n_fft);
        Ok(Self {
            params,
            fft,
            window,
        })
    }

    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    pub fn extract(&self, audio: &AudioSample) -> Result<FeatureVector, ExtractionError> {
        self.extract_until(audio, &AtomicBool::new(false))
    }

    /// Like [`extract`](Self::extract), but gives up with
    /// `ExtractionError::Cancelled` once `cancel` is set. The flag is polled
    /// once per STFT frame.
    pub fn extract_until(
        &self,
        audio: &AudioSample,
        cancel: &AtomicBool,
    ) -> Result<FeatureVector, ExtractionError> {
        if audio.sample_rate == 0 {
            return Err(ExtractionError::InvalidSampleRate(audio.sample_rate));
        }
        if audio.waveform.is_empty() {
            return Err(ExtractionError::EmptySignal);
        }
        if let Some(idx) = audio.waveform.iter().position(|s| !s.is_finite()) {
            return Err(ExtractionError::NonFiniteInput(idx));
        }

        let samples: Vec<f64> = audio.waveform.iter().map(|&s| s as f64).collect();
        let sr = audio.sample_rate;

        // Pass 1: spectral descriptors and mel energies per STFT frame
        let spectral = self.spectral_pass(&samples, sr, cancel)?;

        // Pass 2: time-domain descriptors
        let rms = mean(&frame_rms(&samples, self.params.n_fft, self.params.hop_length));
        let zcr = mean(&frame_zcr(&samples, self.params.n_fft, self.params.hop_length));

        // Pass 3: cepstral coefficients from the clamped log-mel spectrogram
        let mfcc = cepstral_means(&spectral.mel_db, self.params.n_mels);

        let vector = FeatureVector::new(
            ScalarFeatures {
                chroma_stft: mean(&spectral.chroma.concat()),
                rms,
                spectral_centroid: mean(&spectral.centroid),
                spectral_bandwidth: mean(&spectral.bandwidth),
                rolloff: mean(&spectral.rolloff),
                zero_crossing_rate: zcr,
            },
            mfcc,
        );

        if let Some((name, value)) = vector.first_non_finite() {
            return Err(ExtractionError::NonFiniteFeature { name, value });
        }

        log::trace!(
            "Extracted {} samples @ {}Hz: rms={:.5}, centroid={:.1}Hz",
            samples.len(),
            sr,
            rms,
            mean(&spectral.centroid)
        );

        Ok(vector)
    }

    fn spectral_pass(
        &self,
        samples: &[f64],
        sample_rate: u32,
        cancel: &AtomicBool,
    ) -> Result<SpectralFrames, ExtractionError> {
        let n_fft = self.params.n_fft;
        let hop = self.params.hop_length;
        let half = n_fft / 2 + 1;

        let freqs = fft_frequencies(sample_rate, n_fft);
        let mel_bank = mel_filter_bank(self.params.n_mels, n_fft, sample_rate, 0.0, sample_rate as f64 / 2.0);
        let chroma_bank = chroma_filter_bank(self.params.n_chroma, n_fft, sample_rate);

        let padded = pad_constant(samples, n_fft / 2);
        let n_frames = frame_count(padded.len(), n_fft, hop);

        let mut out = SpectralFrames {
            chroma: Vec::with_capacity(n_frames),
            centroid: Vec::with_capacity(n_frames),
            bandwidth: Vec::with_capacity(n_frames),
            rolloff: Vec::with_capacity(n_frames),
            mel_db: Vec::with_capacity(n_frames),
        };

        let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
        let mut magnitude = vec![0.0f64; half];
        let mut power = vec![0.0f64; half];

        for t in 0..n_frames {
            if cancel.load(Ordering::Relaxed) {
                return Err(ExtractionError::Cancelled);
            }
            let start = t * hop;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] * self.window[i], 0.0);
            }
            self.fft.process(&mut buffer);

            for k in 0..half {
                magnitude[k] = buffer[k].norm();
                power[k] = buffer[k].norm_sqr();
            }

            // chroma: filterbank over power, max-normalized per frame
            let mut chroma: Vec<f64> = chroma_bank.iter().map(|row| dot(row, &power)).collect();
            let peak = chroma.iter().fold(0.0f64, |m, v| m.max(v.abs()));
            if peak > f64::MIN_POSITIVE {
                for v in chroma.iter_mut() {
                    *v /= peak;
                }
            }
            out.chroma.push(chroma);

            let total: f64 = magnitude.iter().sum();
            let (centroid, bandwidth) = if total > f64::MIN_POSITIVE {
                let centroid = dot(&freqs, &magnitude) / total;
                let spread = magnitude
                    .iter()
                    .zip(freqs.iter())
                    .map(|(&m, &f)| (m / total) * (f - centroid).powi(2))
                    .sum::<f64>();
                (centroid, spread.sqrt())
            } else {
                (0.0, 0.0)
            };
            out.centroid.push(centroid);
            out.bandwidth.push(bandwidth);
            out.rolloff
                .push(rolloff_frequency(&magnitude, &freqs, self.params.rolloff_percent));

            out.mel_db.push(
                mel_bank
                    .iter()
                    .map(|row| 10.0 * dot(row, &power).max(AMIN).log10())
                    .collect(),
            );
        }

        Ok(out)
    }
}

struct SpectralFrames {
    /// `[frame][pitch class]`, row 0 = C, each frame scaled to a peak of 1
    chroma: Vec<Vec<f64>>,
    centroid: Vec<f64>,
    bandwidth: Vec<f64>,
    rolloff: Vec<f64>,
    /// `[frame][mel band]`, unclamped decibels
    mel_db: Vec<Vec<f64>>,
}

/// Convenience wrapper for one-off extraction.
pub fn extract_features(
    audio: &AudioSample,
    params: &AnalysisParams,
) -> Result<FeatureVector, ExtractionError> {
    FeatureExtractor::new(params.clone())?.extract(audio)
}

fn cepstral_means(mel_db: &[Vec<f64>], n_mels: usize) -> [f64; N_MFCC] {
    let mut coeffs = [0.0; N_MFCC];
    if mel_db.is_empty() {
        return coeffs;
    }

    let peak = mel_db
        .iter()
        .flat_map(|frame| frame.iter())
        .fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    let floor = peak - TOP_DB;

    // The DCT is linear, so the frame mean of the coefficients equals the
    // DCT of the frame-mean log-mel spectrum.
    let mut band_mean = vec![0.0f64; n_mels];
    for frame in mel_db {
        for (acc, &db) in band_mean.iter_mut().zip(frame.iter()) {
            *acc += db.max(floor);
        }
    }
    let n = mel_db.len() as f64;
    for acc in band_mean.iter_mut() {
        *acc /= n;
    }

    let basis = dct_basis(N_MFCC, n_mels);
    for (c, row) in basis.iter().enumerate() {
        coeffs[c] = dot(row, &band_mean);
    }
    coeffs
}

fn rolloff_frequency(magnitude: &[f64], freqs: &[f64], percent: f64) -> f64 {
    let total: f64 = magnitude.iter().sum();
    let threshold = percent * total;
    let mut cumulative = 0.0;
    for (k, &m) in magnitude.iter().enumerate() {
        cumulative += m;
        if cumulative >= threshold {
            return freqs[k];
        }
    }
    freqs.last().copied().unwrap_or(0.0)
}

fn frame_rms(samples: &[f64], frame_length: usize, hop: usize) -> Vec<f64> {
    let padded = pad_constant(samples, frame_length / 2);
    let n_frames = frame_count(padded.len(), frame_length, hop);
    (0..n_frames)
        .map(|t| {
            let frame = &padded[t * hop..t * hop + frame_length];
            (frame.iter().map(|s| s * s).sum::<f64>() / frame_length as f64).sqrt()
        })
        .collect()
}

fn frame_zcr(samples: &[f64], frame_length: usize, hop: usize) -> Vec<f64> {
    let padded = pad_edge(samples, frame_length / 2);
    let n_frames = frame_count(padded.len(), frame_length, hop);
    let negative = |x: f64| x < -ZCR_THRESHOLD;
    (0..n_frames)
        .map(|t| {
            let frame = &padded[t * hop..t * hop + frame_length];
            let crossings = frame
                .windows(2)
                .filter(|w| {
                    let a = if w[0].abs() <= ZCR_THRESHOLD { 0.0 } else { w[0] };
                    let b = if w[1].abs() <= ZCR_THRESHOLD { 0.0 } else { w[1] };
                    negative(a) != negative(b)
                })
                .count();
            crossings as f64 / frame_length as f64
        })
        .collect()
}

fn pad_constant(samples: &[f64], pad: usize) -> Vec<f64> {
    let mut padded = vec![0.0; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);
    padded
}

fn pad_edge(samples: &[f64], pad: usize) -> Vec<f64> {
    let first = samples.first().copied().unwrap_or(0.0);
    let last = samples.last().copied().unwrap_or(0.0);
    let mut padded = Vec::with_capacity(samples.len() + 2 * pad);
    padded.extend(std::iter::repeat(first).take(pad));
    padded.extend_from_slice(samples);
    padded.extend(std::iter::repeat(last).take(pad));
    padded
}

fn frame_count(padded_len: usize, frame_length: usize, hop: usize) -> usize {
    if padded_len < frame_length {
        return 0;
    }
    1 + (padded_len - frame_length) / hop
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::FEATURE_NAMES;

    fn tone(freq: f64, sample_rate: u32, seconds: f64) -> AudioSample {
        let n = (sample_rate as f64 * seconds) as usize;
        let waveform = (0..n)
            .map(|i| (0.5 * (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin()) as f32)
            .collect();
        AudioSample::new(waveform, sample_rate)
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(AnalysisParams::default()).unwrap()
    }

    #[test]
    fn tone_produces_all_finite_features() {
        let v = extractor().extract(&tone(440.0, 22050, 1.0)).unwrap();
        assert_eq!(v.iter().count(), FEATURE_NAMES.len());
        assert!(v.iter().all(|(_, x)| x.is_finite()));
    }

    #[test]
    fn tone_descriptors_are_plausible() {
        let v = extractor().extract(&tone(1000.0, 16000, 1.0)).unwrap();
        let centroid = v.get("spectral_centroid").unwrap();
        assert!((centroid - 1000.0).abs() < 150.0, "centroid {}", centroid);
        let rolloff = v.get("rolloff").unwrap();
        assert!(rolloff >= 900.0 && rolloff < 2000.0, "rolloff {}", rolloff);
        // 0.5 amplitude sine has rms ~0.354, edge frames pull the mean down
        let rms = v.get("rms").unwrap();
        assert!(rms > 0.3 && rms < 0.36, "rms {}", rms);
        // 1 kHz at 16 kHz crosses zero twice per 16 samples
        let zcr = v.get("zero_crossing_rate").unwrap();
        assert!((zcr - 0.125).abs() < 0.01, "zcr {}", zcr);
        // one dominant pitch class per frame, the rest well below it
        let chroma = v.get("chroma_stft").unwrap();
        assert!(chroma > 1.0 / 12.0 && chroma < 0.4, "chroma {}", chroma);
    }

    fn peak_classes(audio: &AudioSample) -> Vec<usize> {
        let samples: Vec<f64> = audio.waveform.iter().map(|&s| s as f64).collect();
        extractor()
            .spectral_pass(&samples, audio.sample_rate, &AtomicBool::new(false))
            .unwrap()
            .chroma
            .iter()
            .map(|frame| {
                (0..frame.len())
                    .max_by(|&a, &b| frame[a].partial_cmp(&frame[b]).unwrap())
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn chroma_peaks_on_the_played_pitch_class() {
        // A4 -> A (9); 1 kHz lies 0.2 semitones above B5 -> B (11)
        for &(freq, sr, class) in &[(440.0, 22050, 9), (440.0, 16000, 9), (1000.0, 16000, 11)] {
            let peaks = peak_classes(&tone(freq, sr, 1.0));
            assert!(!peaks.is_empty());
            assert!(
                peaks.iter().all(|&c| c == class),
                "{} Hz @ {}: {:?}",
                freq,
                sr,
                peaks
            );
        }
    }

    #[test]
    fn chroma_frames_are_peak_normalized() {
        let samples: Vec<f64> = tone(440.0, 22050, 0.5).waveform.iter().map(|&s| s as f64).collect();
        let spectral = extractor()
            .spectral_pass(&samples, 22050, &AtomicBool::new(false))
            .unwrap();
        for frame in &spectral.chroma {
            assert_eq!(frame.len(), 12);
            let peak = frame.iter().cloned().fold(0.0, f64::max);
            assert!((peak - 1.0).abs() < 1e-12);
            assert!(frame.iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn empty_waveform_is_an_extraction_error() {
        let err = extractor().extract(&AudioSample::new(vec![], 22050)).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptySignal));
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let err = extractor().extract(&AudioSample::new(vec![0.1; 100], 0)).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidSampleRate(0)));
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let mut waveform = vec![0.1f32; 4096];
        waveform[17] = f32::NAN;
        let err = extractor().extract(&AudioSample::new(waveform, 22050)).unwrap_err();
        assert!(matches!(err, ExtractionError::NonFiniteInput(17)));
    }

    #[test]
    fn shorter_than_window_is_still_defined() {
        let v = extractor().extract(&tone(440.0, 22050, 0.01)).unwrap();
        assert!(v.first_non_finite().is_none());
    }

    #[test]
    fn silence_is_finite() {
        let v = extractor().extract(&AudioSample::new(vec![0.0; 8000], 8000)).unwrap();
        assert_eq!(v.get("rms"), Some(0.0));
        assert_eq!(v.get("zero_crossing_rate"), Some(0.0));
        assert_eq!(v.get("spectral_centroid"), Some(0.0));
        // every mel band sits at the 1e-10 floor, only c0 survives the DCT
        assert!(v.mfcc(1).unwrap() < -1000.0);
        assert!(v.mfcc(2).unwrap().abs() < 1e-6);
    }

    #[test]
    fn cancelled_extraction_stops() {
        let cancel = AtomicBool::new(true);
        let err = extractor()
            .extract_until(&tone(440.0, 22050, 1.0), &cancel)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Cancelled));
    }

    #[test]
    fn extraction_is_reproducible() {
        let audio = tone(330.0, 44100, 0.5);
        let a = extractor().extract(&audio).unwrap();
        let b = extractor().extract(&audio).unwrap();
        let bits = |v: &FeatureVector| v.values().map(f64::to_bits);
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn rejects_invalid_params() {
        let params = AnalysisParams {
            n_mels: 10,
            ..Default::default()
        };
        assert!(FeatureExtractor::new(params).is_err());
        let params = AnalysisParams {
            hop_length: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn frame_count_matches_centered_stft() {
        let samples = vec![0.0; 22050];
        assert_eq!(frame_rms(&samples, 2048, 512).len(), 1 + 22050 / 512);
        assert_eq!(frame_zcr(&samples, 2048, 512).len(), 1 + 22050 / 512);
    }
}
