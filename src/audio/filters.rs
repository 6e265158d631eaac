//! Windows, filterbanks and the cepstral DCT basis.
//!
//! Filterbanks are row-major `[band][bin]` over the `n_fft / 2 + 1`
//! non-negative frequency bins.

use std::f64::consts::PI;

/// Periodic Hann window (the DFT-even variant used for spectral analysis).
pub fn hann_window(size: usize) -> Vec<f64> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / size as f64).cos())
        .collect()
}

/// Centre frequency of every STFT bin in Hz.
pub fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f64> {
    let step = sample_rate as f64 / n_fft as f64;
    (0..=n_fft / 2).map(|k| k as f64 * step).collect()
}

const MEL_F_SP: f64 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f64 = 1000.0;
const MEL_MIN_LOG_MEL: f64 = MEL_MIN_LOG_HZ / MEL_F_SP;

fn mel_log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MEL_MIN_LOG_HZ {
        MEL_MIN_LOG_MEL + (hz / MEL_MIN_LOG_HZ).ln() / mel_log_step()
    } else {
        hz / MEL_F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MEL_MIN_LOG_MEL {
        MEL_MIN_LOG_HZ * (mel_log_step() * (mel - MEL_MIN_LOG_MEL)).exp()
    } else {
        mel * MEL_F_SP
    }
}

/// Triangular mel filterbank with Slaney area normalization.
pub fn mel_filter_bank(
    num_mels: usize,
    n_fft: usize,
    sample_rate: u32,
    low_freq: f64,
    high_freq: f64,
) -> Vec<Vec<f64>> {
    let fft_freqs = fft_frequencies(sample_rate, n_fft);

    let low_mel = hz_to_mel(low_freq);
    let high_mel = hz_to_mel(high_freq);
    let step = (high_mel - low_mel) / (num_mels + 1) as f64;
    let mel_f: Vec<f64> = (0..num_mels + 2)
        .map(|i| mel_to_hz(low_mel + i as f64 * step))
        .collect();
    let fdiff: Vec<f64> = mel_f.windows(2).map(|w| w[1] - w[0]).collect();

    let mut bank = Vec::with_capacity(num_mels);
    for m in 0..num_mels {
        let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]);
        let filter: Vec<f64> = fft_freqs
            .iter()
            .map(|&f| {
                let lower = (f - mel_f[m]) / fdiff[m];
                let upper = (mel_f[m + 2] - f) / fdiff[m + 1];
                lower.min(upper).max(0.0) * enorm
            })
            .collect();
        bank.push(filter);
    }
    bank
}

/// Centre octave of the chroma weighting bump.
const CHROMA_CENTER_OCTAVE: f64 = 5.0;
/// Width of the octave weighting bump, in octaves.
const CHROMA_OCTAVE_WIDTH: f64 = 2.0;
/// Reference frequency of octave 0 at zero tuning (A440 / 16).
const CHROMA_REF_HZ: f64 = 440.0 / 16.0;

/// Chroma filterbank mapping STFT bins onto `n_chroma` pitch classes,
/// row 0 = C.
pub fn chroma_filter_bank(n_chroma: usize, n_fft: usize, sample_rate: u32) -> Vec<Vec<f64>> {
    let nc = n_chroma as f64;

    // Fractional chroma bin of every FFT bin except DC; DC is extrapolated
    // 1.5 octaves below bin 1.
    let mut frq_bins = Vec::with_capacity(n_fft);
    frq_bins.push(0.0);
    for k in 1..n_fft {
        let hz = k as f64 * sample_rate as f64 / n_fft as f64;
        frq_bins.push(nc * (hz / CHROMA_REF_HZ).log2());
    }
    frq_bins[0] = frq_bins.get(1).copied().unwrap_or(0.0) - 1.5 * nc;

    let mut bin_width: Vec<f64> = frq_bins
        .windows(2)
        .map(|w| (w[1] - w[0]).max(1.0))
        .collect();
    bin_width.push(1.0);

    let half = (nc / 2.0).round();
    let mut wts = vec![vec![0.0; n_fft]; n_chroma];
    for (c, row) in wts.iter_mut().enumerate() {
        for (k, w) in row.iter_mut().enumerate() {
            let d = (frq_bins[k] - c as f64 + half + 10.0 * nc).rem_euclid(nc) - half;
            *w = (-0.5 * (2.0 * d / bin_width[k]).powi(2)).exp();
        }
    }

    for k in 0..n_fft {
        let norm = wts.iter().map(|row| row[k] * row[k]).sum::<f64>().sqrt();
        if norm > f64::MIN_POSITIVE {
            for row in wts.iter_mut() {
                row[k] /= norm;
            }
        }
    }

    for k in 0..n_fft {
        let octave = frq_bins[k] / nc;
        let weight = (-0.5 * ((octave - CHROMA_CENTER_OCTAVE) / CHROMA_OCTAVE_WIDTH).powi(2)).exp();
        for row in wts.iter_mut() {
            row[k] *= weight;
        }
    }

    // Start at C instead of A.
    let shift = 3 * (n_chroma / 12);
    wts.rotate_left(shift % n_chroma.max(1));

    let keep = n_fft / 2 + 1;
    for row in wts.iter_mut() {
        row.truncate(keep);
    }
    wts
}

/// Orthonormal DCT-II basis, `[n_out][n_in]`.
pub fn dct_basis(n_out: usize, n_in: usize) -> Vec<Vec<f64>> {
    let n = n_in as f64;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_in)
                .map(|i| scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_window_periodic() {
        let w = hann_window(8);
        assert_eq!(w.len(), 8);
        assert!(w[0].abs() < 1e-12);
        assert!((w[4] - 1.0).abs() < 1e-12);
        // periodic: w[i] == w[n - i]
        for i in 1..4 {
            assert!((w[i] - w[8 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn hz_mel_roundtrip() {
        for &hz in &[0.0, 100.0, 440.0, 1000.0, 4000.0, 11025.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((hz - back).abs() < 1e-6, "roundtrip failed for {} Hz", hz);
        }
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn mel_filter_bank_shape() {
        let bank = mel_filter_bank(128, 2048, 22050, 0.0, 11025.0);
        assert_eq!(bank.len(), 128);
        assert_eq!(bank[0].len(), 1025);
        for filter in &bank {
            assert!(filter.iter().all(|&v| v >= 0.0));
        }
        // upper filters are wide enough to cover at least one bin
        assert!(bank[127].iter().any(|&v| v > 0.0));
    }

    #[test]
    fn chroma_filter_bank_peaks_at_pitch_class() {
        let sr = 22050;
        let n_fft = 2048;
        let bank = chroma_filter_bank(12, n_fft, sr);
        assert_eq!(bank.len(), 12);
        assert_eq!(bank[0].len(), n_fft / 2 + 1);

        // bin nearest 440 Hz should weigh A (index 9) highest
        let bin = (440.0 * n_fft as f64 / sr as f64).round() as usize;
        let best = (0..12)
            .max_by(|&a, &b| bank[a][bin].partial_cmp(&bank[b][bin]).unwrap())
            .unwrap();
        assert_eq!(best, 9);
    }

    #[test]
    fn chroma_weights_center_on_each_pitch_class() {
        let sr = 22050;
        let n_fft = 4096;
        let bank = chroma_filter_bank(12, n_fft, sr);
        // C4, E4, G4, A4, B4 in row order after the C roll
        for &(hz, class) in &[(261.63, 0), (329.63, 4), (392.0, 7), (440.0, 9), (493.88, 11)] {
            let bin = (hz * n_fft as f64 / sr as f64).round() as usize;
            let best = (0..12)
                .max_by(|&a, &b| bank[a][bin].partial_cmp(&bank[b][bin]).unwrap())
                .unwrap();
            assert_eq!(best, class, "{} Hz", hz);
            // neighbours a semitone away get a fraction of the weight
            let up = bank[(class + 1) % 12][bin];
            let down = bank[(class + 11) % 12][bin];
            assert!(up < 0.5 * bank[class][bin] && down < 0.5 * bank[class][bin]);
        }
    }

    #[test]
    fn dct_basis_orthonormal() {
        let basis = dct_basis(8, 8);
        for a in 0..8 {
            for b in 0..8 {
                let dot: f64 = basis[a].iter().zip(&basis[b]).map(|(x, y)| x * y).sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-9);
            }
        }
    }
}
