use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::LoadError;

/// Mono samples at the file's native sample rate.
#[derive(Clone, Debug)]
pub struct AudioSample {
    pub waveform: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSample {
    pub fn new(waveform: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            waveform,
            sample_rate,
        }
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.waveform.len() as f64 / self.sample_rate as f64
    }
}

/// Decode `path` to mono without resampling.
pub fn load_audio(path: &Path) -> Result<AudioSample, LoadError> {
    let fail = |reason: String| LoadError::new(path, reason);

    let file = std::fs::File::open(path).map_err(|e| fail(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| fail(format!("failed to probe audio format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| fail("no audio tracks found".to_string()))?;

    let track_id = track.id;
    let expected_frames = track.codec_params.n_frames;
    let channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track
        .codec_params
        .sample_rate
        .filter(|&sr| sr > 0)
        .ok_or_else(|| fail("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| fail(format!("failed to create audio decoder: {}", e)))?;

    let mut waveform: Vec<f32> = Vec::new();
    let mut bad_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(fail(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => {
                bad_packets += 1;
                continue;
            }
            Err(e) => return Err(fail(e.to_string())),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        let samples = sample_buf.samples();

        if channels == 1 {
            waveform.extend_from_slice(samples);
        } else {
            for frame_samples in samples.chunks(channels) {
                let mono: f32 = frame_samples.iter().sum::<f32>() / channels as f32;
                waveform.push(mono);
            }
        }
    }

    if bad_packets > 0 {
        log::debug!("{}: skipped {} undecodable packets", path.display(), bad_packets);
    }

    // The container declared more audio than the stream delivered.
    if let Some(expected) = expected_frames {
        if (waveform.len() as u64) < expected {
            return Err(fail(format!(
                "truncated audio: expected {} frames, decoded {}",
                expected,
                waveform.len()
            )));
        }
    }

    if waveform.is_empty() {
        return Err(fail("zero-length signal".to_string()));
    }

    log::debug!(
        "Decoded {}: {} samples, {}Hz, {:.2}s",
        path.display(),
        waveform.len(),
        sample_rate,
        waveform.len() as f32 / sample_rate as f32
    );

    Ok(AudioSample::new(waveform, sample_rate))
}
