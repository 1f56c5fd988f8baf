use std::fs::File;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;

const RESAMPLE_CHUNK: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum AudioDecodeError {
    #[error("cannot open audio file: {0}")]
    Open(#[from] std::io::Error),
    #[error("unsupported or corrupt audio format: {0}")]
    Probe(String),
    #[error("no audio track found")]
    NoTrack,
    #[error("unknown sample rate")]
    UnknownSampleRate,
    #[error("unsupported codec: {0}")]
    Codec(String),
    #[error("decoding failed: {0}")]
    Decode(String),
    #[error("resampling failed: {0}")]
    Resample(String),
}

/// Decode an audio file to 16 kHz mono PCM.
///
/// The file extension, when present, is used as a format hint. A file with
/// a valid header but no samples yields an empty vector.
pub fn decode_file(path: &Path) -> Result<Vec<f32>, AudioDecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioDecodeError::Probe(e.to_string()))?;
    let mut format = probed.format;

    let track = format.default_track().ok_or(AudioDecodeError::NoTrack)?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params
        .sample_rate
        .ok_or(AudioDecodeError::UnknownSampleRate)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioDecodeError::Codec(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut channels = 1;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioDecodeError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!(error = %e, "Skipping corrupt audio frame");
                continue;
            }
            Err(e) => return Err(AudioDecodeError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            continue;
        }
        // Interleaving follows the decoded buffer, not the container header.
        channels = spec.channels.count().max(1);

        let mut buffer = SampleBuffer::<f32>::new(frames as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        let interleaved = buffer.samples();

        if channels > 1 {
            samples.extend(
                interleaved
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        } else {
            samples.extend_from_slice(interleaved);
        }
    }

    if source_rate != TARGET_SAMPLE_RATE && !samples.is_empty() {
        samples = resample(&samples, source_rate, TARGET_SAMPLE_RATE)?;
    }

    tracing::debug!(
        source_rate,
        channels,
        samples = samples.len(),
        duration_secs = samples.len() as f32 / TARGET_SAMPLE_RATE as f32,
        "Audio decoded to 16kHz mono PCM"
    );

    Ok(samples)
}

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioDecodeError> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| AudioDecodeError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let expected_len = (samples.len() as f64 * ratio) as usize;
    let mut output = Vec::with_capacity(delay + expected_len + RESAMPLE_CHUNK);

    let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
    for chunk in &mut chunks {
        let result = resampler
            .process(&[chunk], None)
            .map_err(|e| AudioDecodeError::Resample(e.to_string()))?;
        output.extend(result.into_iter().flatten());
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let tail: [&[f32]; 1] = [remainder];
        let result = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| AudioDecodeError::Resample(e.to_string()))?;
        output.extend(result.into_iter().flatten());
    }

    // Flush what is still inside the filter.
    while output.len() < delay + expected_len {
        let result = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| AudioDecodeError::Resample(e.to_string()))?;
        let before = output.len();
        output.extend(result.into_iter().flatten());
        if output.len() == before {
            break;
        }
    }

    let mut output = output.split_off(delay.min(output.len()));
    output.resize(expected_len, 0.0);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Minimal 16-bit PCM WAV file.
    fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let byte_rate = sample_rate * channels as u32 * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for sample in samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out
    }

    fn write_temp(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_decode_16k_mono_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<i16> = (0..1600).map(|i| ((i % 100) * 100) as i16).collect();
        let path = write_temp(&dir, "tone.wav", &wav_bytes(16_000, 1, &samples));

        let pcm = decode_file(&path).unwrap();
        assert_eq!(pcm.len(), 1600);
        assert!(pcm.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_decode_stereo_downmixes() {
        let dir = tempfile::tempdir().unwrap();
        // left = +16384, right = -16384 -> silence once averaged
        let samples: Vec<i16> = (0..800).flat_map(|_| [16384i16, -16384i16]).collect();
        let path = write_temp(&dir, "stereo.wav", &wav_bytes(16_000, 2, &samples));

        let pcm = decode_file(&path).unwrap();
        assert_eq!(pcm.len(), 800);
        assert!(pcm.iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn test_decode_resamples_to_16k() {
        let dir = tempfile::tempdir().unwrap();
        let samples = vec![0i16; 8000];
        let path = write_temp(&dir, "low.wav", &wav_bytes(8_000, 1, &samples));

        let pcm = decode_file(&path).unwrap();
        assert_eq!(pcm.len(), 16_000);
    }

    #[test]
    fn test_resampling_keeps_signal_aligned() {
        // silence for the first half second, then a constant level
        let samples: Vec<i16> = (0..8000).map(|i| if i < 4000 { 0 } else { 16384 }).collect();
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "step.wav", &wav_bytes(8_000, 1, &samples));

        let pcm = decode_file(&path).unwrap();
        assert_eq!(pcm.len(), 16_000);
        // the step lands at output sample 8000 with no filter delay in front of it
        assert!(pcm[8000 - 64].abs() < 0.125, "before step: {}", pcm[8000 - 64]);
        assert!((pcm[8000 + 64] - 0.5).abs() < 0.125, "after step: {}", pcm[8000 + 64]);
        // the tail is real signal, not padding
        assert!((pcm[15_000] - 0.5).abs() < 0.125, "tail: {}", pcm[15_000]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "noise.bin", b"definitely not audio data at all");
        assert!(decode_file(&path).is_err());
    }

    #[test]
    fn test_decode_missing_file() {
        let err = decode_file(Path::new("/nonexistent/clip.wav")).unwrap_err();
        assert!(matches!(err, AudioDecodeError::Open(_)));
    }
}
