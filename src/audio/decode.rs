//! Decoding of streamed audio segments.
//!
//! Segments arrive as opaque encoded bytes (the backend's TTS emits MP3
//! frames; WAV appears in tests and tooling). Decoding goes through
//! symphonia's format probe so the container/codec never leaks past this
//! module, and multi-channel audio is downmixed to mono.

use crate::error::{AssistError, Result};

/// One decoded audio segment ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSegment {
    /// Mono samples in \[-1, 1\].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl DecodedSegment {
    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode an encoded segment to mono f32 samples.
///
/// # Errors
///
/// Returns [`AssistError::Audio`] when the bytes are not a recognizable
/// audio container or decoding fails outright. Individual corrupt packets
/// inside an otherwise decodable segment are skipped.
pub fn decode_segment(bytes: &[u8]) -> Result<DecodedSegment> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AssistError::Audio(format!("failed to probe segment: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AssistError::Audio("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| AssistError::Audio("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AssistError::Audio(format!("failed to create decoder: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) => {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    break;
                }
                return Err(AssistError::Audio(format!("segment read error: {e}")));
            }
            Err(e) => return Err(AssistError::Audio(format!("segment read error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(AssistError::Audio(format!("segment decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let frames = decoded.frames() as u64;

        let frames_usize = usize::try_from(frames).unwrap_or(usize::MAX);
        let required = frames_usize.saturating_mul(channels);
        let needs_new = match sample_buf.as_ref() {
            Some(b) => b.capacity() < required,
            None => true,
        };

        if needs_new {
            sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
        } else if let Some(b) = sample_buf.as_mut() {
            b.clear();
        }

        if let Some(b) = sample_buf.as_mut() {
            b.copy_interleaved_ref(decoded);
        }

        let data = match sample_buf.as_ref() {
            Some(b) => b.samples(),
            None => &[],
        };
        if channels <= 1 {
            samples.extend_from_slice(data);
        } else {
            for frame in data.chunks_exact(channels) {
                let sum: f32 = frame.iter().sum();
                samples.push(sum / channels as f32);
            }
        }
    }

    if samples.is_empty() {
        return Err(AssistError::Audio("segment contained no audio frames".into()));
    }

    Ok(DecodedSegment {
        samples,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal PCM16 WAV file in memory.
    fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let byte_rate = sample_rate * u32::from(channels) * 2;
        let block_align = channels * 2;

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_mono_wav() {
        let bytes = wav_bytes(24_000, 1, &[0, 16_384, -16_384, 0]);
        let segment = decode_segment(&bytes);
        assert!(segment.is_ok());
        let segment = match segment {
            Ok(s) => s,
            Err(_) => unreachable!("mono wav decodes"),
        };
        assert_eq!(segment.sample_rate, 24_000);
        assert_eq!(segment.samples.len(), 4);
        assert!((segment.samples[1] - 0.5).abs() < 0.01);
    }

    #[test]
    fn downmixes_stereo_to_mono() {
        // L = 16384, R = 0 on every frame → mono ≈ 0.25.
        let interleaved: Vec<i16> = (0..8).map(|i| if i % 2 == 0 { 16_384 } else { 0 }).collect();
        let bytes = wav_bytes(44_100, 2, &interleaved);
        let segment = decode_segment(&bytes);
        assert!(segment.is_ok());
        let segment = match segment {
            Ok(s) => s,
            Err(_) => unreachable!("stereo wav decodes"),
        };
        assert_eq!(segment.sample_rate, 44_100);
        assert_eq!(segment.samples.len(), 4);
        for s in &segment.samples {
            assert!((s - 0.25).abs() < 0.01);
        }
    }

    #[test]
    fn rejects_garbage_bytes() {
        assert!(decode_segment(b"definitely not audio").is_err());
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(decode_segment(&[]).is_err());
    }

    #[test]
    fn duration_from_sample_count() {
        let segment = DecodedSegment {
            samples: vec![0.0; 24_000],
            sample_rate: 24_000,
        };
        assert!((segment.duration_secs() - 1.0).abs() < f32::EPSILON);
    }
}
