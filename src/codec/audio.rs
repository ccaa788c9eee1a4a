use crate::{Error, Result};
use base64::Engine as _;
use std::time::Duration;

/// Sample rate of speech payloads returned by the TTS model.
pub const SAMPLE_RATE: u32 = 24_000;
/// Speech payloads are mono.
pub const CHANNELS: u16 = 1;

const BITS_PER_SAMPLE: u16 = 16;

/// Decoded speech ready for an audio sink: mono, 24 kHz, samples in
/// `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
}

impl SampleBuffer {
    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    pub fn channels(&self) -> u16 {
        CHANNELS
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / SAMPLE_RATE as f64)
    }

    /// Serializes the buffer as a 16-bit PCM RIFF/WAVE file.
    pub fn to_wav_bytes(&self) -> Vec<u8> {
        let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
        let byte_rate = SAMPLE_RATE * block_align as u32;
        let data_len = (self.samples.len() * block_align as usize) as u32;

        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&CHANNELS.to_le_bytes());
        out.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for sample in &self.samples {
            let pcm = (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            out.extend_from_slice(&pcm.to_le_bytes());
        }
        out
    }
}

/// Decodes little-endian signed 16-bit PCM into normalized samples.
///
/// A payload with an odd byte length is rejected rather than truncated.
pub fn decode_audio(raw: &[u8]) -> Result<SampleBuffer> {
    if raw.len() % 2 != 0 {
        return Err(Error::MalformedAudio(format!(
            "PCM payload has odd length {}",
            raw.len()
        )));
    }

    let samples = raw
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    Ok(SampleBuffer { samples })
}

/// Decodes the base64 payload returned by speech synthesis.
pub fn decode_audio_base64(payload: &str) -> Result<SampleBuffer> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::MalformedAudio(format!("invalid base64: {}", e)))?;
    decode_audio(&raw)
}
