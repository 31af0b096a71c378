// Frame codec: float <-> PCM16 sample conversion and the base64 wire encoding
//
// The remote endpoint speaks 16-bit signed little-endian PCM, 24kHz mono,
// carried as base64 text inside JSON frames.

use base64::Engine;

/// Sample rate of every PCM16 frame exchanged with the remote endpoint
pub const SAMPLE_RATE: u32 = 24_000;

const POSITIVE_FULL_SCALE: f32 = 32_767.0;
const NEGATIVE_FULL_SCALE: f32 = 32_768.0;

/// Convert float samples in [-1, 1] to PCM16
///
/// Out-of-range samples are clamped. Negative samples scale by 32768,
/// positive by 32767, so both extremes map onto the full i16 range.
pub fn encode(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = s.clamp(-1.0, 1.0);
            let scaled = if s < 0.0 {
                s * NEGATIVE_FULL_SCALE
            } else {
                s * POSITIVE_FULL_SCALE
            };
            scaled.round() as i16
        })
        .collect()
}

/// Convert PCM16 back to float samples in [-1, 1]
pub fn decode(pcm: &[i16]) -> Vec<f32> {
    pcm.iter()
        .map(|&s| {
            if s < 0 {
                s as f32 / NEGATIVE_FULL_SCALE
            } else {
                s as f32 / POSITIVE_FULL_SCALE
            }
        })
        .collect()
}

/// Serialize PCM16 samples as little-endian bytes
pub fn pcm_to_bytes(pcm: &[i16]) -> Vec<u8> {
    pcm.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Parse little-endian bytes into PCM16 samples (a trailing odd byte is dropped)
pub fn pcm_from_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Binary-to-text transport encoding (standard base64)
pub fn to_wire(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Inverse of [`to_wire`]
pub fn from_wire(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(text)
}

/// Convert interleaved multi-channel audio to mono by averaging channels
pub fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels.max(1) as usize;
    if ch == 1 {
        return data.to_vec();
    }
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler
///
/// Speech-only content, so no anti-alias filter.
pub fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || src_rate == 0 || dst_rate == 0 {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}

/// Streaming linear resampler
///
/// Carries the fractional read position and the last input sample between
/// calls, so a stream fed in arbitrary chunks interpolates across chunk
/// boundaries and does not drift.
#[derive(Debug, Clone)]
pub struct Resampler {
    ratio: f64,
    passthrough: bool,
    /// Read position relative to `last` (or to the first input sample)
    position: f64,
    last: Option<f32>,
}

impl Resampler {
    pub fn new(src_rate: u32, dst_rate: u32) -> Self {
        let passthrough = src_rate == dst_rate || src_rate == 0 || dst_rate == 0;
        Self {
            ratio: if passthrough {
                1.0
            } else {
                src_rate as f64 / dst_rate as f64
            },
            passthrough,
            position: 0.0,
            last: None,
        }
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.passthrough || input.is_empty() {
            return input.to_vec();
        }

        let last = self.last;
        let offset = usize::from(last.is_some());
        let len = input.len() + offset;
        let at = |i: usize| match (i, last) {
            (0, Some(last)) => last,
            _ => input[i - offset],
        };

        let mut output = Vec::with_capacity((input.len() as f64 / self.ratio) as usize + 1);
        let mut position = self.position;
        while (position as usize) + 1 < len {
            let idx = position as usize;
            let frac = position - idx as f64;
            let sample = at(idx) as f64 * (1.0 - frac) + at(idx + 1) as f64 * frac;
            output.push(sample as f32);
            position += self.ratio;
        }

        self.last = Some(at(len - 1));
        self.position = position - (len - 1) as f64;
        output
    }
}
