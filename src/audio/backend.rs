use std::sync::Arc;
use tokio::sync::mpsc;

use super::codec::SAMPLE_RATE;
use crate::error::Result;

/// Captured audio block (16-bit PCM, mono)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// PCM16 samples
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration of this frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Configuration for audio backends
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate (device audio is resampled to it)
    pub target_sample_rate: u32,
    /// Samples per emitted frame
    pub block_size: usize,
    /// Capacity of the frame channel handed to the consumer
    pub channel_capacity: usize,
    /// Input device name (default device when unset)
    pub input_device: Option<String>,
    /// Output device name (default device when unset)
    pub output_device: Option<String>,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: SAMPLE_RATE, // 24kHz realtime PCM16
            block_size: 4096,
            channel_capacity: 64,
            input_device: None,
            output_device: None,
        }
    }
}

/// Microphone capture trait
///
/// Implementations own a real (or fake) input device. Each `start` hands out
/// a fresh receiver, so the sink can only change between start/stop cycles.
#[async_trait::async_trait]
pub trait AudioBackend: Send {
    /// Acquire the device and start emitting frames
    ///
    /// Fails with `SessionError::Device` when the device is unavailable or denied.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Release the device. Safe to call when not started.
    async fn stop(&mut self);

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Speaker trait used by the playback scheduler
#[async_trait::async_trait]
pub trait AudioOutput: Send + Sync {
    /// Play one PCM16 segment, resolving once it has been fully played
    async fn play(&self, samples: Vec<i16>, sample_rate: u32) -> Result<()>;

    /// Silence the device immediately, abandoning the current segment
    fn stop(&self);

    /// Get output name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create the platform microphone backend
    pub fn microphone(config: AudioBackendConfig) -> Box<dyn AudioBackend> {
        Box::new(super::microphone::CpalMicrophone::new(config))
    }

    /// Create the platform speaker
    pub fn speaker(config: AudioBackendConfig) -> Arc<dyn AudioOutput> {
        Arc::new(super::speaker::CpalSpeaker::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame {
            samples: vec![0; 2400],
            sample_rate: SAMPLE_RATE,
            timestamp_ms: 0,
        };
        assert_eq!(frame.duration_ms(), 100);
    }

    #[test]
    fn test_frame_duration_zero_rate() {
        let frame = AudioFrame {
            samples: vec![0; 10],
            sample_rate: 0,
            timestamp_ms: 0,
        };
        assert_eq!(frame.duration_ms(), 0);
    }
}
