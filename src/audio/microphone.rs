//! Microphone capture using cpal.
//!
//! The cpal stream lives on a dedicated thread for its whole life (streams are
//! not `Send`). Audio is downmixed to mono, resampled to the target rate and
//! re-blocked into fixed-size PCM16 frames before reaching the consumer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::codec;
use crate::error::{Result, SessionError};

/// Default-device microphone backend
pub struct CpalMicrophone {
    config: AudioBackendConfig,
    worker: Option<CaptureWorker>,
}

/// Handle on the thread that owns the cpal input stream.
///
/// Dropping `stop_tx` (or sending on it) ends the thread and releases the device.
struct CaptureWorker {
    stop_tx: std_mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl CpalMicrophone {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            worker: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for CpalMicrophone {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.worker.is_some() {
            return Err(SessionError::Device("microphone already capturing".into()));
        }

        info!(
            "Starting microphone capture ({}Hz, {} samples/frame)",
            self.config.target_sample_rate, self.config.block_size
        );

        let (frame_tx, frame_rx) = mpsc::channel(self.config.channel_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || run_capture(config, frame_tx, ready_tx, stop_rx))
            .map_err(|e| SessionError::Device(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker { stop_tx, thread });
                info!("Microphone capture started");
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(SessionError::Device(
                "capture thread exited before the stream started".into(),
            )),
        }
    }

    async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        info!("Stopping microphone capture");
        let _ = worker.stop_tx.send(());
        if tokio::task::spawn_blocking(move || worker.thread.join())
            .await
            .is_err()
        {
            warn!("Capture thread did not shut down cleanly");
        }
        info!("Microphone released");
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

fn run_capture(
    config: AudioBackendConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<()>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match build_input_stream(&config, frame_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(SessionError::Device(format!(
            "failed to start input stream: {e}"
        ))));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Hold the stream until told to stop or the owner goes away
    let _ = stop_rx.recv();
    drop(stream);
}

fn build_input_stream(
    config: &AudioBackendConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = if let Some(ref name) = config.input_device {
        host.input_devices()
            .map_err(|e| SessionError::Device(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| SessionError::Device(format!("input device '{name}' not found")))?
    } else {
        host.default_input_device()
            .ok_or_else(|| SessionError::Device("no default input device".into()))?
    };

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using input device: {device_name}");

    let default_config = device
        .default_input_config()
        .map_err(|e| SessionError::Device(format!("no default input config: {e}")))?;

    let native_rate = default_config.sample_rate();
    let native_channels = default_config.channels();
    let target_rate = config.target_sample_rate;

    let stream_config = StreamConfig {
        channels: native_channels,
        sample_rate: native_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        "native input config: {}Hz, {} channels -> {}Hz mono",
        native_rate, native_channels, target_rate
    );

    let mut resampler = codec::Resampler::new(native_rate, target_rate);
    let mut blocker = FrameBlocker::new(config.block_size, target_rate);

    device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = codec::to_mono(data, native_channels);
                let samples = resampler.process(&mono);
                for frame in blocker.push(&samples) {
                    // Never block the audio thread
                    if frame_tx.try_send(frame).is_err() {
                        debug!("audio channel full, dropping frame");
                    }
                }
            },
            move |err| {
                error!("audio input stream error: {err}");
            },
            None,
        )
        .map_err(|e| SessionError::Device(format!("failed to build input stream: {e}")))
}

/// Re-blocks a stream of float samples into fixed-size PCM16 frames
pub struct FrameBlocker {
    block_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    emitted_samples: u64,
}

impl FrameBlocker {
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            sample_rate,
            pending: Vec::with_capacity(block_size * 2),
            emitted_samples: 0,
        }
    }

    /// Append samples, returning every frame that is now complete
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.block_size {
            let block: Vec<f32> = self.pending.drain(..self.block_size).collect();
            let timestamp_ms = if self.sample_rate == 0 {
                0
            } else {
                self.emitted_samples * 1000 / self.sample_rate as u64
            };
            self.emitted_samples += self.block_size as u64;

            frames.push(AudioFrame {
                samples: codec::encode(&block),
                sample_rate: self.sample_rate,
                timestamp_ms,
            });
        }
        frames
    }
}
