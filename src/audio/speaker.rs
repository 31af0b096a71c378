//! Audio playback to system speakers via cpal.
//!
//! A single output stream is opened lazily on a dedicated thread and kept for
//! the speaker's lifetime. `play` loads one segment into the shared buffer and
//! awaits the completion signal the output callback fires once the last sample
//! has been written.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{error, info};

use super::backend::{AudioBackendConfig, AudioOutput};
use super::codec;
use crate::error::{Result, SessionError};

/// Default-device speaker
pub struct CpalSpeaker {
    config: AudioBackendConfig,
    buffer: Arc<Mutex<PlaybackBuffer>>,
    worker: Mutex<Option<OutputWorker>>,
}

/// Segment currently owned by the output callback
#[derive(Default)]
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    /// Fired when `samples` has been fully written to the device
    done_tx: Option<oneshot::Sender<()>>,
}

impl PlaybackBuffer {
    /// Replace the current segment; a superseded waiter sees its sender dropped
    fn load(&mut self, samples: Vec<f32>) -> oneshot::Receiver<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.samples = samples;
        self.position = 0;
        self.done_tx = Some(done_tx);
        done_rx
    }

    /// Write interleaved output, padding with silence past the end
    fn fill(&mut self, data: &mut [f32], channels: usize) {
        for frame in data.chunks_mut(channels.max(1)) {
            let sample = match self.samples.get(self.position) {
                Some(&s) => {
                    self.position += 1;
                    s
                }
                None => 0.0,
            };
            frame.fill(sample);
        }

        if self.position >= self.samples.len() {
            if let Some(done_tx) = self.done_tx.take() {
                let _ = done_tx.send(());
            }
        }
    }

    fn stop(&mut self) {
        self.samples.clear();
        self.position = 0;
        if let Some(done_tx) = self.done_tx.take() {
            let _ = done_tx.send(());
        }
    }
}

struct OutputWorker {
    device_rate: u32,
    // Dropping this ends the output thread
    _stop_tx: std_mpsc::Sender<()>,
}

impl CpalSpeaker {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            buffer: Arc::new(Mutex::new(PlaybackBuffer::default())),
            worker: Mutex::new(None),
        }
    }

    fn lock_buffer(&self) -> Result<std::sync::MutexGuard<'_, PlaybackBuffer>> {
        self.buffer
            .lock()
            .map_err(|e| SessionError::Device(format!("playback buffer lock poisoned: {e}")))
    }

    fn running_rate(&self) -> Result<Option<u32>> {
        let worker = self
            .worker
            .lock()
            .map_err(|e| SessionError::Device(format!("output worker lock poisoned: {e}")))?;
        Ok(worker.as_ref().map(|w| w.device_rate))
    }

    /// Open the output stream on first use, returning the device sample rate
    async fn ensure_started(&self) -> Result<u32> {
        if let Some(rate) = self.running_rate()? {
            return Ok(rate);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let buffer = Arc::clone(&self.buffer);
        let output_device = self.config.output_device.clone();

        std::thread::Builder::new()
            .name("speaker-output".into())
            .spawn(move || run_output(output_device, buffer, ready_tx, stop_rx))
            .map_err(|e| SessionError::Device(format!("failed to spawn output thread: {e}")))?;

        let device_rate = ready_rx.await.map_err(|_| {
            SessionError::Device("output thread exited before the stream started".into())
        })??;

        let mut worker = self
            .worker
            .lock()
            .map_err(|e| SessionError::Device(format!("output worker lock poisoned: {e}")))?;
        *worker = Some(OutputWorker {
            device_rate,
            _stop_tx: stop_tx,
        });

        Ok(device_rate)
    }
}

#[async_trait::async_trait]
impl AudioOutput for CpalSpeaker {
    async fn play(&self, samples: Vec<i16>, sample_rate: u32) -> Result<()> {
        let device_rate = self.ensure_started().await?;
        let floats = codec::resample(&codec::decode(&samples), sample_rate, device_rate);
        if floats.is_empty() {
            return Ok(());
        }

        let done_rx = self.lock_buffer()?.load(floats);
        // A dropped sender means the segment was superseded or stopped
        let _ = done_rx.await;
        Ok(())
    }

    fn stop(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.stop();
        }
    }

    fn name(&self) -> &str {
        "cpal speaker"
    }
}

fn run_output(
    output_device: Option<String>,
    buffer: Arc<Mutex<PlaybackBuffer>>,
    ready_tx: oneshot::Sender<Result<u32>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let (stream, device_rate) = match build_output_stream(output_device, buffer) {
        Ok(built) => built,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(SessionError::Device(format!(
            "failed to start output stream: {e}"
        ))));
        return;
    }

    let _ = ready_tx.send(Ok(device_rate));
    let _ = stop_rx.recv();
    drop(stream);
    info!("Speaker released");
}

fn build_output_stream(
    output_device: Option<String>,
    buffer: Arc<Mutex<PlaybackBuffer>>,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();

    let device = if let Some(ref name) = output_device {
        host.output_devices()
            .map_err(|e| SessionError::Device(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| SessionError::Device(format!("output device '{name}' not found")))?
    } else {
        host.default_output_device()
            .ok_or_else(|| SessionError::Device("no default output device".into()))?
    };

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using output device: {device_name}");

    let default_config = device
        .default_output_config()
        .map_err(|e| SessionError::Device(format!("no default output config: {e}")))?;

    let device_rate = default_config.sample_rate();
    let channels = default_config.channels().max(1) as usize;

    let stream_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: device_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| match buffer.lock() {
                Ok(mut buf) => buf.fill(data, channels),
                Err(_) => data.fill(0.0),
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| SessionError::Device(format!("failed to build output stream: {e}")))?;

    Ok((stream, device_rate))
}
