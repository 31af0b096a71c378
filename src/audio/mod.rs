pub mod backend;
pub mod codec;
pub mod microphone;
pub mod playback;
pub mod speaker;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioOutput};
pub use microphone::{CpalMicrophone, FrameBlocker};
pub use playback::{ClearMode, PlaybackEntry, PlaybackFinished, PlaybackScheduler};
pub use speaker::CpalSpeaker;
