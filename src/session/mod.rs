//! Voice session management
//!
//! This module provides the `VoiceSession` abstraction that manages:
//! - Connection lifecycle (credential fetch, handshake, teardown)
//! - Microphone capture streamed upstream as PCM16
//! - Turn state driven by server events
//! - Ordered playback of assistant audio
//! - Tool calls applied through the host callbacks

mod config;
mod host;
mod session;
mod state;
mod stats;
pub mod tools;

pub use config::{SessionConfig, TurnDetectionSettings, DEFAULT_INSTRUCTIONS};
pub use host::{SessionHost, SiteUpdate};
pub use session::{SessionDeps, VoiceSession};
pub use state::{on_playback_drained, reduce, ConnectionState, Effect, TurnContext, TurnState};
pub use stats::{SessionStats, SessionStatus};
pub use tools::{ToolInvocation, ToolOutcome};
