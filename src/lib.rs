pub mod audio;
pub mod config;
pub mod credentials;
pub mod error;
pub mod realtime;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioOutput,
    PlaybackScheduler,
};
pub use config::Config;
pub use credentials::{CredentialBroker, HttpCredentialBroker, OpenAiSessionBroker, SessionToken};
pub use error::{ErrorKind, ErrorReport, SessionError};
pub use realtime::{ClientEvent, Connector, ServerEvent, WebSocketConnector};
pub use session::{
    ConnectionState, SessionConfig, SessionDeps, SessionHost, SessionStats, SessionStatus,
    SiteUpdate, TurnState, VoiceSession,
};
