//! Error taxonomy for the voice session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of failure, as observed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Microphone or speaker unavailable / denied
    Device,
    /// Credential fetch or socket handshake failed
    Handshake,
    /// Tool call arguments could not be parsed
    MalformedToolArguments,
    /// Unexpected socket error or close
    Transport,
    /// Server-sent `error` event
    RemoteProtocol,
    /// Invalid configuration
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Device => "device",
            ErrorKind::Handshake => "handshake",
            ErrorKind::MalformedToolArguments => "malformed_tool_arguments",
            ErrorKind::Transport => "transport",
            ErrorKind::RemoteProtocol => "remote_protocol",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}

/// Errors raised by the voice session and its collaborators.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("audio device error: {0}")]
    Device(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("malformed arguments for tool '{name}': {reason}")]
    MalformedToolArguments { name: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote error: {0}")]
    RemoteProtocol(String),

    #[error("config error: {0}")]
    Config(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Device(_) => ErrorKind::Device,
            SessionError::Handshake(_) => ErrorKind::Handshake,
            SessionError::MalformedToolArguments { .. } => ErrorKind::MalformedToolArguments,
            SessionError::Transport(_) => ErrorKind::Transport,
            SessionError::RemoteProtocol(_) => ErrorKind::RemoteProtocol,
            SessionError::Config(_) => ErrorKind::Config,
        }
    }

    /// Snapshot suitable for publishing to the host.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Human-readable error plus its precise kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(SessionError::Device("denied".into()).kind(), ErrorKind::Device);
        assert_eq!(
            SessionError::MalformedToolArguments {
                name: "save_html".into(),
                reason: "EOF".into()
            }
            .kind(),
            ErrorKind::MalformedToolArguments
        );
        assert_eq!(SessionError::Transport("reset".into()).kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_report_carries_message() {
        let report = SessionError::Handshake("401 Unauthorized".into()).report();
        assert_eq!(report.kind, ErrorKind::Handshake);
        assert!(report.message.contains("401"));
        assert_eq!(report.to_string(), "[handshake] handshake failed: 401 Unauthorized");
    }
}
