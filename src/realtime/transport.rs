use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{ClientEvent, ServerEvent};
use crate::credentials::SessionToken;
use crate::error::{Result, SessionError};
use crate::session::ConnectionState;

/// Capacity of the outbound frame channel
pub const OUTBOUND_CAPACITY: usize = 256;

/// What the duplex connection delivers to the session
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// JSON text frame
    Text(String),
    /// Remote closed the connection (close reason, if any)
    Closed(Option<String>),
    /// Socket error
    Failed(String),
}

/// One open duplex connection
///
/// Dropping `outbound` closes the underlying socket.
pub struct Link {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<InboundFrame>,
}

/// Capability to open a duplex channel to the realtime endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the handshake, returning the open link
    ///
    /// Fails with `SessionError::Handshake`.
    async fn open(&self, url: &str, token: &SessionToken) -> Result<Link>;
}

/// Owns at most one duplex connection per connect cycle
pub struct Transport {
    state: ConnectionState,
    link: Option<Link>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            link: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Disconnected -> Connecting; false (and no change) from any other state
    pub fn begin(&mut self) -> bool {
        if self.state != ConnectionState::Disconnected {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    /// Adopt a freshly opened link
    ///
    /// `initial` (the session configuration) is written before anything else,
    /// then the transport becomes Connected.
    pub fn establish(&mut self, link: Link, initial: &ClientEvent) -> Result<()> {
        let text = serde_json::to_string(initial)
            .map_err(|e| SessionError::Handshake(format!("cannot encode {}: {e}", initial.kind())))?;

        link.outbound
            .try_send(text)
            .map_err(|e| SessionError::Handshake(format!("cannot send {}: {e}", initial.kind())))?;

        self.link = Some(link);
        self.state = ConnectionState::Connected;
        info!("Transport connected, {} sent", initial.kind());
        Ok(())
    }

    /// Send an event; dropped (not queued) unless Connected
    ///
    /// Never awaits: a full outbound channel also drops the event.
    pub fn send(&self, event: &ClientEvent) -> bool {
        let Some(link) = self.link.as_ref().filter(|_| self.state == ConnectionState::Connected)
        else {
            debug!("Dropping {} while {}", event.kind(), self.state);
            return false;
        };

        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {}: {}", event.kind(), e);
                return false;
            }
        };

        match link.outbound.try_send(text) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbound channel full, dropping {}", event.kind());
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Outbound channel closed, dropping {}", event.kind());
                false
            }
        }
    }

    /// Next inbound frame; pending forever while there is no link
    ///
    /// A closed inbound channel is reported as `Closed(None)`.
    pub async fn recv(&mut self) -> InboundFrame {
        match self.link.as_mut() {
            Some(link) => link
                .inbound
                .recv()
                .await
                .unwrap_or(InboundFrame::Closed(None)),
            None => std::future::pending().await,
        }
    }

    /// Drop the link (closing the socket) and return to Disconnected
    pub fn close(&mut self) {
        if self.link.take().is_some() {
            info!("Transport closed");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Decode one inbound text frame
    ///
    /// Unknown event types decode to `ServerEvent::Unknown`; frames that are
    /// not valid events are a `RemoteProtocol` error.
    pub fn decode(text: &str) -> Result<ServerEvent> {
        serde_json::from_str::<ServerEvent>(text).map_err(|e| {
            warn!("Failed to parse server event: {} ({} bytes)", e, text.len());
            SessionError::RemoteProtocol(format!("malformed server event: {e}"))
        })
    }
}
