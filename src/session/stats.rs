use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{ConnectionState, TurnState};
use crate::error::ErrorReport;

/// Counters for the current (or last) connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Id from `session.created`
    pub remote_session_id: Option<String>,

    /// When the handshake completed
    pub connected_at: Option<DateTime<Utc>>,

    /// Audio frames sent upstream
    pub frames_sent: usize,

    /// Assistant segments fully played
    pub segments_played: usize,

    /// Tool calls executed (including failed ones)
    pub tool_calls: usize,

    /// Transcript callbacks delivered to the host
    pub transcript_events: usize,
}

impl SessionStats {
    /// Seconds since the handshake completed
    pub fn duration_secs(&self) -> f64 {
        self.connected_at
            .map(|at| Utc::now().signed_duration_since(at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

/// Snapshot published to the host on every change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub connection: ConnectionState,

    pub turn: TurnState,

    /// Last failure; cleared by the next successful inbound event
    pub error: Option<ErrorReport>,

    pub stats: SessionStats,
}
