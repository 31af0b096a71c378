//! Connection and turn state, plus the pure inbound-event reducer.
//!
//! `reduce` maps `(turn context, playback activity, server event)` to the next
//! turn context and a list of effects. It performs no I/O; the session driver
//! applies the effects (enqueue audio, notify host, run tools, report errors).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::audio::codec;
use crate::error::SessionError;
use crate::realtime::ServerEvent;

/// Whether the duplex channel exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Where the conversational turn is; only meaningful while Connected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Idle => "idle",
            TurnState::Listening => "listening",
            TurnState::Thinking => "thinking",
            TurnState::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnContext {
    pub turn: TurnState,
    /// Audio deltas may still arrive for the current response
    pub response_streaming: bool,
    /// The user barged in; the rest of the current response is discarded
    pub interrupted: bool,
}

/// Side effect requested by the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// `session.created` with the remote session id
    SessionReady(Option<String>),
    /// Decoded assistant audio for the playback queue
    Enqueue(Vec<i16>),
    Transcript { text: String, is_user: bool },
    /// A `function_call` output item was announced
    TrackCall { call_id: String, name: String },
    /// Arguments of a tool call are complete
    ToolCall {
        name: Option<String>,
        call_id: String,
        arguments: String,
    },
    /// User started talking over queued assistant audio
    Interrupt,
    /// Server-sent `error` event
    RemoteError(String),
    /// Locally detected, non-fatal problem with an inbound event
    Report(SessionError),
}

/// Apply one inbound event
pub fn reduce(
    ctx: TurnContext,
    playback_active: bool,
    event: ServerEvent,
) -> (TurnContext, Vec<Effect>) {
    let mut next = ctx;
    let mut effects = Vec::new();

    match event {
        ServerEvent::SessionCreated { session } => {
            effects.push(Effect::SessionReady(session.and_then(|s| s.id)));
        }

        ServerEvent::SessionUpdated { .. } | ServerEvent::Unknown => {}

        ServerEvent::SpeechStarted { .. } => {
            if playback_active {
                next.turn = TurnState::Speaking;
                effects.push(Effect::Interrupt);
            } else {
                next.turn = TurnState::Listening;
            }
        }

        ServerEvent::SpeechStopped { .. } => {
            next.turn = if playback_active {
                TurnState::Speaking
            } else {
                TurnState::Thinking
            };
        }

        ServerEvent::InputTranscriptionCompleted { transcript, .. } => {
            if !transcript.trim().is_empty() {
                effects.push(Effect::Transcript {
                    text: transcript,
                    is_user: true,
                });
            }
        }

        ServerEvent::AudioDelta { .. } if ctx.interrupted => {}

        ServerEvent::AudioDelta { delta, .. } => {
            next.turn = TurnState::Speaking;
            next.response_streaming = true;
            match codec::from_wire(&delta) {
                Ok(bytes) => {
                    let samples = codec::pcm_from_bytes(&bytes);
                    if !samples.is_empty() {
                        effects.push(Effect::Enqueue(samples));
                    }
                }
                Err(e) => effects.push(Effect::Report(SessionError::RemoteProtocol(format!(
                    "undecodable audio delta: {e}"
                )))),
            }
        }

        ServerEvent::AudioTranscriptDelta { delta, .. } => {
            if !delta.is_empty() {
                effects.push(Effect::Transcript {
                    text: delta,
                    is_user: false,
                });
            }
        }

        ServerEvent::OutputItemAdded { item } => {
            if let Some(item) = item.filter(|i| i.item_type == "function_call") {
                if let (Some(call_id), Some(name)) = (item.call_id, item.name) {
                    effects.push(Effect::TrackCall { call_id, name });
                }
            }
        }

        ServerEvent::FunctionCallArgumentsDone {
            name,
            arguments,
            call_id,
        } => {
            effects.push(Effect::ToolCall {
                name,
                call_id,
                arguments,
            });
        }

        ServerEvent::ResponseDone { .. } => {
            next.response_streaming = false;
            next.interrupted = false;
            next.turn = if playback_active {
                TurnState::Speaking
            } else {
                TurnState::Listening
            };
        }

        ServerEvent::Error { error } => {
            effects.push(Effect::RemoteError(error.describe()));
        }
    }

    (next, effects)
}

/// The user talked over playback with barge-in enabled
///
/// Returns the context to adopt and whether the streaming response should be
/// cancelled remotely.
pub fn on_barge_in(ctx: TurnContext) -> (TurnContext, bool) {
    let next = TurnContext {
        turn: TurnState::Listening,
        interrupted: ctx.response_streaming,
        ..ctx
    };
    (next, ctx.response_streaming)
}

/// The playback queue became idle
pub fn on_playback_drained(ctx: TurnContext) -> TurnContext {
    if ctx.turn == TurnState::Speaking && !ctx.response_streaming {
        TurnContext {
            turn: TurnState::Listening,
            ..ctx
        }
    } else {
        ctx
    }
}
