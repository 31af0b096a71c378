use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::tools;
use crate::audio::codec::SAMPLE_RATE;
use crate::realtime::messages::InputAudioTranscription;
use crate::realtime::{ClientEvent, SessionSettings, TurnDetection};

pub const DEFAULT_INSTRUCTIONS: &str = "You are an expert website builder assistant. You help users create and modify websites through voice commands.

Current HTML content: {document}

When users ask you to create or modify the website, use the save_html function with complete HTML code.

Be conversational and friendly. Acknowledge requests quickly and execute changes immediately.";

/// Placeholder used when the host has no document yet
const EMPTY_DOCUMENT: &str = "No content yet - create a beautiful website!";

/// Server VAD parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurnDetectionSettings {
    /// Activation threshold (0.0 to 1.0)
    pub threshold: f32,

    /// Audio kept before detected speech
    pub prefix_padding_ms: u32,

    /// Silence that ends a user turn
    pub silence_duration_ms: u32,
}

impl Default for TurnDetectionSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

/// Configuration for one voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Client session identifier handed to the credential broker
    pub session_id: String,

    /// Realtime WebSocket endpoint (without query)
    pub endpoint: String,

    pub model: String,

    pub voice: String,

    /// Instructions template; `{document}` is replaced by the current document
    pub instructions: String,

    /// Model used to transcribe user speech (None disables user transcripts)
    pub transcription_model: Option<String>,

    pub turn_detection: TurnDetectionSettings,

    /// Tool choice policy ("auto", "none", "required")
    pub tool_choice: String,

    /// Sample rate of PCM16 audio in both directions
    pub sample_rate: u32,

    /// Upper bound on token fetch plus socket handshake
    pub connect_timeout: Duration,

    /// Stop assistant playback when the user starts talking over it
    pub barge_in: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("site-{}", uuid::Uuid::new_v4()),
            endpoint: "wss://api.openai.com/v1/realtime".to_string(),
            model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
            voice: "sage".to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            transcription_model: Some("whisper-1".to_string()),
            turn_detection: TurnDetectionSettings::default(),
            tool_choice: "auto".to_string(),
            sample_rate: SAMPLE_RATE, // pcm16 is 24kHz mono
            connect_timeout: Duration::from_secs(15),
            barge_in: false,
        }
    }
}

impl SessionConfig {
    /// Endpoint URL including the model query
    pub fn realtime_url(&self) -> String {
        format!("{}?model={}", self.endpoint, self.model)
    }

    /// The `session.update` sent right after the handshake
    pub fn session_update(&self, document: Option<&str>) -> ClientEvent {
        let document = document.filter(|d| !d.trim().is_empty()).unwrap_or(EMPTY_DOCUMENT);
        let vad = self.turn_detection;

        ClientEvent::SessionUpdate {
            session: SessionSettings {
                modalities: vec!["text".to_string(), "audio".to_string()],
                instructions: Some(self.instructions.replace("{document}", document)),
                voice: self.voice.clone(),
                input_audio_format: "pcm16".to_string(),
                output_audio_format: "pcm16".to_string(),
                input_audio_transcription: self
                    .transcription_model
                    .clone()
                    .map(|model| InputAudioTranscription { model }),
                turn_detection: TurnDetection::ServerVad {
                    threshold: vad.threshold,
                    prefix_padding_ms: vad.prefix_padding_ms,
                    silence_duration_ms: vad.silence_duration_ms,
                },
                tools: tools::definitions(),
                tool_choice: self.tool_choice.clone(),
            },
        }
    }
}
