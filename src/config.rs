use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::codec::SAMPLE_RATE;
use crate::audio::AudioBackendConfig;
use crate::credentials::{CredentialBroker, HttpCredentialBroker, OpenAiSessionBroker};
use crate::error::SessionError;
use crate::session::{SessionConfig, TurnDetectionSettings, DEFAULT_INSTRUCTIONS};

/// Environment overrides: `SITE_VOICE__REALTIME__VOICE=alloy`
const ENV_PREFIX: &str = "SITE_VOICE";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

/// Where session tokens come from
///
/// `token_url` wins when both are set.
#[derive(Debug, Default, Deserialize)]
pub struct BrokerConfig {
    /// Host token route (POST `{"sessionId"}`)
    pub token_url: Option<String>,
    /// Name of the env var holding an API key for direct session creation
    pub api_key_env: Option<String>,
    /// Override for the sessions API base URL
    pub api_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub transcription_model: Option<String>,
    pub instructions: String,
    pub tool_choice: String,
    pub vad_threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
    pub connect_timeout_secs: u64,
    pub barge_in: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        let vad = TurnDetectionSettings::default();
        Self {
            endpoint: session.endpoint,
            model: session.model,
            voice: session.voice,
            transcription_model: session.transcription_model,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            tool_choice: session.tool_choice,
            vad_threshold: vad.threshold,
            prefix_padding_ms: vad.prefix_padding_ms,
            silence_duration_ms: vad.silence_duration_ms,
            connect_timeout_secs: session.connect_timeout.as_secs(),
            barge_in: session.barge_in,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub channel_capacity: usize,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let backend = AudioBackendConfig::default();
        Self {
            sample_rate: backend.target_sample_rate,
            block_size: backend.block_size,
            channel_capacity: backend.channel_capacity,
            input_device: None,
            output_device: None,
        }
    }
}

impl Config {
    /// Load `path` (extension optional) overlaid by `SITE_VOICE__*` env vars
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
            .build()
            .with_context(|| format!("Failed to read config {path}"))?;

        let cfg: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> std::result::Result<(), SessionError> {
        let invalid = |msg: String| -> std::result::Result<(), SessionError> {
            Err(SessionError::Config(msg))
        };

        if self.audio.sample_rate != SAMPLE_RATE {
            return invalid(format!(
                "audio.sample_rate must be {SAMPLE_RATE} (pcm16), got {}",
                self.audio.sample_rate
            ));
        }
        if self.audio.block_size == 0 || self.audio.channel_capacity == 0 {
            return invalid("audio.block_size and audio.channel_capacity must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.realtime.vad_threshold) {
            return invalid(format!(
                "realtime.vad_threshold must be within 0.0..=1.0, got {}",
                self.realtime.vad_threshold
            ));
        }
        if self.realtime.connect_timeout_secs == 0 {
            return invalid("realtime.connect_timeout_secs must be positive".into());
        }
        if self.broker.token_url.is_none() && self.broker.api_key_env.is_none() {
            return invalid("broker needs token_url or api_key_env".into());
        }
        Ok(())
    }

    /// Runtime configuration for one session
    pub fn session_config(&self, session_id: &str) -> SessionConfig {
        let rt = &self.realtime;
        SessionConfig {
            session_id: session_id.to_string(),
            endpoint: rt.endpoint.clone(),
            model: rt.model.clone(),
            voice: rt.voice.clone(),
            instructions: rt.instructions.clone(),
            transcription_model: rt.transcription_model.clone(),
            turn_detection: TurnDetectionSettings {
                threshold: rt.vad_threshold,
                prefix_padding_ms: rt.prefix_padding_ms,
                silence_duration_ms: rt.silence_duration_ms,
            },
            tool_choice: rt.tool_choice.clone(),
            sample_rate: self.audio.sample_rate,
            connect_timeout: Duration::from_secs(rt.connect_timeout_secs),
            barge_in: rt.barge_in,
        }
    }

    pub fn audio_backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.audio.sample_rate,
            block_size: self.audio.block_size,
            channel_capacity: self.audio.channel_capacity,
            input_device: self.audio.input_device.clone(),
            output_device: self.audio.output_device.clone(),
        }
    }

    /// Build the configured credential broker
    pub fn credential_broker(&self) -> Result<Arc<dyn CredentialBroker>> {
        if let Some(url) = &self.broker.token_url {
            return Ok(Arc::new(HttpCredentialBroker::new(url.clone())));
        }

        let Some(var) = &self.broker.api_key_env else {
            bail!("No credential broker configured");
        };
        let api_key = std::env::var(var).with_context(|| format!("{var} is not set"))?;

        let mut broker = OpenAiSessionBroker::new(
            api_key,
            self.realtime.model.clone(),
            self.realtime.voice.clone(),
        );
        if let Some(base_url) = &self.broker.api_base_url {
            broker = broker.with_base_url(base_url.clone());
        }
        Ok(Arc::new(broker))
    }
}
