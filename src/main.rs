use anyhow::{Context, Result};
use clap::Parser;
use site_voice::realtime::WebSocketConnector;
use site_voice::{
    AudioBackendFactory, Config, ConnectionState, SessionDeps, SessionHost, SiteUpdate,
    VoiceSession,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "site-voice", about = "Edit a website by talking to it", version)]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/site-voice")]
    config: String,

    /// Client session identifier
    #[arg(short, long)]
    session_id: Option<String>,

    /// HTML file kept in sync with the conversation
    #[arg(short, long, default_value = "site.html")]
    output: PathBuf,
}

/// Writes every site update to a file and prints transcripts
struct FileHost {
    output: PathBuf,
}

impl SessionHost for FileHost {
    fn on_site_update(&self, update: &SiteUpdate) {
        match std::fs::write(&self.output, &update.content) {
            Ok(()) => info!(
                "Saved {} ({})",
                self.output.display(),
                update.description.as_deref().unwrap_or("no description")
            ),
            Err(e) => error!("Failed to write {}: {}", self.output.display(), e),
        }
    }

    fn on_transcript(&self, text: &str, is_user: bool) {
        if is_user {
            println!("\nyou: {}", text.trim());
        } else {
            print!("{text}");
            std::io::stdout().flush().ok();
        }
    }

    fn current_document(&self) -> Option<String> {
        std::fs::read_to_string(&self.output).ok()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("site_voice=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    info!("Site Voice v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let session_id = cli
        .session_id
        .unwrap_or_else(|| format!("site-{}", uuid::Uuid::new_v4()));
    let audio = cfg.audio_backend_config();

    let deps = SessionDeps {
        broker: cfg.credential_broker()?,
        connector: Arc::new(WebSocketConnector::new()),
        microphone: AudioBackendFactory::microphone(audio.clone()),
        output: AudioBackendFactory::speaker(audio),
        host: Arc::new(FileHost {
            output: cli.output.clone(),
        }),
    };

    let session = VoiceSession::spawn(cfg.session_config(&session_id), deps);
    session.connect().await.context("Failed to connect")?;
    info!("Listening. Press Ctrl-C to stop.");

    let mut status = session.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if current.connection == ConnectionState::Disconnected {
                    if let Some(report) = current.error {
                        warn!("Session ended: {}", report);
                    }
                    break;
                }
            }
        }
    }

    let stats = session.shutdown().await;
    println!();
    info!(
        "Session stats: {:.1}s, {} frames sent, {} segments played, {} tool calls, {} transcript events",
        stats.duration_secs(),
        stats.frames_sent,
        stats.segments_played,
        stats.tool_calls,
        stats.transcript_events
    );

    Ok(())
}
