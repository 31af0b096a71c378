use super::config::SessionConfig;
use super::host::SessionHost;
use super::state::{self, ConnectionState, Effect, TurnContext};
use super::stats::{SessionStats, SessionStatus};
use super::tools::{self, ToolInvocation};
use crate::audio::{
    AudioBackend, AudioFrame, AudioOutput, ClearMode, PlaybackFinished, PlaybackScheduler,
};
use crate::credentials::CredentialBroker;
use crate::error::{ErrorReport, Result, SessionError};
use crate::realtime::{ClientEvent, Connector, InboundFrame, Link, ServerEvent, Transport};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Collaborators injected into a voice session
pub struct SessionDeps {
    /// Issues the short-lived handshake credential
    pub broker: Arc<dyn CredentialBroker>,

    /// Opens the duplex channel
    pub connector: Arc<dyn Connector>,

    /// Microphone, started on every successful connect
    pub microphone: Box<dyn AudioBackend>,

    /// Speaker used by the playback scheduler
    pub output: Arc<dyn AudioOutput>,

    /// Host application callbacks
    pub host: Arc<dyn SessionHost>,
}

enum Command {
    Connect(oneshot::Sender<Result<ConnectionState>>),
    Disconnect(oneshot::Sender<()>),
}

/// Handle on a running voice session
///
/// All work happens on one driver task; this handle only sends it commands
/// and watches the status it publishes. Every method is safe to call in any
/// state.
pub struct VoiceSession {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
    driver: JoinHandle<SessionStats>,
}

impl VoiceSession {
    /// Start the driver task (Disconnected; nothing is acquired yet)
    pub fn spawn(config: SessionConfig, deps: SessionDeps) -> Self {
        info!("Creating voice session: {}", config.session_id);

        let (commands, command_rx) = mpsc::channel(16);
        let (status_tx, status) = watch::channel(SessionStatus::default());
        let driver = Driver::new(config, deps, status_tx);
        let driver = tokio::spawn(driver.run(command_rx));

        Self {
            commands,
            status,
            driver,
        }
    }

    /// Open the session
    ///
    /// Resolves to `Connected` on success, to the current state when already
    /// connecting or connected, and to `Disconnected` when a `disconnect()`
    /// cancelled the attempt. Device and handshake failures are returned and
    /// leave the session Disconnected.
    pub async fn connect(&self) -> Result<ConnectionState> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Connect(reply_tx))
            .await
            .map_err(|_| SessionError::Transport("session driver stopped".into()))?;

        reply_rx
            .await
            .map_err(|_| SessionError::Transport("session driver stopped".into()))?
    }

    /// Tear the session down; no-op while Disconnected
    pub async fn disconnect(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Disconnect(reply_tx)).await.is_ok() {
            let _ = reply_rx.await;
        }
    }

    /// Latest published status
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Watch every status change
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Disconnect, stop the driver and return the final stats
    pub async fn shutdown(self) -> SessionStats {
        self.disconnect().await;
        drop(self.commands);

        match self.driver.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Session driver panicked: {}", e);
                self.status.borrow().stats.clone()
            }
        }
    }
}

struct PendingHandshake {
    task: JoinHandle<Result<Link>>,
    reply: oneshot::Sender<Result<ConnectionState>>,
}

/// Owns every piece of session state; runs on a single task
struct Driver {
    config: SessionConfig,
    broker: Arc<dyn CredentialBroker>,
    connector: Arc<dyn Connector>,
    microphone: Box<dyn AudioBackend>,
    host: Arc<dyn SessionHost>,

    transport: Transport,
    playback: PlaybackScheduler,
    playback_rx: mpsc::UnboundedReceiver<PlaybackFinished>,
    capture_rx: Option<mpsc::Receiver<AudioFrame>>,
    handshake: Option<PendingHandshake>,

    ctx: TurnContext,
    /// call_id -> tool name, from `response.output_item.added`
    calls: HashMap<String, String>,
    error: Option<ErrorReport>,
    stats: SessionStats,
    status_tx: watch::Sender<SessionStatus>,
}

impl Driver {
    fn new(
        config: SessionConfig,
        deps: SessionDeps,
        status_tx: watch::Sender<SessionStatus>,
    ) -> Self {
        let (playback, playback_rx) = PlaybackScheduler::new(deps.output, config.sample_rate);

        Self {
            config,
            broker: deps.broker,
            connector: deps.connector,
            microphone: deps.microphone,
            host: deps.host,
            transport: Transport::new(),
            playback,
            playback_rx,
            capture_rx: None,
            handshake: None,
            ctx: TurnContext::default(),
            calls: HashMap::new(),
            error: None,
            stats: SessionStats::default(),
            status_tx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> SessionStats {
        debug!("Session driver started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Connect(reply)) => self.on_connect(reply),
                    Some(Command::Disconnect(reply)) => {
                        self.teardown(None).await;
                        self.publish();
                        let _ = reply.send(());
                    }
                    None => break,
                },

                result = wait_handshake(&mut self.handshake) => self.on_handshake(result).await,

                frame = recv_capture(&mut self.capture_rx) => self.on_capture(frame).await,

                frame = self.transport.recv() => self.on_inbound(frame).await,

                Some(done) = self.playback_rx.recv() => self.on_playback(done),
            }

            self.publish();
        }

        self.teardown(None).await;
        debug!("Session driver stopped");
        self.stats
    }

    fn publish(&self) {
        self.status_tx.send_replace(SessionStatus {
            connection: self.transport.state(),
            turn: self.ctx.turn,
            error: self.error.clone(),
            stats: self.stats.clone(),
        });
    }

    fn report(&mut self, err: &SessionError) {
        self.error = Some(err.report());
    }

    fn on_connect(&mut self, reply: oneshot::Sender<Result<ConnectionState>>) {
        if !self.transport.begin() {
            debug!("Connect ignored while {}", self.transport.state());
            let _ = reply.send(Ok(self.transport.state()));
            return;
        }

        info!("Connecting voice session: {}", self.config.session_id);
        self.ctx = TurnContext::default();
        self.calls.clear();
        self.stats = SessionStats::default();

        let broker = Arc::clone(&self.broker);
        let connector = Arc::clone(&self.connector);
        let session_id = self.config.session_id.clone();
        let url = self.config.realtime_url();
        let timeout = self.config.connect_timeout;

        let task = tokio::spawn(async move {
            let open = async {
                let token = broker.fetch_token(&session_id).await?;
                connector.open(&url, &token).await
            };
            tokio::time::timeout(timeout, open)
                .await
                .map_err(|_| SessionError::Handshake(format!("timed out after {:?}", timeout)))?
        });

        self.handshake = Some(PendingHandshake { task, reply });
    }

    async fn on_handshake(&mut self, result: Result<Link>) {
        let Some(pending) = self.handshake.take() else {
            return;
        };

        let outcome = match result {
            Ok(link) => self.establish(link).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!("Voice session connected: {}", self.config.session_id);
                self.error = None;
                self.ctx = TurnContext::default();
                self.stats.connected_at = Some(Utc::now());
                self.publish();
                let _ = pending.reply.send(Ok(ConnectionState::Connected));
            }
            Err(e) => {
                error!("Connect failed: {}", e);
                self.transport.close();
                self.report(&e);
                self.publish();
                let _ = pending.reply.send(Err(e));
            }
        }
    }

    /// Configure the session, then start capture
    async fn establish(&mut self, link: Link) -> Result<()> {
        let document = self.host.current_document();
        let update = self.config.session_update(document.as_deref());
        self.transport.establish(link, &update)?;

        let frames = self.microphone.start().await?;
        info!("Capturing from {}", self.microphone.name());
        self.capture_rx = Some(frames);
        Ok(())
    }

    /// Return to the initial state, releasing everything
    ///
    /// Safe in every state; `reason` is surfaced to the host.
    async fn teardown(&mut self, reason: Option<SessionError>) {
        let was = self.transport.state();
        let cancelled = self.handshake.take();
        if let Some(pending) = &cancelled {
            pending.task.abort();
        }

        self.capture_rx = None;
        self.microphone.stop().await;
        self.playback.clear(ClearMode::Forced);
        self.transport.close();
        self.ctx = TurnContext::default();
        self.calls.clear();

        match reason {
            Some(e) => {
                error!("Voice session torn down: {}", e);
                self.report(&e);
            }
            None if was != ConnectionState::Disconnected => {
                info!("Voice session disconnected: {}", self.config.session_id);
            }
            None => {}
        }

        if let Some(pending) = cancelled {
            self.publish();
            let _ = pending.reply.send(Ok(ConnectionState::Disconnected));
        }
    }

    async fn on_capture(&mut self, frame: Option<AudioFrame>) {
        match frame {
            Some(frame) => {
                if self.transport.send(&ClientEvent::audio_append(&frame.samples)) {
                    self.stats.frames_sent += 1;
                }
            }
            None => {
                self.teardown(Some(SessionError::Device("microphone stream ended".into())))
                    .await;
            }
        }
    }

    async fn on_inbound(&mut self, frame: InboundFrame) {
        match frame {
            InboundFrame::Text(text) => {
                match Transport::decode(&text) {
                    Ok(event) => self.on_event(event),
                    Err(e) => self.report(&e),
                }
            }
            InboundFrame::Closed(reason) => {
                let message = match reason.filter(|r| !r.is_empty()) {
                    Some(reason) => format!("connection closed by server: {reason}"),
                    None => "connection closed by server".to_string(),
                };
                self.teardown(Some(SessionError::Transport(message))).await;
            }
            InboundFrame::Failed(e) => {
                self.teardown(Some(SessionError::Transport(e))).await;
            }
        }
    }

    fn on_event(&mut self, event: ServerEvent) {
        if !matches!(event, ServerEvent::Error { .. }) {
            self.error = None;
        }

        let (ctx, effects) = state::reduce(self.ctx, self.playback.is_active(), event);
        if ctx.turn != self.ctx.turn {
            debug!("Turn {} -> {}", self.ctx.turn, ctx.turn);
        }
        self.ctx = ctx;

        for effect in effects {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::SessionReady(id) => {
                info!("Realtime session ready: {}", id.as_deref().unwrap_or("<unknown>"));
                self.stats.remote_session_id = id;
            }
            Effect::Enqueue(samples) => {
                self.playback.enqueue(samples);
            }
            Effect::Transcript { text, is_user } => {
                self.host.on_transcript(&text, is_user);
                self.stats.transcript_events += 1;
            }
            Effect::TrackCall { call_id, name } => {
                debug!("Tracking tool call {} ({})", call_id, name);
                self.calls.insert(call_id, name);
            }
            Effect::ToolCall {
                name,
                call_id,
                arguments,
            } => {
                let tracked = self.calls.remove(&call_id);
                let invocation = ToolInvocation {
                    name: name.or(tracked).unwrap_or_default(),
                    arguments,
                    call_id,
                };
                self.run_tool(invocation);
            }
            Effect::Interrupt => {
                if self.config.barge_in {
                    info!("User interrupted playback");
                    self.playback.clear(ClearMode::Forced);
                    let (ctx, cancel) = state::on_barge_in(self.ctx);
                    self.ctx = ctx;
                    if cancel {
                        self.transport.send(&ClientEvent::ResponseCancel);
                    }
                }
            }
            Effect::RemoteError(message) => {
                warn!("Realtime API error: {}", message);
                self.report(&SessionError::RemoteProtocol(message));
            }
            Effect::Report(e) => {
                warn!("{}", e);
                self.report(&e);
            }
        }
    }

    fn run_tool(&mut self, invocation: ToolInvocation) {
        let outcome = tools::execute(&invocation, self.host.as_ref());
        self.stats.tool_calls += 1;

        for reply in &outcome.replies {
            self.transport.send(reply);
        }
        if let Some(e) = outcome.error {
            self.report(&e);
        }
    }

    fn on_playback(&mut self, done: PlaybackFinished) {
        match done.result {
            Ok(()) => self.stats.segments_played += 1,
            // The segment is skipped; the session stays up
            Err(e) => self.report(&e),
        }

        if self.playback.on_finished(done.id) {
            self.ctx = state::on_playback_drained(self.ctx);
        }
    }
}

async fn wait_handshake(pending: &mut Option<PendingHandshake>) -> Result<Link> {
    match pending {
        Some(pending) => match (&mut pending.task).await {
            Ok(result) => result,
            Err(e) => Err(SessionError::Handshake(format!("handshake task failed: {e}"))),
        },
        None => std::future::pending().await,
    }
}

async fn recv_capture(capture: &mut Option<mpsc::Receiver<AudioFrame>>) -> Option<AudioFrame> {
    match capture {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
