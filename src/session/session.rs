use super::config::SessionConfig;
use super::guard::{GuardSignal, TimeoutGuard};
use super::relay::{PendingResult, ResultRelay};
use super::state::SessionState;
use super::stats::SessionStats;
use crate::coordinator::{Inbound, Outbound, RequestDescriptor, StatusEvent};
use crate::decoder::{DecoderEvent, DecoderEventSink, DecoderPipeline};
use crate::error::WorkerError;
use crate::postprocess::{self, PostProcessor};
use chrono::{DateTime, Utc};
use futures::stream::{SplitStream, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Request id used in logs until the coordinator assigns one
pub const UNDEFINED_REQUEST_ID: &str = "<undefined>";

/// One coordinator connection carrying at most one recognition request
///
/// The session is a single task that owns all request state. Inbound
/// coordinator frames, decoder events and timeout-guard signals are
/// multiplexed into it, so every state transition is made in one place and
/// a losing racer (e.g. `EOS` against a silence timeout) sees the updated
/// state and becomes a no-op.
pub struct Session {
    /// Session configuration
    config: SessionConfig,

    /// Decoder shared across sessions
    decoder: Arc<dyn DecoderPipeline>,

    /// Optional transcript filter shared across sessions
    post_processor: Option<Arc<dyn PostProcessor>>,

    /// Identifies this connection in logs
    connection_id: Uuid,

    request_id: String,
    content_type: Option<String>,

    /// Current state, observed by the timeout guard
    state: watch::Sender<SessionState>,

    /// Time of the last decoder event, observed by the timeout guard
    activity: watch::Sender<Instant>,

    relay: ResultRelay,

    guard: Option<JoinHandle<()>>,

    /// Process shutdown signal; only honoured while no request is in flight
    shutdown: Option<watch::Receiver<bool>>,

    /// Hard limit on waiting for decoder EOS after a cancel
    cancel_deadline: Option<Instant>,

    started_at: DateTime<Utc>,
    audio_chunks: usize,
    audio_bytes: usize,
    events_sent: usize,
    timed_out: bool,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        decoder: Arc<dyn DecoderPipeline>,
        post_processor: Option<Arc<dyn PostProcessor>>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Created);
        let (activity, _) = watch::channel(Instant::now());
        let relay = ResultRelay::new(config.result_mode);

        Self {
            config,
            decoder,
            post_processor,
            connection_id: Uuid::new_v4(),
            request_id: UNDEFINED_REQUEST_ID.to_string(),
            content_type: None,
            state,
            activity,
            relay,
            guard: None,
            shutdown: None,
            cancel_deadline: None,
            started_at: Utc::now(),
            audio_chunks: 0,
            audio_bytes: 0,
            events_sent: 0,
            timed_out: false,
        }
    }

    /// Let the session end early on shutdown while it is still waiting for a request
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Observe state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }


    /// Serve one connection until the session finishes
    ///
    /// Returns an error only for decoder or post-processor faults; transport
    /// problems end the session like a close from the coordinator.
    pub async fn run<S>(mut self, ws: WebSocketStream<S>) -> Result<SessionStats, WorkerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (sink, stream) = ws.split();
        let mut outbound = Outbound::new(sink);

        let (event_sink, decoder_events) = DecoderEventSink::channel();
        let (guard_tx, guard_signals) = mpsc::channel(4);

        self.decoder.set_event_sink(event_sink.clone()).await;
        self.transition(SessionState::Connected);
        info!(
            "Opened websocket connection to server (connection {})",
            self.connection_id
        );

        let result = self
            .drive(stream, &mut outbound, decoder_events, guard_signals, guard_tx)
            .await;

        if let Some(guard) = self.guard.take() {
            guard.abort();
        }
        drop(event_sink);

        if let Err(e) = result {
            outbound.close().await;
            return Err(e);
        }

        Ok(self.stats())
    }

    async fn drive<S>(
        &mut self,
        mut inbound: SplitStream<WebSocketStream<S>>,
        outbound: &mut Outbound<S>,
        mut decoder_events: mpsc::UnboundedReceiver<DecoderEvent>,
        mut guard_signals: mpsc::Receiver<GuardSignal>,
        guard_tx: mpsc::Sender<GuardSignal>,
    ) -> Result<(), WorkerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut inbound_open = true;

        loop {
            let cancel_deadline = self.cancel_deadline;
            let idle = self.state() == SessionState::Connected;

            tokio::select! {
                biased;

                // Decoder output first, so a final result is never lost to a close
                Some(event) = decoder_events.recv() => {
                    if self.on_decoder_event(event, outbound).await? {
                        return Ok(());
                    }
                }

                Some(signal) = guard_signals.recv() => {
                    self.on_guard_signal(signal, outbound).await?;
                }

                message = inbound.next(), if inbound_open => {
                    let message = match message {
                        Some(Ok(message)) => Inbound::classify(message),
                        Some(Err(e)) => {
                            warn!("{}: Coordinator connection failed: {}", self.request_id, e);
                            Some(Inbound::Closed)
                        }
                        None => Some(Inbound::Closed),
                    };

                    match message {
                        Some(Inbound::Closed) => {
                            inbound_open = false;
                            if self.on_connection_closed().await? {
                                outbound.close().await;
                                return Ok(());
                            }
                        }
                        Some(message) => self.on_inbound(message, &guard_tx).await?,
                        None => {}
                    }
                }

                _ = shutdown_requested(&mut self.shutdown), if idle => {
                    info!("Shutdown requested while idle, closing connection");
                    self.transition(SessionState::Finished);
                    outbound.close().await;
                    return Ok(());
                }

                _ = sleep_until(cancel_deadline.unwrap_or_else(Instant::now)), if cancel_deadline.is_some() => {
                    warn!(
                        "{}: Decoder did not confirm cancellation in time, closing without EOS",
                        self.request_id
                    );
                    self.finish(outbound).await;
                    return Ok(());
                }

                else => {
                    self.finish(outbound).await;
                    return Ok(());
                }
            }
        }
    }

    async fn on_inbound(
        &mut self,
        message: Inbound,
        guard_tx: &mpsc::Sender<GuardSignal>,
    ) -> Result<(), WorkerError> {
        let state = self.state();
        debug!(
            "{}: Got {} message from server in state {}",
            self.request_id,
            message.kind(),
            state
        );

        match (state, message) {
            (SessionState::Connected, Inbound::Text(text)) => {
                match serde_json::from_str::<RequestDescriptor>(&text) {
                    Ok(descriptor) => self.init_request(descriptor, guard_tx).await?,
                    Err(e) => warn!(
                        "{}: Ignoring malformed request descriptor: {}",
                        self.request_id, e
                    ),
                }
            }
            (SessionState::Connected, other) => {
                warn!(
                    "{}: Expected a request descriptor, ignoring {} message",
                    self.request_id,
                    other.kind()
                );
            }
            (_, Inbound::EndOfStream) => {
                if state.accepts_audio() {
                    self.decoder
                        .end_request()
                        .await
                        .map_err(WorkerError::Decoder)?;
                    self.transition(SessionState::EosReceived);
                } else {
                    info!(
                        "{}: Ignoring EOS, worker already in state {}",
                        self.request_id, state
                    );
                }
            }
            (_, Inbound::Audio(data)) => {
                if state.accepts_audio() {
                    self.decoder
                        .process_data(&data)
                        .await
                        .map_err(WorkerError::Decoder)?;
                    self.audio_chunks += 1;
                    self.audio_bytes += data.len();
                    self.transition(SessionState::Processing);
                } else {
                    info!(
                        "{}: Ignoring data, worker already in state {}",
                        self.request_id, state
                    );
                }
            }
            (_, Inbound::Text(_)) => {
                warn!(
                    "{}: Ignoring unexpected text message in state {}",
                    self.request_id, state
                );
            }
            (_, Inbound::Closed) => {}
        }

        Ok(())
    }

    async fn init_request(
        &mut self,
        descriptor: RequestDescriptor,
        guard_tx: &mpsc::Sender<GuardSignal>,
    ) -> Result<(), WorkerError> {
        self.request_id = descriptor.id;

        self.decoder
            .init_request(&self.request_id, &descriptor.content_type)
            .await
            .map_err(WorkerError::Decoder)?;
        self.content_type = Some(descriptor.content_type);

        self.activity.send_replace(Instant::now());
        self.transition(SessionState::Initialized);

        let guard = TimeoutGuard::new(
            self.request_id.clone(),
            self.config.silence_timeout,
            self.config.guard_interval,
            self.activity.subscribe(),
            self.state.subscribe(),
            guard_tx.clone(),
        );
        self.guard = Some(guard.spawn());
        info!("{}: Started timeout guard", self.request_id);

        info!(
            "{}: Initialized request (content type {})",
            self.request_id,
            self.content_type.as_deref().unwrap_or_default()
        );

        Ok(())
    }

    /// Returns `true` once the session is finished
    async fn on_decoder_event<S>(
        &mut self,
        event: DecoderEvent,
        outbound: &mut Outbound<S>,
    ) -> Result<bool, WorkerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if !self.state().has_request() {
            debug!(
                "{}: Ignoring decoder event outside a request: {:?}",
                self.request_id, event
            );
            return Ok(false);
        }

        self.activity.send_replace(Instant::now());

        let pending = match event {
            DecoderEvent::Eos => {
                self.finish(outbound).await;
                return Ok(true);
            }
            DecoderEvent::Word(token) => self.relay.on_word(&token),
            DecoderEvent::Result {
                hypothesis,
                is_final,
            } => self.relay.on_result(hypothesis, is_final),
        };

        match pending {
            Some(pending) => self.send_result(pending, outbound).await?,
            None => warn!(
                "{}: Ignoring decoder output outside the {:?} protocol",
                self.request_id,
                self.relay.mode()
            ),
        }

        Ok(false)
    }

    async fn send_result<S>(
        &mut self,
        pending: PendingResult,
        outbound: &mut Outbound<S>,
    ) -> Result<(), WorkerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!(
            "{}: Postprocessing (final={}) result..",
            self.request_id, pending.is_final
        );
        let transcript = postprocess::apply(self.post_processor.as_deref(), &pending.text)
            .await
            .map_err(WorkerError::PostProcessor)?;
        debug!("{}: Postprocessing done.", self.request_id);

        self.send(outbound, &StatusEvent::transcript(transcript, pending.is_final))
            .await;
        Ok(())
    }

    async fn on_guard_signal<S>(
        &mut self,
        signal: GuardSignal,
        outbound: &mut Outbound<S>,
    ) -> Result<(), WorkerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let GuardSignal::SilenceTimeout { idle } = signal;

        let state = self.state();
        if !state.is_watched() {
            debug!(
                "{}: Silence timeout arrived in state {}, ignoring",
                self.request_id, state
            );
            return Ok(());
        }

        info!(
            "{}: Cancelling after {:.1} seconds without decoder activity",
            self.request_id,
            idle.as_secs_f64()
        );
        self.timed_out = true;
        self.begin_cancel().await?;
        self.send(outbound, &StatusEvent::no_speech()).await;

        Ok(())
    }

    /// Returns `true` if the session can end right away
    async fn on_connection_closed(&mut self) -> Result<bool, WorkerError> {
        let state = self.state();
        debug!("{}: Websocket closed in state {}", self.request_id, state);

        match state {
            SessionState::Created | SessionState::Connected => {
                // Nothing in flight
                self.transition(SessionState::Finished);
                Ok(true)
            }
            SessionState::Finished => Ok(true),
            SessionState::Cancelling => {
                info!("{}: Waiting for decoder EOS", self.request_id);
                Ok(false)
            }
            _ => {
                info!(
                    "{}: Master disconnected before decoder reached EOS",
                    self.request_id
                );
                self.begin_cancel().await?;
                info!("{}: Waiting for decoder EOS", self.request_id);
                Ok(false)
            }
        }
    }

    async fn begin_cancel(&mut self) -> Result<(), WorkerError> {
        self.transition(SessionState::Cancelling);
        self.decoder.cancel().await.map_err(WorkerError::Decoder)?;
        self.cancel_deadline = self.config.cancel_timeout.map(|t| Instant::now() + t);
        Ok(())
    }

    async fn finish<S>(&mut self, outbound: &mut Outbound<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.transition(SessionState::Finished);
        self.cancel_deadline = None;
        self.relay.reset();
        outbound.close().await;
        info!("{}: EOS received, connection closed", self.request_id);
    }

    async fn send<S>(&mut self, outbound: &mut Outbound<S>, event: &StatusEvent)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match outbound.send_event(event).await {
            Ok(()) => self.events_sent += 1,
            Err(e) => warn!("{}: {:#}", self.request_id, e),
        }
    }

    fn transition(&mut self, next: SessionState) {
        let current = self.state();
        if next < current {
            warn!(
                "{}: Refusing to move back from {} to {}",
                self.request_id, current, next
            );
            return;
        }
        if next != current {
            debug!("{}: {} -> {}", self.request_id, current, next);
            self.state.send_replace(next);
        }
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            request_id: self.request_id.clone(),
            final_state: self.state(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            audio_chunks: self.audio_chunks,
            audio_bytes: self.audio_bytes,
            events_sent: self.events_sent,
            timed_out: self.timed_out,
        }
    }
}

/// Resolves once shutdown is requested; never resolves without a signal
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        let requested = rx.wait_for(|stop| *stop).await.is_ok();
        if requested {
            return;
        }
    }
    std::future::pending::<()>().await
}
