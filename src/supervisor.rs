use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::coordinator;
use crate::decoder::DecoderPipeline;
use crate::postprocess::PostProcessor;
use crate::session::{Session, SessionConfig};

/// Keeps the worker connected to its coordinator
///
/// Runs one session per connection, back to back. Failed connection
/// attempts are retried after a fixed delay, forever, until shutdown is
/// requested. A request in flight when shutdown arrives is allowed to finish.
pub struct Supervisor {
    uri: String,
    session_config: SessionConfig,
    reconnect_delay: Duration,
    decoder: Arc<dyn DecoderPipeline>,
    post_processor: Option<Arc<dyn PostProcessor>>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    pub fn new(
        uri: impl Into<String>,
        session_config: SessionConfig,
        reconnect_delay: Duration,
        decoder: Arc<dyn DecoderPipeline>,
        post_processor: Option<Arc<dyn PostProcessor>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            uri: uri.into(),
            session_config,
            reconnect_delay,
            decoder,
            post_processor,
            shutdown,
        }
    }

    /// Run until shutdown. Returns the number of sessions served, or the
    /// fatal error that stopped the worker.
    pub async fn run(mut self) -> Result<usize> {
        let mut completed = 0;

        loop {
            if self.shutdown_requested() {
                info!("Shutdown requested, supervisor stopping after {} sessions", completed);
                return Ok(completed);
            }

            info!("Opening websocket connection to master server");
            let attempt = tokio::select! {
                attempt = coordinator::connect(&self.uri) => attempt,
                _ = stop_signal(&mut self.shutdown) => continue,
            };

            let stream = match attempt {
                Ok(stream) => stream,
                Err(e) => {
                    error!(
                        "Couldn't connect to server, waiting for {} seconds: {}",
                        self.reconnect_delay.as_secs(),
                        e
                    );
                    self.wait_before_reconnect().await;
                    continue;
                }
            };

            let session = Session::new(
                self.session_config.clone(),
                Arc::clone(&self.decoder),
                self.post_processor.clone(),
            )
            .with_shutdown(self.shutdown.clone());

            match session.run(stream).await {
                Ok(stats) => {
                    completed += 1;
                    info!(
                        "{}: Session done in {:.1}s (state={}, chunks={}, bytes={}, events={}, timed_out={})",
                        stats.request_id,
                        stats.duration_secs(),
                        stats.final_state,
                        stats.audio_chunks,
                        stats.audio_bytes,
                        stats.events_sent,
                        stats.timed_out
                    );
                }
                // Sessions only fail on decoder or post-processor faults
                Err(e) => {
                    debug_assert!(e.is_fatal());
                    error!("Fatal session error, stopping worker: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep for the reconnect delay, cut short by shutdown
    async fn wait_before_reconnect(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(self.reconnect_delay) => {}
            _ = stop_signal(&mut self.shutdown) => {}
        }
    }
}

/// Resolves once shutdown is requested. If the sender is gone no request
/// can arrive, so it never resolves.
async fn stop_signal(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await
    }
}
