use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures that end a session or a connection attempt.
///
/// Connection failures are recoverable: the supervisor waits and reconnects.
/// Decoder and post-processor faults are fatal, since the worker can no
/// longer trust its collaborators.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to connect to coordinator: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("decoder fault: {0:#}")]
    Decoder(anyhow::Error),

    #[error("post-processor fault: {0:#}")]
    PostProcessor(anyhow::Error),
}

impl WorkerError {
    /// Whether the worker must stop instead of reconnecting
    pub fn is_fatal(&self) -> bool {
        matches!(self, WorkerError::Decoder(_) | WorkerError::PostProcessor(_))
    }
}
