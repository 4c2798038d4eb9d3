use anyhow::{Context, Result};
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::messages::{StatusEvent, EOS_MARKER};
use crate::error::WorkerError;

/// WebSocket connection to the coordinator as opened by the worker
pub type CoordinatorStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket connection to the coordinator
pub async fn connect(uri: &str) -> Result<CoordinatorStream, WorkerError> {
    info!("Connecting to coordinator at {}", uri);

    let (stream, _response) = connect_async(uri).await.map_err(WorkerError::Connect)?;

    info!("Opened websocket connection to coordinator");

    Ok(stream)
}

/// An inbound coordinator message, classified for the session
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Text frame (request descriptor, or a protocol violation later on)
    Text(String),
    /// Raw audio bytes
    Audio(Vec<u8>),
    /// The literal end-of-stream control message
    EndOfStream,
    /// The coordinator closed the connection
    Closed,
}

impl Inbound {
    /// Classify a WebSocket frame. Returns `None` for control frames that
    /// tungstenite answers on its own.
    pub fn classify(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) if text.as_str() == EOS_MARKER => Some(Inbound::EndOfStream),
            Message::Text(text) => Some(Inbound::Text(text.as_str().to_string())),
            Message::Binary(data) if &data[..] == EOS_MARKER.as_bytes() => {
                Some(Inbound::EndOfStream)
            }
            Message::Binary(data) => Some(Inbound::Audio(data.to_vec())),
            Message::Close(_) => Some(Inbound::Closed),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Inbound::Text(_) => "text",
            Inbound::Audio(_) => "audio",
            Inbound::EndOfStream => "end-of-stream",
            Inbound::Closed => "close",
        }
    }
}

/// Sending half of the coordinator connection
pub struct Outbound<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    closed: bool,
}

impl<S> Outbound<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(sink: SplitSink<WebSocketStream<S>, Message>) -> Self {
        Self {
            sink,
            closed: false,
        }
    }

    /// Serialize and send a status event
    pub async fn send_event(&mut self, event: &StatusEvent) -> Result<()> {
        if self.closed {
            anyhow::bail!("connection already closed");
        }

        let payload = serde_json::to_string(event).context("Failed to serialize status event")?;

        self.sink
            .send(Message::text(payload))
            .await
            .context("Failed to send status event")?;

        Ok(())
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.sink.close().await {
            debug!("Closing coordinator connection failed: {}", e);
        }
    }
}
