// Shared fixtures for integration tests: a scripted decoder and a local
// coordinator endpoint speaking the worker WebSocket protocol.

#![allow(dead_code)]

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use speech_worker::coordinator::{self, CoordinatorStream};
use speech_worker::{
    DecoderEvent, DecoderEventSink, DecoderPipeline, PostProcessor, ResultMode, SessionConfig,
    StatusEvent,
};
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

pub type CoordinatorSide = WebSocketStream<TcpStream>;

/// A call the session made on the decoder
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Init {
        request_id: String,
        content_type: String,
    },
    Data(Vec<u8>),
    End,
    Cancel,
}

/// Decoder double that records calls and replays a script
#[derive(Default)]
pub struct ScriptedDecoder {
    calls: Mutex<Vec<Call>>,
    sink: Mutex<Option<DecoderEventSink>>,
    /// Events emitted when the request ends, before EOS
    script: Vec<DecoderEvent>,
    eos_on_end: bool,
    eos_on_cancel: bool,
    fail_on_data: bool,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `script` then EOS when the session ends the request
    pub fn finishing_with(mut self, script: Vec<DecoderEvent>) -> Self {
        self.script = script;
        self.eos_on_end = true;
        self
    }

    /// Emit the script without a trailing EOS
    pub fn emitting(mut self, script: Vec<DecoderEvent>) -> Self {
        self.script = script;
        self
    }

    pub fn eos_on_end(mut self) -> Self {
        self.eos_on_end = true;
        self
    }

    pub fn eos_on_cancel(mut self) -> Self {
        self.eos_on_cancel = true;
        self
    }

    pub fn fail_on_data(mut self) -> Self {
        self.fail_on_data = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn data_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Data(_)))
            .count()
    }

    pub fn sink(&self) -> Option<DecoderEventSink> {
        self.sink.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl DecoderPipeline for ScriptedDecoder {
    async fn set_event_sink(&self, sink: DecoderEventSink) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    async fn init_request(&self, request_id: &str, content_type: &str) -> Result<()> {
        self.record(Call::Init {
            request_id: request_id.to_string(),
            content_type: content_type.to_string(),
        });
        Ok(())
    }

    async fn process_data(&self, data: &[u8]) -> Result<()> {
        if self.fail_on_data {
            anyhow::bail!("decoder crashed");
        }
        self.record(Call::Data(data.to_vec()));
        Ok(())
    }

    async fn end_request(&self) -> Result<()> {
        self.record(Call::End);
        if let Some(sink) = self.sink() {
            for event in &self.script {
                sink.emit(event.clone());
            }
            if self.eos_on_end {
                sink.eos();
            }
        }
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        self.record(Call::Cancel);
        if self.eos_on_cancel {
            if let Some(sink) = self.sink() {
                sink.eos();
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Upper-cases transcripts
pub struct Shout;

#[async_trait::async_trait]
impl PostProcessor for Shout {
    async fn process(&self, text: &str) -> Result<String> {
        Ok(text.to_uppercase())
    }
}

/// Post-processor that always fails
pub struct Broken;

#[async_trait::async_trait]
impl PostProcessor for Broken {
    async fn process(&self, _text: &str) -> Result<String> {
        anyhow::bail!("post-processor died")
    }
}

pub fn word(token: &str) -> DecoderEvent {
    DecoderEvent::Word(token.to_string())
}

/// Session timings short enough for tests
pub fn fast_config(result_mode: ResultMode) -> SessionConfig {
    SessionConfig {
        silence_timeout: Duration::from_secs(2),
        guard_interval: Duration::from_millis(50),
        cancel_timeout: Some(Duration::from_secs(5)),
        result_mode,
    }
}

/// Like `fast_config`, with a silence timeout tests can wait out
pub fn quick_silence(result_mode: ResultMode) -> SessionConfig {
    SessionConfig {
        silence_timeout: Duration::from_millis(300),
        ..fast_config(result_mode)
    }
}

/// Open a worker connection to a fresh local coordinator
pub async fn connect_pair() -> (CoordinatorSide, CoordinatorStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let (server, client) = tokio::join!(
        async {
            let (stream, _) = listener.accept().await.unwrap();
            accept_async(stream).await.unwrap()
        },
        coordinator::connect(&url)
    );

    (server, client.unwrap())
}

/// Accept one worker connection on an existing listener
pub async fn accept_worker(listener: &TcpListener) -> CoordinatorSide {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

pub async fn send_descriptor(ws: &mut CoordinatorSide, id: &str, content_type: &str) {
    let descriptor = serde_json::json!({ "id": id, "content_type": content_type, "user_id": "tester" });
    ws.send(Message::text(descriptor.to_string())).await.unwrap();
}

pub async fn send_audio(ws: &mut CoordinatorSide, data: &[u8]) {
    ws.send(Message::binary(data.to_vec())).await.unwrap();
}

pub async fn send_text(ws: &mut CoordinatorSide, text: &str) {
    ws.send(Message::text(text.to_string())).await.unwrap();
}

pub async fn send_eos(ws: &mut CoordinatorSide) {
    ws.send(Message::text("EOS")).await.unwrap();
}

/// Next status event, or `None` once the worker closed the connection
pub async fn next_event(ws: &mut CoordinatorSide) -> Option<StatusEvent> {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for the worker");

        match frame {
            Some(Ok(Message::Text(text))) => {
                return Some(serde_json::from_str(text.as_str()).unwrap());
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// All status events until the worker closes the connection
pub async fn events_until_close(ws: &mut CoordinatorSide) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Some(event) = next_event(ws).await {
        events.push(event);
    }
    events
}
