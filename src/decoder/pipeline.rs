use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Word token a decoder emits at the end of an utterance
pub const END_OF_UTTERANCE: &str = "<#s>";

/// Event delivered by a decoder to the session that owns the current request
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// One recognized word (word-token protocol)
    Word(String),
    /// A complete hypothesis (result-object protocol)
    Result { hypothesis: String, is_final: bool },
    /// The decoder finished the request. Nothing follows it.
    Eos,
}

/// How a decoder reports what it recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultMode {
    /// Individual words, with `END_OF_UTTERANCE` closing each segment
    #[default]
    WordTokens,
    /// Whole hypotheses with a final flag
    ResultObjects,
}

impl ResultMode {
    /// Map the `use-decoder2` configuration flag to a mode
    pub fn from_use_decoder2(use_decoder2: bool) -> Self {
        if use_decoder2 {
            ResultMode::ResultObjects
        } else {
            ResultMode::WordTokens
        }
    }
}

/// Handle a decoder uses to deliver events to a session
///
/// Cloneable and usable from any thread or task. Sends to a session that
/// is gone are dropped silently.
#[derive(Debug, Clone)]
pub struct DecoderEventSink {
    tx: mpsc::UnboundedSender<DecoderEvent>,
}

impl DecoderEventSink {
    /// Create a sink and the receiver the session drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DecoderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn word(&self, token: impl Into<String>) {
        self.emit(DecoderEvent::Word(token.into()));
    }

    pub fn result(&self, hypothesis: impl Into<String>, is_final: bool) {
        self.emit(DecoderEvent::Result {
            hypothesis: hypothesis.into(),
            is_final,
        });
    }

    pub fn eos(&self) {
        self.emit(DecoderEvent::Eos);
    }

    pub fn emit(&self, event: DecoderEvent) {
        let _ = self.tx.send(event);
    }
}

/// Decoding engine driven by a session
///
/// One decoder is created at process start and shared by every session the
/// worker runs, one request at a time. Each session registers its own
/// event sink before starting a request.
#[async_trait::async_trait]
pub trait DecoderPipeline: Send + Sync {
    /// Route subsequent events to this sink
    async fn set_event_sink(&self, sink: DecoderEventSink);

    /// Begin decoding a new request. Called once per session, before audio.
    async fn init_request(&self, request_id: &str, content_type: &str) -> Result<()>;

    /// Feed one chunk of raw audio
    async fn process_data(&self, data: &[u8]) -> Result<()>;

    /// No more audio will follow. Idempotent.
    async fn end_request(&self) -> Result<()>;

    /// Ask the decoder to stop early. Completion is signalled with `DecoderEvent::Eos`.
    async fn cancel(&self) -> Result<()>;

    /// Decoder name for logging
    fn name(&self) -> &str;
}
