use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use super::pipeline::{DecoderEventSink, DecoderPipeline, ResultMode};

/// Environment variable carrying the request id to the recognizer command
pub const REQUEST_ID_ENV: &str = "SPEECH_REQUEST_ID";

/// Environment variable carrying the negotiated content type
pub const CONTENT_TYPE_ENV: &str = "SPEECH_CONTENT_TYPE";

/// One line of recognizer output in result-object mode
#[derive(Debug, Deserialize)]
struct ResultLine {
    hypothesis: String,
    #[serde(rename = "final", default)]
    is_final: bool,
}

struct ActiveRequest {
    request_id: String,
    /// Audio queue drained by the stdin writer; dropping it closes stdin
    audio: Option<mpsc::UnboundedSender<Vec<u8>>>,
    /// Tells the child watcher to kill the recognizer; dropping it does too
    kill: Option<oneshot::Sender<()>>,
}

/// Decoder backed by an external recognizer command
///
/// Every request runs `sh -c <command>`: audio goes to its stdin, and each
/// stdout line is one event. In word-token mode a line is one token; in
/// result-object mode a line is `{"hypothesis": "...", "final": bool}`.
/// The command exiting (stdout EOF) ends the request.
///
/// Audio is queued to a per-request writer task, so a recognizer that stops
/// reading never blocks the caller.
pub struct CommandDecoder {
    command: String,
    mode: ResultMode,
    sink: Mutex<Option<DecoderEventSink>>,
    active: Mutex<Option<ActiveRequest>>,
}

impl CommandDecoder {
    pub fn new(command: impl Into<String>, mode: ResultMode) -> Self {
        Self {
            command: command.into(),
            mode,
            sink: Mutex::new(None),
            active: Mutex::new(None),
        }
    }

    async fn write_audio(
        request_id: String,
        mut stdin: ChildStdin,
        mut chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        while let Some(chunk) = chunks.recv().await {
            if let Err(e) = stdin.write_all(&chunk).await {
                if e.kind() == ErrorKind::BrokenPipe {
                    // The recognizer exited; its EOS is already on the way.
                    warn!("{}: Recognizer stopped reading audio", request_id);
                } else {
                    warn!("{}: Writing audio to recognizer failed: {}", request_id, e);
                }
                return;
            }
        }

        if let Err(e) = stdin.shutdown().await {
            debug!("{}: Closing recognizer stdin: {}", request_id, e);
        }
        debug!("{}: Closed recognizer input", request_id);
    }

    /// Reap the recognizer when it exits, or kill it on request
    async fn watch_child(request_id: String, mut child: Child, kill: oneshot::Receiver<()>) {
        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => debug!("{}: Recognizer exited with {}", request_id, status),
                Err(e) => warn!("{}: Waiting for recognizer failed: {}", request_id, e),
            },
            _ = kill => match child.kill().await {
                Ok(()) => info!("{}: Killed recognizer", request_id),
                Err(e) => warn!("{}: Failed to kill recognizer: {}", request_id, e),
            },
        }
    }

    async fn read_output(
        request_id: String,
        stdout: ChildStdout,
        mode: ResultMode,
        sink: DecoderEventSink,
    ) {
        let mut lines = BufReader::new(stdout).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    match mode {
                        ResultMode::WordTokens => sink.word(line),
                        ResultMode::ResultObjects => match serde_json::from_str::<ResultLine>(line) {
                            Ok(result) => sink.result(result.hypothesis, result.is_final),
                            Err(e) => {
                                warn!("{}: Unparseable recognizer output {:?}: {}", request_id, line, e)
                            }
                        },
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("{}: Reading recognizer output failed: {}", request_id, e);
                    break;
                }
            }
        }

        debug!("{}: Recognizer output closed", request_id);
        sink.eos();
    }
}

#[async_trait::async_trait]
impl DecoderPipeline for CommandDecoder {
    async fn set_event_sink(&self, sink: DecoderEventSink) {
        *self.sink.lock().await = Some(sink);
    }

    async fn init_request(&self, request_id: &str, content_type: &str) -> Result<()> {
        let sink = self
            .sink
            .lock()
            .await
            .clone()
            .context("No event sink registered before init_request")?;

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            warn!(
                "{}: Recognizer for previous request {} still running, killing it",
                request_id, previous.request_id
            );
        }

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env(REQUEST_ID_ENV, request_id)
            .env(CONTENT_TYPE_ENV, content_type)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start recognizer command: {}", self.command))?;

        let stdin = child.stdin.take().context("Recognizer command has no stdin")?;
        let stdout = child
            .stdout
            .take()
            .context("Recognizer command has no stdout")?;

        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(Self::read_output(
            request_id.to_string(),
            stdout,
            self.mode,
            sink,
        ));
        tokio::spawn(Self::write_audio(request_id.to_string(), stdin, audio_rx));
        tokio::spawn(Self::watch_child(request_id.to_string(), child, kill_rx));

        info!("{}: Started recognizer (content type {})", request_id, content_type);

        *active = Some(ActiveRequest {
            request_id: request_id.to_string(),
            audio: Some(audio_tx),
            kill: Some(kill_tx),
        });

        Ok(())
    }

    async fn process_data(&self, data: &[u8]) -> Result<()> {
        let active = self.active.lock().await;
        let request = active.as_ref().context("process_data called without a request")?;

        let queued = request
            .audio
            .as_ref()
            .is_some_and(|audio| audio.send(data.to_vec()).is_ok());
        if !queued {
            debug!("{}: Dropping audio, recognizer input is closed", request.request_id);
        }
        Ok(())
    }

    async fn end_request(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if let Some(request) = active.as_mut() {
            // The writer flushes queued audio, then closes stdin
            if request.audio.take().is_some() {
                debug!("{}: End of audio", request.request_id);
            }
        }
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if let Some(request) = active.as_mut() {
            request.audio = None;
            if let Some(kill) = request.kill.take() {
                // Fails only if the recognizer was already reaped
                if kill.send(()).is_err() {
                    debug!("{}: Recognizer already exited", request.request_id);
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "command"
    }
}
