use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::info;

use super::{unescape_output, PostProcessor};

struct Pipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Post-processor running as a long-lived child process
///
/// Started once from a shell command line and shared by all sessions.
/// Requests are serialized: each writes one line and reads one line back.
pub struct CommandPostProcessor {
    command: String,
    pipes: Mutex<Pipes>,
    // Held so the process is killed when the post-processor is dropped
    _child: Child,
}

impl CommandPostProcessor {
    /// Start the post-processor command
    pub fn spawn(command: &str) -> Result<Self> {
        info!("Starting post-processor: {}", command);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start post-processor: {}", command))?;

        let stdin = child.stdin.take().context("Post-processor has no stdin")?;
        let stdout = child.stdout.take().context("Post-processor has no stdout")?;

        Ok(Self {
            command: command.to_string(),
            pipes: Mutex::new(Pipes {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            _child: child,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait::async_trait]
impl PostProcessor for CommandPostProcessor {
    async fn process(&self, text: &str) -> Result<String> {
        let mut pipes = self.pipes.lock().await;

        pipes
            .stdin
            .write_all(format!("{}\n", text).as_bytes())
            .await
            .context("Failed to write to post-processor")?;
        pipes
            .stdin
            .flush()
            .await
            .context("Failed to flush post-processor input")?;

        let mut line = String::new();
        let read = pipes
            .stdout
            .read_line(&mut line)
            .await
            .context("Failed to read from post-processor")?;
        if read == 0 {
            anyhow::bail!("Post-processor exited: {}", self.command);
        }

        Ok(unescape_output(&line))
    }
}
