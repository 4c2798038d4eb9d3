use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::decoder::ResultMode;
use crate::session::SessionConfig;

/// Worker configuration, loaded from a YAML, TOML or JSON file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Decoder reports whole hypotheses instead of word tokens
    pub use_decoder2: bool,
    /// Seconds of decoder silence before a request is cancelled
    pub silence_timeout: u64,
    /// Timeout guard polling interval in milliseconds
    pub guard_interval_ms: u64,
    /// Seconds to wait before reconnecting after a failed connection
    pub reconnect_delay: u64,
    /// Seconds to wait for decoder EOS after a cancel; 0 waits forever
    pub cancel_timeout: u64,
    /// Shell command line of the transcript post-processor
    pub post_processor: Option<String>,
    pub decoder: DecoderConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Shell command line of the recognizer run for each request
    pub command: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directives, used when `RUST_LOG` is unset
    pub filter: String,
    /// Colored output
    pub ansi: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_decoder2: false,
            silence_timeout: 5,
            guard_interval_ms: 1000,
            reconnect_delay: 5,
            cancel_timeout: 30,
            post_processor: None,
            decoder: DecoderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            ansi: true,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let config: Self = settings
            .try_deserialize()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.guard_interval_ms == 0 {
            anyhow::bail!("guard-interval-ms must be greater than zero");
        }
        Ok(())
    }

    pub fn result_mode(&self) -> ResultMode {
        ResultMode::from_use_decoder2(self.use_decoder2)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            silence_timeout: Duration::from_secs(self.silence_timeout),
            guard_interval: Duration::from_millis(self.guard_interval_ms),
            cancel_timeout: (self.cancel_timeout > 0)
                .then(|| Duration::from_secs(self.cancel_timeout)),
            result_mode: self.result_mode(),
        }
    }
}
