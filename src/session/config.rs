use std::time::Duration;

use crate::decoder::ResultMode;

/// Configuration for a coordinator session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Decoder silence after which the request is cancelled
    /// Default: 5 seconds
    pub silence_timeout: Duration,

    /// How often the timeout guard checks for silence
    /// Default: 1 second
    pub guard_interval: Duration,

    /// How long a cancelled request may wait for the decoder's EOS before
    /// the session gives up and closes. `None` waits indefinitely.
    /// Default: 30 seconds
    pub cancel_timeout: Option<Duration>,

    /// Which result protocol the decoder speaks
    pub result_mode: ResultMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            silence_timeout: Duration::from_secs(5),
            guard_interval: Duration::from_secs(1),
            cancel_timeout: Some(Duration::from_secs(30)),
            result_mode: ResultMode::WordTokens,
        }
    }
}
