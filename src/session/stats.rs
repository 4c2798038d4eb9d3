use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionState;

/// Summary of one finished session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Request id assigned by the coordinator (`<undefined>` if none arrived)
    pub request_id: String,

    /// State the session ended in
    pub final_state: SessionState,

    /// When the connection was opened
    pub started_at: DateTime<Utc>,

    /// When the session ended
    pub finished_at: DateTime<Utc>,

    /// Number of audio chunks forwarded to the decoder
    pub audio_chunks: usize,

    /// Total audio bytes forwarded to the decoder
    pub audio_bytes: usize,

    /// Number of status events sent to the coordinator
    pub events_sent: usize,

    /// Whether the request was cancelled for decoder silence
    pub timed_out: bool,
}

impl SessionStats {
    pub fn duration_secs(&self) -> f64 {
        self.finished_at
            .signed_duration_since(self.started_at)
            .num_milliseconds() as f64
            / 1000.0
    }
}
