use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a coordinator session
///
/// Variants are declared in transition order; a session only ever moves
/// forward through this ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Created,
    Connected,
    Initialized,
    Processing,
    EosReceived,
    Cancelling,
    Finished,
}

impl SessionState {
    /// Audio may be forwarded to the decoder
    pub fn accepts_audio(self) -> bool {
        matches!(self, SessionState::Initialized | SessionState::Processing)
    }

    /// States in which the timeout guard watches for decoder silence
    pub fn is_watched(self) -> bool {
        matches!(
            self,
            SessionState::Connected | SessionState::Initialized | SessionState::Processing
        )
    }

    /// A request has been handed to the decoder and has not finished yet
    pub fn has_request(self) -> bool {
        self >= SessionState::Initialized && self < SessionState::Finished
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Connected => "connected",
            SessionState::Initialized => "initialized",
            SessionState::Processing => "processing",
            SessionState::EosReceived => "eos-received",
            SessionState::Cancelling => "cancelling",
            SessionState::Finished => "finished",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
