//! Coordinator session management
//!
//! This module provides the `Session` that handles one request per
//! coordinator connection:
//! - Request lifecycle state machine
//! - Routing of audio and end-of-stream to the decoder
//! - Relay of decoder results (through the post-processor) to the coordinator
//! - Silence watchdog that cancels stalled decodes

mod config;
mod guard;
mod relay;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use guard::{GuardSignal, TimeoutGuard};
pub use relay::{PendingResult, ResultRelay};
pub use session::{Session, UNDEFINED_REQUEST_ID};
pub use state::SessionState;
pub use stats::SessionStats;
