pub mod config;
pub mod coordinator;
pub mod decoder;
pub mod error;
pub mod postprocess;
pub mod session;
pub mod supervisor;

pub use config::Config;
pub use coordinator::{RequestDescriptor, Status, StatusEvent};
pub use decoder::{CommandDecoder, DecoderEvent, DecoderEventSink, DecoderPipeline, ResultMode};
pub use error::WorkerError;
pub use postprocess::{CommandPostProcessor, PostProcessor};
pub use session::{Session, SessionConfig, SessionState, SessionStats};
pub use supervisor::Supervisor;
