//! WebSocket link to the coordinating server
//!
//! The coordinator hands the worker one request per connection: a JSON
//! request descriptor, then binary audio frames, then the `EOS` marker.
//! The worker answers with JSON status events.

pub mod client;
pub mod messages;

pub use client::{connect, CoordinatorStream, Inbound, Outbound};
pub use messages::{Hypothesis, RecognitionResult, RequestDescriptor, Status, StatusEvent, EOS_MARKER};
