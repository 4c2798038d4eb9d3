pub mod command;
pub mod pipeline;

pub use command::CommandDecoder;
pub use pipeline::{DecoderEvent, DecoderEventSink, DecoderPipeline, ResultMode, END_OF_UTTERANCE};
