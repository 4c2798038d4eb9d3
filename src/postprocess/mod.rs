//! Optional text filter applied to every transcript before it is relayed

mod command;

pub use command::CommandPostProcessor;

use anyhow::Result;

/// Line-oriented text filter: one line in, one line out
#[async_trait::async_trait]
pub trait PostProcessor: Send + Sync {
    async fn process(&self, text: &str) -> Result<String>;
}

/// Run `text` through the post-processor, or pass it through when none is configured
pub async fn apply(post_processor: Option<&dyn PostProcessor>, text: &str) -> Result<String> {
    match post_processor {
        Some(post_processor) => post_processor.process(text).await,
        None => Ok(text.to_string()),
    }
}

/// Clean up one line of filter output: trim it and turn escaped `\n`
/// sequences into real newlines
pub fn unescape_output(line: &str) -> String {
    line.trim().replace("\\n", "\n")
}
