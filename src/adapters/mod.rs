pub mod claude;

pub use claude::ClaudeAdapter;

use anyhow::Result;
use async_trait::async_trait;

/// Text-in/text-out access to a hosted language model
#[async_trait]
pub trait PromptRunner: Send + Sync {
    /// Run one prompt with a system instruction and return the model's text reply
    async fn run(&self, system: &str, prompt: &str) -> Result<String>;
}
