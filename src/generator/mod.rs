pub mod gemini;
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;

/// Something that turns a prompt into text. The relay only knows this trait.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short label for logs and the startup banner.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}
