pub mod gemini;
pub mod media;

use anyhow::Result;
use async_trait::async_trait;

use crate::llm::media::PortraitImage;

/// Seam between the request handler and the multimodal backend. The shipped
/// implementation is [`gemini::GeminiVision`]; handler tests substitute stubs.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Returns the model's textual description for the prompt + portrait pair.
    async fn describe_portrait(&self, prompt: &str, portrait: &PortraitImage) -> Result<String>;
}

pub use gemini::GeminiVision;
