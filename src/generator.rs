use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("Image generation failed: {0}")]
pub struct ImageGenerationError(pub String);

/// Downstream step that turns a textual description back into an image
/// reference. Modeled as a trait so the handler and its tests do not care
/// whether a real generation backend is wired in.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn render_from_description(
        &self,
        description: &str,
    ) -> Result<String, ImageGenerationError>;
}

/// No image-generation backend is integrated yet (Replicate, Stability and
/// friends are candidates); until one is, every description maps to the same
/// placeholder data URI.
pub struct PlaceholderImageGenerator;

const PLACEHOLDER_IMAGE: &str = "data:image/jpeg;base64,...";

#[async_trait]
impl ImageGenerator for PlaceholderImageGenerator {
    async fn render_from_description(
        &self,
        _description: &str,
    ) -> Result<String, ImageGenerationError> {
        Ok(PLACEHOLDER_IMAGE.to_string())
    }
}
