use std::sync::Arc;

use crate::config::Config;
use crate::generator::{ImageGenerator, PlaceholderImageGenerator};
use crate::llm::{GeminiVision, VisionModel};

/// Shared per-process state handed to every request handler. Immutable after
/// startup; cloning is cheap (all fields are behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub vision: Arc<dyn VisionModel>,
    pub generator: Arc<dyn ImageGenerator>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        let vision = Arc::new(GeminiVision::new(config.clone()));
        AppState {
            config,
            vision,
            generator: Arc::new(PlaceholderImageGenerator),
        }
    }

    /// Wires explicit service implementations; used by tests to stub the
    /// external collaborators.
    #[cfg(test)]
    pub fn with_services(
        config: Arc<Config>,
        vision: Arc<dyn VisionModel>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        AppState {
            config,
            vision,
            generator,
        }
    }
}
