use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use crate::emotion::build_transformation_prompt;
use crate::llm::media::decode_data_uri;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/update-image", post(update_image))
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateImageRequest {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub emotion: Option<i32>,
    #[serde(default)]
    pub hallucination_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateImageResponse {
    pub processed_image: String,
    pub description: String,
    pub metadata: ResponseMetadata,
}

// Metadata keys stay snake_case while the top-level keys are camelCase; both
// are part of the wire contract.
#[derive(Debug, Serialize)]
pub struct ResponseMetadata {
    pub model: String,
    pub emotion: i32,
    pub hallucination_enabled: bool,
    pub prompt: String,
}

#[derive(Debug)]
pub enum ApiError {
    MissingFields,
    Processing,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::MissingFields => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Missing required fields" })),
            )
                .into_response(),
            ApiError::Processing => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to process image" })),
            )
                .into_response(),
        }
    }
}

/// `POST /api/update-image`: decode the portrait, ask the vision model for a
/// description of the emotionally transformed version, and hand the
/// description to the (placeholder) image generator. Failures past input
/// validation collapse into one generic 500; detail stays in the server log.
async fn update_image(
    State(state): State<AppState>,
    Json(request): Json<UpdateImageRequest>,
) -> Result<Json<UpdateImageResponse>, ApiError> {
    let image = request
        .image
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let (Some(image), Some(emotion)) = (image, request.emotion) else {
        return Err(ApiError::MissingFields);
    };

    let hallucination_enabled = request.hallucination_enabled;
    let prompt = build_transformation_prompt(emotion, hallucination_enabled);
    debug!(emotion, hallucination_enabled, "built transformation prompt");

    match process_portrait(&state, image, &prompt).await {
        Ok((description, processed_image)) => Ok(Json(UpdateImageResponse {
            processed_image,
            description,
            metadata: ResponseMetadata {
                model: state.config.gemini_vision_model.clone(),
                emotion,
                hallucination_enabled,
                prompt,
            },
        })),
        Err(err) => {
            error!("Failed to process portrait: {err:#}");
            Err(ApiError::Processing)
        }
    }
}

async fn process_portrait(
    state: &AppState,
    image: &str,
    prompt: &str,
) -> Result<(String, String)> {
    let portrait = decode_data_uri(image)?;
    debug!(
        width = portrait.width,
        height = portrait.height,
        mime_type = %portrait.mime_type,
        "decoded portrait image"
    );

    let description = state.vision.describe_portrait(prompt, &portrait).await?;
    let processed_image = state
        .generator
        .render_from_description(&description)
        .await?;
    Ok((description, processed_image))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use base64::{engine::general_purpose, Engine as _};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::generator::{ImageGenerationError, ImageGenerator};
    use crate::llm::media::PortraitImage;
    use crate::llm::VisionModel;

    struct StubVision(&'static str);

    #[async_trait]
    impl VisionModel for StubVision {
        async fn describe_portrait(
            &self,
            _prompt: &str,
            _portrait: &PortraitImage,
        ) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingVision;

    #[async_trait]
    impl VisionModel for FailingVision {
        async fn describe_portrait(
            &self,
            _prompt: &str,
            _portrait: &PortraitImage,
        ) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("model unavailable"))
        }
    }

    struct StubGenerator;

    #[async_trait]
    impl ImageGenerator for StubGenerator {
        async fn render_from_description(
            &self,
            _description: &str,
        ) -> Result<String, ImageGenerationError> {
            Ok("stub://processed".to_string())
        }
    }

    fn test_router(vision: Arc<dyn VisionModel>) -> Router {
        let state = AppState::with_services(
            Arc::new(Config::for_tests()),
            vision,
            Arc::new(StubGenerator),
        );
        routes().with_state(state)
    }

    fn post_update_image(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/update-image")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn response_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn png_data_uri() -> String {
        let mut buffer = Vec::new();
        image::RgbaImage::new(2, 2)
            .write_to(
                &mut std::io::Cursor::new(&mut buffer),
                image::ImageFormat::Png,
            )
            .expect("encode test png");
        format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&buffer)
        )
    }

    #[tokio::test]
    async fn missing_image_returns_400() {
        let router = test_router(Arc::new(StubVision("unused")));
        let response = router
            .oneshot(post_update_image(json!({ "emotion": 3 })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response_json(response).await,
            json!({ "error": "Missing required fields" })
        );
    }

    #[tokio::test]
    async fn empty_image_returns_400() {
        let router = test_router(Arc::new(StubVision("unused")));
        let response = router
            .oneshot(post_update_image(json!({ "image": "  ", "emotion": 3 })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_emotion_returns_400() {
        let router = test_router(Arc::new(StubVision("unused")));
        let response = router
            .oneshot(post_update_image(json!({ "image": png_data_uri() })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response_json(response).await,
            json!({ "error": "Missing required fields" })
        );
    }

    #[tokio::test]
    async fn malformed_base64_returns_generic_500() {
        let router = test_router(Arc::new(StubVision("unused")));
        let body = json!({ "image": "data:image/png;base64,not-base64!!!", "emotion": 0 });
        let response = router
            .oneshot(post_update_image(body))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response_json(response).await,
            json!({ "error": "Failed to process image" })
        );
    }

    #[tokio::test]
    async fn vision_failure_returns_generic_500() {
        let router = test_router(Arc::new(FailingVision));
        let body = json!({ "image": png_data_uri(), "emotion": 1 });
        let response = router
            .oneshot(post_update_image(body))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response_json(response).await,
            json!({ "error": "Failed to process image" })
        );
    }

    #[tokio::test]
    async fn well_formed_request_returns_description_and_metadata() {
        let router = test_router(Arc::new(StubVision("A face lit with cosmic joy.")));
        let body = json!({
            "image": png_data_uri(),
            "emotion": 8,
            "hallucinationEnabled": true,
            "fileName": "portrait.png"
        });
        let response = router
            .oneshot(post_update_image(body))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["processedImage"], "stub://processed");
        assert_eq!(json["description"], "A face lit with cosmic joy.");
        assert_eq!(json["metadata"]["model"], "gemini-pro-vision");
        assert_eq!(json["metadata"]["emotion"], 8);
        assert_eq!(json["metadata"]["hallucination_enabled"], true);
        let prompt = json["metadata"]["prompt"].as_str().expect("prompt");
        assert!(prompt.contains("cosmic ecstasy and divine joy"));
        assert!(prompt.contains("extreme and exaggerated"));
    }

    #[tokio::test]
    async fn hallucination_flag_defaults_to_false() {
        let router = test_router(Arc::new(StubVision("A quietly content face.")));
        let body = json!({ "image": png_data_uri(), "emotion": 1 });
        let response = router
            .oneshot(post_update_image(body))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["metadata"]["hallucination_enabled"], false);
        let prompt = json["metadata"]["prompt"].as_str().expect("prompt");
        assert!(prompt.contains("subtle and realistic"));
    }

    #[tokio::test]
    async fn health_endpoint_answers_ok() {
        let router = test_router(Arc::new(StubVision("unused")));
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
