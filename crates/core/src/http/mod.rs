//! JSON API over the pipeline stages.
//!
//! Each stage has its own endpoint so a frontend can drive the flow step by
//! step (analyze, then voice, then video). Generated files are served back
//! under `/api/assets`.

use crate::config::ServerConfig;
use crate::emotion::EmotionRecord;
use crate::pipeline::{Pipeline, PipelineError, VideoResult};
use crate::voice::AudioResult;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

const LOG_TARGET: &str = "http";

const TEXT_REQUIRED: &str = "Text is required";
const TEXT_AND_EMOTION_REQUIRED: &str = "Text and emotion data are required";
const ANALYZE_FAILED: &str = "Failed to analyze emotion";
const VOICE_FAILED: &str = "Failed to generate voice";
const VIDEO_FAILED: &str = "Failed to generate video";

pub struct AppState {
    pipeline: Pipeline,
    expose_error_details: bool,
}

impl AppState {
    pub fn new(pipeline: Pipeline, expose_error_details: bool) -> Self {
        Self {
            pipeline,
            expose_error_details,
        }
    }

    fn internal(&self, message: &'static str, err: &impl Display) -> ApiError {
        tracing::error!(target: LOG_TARGET, error = %err, "{message}");
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
            detail: self.expose_error_details.then(|| err.to_string()),
        }
    }

    fn pipeline_error(&self, message: &'static str, err: PipelineError) -> ApiError {
        match err {
            PipelineError::Validation(_) => ApiError::bad_request(message),
            other => self.internal(message, &other),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    detail: Option<String>,
}

impl ApiError {
    fn bad_request(message: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
            detail: None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            message: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

pub fn router(pipeline: Pipeline, server: &ServerConfig) -> Router {
    let assets = ServeDir::new(pipeline.assets().root());
    let state = Arc::new(AppState::new(pipeline, server.expose_error_details));

    let router = Router::new()
        .route("/", get(status))
        .route("/api/health", get(health))
        .route("/api/emotion/analyze", post(analyze_emotion))
        .route("/api/voice/generate", post(generate_voice))
        .route("/api/video/generate", post(generate_video))
        .nest_service("/api/assets", assets)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    match cors_layer(&server.frontend_origin) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origin: &str) -> Option<CorsLayer> {
    let origin = match HeaderValue::from_str(origin.trim()) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(target: LOG_TARGET, origin, error = %e, "invalid frontend origin, CORS disabled");
            return None;
        }
    };
    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
    message: &'static str,
    version: &'static str,
}

async fn status() -> Json<StatusBody> {
    Json(StatusBody {
        status: "online",
        message: "Script2Self API is running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

/// Client-supplied emotion data. A malformed object degrades to the neutral
/// record instead of failing the request.
fn lenient_emotion(value: Option<serde_json::Value>) -> Option<EmotionRecord> {
    let value = value.filter(|v| !v.is_null())?;
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(target: LOG_TARGET, error = %e, "unusable emotion data, using defaults");
            Some(EmotionRecord::default())
        }
    }
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    text: Option<String>,
}

async fn analyze_emotion(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<EmotionRecord>, ApiError> {
    let text = payload
        .ok()
        .and_then(|Json(req)| non_blank(req.text))
        .ok_or_else(|| ApiError::bad_request(TEXT_REQUIRED))?;

    let record = state
        .pipeline
        .classify(&text)
        .await
        .map_err(|e| state.pipeline_error(ANALYZE_FAILED, e))?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct VoiceRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    emotion: Option<serde_json::Value>,
}

async fn generate_voice(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VoiceRequest>, JsonRejection>,
) -> Result<Json<AudioResult>, ApiError> {
    let Ok(Json(req)) = payload else {
        return Err(ApiError::bad_request(TEXT_REQUIRED));
    };
    let text = non_blank(req.text).ok_or_else(|| ApiError::bad_request(TEXT_REQUIRED))?;
    let emotion = lenient_emotion(req.emotion);

    let audio = state
        .pipeline
        .synthesize(&text, emotion.as_ref())
        .await
        .map_err(|e| state.pipeline_error(VOICE_FAILED, e))?;
    Ok(Json(audio))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    emotion: Option<serde_json::Value>,
    /// Whatever the voice endpoint returned. Shapes that don't parse are
    /// treated as "no audio".
    #[serde(default)]
    audio_data: Option<serde_json::Value>,
}

async fn generate_video(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VideoRequest>, JsonRejection>,
) -> Result<Json<VideoResult>, ApiError> {
    let Ok(Json(req)) = payload else {
        return Err(ApiError::bad_request(TEXT_AND_EMOTION_REQUIRED));
    };
    let (Some(text), Some(emotion)) = (non_blank(req.text), lenient_emotion(req.emotion)) else {
        return Err(ApiError::bad_request(TEXT_AND_EMOTION_REQUIRED));
    };
    let audio = req
        .audio_data
        .and_then(|v| serde_json::from_value::<AudioResult>(v).ok());

    let video = state
        .pipeline
        .generate_video(&text, &emotion, audio.as_ref())
        .await
        .map_err(|e| state.pipeline_error(VIDEO_FAILED, e))?;
    Ok(Json(video))
}
