// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HTTP detection API.
//!
//! | Route | Method | Answer |
//! |-------|--------|--------|
//! | `/` | GET | banner |
//! | `/health` | GET | `{status, version}` |
//! | `/info` | GET | model summary, 500 without a model |
//! | `/predict` | POST | multipart upload, detection rows plus annotated PNG |
//! | `/api-docs/openapi.json` | GET | `OpenAPI` document |
//!
//! The model is loaded once at startup. A failed load does not stop the
//! server; every model-bound route answers 500 instead.

use std::collections::BTreeMap;
use std::env;
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::annotate::Annotator;
use crate::detector::Detector;
use crate::error::{InferenceError, Result};
use crate::inference::{DEFAULT_CONFIDENCE, DEFAULT_IMGSZ, InferenceConfig};

/// Message returned by model-bound routes when no model is loaded.
pub const NO_MODEL: &str = "No model loaded on server";

/// Multipart field names accepted for the uploaded image, in lookup order.
pub const UPLOAD_FIELDS: [&str; 2] = ["file", "image"];

/// Server settings, read from the environment with CLI overrides on top.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub model_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub confidence: f32,
    pub imgsz: usize,
    pub max_det: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/best.onnx"),
            host: "0.0.0.0".to_string(),
            port: 8000,
            confidence: DEFAULT_CONFIDENCE,
            imgsz: DEFAULT_IMGSZ,
            max_det: 300,
        }
    }
}

impl ServerConfig {
    /// Read `MODEL_PATH`, `HOST`, `PORT`, `CONF`, `IMGSZ` and `MAX_DET`.
    ///
    /// Unset or unparsable variables keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_path: env::var("MODEL_PATH").map_or(defaults.model_path, PathBuf::from),
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            confidence: env_parse("CONF").unwrap_or(defaults.confidence),
            imgsz: env_parse("IMGSZ").unwrap_or(defaults.imgsz),
            max_det: env_parse("MAX_DET").unwrap_or(defaults.max_det),
        }
    }

    /// Inference settings for the served detector.
    #[must_use]
    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig::new()
            .with_confidence(self.confidence)
            .with_imgsz(self.imgsz)
            .with_max_detections(self.max_det)
    }

    /// Socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Config`] if host and port do not form an address.
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| InferenceError::Config(format!("Invalid bind address: {e}")))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Shared application state.
pub struct AppState {
    detector: Option<Arc<Mutex<Detector>>>,
    load_error: Option<String>,
    annotator: Annotator,
    config: ServerConfig,
}

impl AppState {
    /// State serving `detector`.
    #[must_use]
    pub fn new(detector: Detector, annotator: Annotator, config: ServerConfig) -> Self {
        Self {
            detector: Some(Arc::new(Mutex::new(detector))),
            load_error: None,
            annotator,
            config,
        }
    }

    /// State with no model; model-bound routes answer 500.
    #[must_use]
    pub fn without_model(reason: impl Into<String>, annotator: Annotator, config: ServerConfig) -> Self {
        Self {
            detector: None,
            load_error: Some(reason.into()),
            annotator,
            config,
        }
    }

    /// Load the configured model, keeping the failure instead of returning it.
    #[must_use]
    pub fn load(config: ServerConfig) -> Self {
        let annotator = Annotator::new();
        info!("Loading model: {}", config.model_path.display());
        match Detector::load(&config.model_path, config.inference_config()) {
            Ok(mut detector) => {
                if let Err(e) = detector.warmup() {
                    warn!("Warmup failed: {e}");
                }
                info!(
                    provider = %detector.provider(),
                    classes = detector.names().len(),
                    "model loaded"
                );
                Self::new(detector, annotator, config)
            }
            Err(e) => {
                error!("Failed to load model {}: {e}", config.model_path.display());
                Self::without_model(e.to_string(), annotator, config)
            }
        }
    }

    /// Whether a model is available.
    #[must_use]
    pub const fn has_model(&self) -> bool {
        self.detector.is_some()
    }

    fn detector(&self) -> std::result::Result<Arc<Mutex<Detector>>, AppError> {
        self.detector.clone().ok_or_else(|| {
            if let Some(reason) = &self.load_error {
                warn!("Request refused, model failed to load: {reason}");
            }
            AppError::Internal(NO_MODEL.to_string())
        })
    }
}

/// Request failure mapped to an HTTP status and `{"error": ...}` body.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<InferenceError> for AppError {
    fn from(err: InferenceError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        error!(status = status.as_u16(), "{message}");
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

// Query parameters for inference configuration
#[derive(Debug, Deserialize, IntoParams)]
pub struct PredictParams {
    /// Confidence threshold (0.0 - 1.0). Default: server `CONF`
    #[param(minimum = 0.0, maximum = 1.0, example = 0.35)]
    conf: Option<f32>,
    /// Maximum number of detections to return. Default: server `MAX_DET`
    #[param(minimum = 1, maximum = 10000, example = 300)]
    max_det: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PredictResponse {
    /// One `[x1, y1, x2, y2, confidence, class_id]` row per detection, in original-image pixels
    pub detections: Vec<[f32; 6]>,
    /// Base64 PNG of the uploaded image with detections drawn
    pub image_b64: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InfoResponse {
    /// Path to the loaded model
    pub model_path: String,
    /// Backend provider serving the model
    pub provider: String,
    /// Number of classes
    pub num_classes: usize,
    /// Letterbox canvas side
    pub imgsz: usize,
    /// Class names by id
    pub names: BTreeMap<usize, String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Server status
    pub status: String,
    /// API version
    pub version: String,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Garbage Detection Server",
        description = "YOLO garbage detection API.\n\n## Query Parameters\n- `conf`: Confidence threshold (0.0-1.0)\n- `max_det`: Maximum detections",
        version = "0.1.0",
        license(name = "AGPL-3.0", url = "https://ultralytics.com/license")
    ),
    paths(root, health, info, predict),
    components(schemas(PredictResponse, ErrorResponse, InfoResponse, HealthResponse)),
    tags(
        (name = "inference", description = "Detection endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/predict", post(predict))
        .route("/api-docs/openapi.json", get(openapi))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl+C.
///
/// # Errors
///
/// Returns [`InferenceError::Config`] for a bad address and
/// [`InferenceError::Io`] if the socket cannot be bound or served.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = state.config.addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {e}");
            }
        })
        .await?;
    Ok(())
}

/// Load the model from `config` and serve on a fresh multi-threaded runtime.
///
/// # Errors
///
/// See [`serve`].
pub fn run(config: ServerConfig) -> Result<()> {
    let state = AppState::load(config);
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(serve(state))
}

/// Root endpoint
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Welcome message", body = String)
    )
)]
async fn root() -> &'static str {
    "Garbage Detection Server - POST /predict with an image file. OpenAPI at /api-docs/openapi.json"
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// Model information endpoint
#[utoipa::path(
    get,
    path = "/info",
    tag = "inference",
    responses(
        (status = 200, description = "Model information", body = InfoResponse),
        (status = 500, description = "No model loaded", body = ErrorResponse)
    )
)]
async fn info(State(state): State<Arc<AppState>>) -> std::result::Result<Json<InfoResponse>, AppError> {
    let detector = state.detector()?;
    let detector = detector.lock().await;
    Ok(Json(InfoResponse {
        model_path: detector
            .model_path()
            .map_or_else(|| state.config.model_path.display().to_string(), |p| p.display().to_string()),
        provider: detector.provider().to_string(),
        num_classes: detector.names().len(),
        imgsz: detector.canvas_size(),
        names: detector
            .names()
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect(),
    }))
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Run detection on an uploaded image
///
/// The image goes in multipart field `file` (`image` is also accepted).
#[utoipa::path(
    post,
    path = "/predict",
    tag = "inference",
    params(PredictParams),
    request_body(content_type = "multipart/form-data", description = "Image file"),
    responses(
        (status = 200, description = "Detections and annotated image", body = PredictResponse),
        (status = 400, description = "No image field in the upload", body = ErrorResponse),
        (status = 500, description = "No model, invalid query parameters, unreadable image or inference failure", body = ErrorResponse)
    )
)]
async fn predict(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<PredictParams>, QueryRejection>,
    mut multipart: Multipart,
) -> std::result::Result<Json<PredictResponse>, AppError> {
    let Query(params) = params.map_err(|e| {
        InferenceError::InvalidInput(format!("Invalid query parameters: {}", e.body_text()))
    })?;
    let detector = state.detector()?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name().is_some_and(|name| UPLOAD_FIELDS.contains(&name)) {
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read field: {e}")))?;
            upload = Some(data);
            break;
        }
    }
    let Some(data) = upload else {
        return Err(AppError::BadRequest(
            "No image uploaded, expected multipart field 'file'".to_string(),
        ));
    };

    let confidence = params.conf.unwrap_or(state.config.confidence);
    let max_det = params.max_det.unwrap_or(state.config.max_det);

    let mut detector = detector.lock_owned().await;
    let worker_state = Arc::clone(&state);
    tokio::task::spawn_blocking(move || {
        let image = image::load_from_memory(&data)
            .map_err(|e| InferenceError::InvalidInput(format!("Invalid image: {e}")))?;
        let imgsz = detector.canvas_size();
        let prediction = detector.predict_with(&image, confidence, imgsz, max_det)?;
        let (annotated, _) = worker_state.annotator.annotate(&image, &prediction.detections);

        let mut png = Vec::new();
        annotated.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok::<_, InferenceError>(PredictResponse {
            detections: prediction.to_rows(),
            image_b64: STANDARD.encode(png),
        })
    })
    .await
    .map_err(|e| AppError::Internal(format!("Inference task failed: {e}")))?
    .map(Json)
    .map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.imgsz, 416);
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:8000");
        let inference = config.inference_config();
        assert_eq!(inference.imgsz, Some(416));
        assert_eq!(inference.max_detections, 300);
    }

    #[test]
    fn test_bad_address() {
        let config = ServerConfig {
            host: "not a host".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.addr(), Err(InferenceError::Config(_))));
    }

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/", "/health", "/info", "/predict"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn test_inference_errors_are_internal() {
        let err = AppError::from(InferenceError::InvalidInput("conf".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err = AppError::BadRequest("x".to_string());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
