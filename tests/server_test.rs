// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HTTP API tests driven through `tower::ServiceExt::oneshot`.

#![cfg(feature = "server")]

mod common;

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::{png_bytes, rows_detector, solid_image};
use garbage_detect::Annotator;
use garbage_detect::server::{
    AppState, ErrorResponse, HealthResponse, InfoResponse, NO_MODEL, PredictResponse, ServerConfig,
    router,
};
use serde::de::DeserializeOwned;
use tower::ServiceExt;

const BOUNDARY: &str = "garbage-detect-test-boundary";

fn served(rows: &[[f32; 6]]) -> Arc<AppState> {
    Arc::new(AppState::new(
        rows_detector(rows, 100),
        Annotator::without_font(),
        ServerConfig::default(),
    ))
}

fn no_model() -> Arc<AppState> {
    Arc::new(AppState::without_model(
        "model file missing",
        Annotator::without_font(),
        ServerConfig::default(),
    ))
}

fn multipart(field: &str, payload: &[u8]) -> Body {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\nContent-Type: image/png\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn predict_request(uri: &str, field: &str, payload: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart(field, payload))
        .unwrap()
}

async fn json_body<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = router(no_model())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health: HealthResponse = json_body(response).await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, garbage_detect::VERSION);
}

#[tokio::test]
async fn test_predict_without_model_is_500() {
    let png = png_bytes(&solid_image(20, 20));
    let response = router(no_model())
        .oneshot(predict_request("/predict", "file", &png))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = json_body(response).await;
    assert_eq!(error.error, NO_MODEL);
}

#[tokio::test]
async fn test_info_without_model_is_500() {
    let response = router(no_model())
        .oneshot(Request::get("/info").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_predict_missing_field_is_400() {
    let response = router(served(&[]))
        .oneshot(predict_request("/predict", "document", b"hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_predict_unreadable_image_is_500() {
    let response = router(served(&[]))
        .oneshot(predict_request("/predict", "file", b"definitely not an image"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = json_body(response).await;
    assert!(error.error.contains("Invalid image"));
}

#[tokio::test]
async fn test_predict_rejects_out_of_range_confidence() {
    let png = png_bytes(&solid_image(20, 20));
    let response = router(served(&[]))
        .oneshot(predict_request("/predict?conf=1.5", "file", &png))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = json_body(response).await;
    assert!(error.error.contains("Invalid input"));
}

#[tokio::test]
async fn test_predict_non_numeric_confidence_is_json_error() {
    let png = png_bytes(&solid_image(20, 20));
    let response = router(served(&[]))
        .oneshot(predict_request("/predict?conf=abc", "file", &png))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = json_body(response).await;
    assert!(error.error.contains("Invalid input"));
    assert!(error.error.contains("query"));
}

#[tokio::test]
async fn test_predict_returns_rows_and_annotated_png() {
    let rows = [
        [10.0, 10.0, 50.0, 50.0, 0.9, 0.0],
        [60.0, 60.0, 90.0, 90.0, 0.3, 1.0],
    ];
    let png = png_bytes(&solid_image(100, 100));
    let response = router(served(&rows))
        .oneshot(predict_request("/predict?conf=0.5&max_det=10", "image", &png))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: PredictResponse = json_body(response).await;
    assert_eq!(body.detections, vec![[10.0, 10.0, 50.0, 50.0, 0.9, 0.0]]);

    let decoded = STANDARD.decode(body.image_b64).unwrap();
    let annotated = image::load_from_memory(&decoded).unwrap().to_rgb8();
    assert_eq!(annotated.dimensions(), (100, 100));
    assert_eq!(
        *annotated.get_pixel(10, 30),
        garbage_detect::annotate::get_class_color(0)
    );
}

#[tokio::test]
async fn test_info_reports_model() {
    let response = router(served(&[]))
        .oneshot(Request::get("/info").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let info: InfoResponse = json_body(response).await;
    assert_eq!(info.provider, "raw-tensor");
    assert_eq!(info.imgsz, 100);
    assert_eq!(info.num_classes, 3);
    assert_eq!(info.names.get(&1).map(String::as_str), Some("can"));
}

#[tokio::test]
async fn test_openapi_document() {
    let response = router(no_model())
        .oneshot(Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc: serde_json::Value = json_body(response).await;
    assert!(doc["paths"]["/predict"].is_object());
}
