use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use postviz_server::provider::{GenerationProvider, ProviderError, RegenerationMode};
use postviz_server::server::build_api_router;

struct StubProvider;

#[async_trait]
impl GenerationProvider for StubProvider {
    async fn record_by_slug(&self, _slug: &str) -> Result<Option<Value>, ProviderError> {
        Ok(None)
    }

    async fn generate(&self, slug: &str, _mode: RegenerationMode) -> Result<Value, ProviderError> {
        Err(ProviderError::NotFound(format!(
            "Blog post not found: {slug}"
        )))
    }

    async fn scan(
        &self,
        _mode: RegenerationMode,
        _limit: Option<usize>,
    ) -> Result<Value, ProviderError> {
        Ok(json!({ "processed": 0, "succeeded": 0, "failed": 0, "errors": [] }))
    }
}

#[tokio::test]
async fn healthz_returns_ok_json() {
    let app = build_api_router(Arc::new(StubProvider));
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/v1/healthz")
                .body(Body::empty())
                .expect("request builder should not fail"),
        )
        .await
        .expect("healthz handler should respond");

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .expect("content-type header present")
        .to_str()
        .expect("content-type must be valid utf-8");
    assert!(
        content_type.starts_with("application/json"),
        "content-type must indicate JSON: {content_type}"
    );

    let body_bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body must be readable")
        .to_bytes();
    let value: Value =
        serde_json::from_slice(body_bytes.as_ref()).expect("healthz response must be valid JSON");
    assert_eq!(value, json!({ "status": "ok" }));
}

#[tokio::test]
async fn missing_records_map_to_404() {
    let app = build_api_router(Arc::new(StubProvider));
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/v1/visualizations/nope")
                .body(Body::empty())
                .expect("request builder should not fail"),
        )
        .await
        .expect("record handler should respond");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body_bytes = response
        .into_body()
        .collect()
        .await
        .expect("body readable")
        .to_bytes();
    let value: Value = serde_json::from_slice(body_bytes.as_ref()).expect("error body is JSON");
    assert_eq!(value["error"], "not_found");
}

#[tokio::test]
async fn generate_surfaces_provider_not_found() {
    let app = build_api_router(Arc::new(StubProvider));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/visualizations/nope/generate?mode=fill-missing")
                .body(Body::empty())
                .expect("request builder should not fail"),
        )
        .await
        .expect("generate handler should respond");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body_bytes = response
        .into_body()
        .collect()
        .await
        .expect("body readable")
        .to_bytes();
    let value: Value = serde_json::from_slice(body_bytes.as_ref()).expect("error body is JSON");
    assert_eq!(value["message"], "Blog post not found: nope");
}

#[tokio::test]
async fn scan_returns_the_batch_report() {
    let app = build_api_router(Arc::new(StubProvider));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/visualizations/scan")
                .body(Body::empty())
                .expect("request builder should not fail"),
        )
        .await
        .expect("scan handler should respond");

    assert_eq!(response.status(), StatusCode::OK);

    let body_bytes = response
        .into_body()
        .collect()
        .await
        .expect("body readable")
        .to_bytes();
    let value: Value = serde_json::from_slice(body_bytes.as_ref()).expect("report is JSON");
    assert_eq!(value["processed"], 0);
}
