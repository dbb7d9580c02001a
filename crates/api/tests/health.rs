mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get};

#[tokio::test]
async fn health_reports_renderer_slots() {
    let app = build_test_app().await;
    let response = app.send(get("/health")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["render_slots"], 2);
    assert_eq!(json["render_slots_available"], 2);
    assert_eq!(json["cached_templates"], 0);
    assert!(json.get("db_healthy").is_none());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = build_test_app().await;
    let response = app.send(get("/api/v1/nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
