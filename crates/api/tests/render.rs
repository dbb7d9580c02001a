mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use common::{body_bytes, body_json, build_test_app, post_render, JWT_SECRET};
use docforge_api::auth::issue_token;
use docforge_core::scope::{AssignmentScope, NewAssignment};

#[tokio::test]
async fn published_version_renders_pdf() {
    let app = build_test_app().await;
    let id = app.published(1, "welcome", "customer_name").await;

    let response = app
        .send(post_render(&format!("/api/v1/render/{id}"), json!({ "name": "Ana" })))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "application/pdf");
    assert_eq!(headers["x-resolved-count"], "1");
    assert_eq!(headers["x-template-cache"], "miss");
    assert!(headers.contains_key("x-render-id"));

    assert_eq!(body_bytes(response).await, b"%PDF-1.7 test");
    assert!(app.renderer.sources.lock().unwrap()[0].contains("Dear Ana"));
}

#[tokio::test]
async fn second_render_hits_template_cache() {
    let app = build_test_app().await;
    let id = app.published(1, "welcome", "customer_name").await;
    let uri = format!("/api/v1/render/{id}");

    app.send(post_render(&uri, json!({}))).await;
    let response = app.send(post_render(&uri, json!({}))).await;
    assert_eq!(response.headers()["x-template-cache"], "hit");
}

#[tokio::test]
async fn draft_needs_preview_flag() {
    let app = build_test_app().await;
    let id = app.draft(1, "wip", "customer_name").await;

    let response = app
        .send(post_render(&format!("/api/v1/render/{id}"), json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CONFLICT");

    let response = app
        .send(post_render(&format!("/api/v1/render/{id}?preview=true"), json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-template-cache"], "miss");
}

#[tokio::test]
async fn unknown_version_is_404() {
    let app = build_test_app().await;
    let response = app.send(post_render("/api/v1/render/4242", json!({}))).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn unresolvable_codes_are_listed() {
    let app = build_test_app().await;
    let id = app.published(1, "broken", "no_such_code").await;

    let response = app
        .send(post_render(&format!("/api/v1/render/{id}"), json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["code"], "MISSING_INJECTABLES");
    assert_eq!(json["details"]["codes"], json!(["no_such_code"]));
    assert!(app.renderer.sources.lock().unwrap().is_empty());
}

#[tokio::test]
async fn workspace_exclusion_turns_code_off() {
    let app = build_test_app().await;
    let id = app.published(1, "welcome", "customer_name").await;
    app.scopes
        .create_assignment(NewAssignment {
            injectable_key: "customer_name".into(),
            scope: AssignmentScope::Workspace {
                tenant_id: 1,
                workspace_id: 2,
            },
            is_active: false,
        })
        .await
        .unwrap();

    let excluded = app
        .send(post_render(
            &format!("/api/v1/render/{id}?tenant_id=1&workspace_id=2"),
            json!({}),
        ))
        .await;
    assert_eq!(excluded.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(excluded).await["details"]["codes"], json!(["customer_name"]));

    let other_workspace = app
        .send(post_render(
            &format!("/api/v1/render/{id}?tenant_id=1&workspace_id=3"),
            json!({}),
        ))
        .await;
    assert_eq!(other_workspace.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_payload_is_400() {
    let app = build_test_app().await;
    let id = app.published(1, "welcome", "customer_name").await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/render/{id}"))
        .header("x-api-key", common::API_KEY)
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn missing_credentials_are_401() {
    let app = build_test_app().await;
    let id = app.published(1, "welcome", "customer_name").await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/render/{id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn end_user_token_is_accepted() {
    let app = build_test_app().await;
    let id = app.published(1, "welcome", "customer_name").await;
    let token = issue_token("user-7", 5, JWT_SECRET).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/render/{id}"))
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(r#"{ "name": "Bo" }"#))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.renderer.sources.lock().unwrap()[0].contains("Dear Bo"));
}
