#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use docforge_api::config::{AuthConfig, CatalogConfig, ServerConfig};
use docforge_api::router::build_app_router;
use docforge_api::state::AppState;
use docforge_core::auth::RenderAuthenticator;
use docforge_core::document::DocumentService;
use docforge_core::injectable::{DataType, FnInjector, InjectableValue, RegistryBuilder};
use docforge_core::render::{
    RenderError, RenderGate, RenderJob, RenderPipeline, Renderer, TemplateCache,
    TemplateCacheConfig,
};
use docforge_core::resolution::{ResolutionEngine, ResolverConfig, ScopeFilter};
use docforge_core::scope::{InMemoryScopeStore, ScopeService, ScopeStore};
use docforge_core::types::DbId;
use docforge_core::version::{InMemoryVersionStore, NewTemplateVersion, VersionService, VersionStore};

pub const API_KEY: &str = "test-render-key";
pub const JWT_SECRET: &str = "test-jwt-secret-for-integration";

/// Build a test `ServerConfig` with safe defaults and test credentials.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        db_max_connections: 1,
        scheduler_interval_secs: 60,
        auth: AuthConfig {
            api_keys: vec![("tests".to_string(), API_KEY.to_string())],
            jwt_secret: Some(JWT_SECRET.to_string()),
            allow_anonymous: false,
        },
        catalog: CatalogConfig::default(),
    }
}

/// Records every job and answers with a fixed PDF header.
#[derive(Default)]
pub struct FakeRenderer {
    pub sources: Mutex<Vec<String>>,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, job: RenderJob) -> Result<Vec<u8>, RenderError> {
        self.sources.lock().unwrap().push(job.source);
        Ok(b"%PDF-1.7 test".to_vec())
    }
}

pub struct TestApp {
    pub router: Router,
    pub versions: VersionService<dyn VersionStore>,
    pub scopes: ScopeService<dyn ScopeStore>,
    pub renderer: Arc<FakeRenderer>,
}

/// Build the full application router over in-memory stores and a fake
/// renderer, with the same middleware stack production uses.
///
/// Registers `customer_name` (Text, read from the payload's `name`) on top
/// of the built-in injectors.
pub async fn build_test_app() -> TestApp {
    let config = test_config();

    let mut builder = RegistryBuilder::new();
    builder
        .register(FnInjector::new("customer_name", DataType::Text, |ctx, _| async move {
            let name = ctx
                .payload()
                .and_then(|p| p.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or("customer")
                .to_string();
            Ok(Some(InjectableValue::Text(name)))
        }))
        .unwrap();
    let registry = Arc::new(builder.build());

    let scope_store: Arc<dyn ScopeStore> = Arc::new(InMemoryScopeStore::new());
    let scopes = ScopeService::new(scope_store);
    scopes.sync_registry(&registry).await.unwrap();

    let engine = ResolutionEngine::new(registry, ResolverConfig::default())
        .with_scope_filter(Arc::new(scopes.clone()) as Arc<dyn ScopeFilter>);

    let renderer = Arc::new(FakeRenderer::default());
    let pipeline = RenderPipeline::new(
        Arc::clone(&renderer) as Arc<dyn Renderer>,
        RenderGate::new(2, Duration::from_secs(1)),
        Arc::new(TemplateCache::new(&TemplateCacheConfig::default())),
    );

    let version_store: Arc<dyn VersionStore> = Arc::new(InMemoryVersionStore::new());
    let versions = VersionService::new(Arc::clone(&version_store));
    let documents = DocumentService::new(version_store, Arc::new(engine), Arc::new(pipeline));

    let authenticator: Arc<dyn RenderAuthenticator> = Arc::new(
        docforge_api::auth::ChainAuthenticator::from_config(&config.auth),
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        pool: None,
        documents,
        authenticator,
    };

    TestApp {
        router: build_app_router(state, &config),
        versions,
        scopes,
        renderer,
    }
}

impl TestApp {
    /// Create a draft whose body greets `code`.
    pub async fn draft(&self, template_id: DbId, name: &str, code: &str) -> DbId {
        let content = json!({ "type": "doc", "content": [
            { "type": "paragraph", "content": [
                { "type": "text", "text": "Dear " },
                { "type": "injectable", "attrs": { "code": code } }
            ]}
        ]});
        self.versions
            .create_draft(
                NewTemplateVersion {
                    template_id,
                    name: name.to_string(),
                    content,
                },
                Utc::now(),
            )
            .await
            .unwrap()
            .id
    }

    pub async fn published(&self, template_id: DbId, name: &str, code: &str) -> DbId {
        let id = self.draft(template_id, name, code).await;
        self.versions.publish(id, "tests", Utc::now()).await.unwrap();
        id
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// POST with the test API key and a JSON body.
pub fn post_render(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-api-key", API_KEY)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap()
}

/// Collect the response body into bytes.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

/// Collect the response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
