use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use docforge_core::auth::RenderAuthenticator;
use docforge_core::document::DocumentService;
use docforge_core::injectable::RegistryBuilder;
use docforge_core::provider::{CatalogProvider, HttpCatalogSource, WorkspaceInjectableProvider};
use docforge_core::render::{
    HttpImageFetcher, ImageCache, ImageCacheConfig, RenderConfig, RenderGate, RenderPipeline,
    TemplateCache, TemplateCacheConfig, TypstRenderer,
};
use docforge_core::resolution::{ResolutionEngine, ResolverConfig, ScopeFilter};
use docforge_core::scope::{ScopeService, ScopeStore};
use docforge_core::version::{VersionService, VersionStore};
use docforge_db::{PgScopeStore, PgVersionStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docforge_api::auth::ChainAuthenticator;
use docforge_api::background;
use docforge_api::cases::HttpCaseClient;
use docforge_api::config::{CatalogConfig, ServerConfig};
use docforge_api::router::build_app_router;
use docforge_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "docforge_api=debug,docforge_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = docforge_db::create_pool(&database_url, config.db_max_connections)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    docforge_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    docforge_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Injectors and scope ---
    let registry = Arc::new(RegistryBuilder::new().build());
    let scope_store: Arc<dyn ScopeStore> = Arc::new(PgScopeStore::new(pool.clone()));
    let scopes = ScopeService::new(scope_store);
    let added = scopes
        .sync_registry(&registry)
        .await
        .expect("Failed to sync system injectables");
    tracing::info!(injectors = registry.len(), added, "Injector registry ready");

    let mut engine = ResolutionEngine::new(Arc::clone(&registry), ResolverConfig::from_env())
        .with_scope_filter(Arc::new(scopes) as Arc<dyn ScopeFilter>);
    if let Some(provider) = build_provider(&config.catalog) {
        engine = engine.with_provider(provider);
        tracing::info!(environment = %config.catalog.environment, "Workspace provider enabled");
    }

    // --- Render pipeline ---
    let render_config = RenderConfig::from_env();
    let gate = RenderGate::new(render_config.max_concurrent, render_config.acquire_timeout);
    let templates = Arc::new(TemplateCache::new(&TemplateCacheConfig::from_env()));

    let image_config = ImageCacheConfig::from_env();
    let fetcher = HttpImageFetcher::new(image_config.fetch_timeout, image_config.max_bytes)
        .expect("Failed to build image fetcher");
    let images = Arc::new(ImageCache::new(&image_config, Arc::new(fetcher)));

    tracing::info!(
        typst = %render_config.typst_bin,
        max_concurrent = render_config.max_concurrent,
        "Render pipeline configured"
    );
    let pipeline = RenderPipeline::new(Arc::new(TypstRenderer::new(render_config)), gate, templates)
        .with_image_cache(Arc::clone(&images));

    // --- Services ---
    let version_store: Arc<dyn VersionStore> = Arc::new(PgVersionStore::new(pool.clone()));
    let versions = VersionService::new(Arc::clone(&version_store));
    let documents = DocumentService::new(version_store, Arc::new(engine), Arc::new(pipeline));

    let auth = &config.auth;
    if auth.api_keys.is_empty() && auth.jwt_secret.is_none() && !auth.allow_anonymous {
        tracing::warn!("No render credentials configured, every render request will be rejected");
    }
    let authenticator: Arc<dyn RenderAuthenticator> =
        Arc::new(ChainAuthenticator::from_config(auth));

    // --- Background jobs ---
    let cancel = CancellationToken::new();
    let cleanup_handle = tokio::spawn(background::image_cache_cleanup::run(
        Arc::clone(&images),
        image_config.cleanup_interval,
        cancel.clone(),
    ));
    let scheduler_handle = tokio::spawn(background::version_scheduler::run(
        versions,
        Duration::from_secs(config.scheduler_interval_secs),
        cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        pool: Some(pool),
        documents,
        authenticator,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    let _ = tokio::time::timeout(grace, cleanup_handle).await;
    let _ = tokio::time::timeout(grace, scheduler_handle).await;
    tracing::info!("Background jobs stopped");

    tracing::info!("Graceful shutdown complete");
}

/// The workspace provider, when both the catalog and the case service are
/// configured.
fn build_provider(config: &CatalogConfig) -> Option<Arc<dyn WorkspaceInjectableProvider>> {
    let (Some(catalog_url), Some(case_url)) = (&config.base_url, &config.case_service_url) else {
        tracing::info!("Catalog or case service not configured, workspace provider disabled");
        return None;
    };
    let catalogs = HttpCatalogSource::new(catalog_url.clone(), config.timeout)
        .expect("Failed to build catalog client");
    let cases = Arc::new(
        HttpCaseClient::new(case_url.clone(), config.timeout).expect("Failed to build case client"),
    );
    Some(Arc::new(
        CatalogProvider::new(Arc::new(catalogs), cases.clone(), cases)
            .with_environment(config.environment.clone()),
    ))
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
