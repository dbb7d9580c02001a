use std::sync::Arc;

use docforge_core::auth::RenderAuthenticator;
use docforge_core::document::DocumentService;
use docforge_core::version::VersionStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Database pool. `None` when the stores are in-memory.
    pub pool: Option<docforge_db::DbPool>,
    pub documents: DocumentService<dyn VersionStore>,
    pub authenticator: Arc<dyn RenderAuthenticator>,
}
