use axum::{
    Router,
    extract::ConnectInfo,
    http::Extensions,
    middleware,
    routing::get,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::Notify;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::info;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthService, CredentialService, MembershipService, Resolver, SeaOrmAuthService,
    SeaOrmCredentialService, SeaOrmMembershipService, access_catalog,
};

pub mod actions;
pub mod dispatch;
mod error;
mod home;
mod observability;
pub mod render;
pub mod session;
mod system;
mod types;
mod validation;

pub use actions::{ActionContext, ActionHandler, ActionRegistry};
pub use error::ApiError;
pub use render::{HandlebarsRenderer, PageData, TemplateRenderer};
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,

    pub store: Store,

    pub auth: Arc<dyn AuthService>,

    pub credentials: Arc<dyn CredentialService>,

    pub membership: Arc<dyn MembershipService>,

    pub resolver: Resolver,

    pub renderer: Arc<dyn TemplateRenderer>,

    pub actions: ActionRegistry,

    pub prometheus_handle: Option<PrometheusHandle>,

    /// Signalled by `/stop-process`.
    pub shutdown: Arc<Notify>,
}

/// Opens the database, seeds the access rules and wires every service.
///
/// Fails if a stored rule names an action nothing handles.
pub async fn create_app_state(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let report = access_catalog::seed(&store).await?;
    info!(
        requests = report.requests_added,
        grants = report.grants_added,
        "Access rules seeded"
    );

    let credentials: Arc<dyn CredentialService> = Arc::new(SeaOrmCredentialService::new(
        store.clone(),
        config.password_rules.clone(),
        config.security.clone(),
    ));
    let membership: Arc<dyn MembershipService> =
        Arc::new(SeaOrmMembershipService::new(store.clone()));
    let auth: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
        store.clone(),
        credentials.clone(),
        config.clone(),
    ));

    let resolver = Resolver::new(store.clone(), config.general.default_language.clone());
    let renderer: Arc<dyn TemplateRenderer> =
        Arc::new(HandlebarsRenderer::new(&config.server.templates_path)?);

    let actions = ActionRegistry::with_home_actions();
    actions.validate(&store.referenced_actions().await?)?;

    Ok(Arc::new(AppState {
        config,
        store,
        auth,
        credentials,
        membership,
        resolver,
        renderer,
        actions,
        prometheus_handle,
        shutdown: Arc::new(Notify::new()),
    }))
}

/// Peer address recorded by the listener; `"unknown"` when not served over TCP.
#[must_use]
pub fn client_ip(extensions: &Extensions) -> String {
    peer_addr(extensions).map_or_else(|| "unknown".to_string(), |ip| ip.to_string())
}

#[must_use]
pub fn peer_addr(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

pub fn router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(server.secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            server.session_minutes,
        )));

    let static_files = ServeDir::new(&server.static_path);

    Router::new()
        .route("/stop-process", get(system::stop_process))
        .route("/metrics", get(observability::get_metrics))
        .route("/", get(dispatch::handle).post(dispatch::handle))
        .route("/{*path}", get(dispatch::handle).post(dispatch::handle))
        .nest_service("/static", static_files)
        .layer(session_layer)
        .with_state(state)
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(TraceLayer::new_for_http())
}
