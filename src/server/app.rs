//! Application setup: the router assembly behind §6.1's HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domains::auth::JwtVerifier;
use crate::kernel::deps::AppDeps;
use crate::server::middleware::require_auth;
use crate::server::routes;

/// Shared application state, injected into every handler via axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<AppDeps>,
    pub jwt_verifier: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(deps: Arc<AppDeps>, jwt_verifier: Arc<JwtVerifier>) -> Self {
        Self { deps, jwt_verifier }
    }

    /// Test-only constructor: a lazily-connected pool (never touches the
    /// network until a query actually runs) plus in-memory/fake
    /// collaborators, for handler tests that only exercise the HTTP layer.
    #[cfg(test)]
    pub fn for_tests(jwt_verifier: Arc<JwtVerifier>) -> Self {
        use crate::kernel::event_bus::EventBus;
        use crate::kernel::jobs::PostgresJobQueue;
        use crate::kernel::nlp_client::FakeNlpClient;
        use crate::kernel::realtime::RealtimeHub;
        use crate::kernel::storage::InMemoryObjectStorage;
        use sqlx::postgres::PgPoolOptions;

        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/orchestrator_test")
            .expect("lazy pool construction never touches the network");

        let deps = AppDeps {
            db_pool: pool.clone(),
            object_storage: Arc::new(InMemoryObjectStorage::new()),
            nlp_client: Arc::new(FakeNlpClient::new()),
            event_bus: Arc::new(EventBus::new()),
            realtime: Arc::new(RealtimeHub::default()),
            job_queue: Arc::new(PostgresJobQueue::new(pool)),
        };

        Self { deps: Arc::new(deps), jwt_verifier }
    }
}

/// CORS origins accepted by the core. Kept permissive on methods/headers
/// since every private route already sits behind `require_auth`.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([axum::http::header::AUTHORIZATION, axum::http::header::CONTENT_TYPE]);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([axum::http::header::AUTHORIZATION, axum::http::header::CONTENT_TYPE])
}

/// Assembles the full router: `/health` is public, everything else sits
/// behind `require_auth` (§6.1).
pub fn build_app(state: AppState, allowed_origins: &[String]) -> Router {
    let private_routes = Router::new()
        .route("/resumes", post(routes::resumes::create_resume).get(routes::resumes::list_resumes))
        .route(
            "/resumes/:id",
            get(routes::resumes::get_resume).delete(routes::resumes::delete_resume),
        )
        .route("/jobs", post(routes::jobs::create_job).get(routes::jobs::list_jobs))
        .route("/jobs/:id", get(routes::jobs::get_job).delete(routes::jobs::delete_job))
        .route("/matches", post(routes::matches::create_match).get(routes::matches::list_matches))
        .route("/matches/:id", get(routes::matches::get_match))
        .route("/usage", get(routes::usage::get_usage))
        .route("/ws", get(routes::ws::upgrade))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    let api = Router::new()
        .route("/health", get(routes::health::health))
        .merge(private_routes);

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .layer(tower_http::timeout::TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}
