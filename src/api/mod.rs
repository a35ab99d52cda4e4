//! REST API server module
//!
//! Exposes the transfer engine's command surface (§4.9) as an OpenAPI 3.1
//! compliant REST API: task enqueue/pause/resume/cancel/reset, task and
//! finished-task queries, configuration (including the simulated
//! network-status probe), and system endpoints (health, events, shutdown).

use crate::{Config, Result, TransferEngine};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, patch, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Tasks (§4.9 command surface)
/// - `POST /tasks` - Enqueue a task
/// - `GET /tasks` - List tasks, optionally filtered by group
/// - `GET /tasks/finished` - List terminal tasks
/// - `GET /tasks/:id` - Fetch a single task record
/// - `POST /tasks/:id/pause` - Pause a running task
/// - `POST /tasks/:id/resume` - Resume a paused/retryable task
/// - `POST /tasks/cancel` - Cancel a set of tasks
/// - `POST /tasks/reset` - Cancel every non-terminal task in a group (or all)
/// - `POST /cleanup` - Trigger an explicit task-record cleanup pass
///
/// ## Configuration
/// - `GET /config` - Get current configuration
/// - `PATCH /config` - Update runtime-changeable configuration fields
/// - `PATCH /config/network-status` - Simulate a network connectivity change
///
/// ## System
/// - `GET /network-status` - Query the simulated network connectivity type
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream of status/progress updates
/// - `POST /shutdown` - Graceful shutdown
pub fn create_router(engine: Arc<TransferEngine>, config: Arc<Config>) -> Router {
    let state = AppState::new(engine, config.clone());

    let router = Router::new()
        // Tasks
        .route("/tasks", post(routes::enqueue_task))
        .route("/tasks", get(routes::list_tasks))
        .route("/tasks/finished", get(routes::list_finished_tasks))
        .route("/tasks/:id", get(routes::get_task))
        .route("/tasks/:id/pause", post(routes::pause_task))
        .route("/tasks/:id/resume", post(routes::resume_task))
        .route("/tasks/cancel", post(routes::cancel_tasks))
        .route("/tasks/reset", post(routes::reset_tasks))
        .route("/cleanup", post(routes::trigger_cleanup))
        // Configuration
        .route("/config", get(routes::get_config))
        .route("/config", patch(routes::update_config))
        .route("/config/network-status", patch(routes::set_network_status))
        // System
        .route("/network-status", get(routes::get_network_status))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream))
        .route("/shutdown", post(routes::shutdown));

    // Merge Swagger UI routes if enabled in config (before applying state)
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state);

    // Middleware layer ordering: In Axum's onion model, the LAST layer applied
    // is the OUTERMOST (runs first on requests). We want:
    //   Request → Rate Limit → Auth → Handler
    // So we apply auth FIRST (innermost), then rate limiting SECOND (outermost).

    // Apply authentication middleware if API key is configured (innermost)
    let router = if config.api.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    // Apply rate limiting middleware if enabled in config (outermost — runs first)
    let router = if config.api.rate_limit.enabled {
        let limiter = Arc::new(rate_limit::RateLimiter::new(config.api.rate_limit.clone()));
        router.layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::rate_limit_middleware,
        ))
    } else {
        router
    };

    // Apply CORS middleware if enabled in config
    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Creates a TCP listener, binds it to `config.api.bind_address`, and serves
/// the router until shutdown.
///
/// # Example
///
/// ```no_run
/// use transferd::{Config, Database, TransferEngine};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let db = Arc::new(Database::new(Path::new(config.database_path())).await?);
/// let engine = Arc::new(TransferEngine::new((*config).clone(), db));
/// engine.start().await?;
///
/// transferd::api::start_api_server(engine, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(engine: Arc<TransferEngine>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address.clone();

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(engine, config);

    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}
