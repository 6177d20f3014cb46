/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use todo_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = todo_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::{auth::require_user, rate_limit::{rate_limit_layer, RateLimiter}},
    routes,
};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use todo_shared::auth::{jwks::JwksCache, jwt::TokenVerifier};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    pub config: Arc<Config>,

    /// Bearer token verifier with its key set cache
    pub verifier: Arc<TokenVerifier>,

    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// State whose verifier fetches keys from the configured auth server
    pub fn new(db: PgPool, config: Config) -> Self {
        let keys = JwksCache::for_auth_server(
            &config.auth.better_auth_url,
            Duration::from_secs(config.auth.jwks_cache_ttl_seconds),
        );
        let verifier = TokenVerifier::new(
            keys,
            config.auth.jwt_algorithm,
            Some(config.auth.jwt_audience.clone()),
        );

        Self::with_verifier(db, config, verifier)
    }

    /// State with a caller-supplied verifier
    pub fn with_verifier(db: PgPool, config: Config, verifier: TokenVerifier) -> Self {
        Self {
            db,
            rate_limiter: Arc::new(RateLimiter::new(config.api.rate_limit_per_minute)),
            config: Arc::new(config),
            verifier: Arc::new(verifier),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /                      # Service banner (public)
/// ├── GET /health                # Health check (public)
/// └── /api/                      # Bearer token + rate limit
///     ├── /todos and /tags also answer with a trailing slash
///     ├── /todos/
///     │   ├── POST   /
///     │   ├── GET    /
///     │   ├── GET    /:id
///     │   ├── PATCH  /:id
///     │   ├── DELETE /:id
///     │   ├── POST   /:id/toggle
///     │   └── GET    /:id/tags
///     └── /tags/
///         ├── GET    /
///         ├── POST   /
///         ├── POST   /cleanup
///         ├── GET    /:id
///         ├── PATCH  /:id
///         └── DELETE /:id
/// ```
///
/// # Middleware Stack
///
/// Outermost first: CORS, request tracing, then on `/api` routes
/// authentication followed by rate limiting.
///
/// Unknown paths get a JSON 404 with code `NOT_FOUND`; below `/api` only
/// after authentication.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check));

    // Collections answer with and without a trailing slash
    let todo_collection = post(routes::tasks::create_task).get(routes::tasks::list_tasks);
    let tag_collection = get(routes::tags::list_tags).post(routes::tags::create_tag);

    // Layers run bottom to top: authenticate, then rate limit
    let api_routes = Router::new()
        .route("/todos", todo_collection.clone())
        .route("/todos/", todo_collection)
        .route(
            "/todos/:id",
            get(routes::tasks::get_task)
                .patch(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route("/todos/:id/toggle", post(routes::tasks::toggle_task))
        .route("/todos/:id/tags", get(routes::tasks::task_tags))
        .route("/tags", tag_collection.clone())
        .route("/tags/", tag_collection)
        .route("/tags/cleanup", post(routes::tags::cleanup_tags))
        .route(
            "/tags/:id",
            get(routes::tags::get_tag)
                .patch(routes::tags::rename_tag)
                .delete(routes::tags::delete_tag),
        )
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_layer,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_user,
        ));

    Router::new()
        .merge(public_routes)
        .nest("/api", api_routes)
        .fallback(not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
        .layer(cors_layer(&state.config))
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::RouteNotFound
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_allows_any() {
        // Development mode: permissive CORS
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
