use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};

use axum::{Extension, Router, response::IntoResponse, routing::get, serve};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    services::ServeDir,
};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt};

use axum::http::{HeaderValue, StatusCode, header};
use shared::config::server::{Config, DatabaseConfig, LogFormat};

use crate::{
    app_state::AppState,
    auth::session::SessionService,
    db::bootstrap,
    middleware::request_context::{self, RequestIdState},
    routes,
    services::{image_host::CloudinaryHost, oauth_service},
    tracer,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn metrics_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn metrics_endpoint(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        handle.render(),
    )
}

/// Initializes the tracing subscriber for logging using the provided
/// configuration.
pub fn initialize_tracing(config: &Config) -> String {
    let env_filter = build_env_filter(config);

    let fmt_builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    if matches!(config.logging.format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).init();
    } else {
        fmt_builder.with_ansi(true).init();
    }

    config.logging.level.clone()
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

/// Creates a database connection pool from the given database settings.
///
/// # Errors
/// Returns an error if the database connection pool cannot be created.
pub async fn create_database_pool(db: &DatabaseConfig) -> Result<sqlx::PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .acquire_timeout(Duration::from_millis(db.statement_timeout_ms))
        .connect(&db.url)
        .await?;
    metrics::gauge!("db_pool_max_connections").set(f64::from(db.max_connections));
    Ok(pool)
}

/// Creates the application state from the resolved configuration and an
/// optional database pool.
#[must_use]
pub fn create_app_state(config: Arc<Config>, pool: Option<sqlx::PgPool>) -> Arc<AppState> {
    let sessions = pool.clone().map(|pool| {
        Arc::new(SessionService::new(pool, config.clone())) as Arc<dyn crate::auth::session::SessionManager>
    });
    let images = Some(Arc::new(CloudinaryHost::new(
        oauth_service::create_http_client(),
        config.media.clone(),
    )) as Arc<dyn crate::services::image_host::ImageHost>);

    Arc::new(AppState {
        config,
        pool,
        sessions,
        images,
    })
}

/// Creates the CORS layer for the application.
#[must_use]
pub fn create_cors_layer(config: &Config) -> CorsLayer {
    use http::Method;

    let methods = vec![
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let mut cors = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::any())
        .allow_credentials(config.server.cors.allow_credentials)
        .max_age(Duration::from_secs(config.server.cors.max_age_seconds));

    if config.server.cors.allowed_origins.is_empty() {
        cors = cors.allow_origin(AllowOrigin::any());
    } else {
        let origins = config
            .server
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| http::HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        cors = cors.allow_origin(AllowOrigin::list(origins));
    }

    cors
}

/// Creates the API router with all route modules.
#[must_use]
pub fn create_api_router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .merge(routes::auth::create_router_auth(state))
        .merge(routes::friends::create_router_friends(state))
        .merge(routes::messages::create_router_messages(state))
}

/// Creates the static file service for serving frontend assets with an SPA
/// fallback.
#[must_use]
pub fn create_static_service<S>(
    static_dir: std::path::PathBuf,
    spa_index: std::path::PathBuf,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    use axum::routing::get_service;
    use tower_http::services::ServeFile;

    Router::new().fallback_service(
        ServeDir::new(static_dir)
            .append_index_html_on_directories(true)
            .fallback(get_service(ServeFile::new(spa_index))),
    )
}

/// Creates the main application router with all middleware and routes.
#[must_use]
pub fn create_app_router(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let config = state.config.clone();

    let api_router = create_api_router(&state);
    let static_files_service =
        create_static_service(config.web.static_dir.clone(), config.web.spa_index.clone());

    let cors = create_cors_layer(&config);
    let request_id_state = RequestIdState::from_config(&config);

    // Layer order: the last layer added is outermost, so the request id is
    // assigned before the trace span is opened, and CORS wraps everything.
    Router::new()
        .nest("/api", api_router)
        .merge(routes::health::create_health_router())
        .route("/metrics", get(metrics_endpoint))
        .merge(routes::openapi::openapi_routes())
        .merge(static_files_service)
        .layer(tracer::create_trace_layer())
        .layer(axum::middleware::from_fn_with_state(
            request_id_state,
            request_context::assign_request_id,
        ))
        .layer(cors)
        .layer(Extension(metrics_handle))
        .with_state(state)
}

/// Creates the graceful shutdown signal handler.
pub async fn create_shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutting down...");
}

/// Starts the backend server and binds it to the configured port.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    initialize_tracing(&config);
    info!("Starting server...");

    let metrics_handle = metrics_handle();
    let config = Arc::new(config);

    // Set up database connection pool
    let pool = create_database_pool(&config.db)
        .await
        .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;

    // Run database bootstrap and health checks
    bootstrap::ensure_liveness(&pool)
        .await
        .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;

    bootstrap::run(&pool, &config.db)
        .await
        .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;

    bootstrap::ensure_readiness(&pool)
        .await
        .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;

    // Create application state and the router
    let state = create_app_state(config.clone(), Some(pool));
    let app = create_app_router(state, metrics_handle.clone());

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    let shutdown_signal = create_shutdown_signal();

    serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::{
        SessionBundle, SessionError, SessionManager, SessionUser, build_session_cookie,
    };
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use axum_test::TestServer;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::Value;
    use shared::models::AuthProvider;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct StaticSessionManager {
        user: SessionUser,
    }

    #[async_trait]
    impl SessionManager for StaticSessionManager {
        async fn issue(&self, _user_id: Uuid) -> Result<SessionBundle, SessionError> {
            let expires_at = Utc::now() + ChronoDuration::days(7);
            let cookie =
                build_session_cookie(&Config::with_defaults(), "fresh-token", expires_at)?;
            Ok(SessionBundle {
                token: "fresh-token".to_string(),
                cookie,
                session_id: Uuid::new_v4(),
                issued_at: Utc::now(),
                expires_at,
            })
        }

        async fn resolve(&self, token: &str) -> Result<Option<SessionUser>, SessionError> {
            if token == "valid-token" {
                Ok(Some(self.user.clone()))
            } else {
                Ok(None)
            }
        }

        async fn revoke(&self, _token: &str) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn sample_session_user() -> SessionUser {
        SessionUser {
            id: Uuid::new_v4(),
            email: "ann@x.com".to_string(),
            username: "ann".to_string(),
            avatar_url: String::new(),
            auth_provider: AuthProvider::Password,
            created_at: Utc::now(),
            session_id: Uuid::new_v4(),
            expires_at: Utc::now() + ChronoDuration::days(7),
        }
    }

    fn test_state_with_sessions() -> Arc<AppState> {
        Arc::new(AppState {
            config: Arc::new(Config::with_defaults()),
            pool: None,
            sessions: Some(Arc::new(StaticSessionManager {
                user: sample_session_user(),
            })),
            images: None,
        })
    }

    #[test]
    fn env_filter_uses_configured_level() {
        let mut config = Config::with_defaults();
        config.logging.level = "debug".to_string();
        let filter = build_env_filter(&config);
        assert!(filter.to_string().contains("debug"));
    }

    #[test]
    fn cors_layer_builds_with_and_without_origins() {
        let mut config = Config::with_defaults();
        let _specific = create_cors_layer(&config);

        config.server.cors.allowed_origins.clear();
        config.server.cors.allow_credentials = false;
        let _any = create_cors_layer(&config);
    }

    #[tokio::test]
    async fn healthz_endpoint_responds_ok() {
        let state = Arc::new(AppState::default());
        let app = create_app_router(state, metrics_handle());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_payload() {
        let state = Arc::new(AppState::default());
        let app = create_app_router(state, metrics_handle());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert_eq!(content_type, "text/plain; version=0.0.4");
    }

    #[tokio::test]
    async fn protected_route_rejects_missing_cookie() {
        let state = test_state_with_sessions();
        let app = create_app_router(state, metrics_handle());
        let server = TestServer::new(app).unwrap();

        let response = server.get("/api/friends/list").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_route_rejects_unknown_token() {
        let state = test_state_with_sessions();
        let app = create_app_router(state, metrics_handle());
        let server = TestServer::new(app).unwrap();

        let response = server
            .get("/api/auth/check")
            .add_cookie(cookie::Cookie::new("parley_session", "bogus"))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn session_cookie_resolves_current_user() {
        let state = test_state_with_sessions();
        let app = create_app_router(state, metrics_handle());
        let server = TestServer::new(app).unwrap();

        let response = server
            .get("/api/auth/check")
            .add_cookie(cookie::Cookie::new("parley_session", "valid-token"))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["username"], "ann");
        assert_eq!(body["email"], "ann@x.com");
        assert_eq!(body["auth_provider"], "password");
        // Credential material never leaves the service layer.
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn responses_carry_request_id_header() {
        let state = Arc::new(AppState::default());
        let app = create_app_router(state, metrics_handle());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .header("x-request-id", "test-trace-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-request-id").unwrap(),
            "test-trace-1"
        );
    }
}
