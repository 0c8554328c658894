//! ShortHub API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Authentication and authorization
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    http::{header, HeaderValue, Method, StatusCode},
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use middleware::rate_limit::RateLimit;
use shorthub_common::{
    auth::AuthService,
    config::{AppConfig, ObservabilityConfig},
    metrics, AppServices,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub services: AppServices,
    pub rate_limit: Option<RateLimit>,
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.services.auth.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    init_tracing(&config.observability);
    info!("Starting ShortHub API Gateway v{}", shorthub_common::VERSION);

    // Initialize metrics
    install_metrics_exporter(&config.observability)?;
    metrics::register_metrics();

    let rate_limit = if config.rate_limit.enabled {
        Some(RateLimit::new(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        )?)
    } else {
        warn!("Rate limiting disabled");
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    // Initialize database connection and services
    info!("Connecting to database...");
    let services = AppServices::build(config).await.map_err(|e| {
        error!(error = %e, "Failed to initialize services");
        e
    })?;

    let app = create_router(AppState {
        services,
        rate_limit,
    });

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_metrics_exporter(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        return Ok(());
    }
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .set_buckets_for_metric(
            Matcher::Suffix("request_duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("storage_duration_seconds".to_string()),
            metrics::TRANSFER_BUCKETS,
        )?
        .install()?;
    info!(port = config.metrics_port, "Prometheus exporter listening");
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(allowed)
    }
}

/// Slow handlers answer 408 instead of hanging the connection
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.services.config.clone();

    let cors = cors_layer(&config.server.cors_origins);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let drive_routes = Router::new()
        .route("/auth-url", get(handlers::drive::auth_url))
        .route("/oauth-callback", get(handlers::drive::oauth_callback))
        .route("/connection-info", get(handlers::drive::connection_info))
        .route("/disconnect", post(handlers::drive::disconnect))
        .route(
            "/upload/{item_id}",
            post(handlers::drive::upload).layer(DefaultBodyLimit::max(
                handlers::drive::body_limit(config.storage.max_upload_bytes),
            )),
        )
        .route("/download/{item_id}", get(handlers::drive::download));

    // API routes
    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Session endpoints
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/me", get(handlers::auth::me))
        .route("/me/password", post(handlers::auth::change_password))
        .route(
            "/me/whatsapp",
            post(handlers::users::connect_whatsapp).delete(handlers::users::disconnect_whatsapp),
        )
        .route(
            "/me/email",
            post(handlers::users::connect_email).delete(handlers::users::disconnect_email),
        )
        .route(
            "/me/profile-image",
            post(handlers::users::upload_profile_image).delete(handlers::users::remove_profile_image),
        )

        // User endpoints
        .route("/users", get(handlers::users::list_users).post(handlers::users::create_user))
        .route(
            "/users/{id}",
            get(handlers::users::get_user)
                .patch(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route("/users/{id}/status", post(handlers::users::update_status))
        .route("/users/{id}/assistant", post(handlers::users::assign_assistant))
        .route("/users/{id}/password", post(handlers::users::set_password))
        .route("/activity-logs", get(handlers::users::activity_logs))

        // Channel endpoints
        .route(
            "/channels",
            get(handlers::channels::list_channels).post(handlers::channels::create_channel),
        )
        .route(
            "/channels/{id}",
            get(handlers::channels::get_channel)
                .patch(handlers::channels::update_channel)
                .delete(handlers::channels::delete_channel),
        )
        .route("/channels/{id}/refresh", post(handlers::channels::refresh_subscribers))
        .route("/channels/{id}/history", get(handlers::channels::subscriber_history))

        // Work item endpoints
        .route("/items", get(handlers::items::list_items))
        .route("/items/stats", get(handlers::items::stats))
        .route("/items/calendar", get(handlers::items::calendar))
        .route("/items/discover", post(handlers::items::discover))
        .route("/items/discover-many", post(handlers::items::discover_many))
        .route("/items/assign-many", post(handlers::items::assign_many))
        .route("/items/status-many", post(handlers::items::update_many_status))
        .route(
            "/items/{id}",
            get(handlers::items::get_item).delete(handlers::items::delete_item),
        )
        .route("/items/{id}/retain", post(handlers::items::retain))
        .route("/items/{id}/reject", post(handlers::items::reject))
        .route("/items/{id}/assign", post(handlers::items::assign))
        .route("/items/{id}/reassign", post(handlers::items::reassign))
        .route("/items/{id}/status", post(handlers::items::update_status))
        .route(
            "/items/{id}/comments",
            get(handlers::items::list_comments).post(handlers::items::add_comment),
        )
        .route("/comments/{id}", delete(handlers::items::delete_comment))

        // Notification endpoints
        .route("/notifications", get(handlers::notifications::list))
        .route("/notifications/unread-count", get(handlers::notifications::unread_count))
        .route("/notifications/read-all", post(handlers::notifications::mark_all_as_read))
        .route("/notifications/stream", get(handlers::notifications::stream))
        .route("/notifications/{id}/read", post(handlers::notifications::mark_as_read))
        .route(
            "/notification-settings",
            get(handlers::notifications::get_settings).put(handlers::notifications::update_settings),
        )

        // Live feeds
        .route("/events/item-status", get(handlers::events::item_status))
        .route("/events/assignments", get(handlers::events::assignments))
        .route("/events/completions", get(handlers::events::completions))
        .route("/events/user-status", get(handlers::events::user_status))
        .route("/events/channel-subscribers", get(handlers::events::channel_subscribers))

        // Analytics endpoints
        .route("/analytics/dashboard", get(handlers::analytics::dashboard))
        .route("/analytics/users/{id}", get(handlers::analytics::user_stats))
        .route("/analytics/channels/{id}", get(handlers::analytics::channel_stats))
        .route("/analytics/destinations/{id}", get(handlers::analytics::destination_stats))

        .nest("/drive", drive_routes)
        .route_layer(axum::middleware::from_fn(middleware::metrics::track_requests));

    let app = Router::new().nest("/api", api_routes);

    let app = match state.rate_limit.clone() {
        Some(limit) => app.layer(axum::middleware::from_fn_with_state(
            limit,
            middleware::rate_limit::rate_limit_middleware,
        )),
        None => app,
    };

    // Compose the app
    app.layer(timeout_layer(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
