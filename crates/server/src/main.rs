//! Neighborly polls server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{
        HeaderName, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
};
use neighborly_api::{AppState, auth_middleware, router as api_router};
use neighborly_common::Config;
use neighborly_core::{IdentityService, PollService, PollSettings};
use neighborly_db::repositories::{PollCommentRepository, PollRepository, PollVoteRepository};
use tokio::{signal, time::interval};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Periodically close polls whose end date has passed.
fn spawn_expiry_sweep(poll_service: PollService, period: Duration) {
    tokio::spawn(async move {
        let mut interval = interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = poll_service.close_expired_polls().await {
                tracing::error!(error = %e, "Failed to close expired polls");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "neighborly_server=debug,neighborly_core=debug,neighborly_api=debug,tower_http=debug"
                    .into()
            }),
        )
        .init();

    info!("Starting neighborly polls server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = neighborly_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    neighborly_db::migrate(&db).await?;
    info!("Migrations completed");

    let db = Arc::new(db);

    // Initialize repositories
    let poll_repo = PollRepository::new(Arc::clone(&db));
    let poll_vote_repo = PollVoteRepository::new(Arc::clone(&db));
    let poll_comment_repo = PollCommentRepository::new(Arc::clone(&db));

    // Initialize services
    let poll_service = PollService::new(
        poll_repo,
        poll_vote_repo,
        poll_comment_repo,
        PollSettings::from_config(&config.polls),
    );
    let identity_service =
        IdentityService::new(&config.auth.jwt_secret, config.auth.allow_guest_votes);

    if config.auth.allow_guest_votes {
        info!("Guest voting enabled");
    }

    spawn_expiry_sweep(
        poll_service.clone(),
        Duration::from_secs(config.polls.expiry_sweep_interval_secs.max(1)),
    );

    let state = AppState {
        poll_service,
        identity_service,
    };

    // Build router
    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    AUTHORIZATION,
                    CONTENT_TYPE,
                    HeaderName::from_static("x-client-info"),
                    HeaderName::from_static("apikey"),
                    HeaderName::from_static("x-device-token"),
                ]),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
