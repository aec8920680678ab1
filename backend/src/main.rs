//! Planning poker server.
//!
//! ```text
//! planning-poker [serve]            run the HTTP/WebSocket server
//! planning-poker watch <session-id> [--server-url <url>]
//!                                   follow a session from outside the server
//! ```

use std::error::Error;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use clap::{Parser, Subcommand};
use planning_poker::adapters::{
    api_router, BroadcastNotifier, HttpSessionFetcher, InMemorySessionStore,
    RandomNicknameGenerator, RedisChangeNotifier, RedisSessionStore, UserAgentBotDetector,
    WebSocketChangeNotifier,
};
use planning_poker::application::{PropagationManager, SessionCoordinator};
use planning_poker::config::{AppConfig, ServerConfig, StoreBackend};
use planning_poker::domain::foundation::{SessionId, Timestamp};
use planning_poker::ports::{ChangeNotifier, SessionStore};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Real-time planning poker sessions
#[derive(Parser, Debug)]
#[command(name = "planning-poker", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP/WebSocket server (default)
    Serve,

    /// Follow a session from outside the server and log every change
    Watch {
        /// Session to follow
        session_id: SessionId,

        /// Server base URL, overriding `propagation.server_url`
        #[arg(long)]
        server_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(Command::Watch {
        server_url: Some(url),
        ..
    }) = &cli.command
    {
        config.propagation.server_url = url.clone();
    }
    config.validate()?;
    init_tracing(&config.server.log_level);

    match cli.command {
        None | Some(Command::Serve) => serve(config).await,
        Some(Command::Watch { session_id, .. }) => watch(config, session_id).await,
    }
}

fn init_tracing(default_directive: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn Error>> {
    let (store, notifier) = build_backends(&config).await?;
    let coordinator = Arc::new(SessionCoordinator::new(
        store,
        notifier,
        Arc::new(RandomNicknameGenerator::new()),
        config.session.coordinator_config(),
    ));

    let app = api_router(coordinator, Arc::new(UserAgentBotDetector::new()))
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config.server))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        addr = %addr,
        backend = ?config.store.backend,
        environment = ?config.server.environment,
        "Planning poker server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn build_backends(
    config: &AppConfig,
) -> Result<(Arc<dyn SessionStore>, Arc<dyn ChangeNotifier>), Box<dyn Error>> {
    match config.store.backend {
        StoreBackend::Redis => {
            let store: Arc<dyn SessionStore> =
                Arc::new(RedisSessionStore::connect(&config.redis).await?);
            let notifier: Arc<dyn ChangeNotifier> =
                Arc::new(RedisChangeNotifier::connect(&config.redis).await?);
            info!(prefix = %config.redis.key_prefix, "Using Redis store and pub/sub");
            Ok((store, notifier))
        }
        StoreBackend::Memory => {
            let memory = Arc::new(InMemorySessionStore::new());
            spawn_purge(Arc::clone(&memory), config.store.purge_interval());
            let store: Arc<dyn SessionStore> = memory;
            let notifier: Arc<dyn ChangeNotifier> = Arc::new(BroadcastNotifier::default());
            info!("Using in-memory store and broadcast rooms");
            Ok((store, notifier))
        }
    }
}

/// Drops expired sessions from the memory backend. Redis expires keys itself.
fn spawn_purge(store: Arc<InMemorySessionStore>, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            store.purge_expired(Timestamp::now()).await;
        }
    });
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if origins.is_empty() {
        if server.is_production() {
            warn!("No CORS origins configured; allowing any origin");
        }
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

/// Follows one session through the propagation manager and logs each view.
///
/// Pushes arrive over the server's live socket and polls over HTTP, so the
/// watcher works the same against either store backend.
async fn watch(config: AppConfig, session_id: SessionId) -> Result<(), Box<dyn Error>> {
    let server_url = config.propagation.server_url.clone();
    let fetcher = Arc::new(HttpSessionFetcher::new(
        server_url.clone(),
        config.server.request_timeout(),
    )?);
    let notifier = Arc::new(WebSocketChangeNotifier::new(
        &server_url,
        config.server.request_timeout(),
    )?);
    info!(server_url = %server_url, session_id = %session_id, "Watching session");

    let manager = PropagationManager::new(fetcher, notifier, config.propagation.propagation_config());
    let handle = manager.attach(session_id).await?;
    let mut view = handle.watch();

    loop {
        {
            let session = view.borrow_and_update();
            let status = handle.status();
            info!(
                session_id = %session.id(),
                round = session.current_round(),
                revision = session.revision(),
                revealed = session.is_revealed(),
                participants = session.participants().len(),
                mode = %status.mode,
                degraded = status.degraded,
                "Session view"
            );
        }

        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shutdown_signal() => break,
        }
    }

    handle.detach();
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Ctrl+C handler unavailable");
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C signal");
        }
        _ = wait_for_sigterm() => {
            info!("Received SIGTERM signal");
        }
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
