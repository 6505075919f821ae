//! elk-daemon entry point.
//!
//! Thin on purpose: loads config, sets up tracing, builds the shared state,
//! starts the expiry sweeper, wires middleware and serves HTTP/WebSocket.
//! Handlers live in `routes.rs` and `ws.rs`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use elk_config::{load_layered_yaml, load_layered_yaml_from_strings, CoordinatorConfig};
use elk_daemon::{routes, state, sweeper};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = match config_paths_from_env() {
        Some(paths) => {
            let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
            load_layered_yaml(&refs).context("load layered config")?
        }
        None => load_layered_yaml_from_strings(&[]).context("load default config")?,
    };
    let config = CoordinatorConfig::from_loaded(&loaded)?;
    for w in config.validate()? {
        warn!("config: {w}");
    }
    info!(config_hash = %loaded.config_hash, "config loaded");

    let addr = match bind_addr_from_env() {
        Some(addr) => addr,
        None => config.bind_addr()?,
    };
    let sweep_interval = config.sweep_interval();

    let mut app_state = state::AppState::new(config);
    app_state.config_hash = Some(loaded.config_hash.clone());
    let shared = Arc::new(app_state);

    let sweeper = sweeper::spawn_expiry_sweeper(Arc::clone(&shared.coordinator), sweep_interval);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!("elk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    sweeper.abort();
    info!("elk-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `ELK_CONFIG` is a comma-separated list of YAML files, later ones win.
fn config_paths_from_env() -> Option<Vec<String>> {
    let raw = std::env::var("ELK_CONFIG").ok()?;
    let paths: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if paths.is_empty() {
        None
    } else {
        Some(paths)
    }
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("ELK_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
