//! shopd entry point.
//!
//! This file is intentionally thin: it sets up tracing, picks the store
//! backend, wires middleware, and starts the HTTP server. All route handlers
//! live in `routes.rs`; all shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use shopd_daemon::{routes, state::AppState};
use shopd_store::{PgStore, ENV_DB_URL};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let shared = Arc::new(build_state().await?);
    info!(store = shared.store_backend, "store backend selected");

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_from_env());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8780)));
    info!("shopd listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

/// Postgres when SHOPD_DATABASE_URL is set, in-memory otherwise.
///
/// Postgres boot runs the embedded migrations and refuses to start if the
/// schema did not come up; a daemon that would 500 on every order is better
/// caught here.
async fn build_state() -> anyhow::Result<AppState> {
    if std::env::var(ENV_DB_URL).is_ok() {
        let store = PgStore::connect_from_env().await?;
        store.migrate().await?;
        let status = store.status().await?;
        anyhow::ensure!(
            status.ok && status.has_orders_table,
            "database is reachable but the orders schema is missing"
        );
        Ok(AppState::new(Arc::new(store), "postgres"))
    } else {
        warn!("{ENV_DB_URL} is not set; using the in-memory store (data will not survive a restart)");
        Ok(AppState::in_memory())
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("SHOPD_ADDR").ok()?.parse().ok()
}

/// CORS: origins from SHOPD_ALLOWED_ORIGINS (comma-separated), falling back
/// to the common localhost dev ports.
fn cors_from_env() -> CorsLayer {
    let configured = std::env::var("SHOPD_ALLOWED_ORIGINS").ok();
    let origins: Vec<HeaderValue> = match &configured {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect(),
        None => [
            "http://localhost",
            "http://127.0.0.1",
            "http://localhost:3000",
            "http://127.0.0.1:3000",
            "http://localhost:5173",
            "http://127.0.0.1:5173",
        ]
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect(),
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}
