//! # alert-agent: Portfolio Alert Service
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌──────────────┐  PUT /api/portfolio/holdings  ┌──────────────────────┐
//!  │  Dashboard   │ ─────────────────────────────▶│  PortfolioRegistry   │
//!  │              │  PUT /api/alerts/config       │                      │
//!  │              │ ─────────────────────────────▶│  Monitor (Idle /     │──▶ QuoteSource
//!  │              │                               │   Paused / Running)  │
//!  │              │ ◀──────── /ws/alerts ─────────│  Dispatcher          │──▶ SendGrid
//!  └──────────────┘                               └──────────────────────┘
//! ```
//!
//! See [`alert_agent::config`] for the environment variables.

use std::net::SocketAddr;

use anyhow::Context;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use alert_agent::{config::Settings, routes, state::build_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("alert_agent=debug".parse()?)
                .add_directive("tower_http=info".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║            ALERT AGENT — Portfolio Monitor            ║
  ║    Ladder · Cooldown · Dispatch · Delivery Audit      ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Settings + shared state ────────────────────────────────────────────
    let settings = Settings::from_env()?;
    let state = build_state(&settings)?;

    // ── 4. Bring the monitor in line with the persisted configuration ────────
    state.monitor.start().await;
    let monitor = state.monitor.clone();

    // ── 5. CORS ───────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 6. Router ─────────────────────────────────────────────────────────────
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // ── 7. Bind & Serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("BIND_ADDR '{}' is not a socket address", settings.bind_addr))?;

    info!(?addr, "🚀 Alert agent starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    monitor.shutdown();
    Ok(())
}
