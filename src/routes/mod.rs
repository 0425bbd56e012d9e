//! HTTP surface.  Handlers stay thin: they translate JSON to core calls and
//! core errors to [`AppError`](crate::error::AppError) responses.

pub mod alerts;
pub mod monitor;
pub mod portfolio;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::state::SharedState;

/// Every route, with state attached.  Middleware is layered on in `main`.
pub fn router(state: SharedState) -> Router {
    Router::new()
        // ── Alert configuration ───────────────────────────────────────────────
        .route("/api/alerts/config",                 get(alerts::get_config).put(alerts::update_config))
        // ── In-app alerts ─────────────────────────────────────────────────────
        .route("/api/alerts/in-app",                 get(alerts::list_alerts).delete(alerts::clear_alerts))
        .route("/api/alerts/in-app/:id/acknowledge", post(alerts::acknowledge_alert))
        // ── Delivery / operator tools ─────────────────────────────────────────
        .route("/api/alerts/logs",                   get(alerts::delivery_logs))
        .route("/api/alerts/test",                   post(alerts::test_fire))
        .route("/api/alerts/cooldown/:symbol/:kind", delete(alerts::reset_cooldown))
        .route("/api/alerts/status",                 get(alerts::status))
        // ── Portfolio ─────────────────────────────────────────────────────────
        .route("/api/portfolio/holdings",            get(portfolio::list_holdings).put(portfolio::register_holdings))
        .route("/api/health",                        get(portfolio::health))
        // ── Live stream ───────────────────────────────────────────────────────
        .route("/ws/alerts",                         get(monitor::ws_alerts))
        .with_state(state)
}
