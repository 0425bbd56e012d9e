//! # routes::alerts
//!
//! Dashboard-facing alert endpoints.
//!
//! ## Endpoints
//!
//! | Method | Path                                  | Description                          |
//! |--------|---------------------------------------|--------------------------------------|
//! | GET    | `/api/alerts/config`                  | Current alert configuration          |
//! | PUT    | `/api/alerts/config`                  | Partial update; may start/stop loop  |
//! | GET    | `/api/alerts/in-app`                  | Alert list, most recent first        |
//! | POST   | `/api/alerts/in-app/:id/acknowledge`  | Mark one alert read                  |
//! | DELETE | `/api/alerts/in-app`                  | Clear every alert                    |
//! | GET    | `/api/alerts/logs`                    | External delivery audit log          |
//! | POST   | `/api/alerts/test`                    | Fire a test alert for one holding    |
//! | DELETE | `/api/alerts/cooldown/:symbol/:kind`  | Forget one cooldown entry            |
//! | GET    | `/api/alerts/status`                  | Monitor state + degradation flags    |

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    config::AlertConfigUpdate,
    error::AppError,
    models::AlertKind,
    state::SharedState,
};

// ─── Configuration ────────────────────────────────────────────────────────────

/// GET /api/alerts/config
pub async fn get_config(State(state): State<SharedState>) -> impl IntoResponse {
    let config = state.monitor.config().await;
    Json(json!({
        "ok":     true,
        "config": config,
    }))
}

/// PUT /api/alerts/config
///
/// ### Request body (JSON, every field optional)
/// ```json
/// { "enabled": true, "recipient_address": "ops@example.com", "poll_interval_ms": 60000 }
/// ```
pub async fn update_config(
    State(state): State<SharedState>,
    Json(update): Json<AlertConfigUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let config = state.monitor.update_configuration(update).await?;
    let monitor_state = state.monitor.state().await;

    Ok(Json(json!({
        "ok":            true,
        "config":        config,
        "monitor_state": monitor_state,
    })))
}

// ─── In-app alerts ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct AlertListQuery {
    #[serde(default)]
    pub unacknowledged_only: bool,
}

/// GET /api/alerts/in-app?unacknowledged_only=true
pub async fn list_alerts(
    State(state): State<SharedState>,
    Query(query): Query<AlertListQuery>,
) -> impl IntoResponse {
    let alerts = state.dispatcher.alerts_snapshot(query.unacknowledged_only).await;
    let unread = state.dispatcher.unread_count().await;

    Json(json!({
        "ok":     true,
        "count":  alerts.len(),
        "unread": unread,
        "alerts": alerts,
    }))
}

/// POST /api/alerts/in-app/:id/acknowledge
pub async fn acknowledge_alert(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state.dispatcher.acknowledge(id).await {
        return Err(AppError::NotFound(format!("No alert with id {id}")));
    }
    let unread = state.dispatcher.unread_count().await;

    Ok(Json(json!({
        "ok":     true,
        "id":     id,
        "unread": unread,
    })))
}

/// DELETE /api/alerts/in-app
pub async fn clear_alerts(State(state): State<SharedState>) -> impl IntoResponse {
    let removed = state.dispatcher.clear_all().await;
    Json(json!({
        "ok":      true,
        "removed": removed,
    }))
}

// ─── Delivery log ─────────────────────────────────────────────────────────────

/// GET /api/alerts/logs
pub async fn delivery_logs(State(state): State<SharedState>) -> impl IntoResponse {
    let entries = state.dispatcher.delivery_log_snapshot().await;
    let failed = state.dispatcher.delivery_failures().await;
    Json(json!({
        "ok":      true,
        "count":   entries.len(),
        "failed":  failed,
        "entries": entries,
    }))
}

// ─── Test fire / cooldown reset ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TestFireRequest {
    pub symbol: String,
    #[serde(default)]
    pub kind:   Option<AlertKind>,
}

/// POST /api/alerts/test
///
/// ### Request body (JSON)
/// ```json
/// { "symbol": "NVDA", "kind": "STOP_LOSS_HIT" }
/// ```
/// `kind` defaults to `SELL_TARGET_HIT`.
pub async fn test_fire(
    State(state): State<SharedState>,
    Json(request): Json<TestFireRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.symbol.trim().is_empty() {
        return Err(AppError::BadRequest("symbol must not be empty".into()));
    }
    let kind = request.kind.unwrap_or(AlertKind::SellTargetHit);
    let (alert, outcome) = state.monitor.test_fire(&request.symbol, kind).await?;

    Ok(Json(json!({
        "ok":       true,
        "alert":    alert,
        "delivery": outcome,
    })))
}

/// DELETE /api/alerts/cooldown/:symbol/:kind
pub async fn reset_cooldown(
    State(state): State<SharedState>,
    Path((symbol, kind)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let kind: AlertKind = kind.parse().map_err(AppError::BadRequest)?;
    let symbol = symbol.trim().to_ascii_uppercase();
    let remaining = state.dispatcher.cooldown_remaining(&symbol, kind).await;
    let removed = state.dispatcher.reset_cooldown(&symbol, kind).await;

    Ok(Json(json!({
        "ok":                        true,
        "symbol":                    symbol,
        "kind":                      kind,
        "removed":                   removed,
        "remaining_seconds_cleared": remaining.map(|d| d.num_seconds()),
    })))
}

// ─── Status ───────────────────────────────────────────────────────────────────

/// GET /api/alerts/status
pub async fn status(State(state): State<SharedState>) -> impl IntoResponse {
    let status = state.monitor.status().await;
    Json(json!({
        "ok":     true,
        "status": status,
    }))
}
