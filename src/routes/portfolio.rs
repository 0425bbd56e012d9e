//! # routes::portfolio
//!
//! Holding registration, the holdings view with live target ladders, and the
//! liveness probe.
//!
//! | Method | Path                       | Description                          |
//! |--------|----------------------------|--------------------------------------|
//! | PUT    | `/api/portfolio/holdings`  | Replace the monitored holdings       |
//! | GET    | `/api/portfolio/holdings`  | Holdings + live price + ladder       |
//! | GET    | `/api/health`              | Liveness                             |

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::{
    engine::TargetLadder,
    error::AppError,
    models::{Holding, HoldingSnapshot},
    state::SharedState,
};

#[derive(Debug, Deserialize)]
pub struct RegisterHoldings {
    pub holdings: Vec<Holding>,
}

/// PUT /api/portfolio/holdings
///
/// ### Request body (JSON)
/// ```json
/// { "holdings": [ { "symbol": "NVDA", "shares": 10, "average_cost": 120.0, "beta": 1.98 } ] }
/// ```
pub async fn register_holdings(
    State(state): State<SharedState>,
    Json(body): Json<RegisterHoldings>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(bad) = body.holdings.iter().find(|h| !h.is_valid()) {
        return Err(AppError::BadRequest(format!(
            "Holding '{}' needs a symbol, positive shares and a positive average cost",
            bad.symbol
        )));
    }

    let count = state.portfolio.register(body.holdings).await;
    let symbols = state.portfolio.symbols().await;

    Ok(Json(json!({
        "ok":      true,
        "count":   count,
        "symbols": symbols,
    })))
}

/// One row of the holdings view.  Price-derived fields are absent when the
/// quote is unavailable.
#[derive(Debug, Serialize)]
struct HoldingView {
    #[serde(flatten)]
    holding:       Holding,
    current_price: Option<f64>,
    market_value:  Option<f64>,
    gain_loss:     Option<f64>,
    gain_loss_pct: Option<f64>,
    ladder:        Option<TargetLadder>,
}

/// GET /api/portfolio/holdings
pub async fn list_holdings(State(state): State<SharedState>) -> impl IntoResponse {
    let holdings = state.portfolio.snapshot().await;
    let mut rows = Vec::with_capacity(holdings.len());

    for holding in holdings {
        let row = match state.quotes.current_price(&holding.symbol).await {
            Ok(price) => {
                let snapshot = HoldingSnapshot::new(holding, price);
                HoldingView {
                    current_price: Some(price),
                    market_value:  Some(snapshot.market_value()),
                    gain_loss:     Some(snapshot.gain_loss()),
                    gain_loss_pct: Some(snapshot.gain_loss_pct()),
                    ladder:        Some(snapshot.ladder()),
                    holding:       snapshot.holding,
                }
            }
            Err(e) => {
                debug!(symbol = %holding.symbol, error = %e, "Quote unavailable for holdings view");
                HoldingView {
                    holding,
                    current_price: None,
                    market_value:  None,
                    gain_loss:     None,
                    gain_loss_pct: None,
                    ladder:        None,
                }
            }
        };
        rows.push(row);
    }

    let portfolio_value: f64 = rows.iter().filter_map(|r| r.market_value).sum();

    Json(json!({
        "ok":              true,
        "count":           rows.len(),
        "portfolio_value": portfolio_value,
        "holdings":        rows,
    }))
}

/// GET /api/health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "ok":      true,
        "service": "alert-agent",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
