//! # error
//!
//! Error types for the alert agent.
//!
//! [`AppError`] is what every HTTP handler returns; Axum's `IntoResponse`
//! impl turns it into a structured JSON body so the dashboard always gets a
//! machine-readable response even on failure.  The narrower error types
//! ([`CollaboratorError`], [`DeliveryError`], [`StoreError`], [`ConfigError`])
//! stay inside the core: the monitor loop and the dispatch pipeline recover
//! from them locally and never let them escape a tick.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// ─── AppError ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested resource (alert, holding) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A collaborator (quote provider) could not answer.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {err}"),
            ),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<CollaboratorError> for AppError {
    fn from(err: CollaboratorError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

// ─── Collaborators ────────────────────────────────────────────────────────────

/// Failure of the portfolio or quote collaborator for one call.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{0} unavailable")]
    Unavailable(String),

    #[error("invalid price {price} for {symbol}")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// ─── External Channel ─────────────────────────────────────────────────────────

/// Why an external alert was not delivered.  Always recorded in the
/// delivery log, never retried.
#[derive(Debug, Error, PartialEq)]
pub enum DeliveryError {
    #[error("No external alert provider configured")]
    NotConfigured,

    #[error("Invalid recipient address: '{0}'")]
    InvalidRecipient(String),

    #[error("{provider} unreachable: {reason}")]
    Unreachable { provider: &'static str, reason: String },

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("{provider} HTTP {status}: {body}")]
    Rejected {
        provider: &'static str,
        status:   u16,
        body:     String,
    },
}

// ─── Persistence ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

// ─── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Unsupported poll interval {0}ms (allowed: 15000, 30000, 60000, 300000)")]
    UnsupportedInterval(u64),

    #[error("Invalid daily summary time '{0}' (expected HH:MM)")]
    InvalidSummaryTime(String),
}
