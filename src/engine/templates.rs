//! # engine::templates
//!
//! Fixed message table keyed by [`AlertKind`].  Each entry is a pure
//! function of (symbol, trigger price) so formatting can be tested without
//! touching the dispatch pipeline.

use crate::models::AlertKind;

type Render = fn(&str, f64) -> String;

struct Template {
    kind:    AlertKind,
    subject: Render,
    message: Render,
}

fn sell_target_subject(symbol: &str, _: f64) -> String {
    format!("Portfolio Alert: {symbol} Reached Sell Target")
}
fn sell_target_message(symbol: &str, price: f64) -> String {
    format!("{symbol} has reached its sell target at ${price:.2}. Consider taking profits.")
}

fn stop_loss_subject(symbol: &str, _: f64) -> String {
    format!("Portfolio CRITICAL: {symbol} Stop Loss Triggered")
}
fn stop_loss_message(symbol: &str, price: f64) -> String {
    format!("{symbol} has breached its stop loss at ${price:.2}. Review your position immediately.")
}

fn trailing_stop_subject(symbol: &str, _: f64) -> String {
    format!("Portfolio Alert: {symbol} Trailing Stop Hit")
}
fn trailing_stop_message(symbol: &str, price: f64) -> String {
    format!("{symbol} has hit its trailing stop at ${price:.2}. Consider reducing exposure.")
}

fn bull_target_subject(symbol: &str, _: f64) -> String {
    format!("Portfolio Alert: {symbol} Bull Target Reached")
}
fn bull_target_message(symbol: &str, price: f64) -> String {
    format!(
        "{symbol} has reached the bull case target at ${price:.2}. \
         Excellent performance — take profits?"
    )
}

fn daily_summary_subject(_: &str, _: f64) -> String {
    "Portfolio Daily Summary".to_string()
}
fn daily_summary_message(_: &str, _: f64) -> String {
    "Daily portfolio summary generated.".to_string()
}

static TEMPLATES: [Template; 5] = [
    Template { kind: AlertKind::SellTargetHit,   subject: sell_target_subject,   message: sell_target_message },
    Template { kind: AlertKind::StopLossHit,     subject: stop_loss_subject,     message: stop_loss_message },
    Template { kind: AlertKind::TrailingStopHit, subject: trailing_stop_subject, message: trailing_stop_message },
    Template { kind: AlertKind::BullTargetHit,   subject: bull_target_subject,   message: bull_target_message },
    Template { kind: AlertKind::DailySummary,    subject: daily_summary_subject, message: daily_summary_message },
];

fn template(kind: AlertKind) -> &'static Template {
    TEMPLATES
        .iter()
        .find(|t| t.kind == kind)
        .unwrap_or(&TEMPLATES[0])
}

/// Human-readable alert text.
pub fn message(kind: AlertKind, symbol: &str, trigger_price: f64) -> String {
    (template(kind).message)(symbol, trigger_price)
}

/// Subject line for the external channel.
pub fn subject(kind: AlertKind, symbol: &str) -> String {
    (template(kind).subject)(symbol, 0.0)
}
