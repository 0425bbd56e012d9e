//! # services::channel
//!
//! **External Channel**: best-effort outbound delivery of one alert.
//!
//! ## Providers
//!
//! ```text
//!   FallbackChannel ──▶ SendGridChannel ──(failed)──▶ SmtpChannel
//! ```
//!
//! - **SendGrid v3**: `POST {base}/v3/mail/send` with a bearer key;
//!   `200`/`202` means accepted.
//! - **SMTP**: one message through a STARTTLS (or plain) relay via `lettre`.
//!
//! Anything else, or no response at all, is a [`DeliveryError`] that the
//! dispatch pipeline writes to the delivery log together with the provider
//! that handled the attempt last.  There is no retry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::SmtpSettings;

use crate::engine::templates;
use crate::error::DeliveryError;
use crate::models::AlertKind;

// ─── Payload ──────────────────────────────────────────────────────────────────

/// Everything the external channel is told about one firing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalAlert {
    pub recipient:       String,
    pub kind:            AlertKind,
    pub symbol:          String,
    pub trigger_price:   f64,
    pub current_price:   f64,
    pub average_cost:    f64,
    pub shares:          f64,
    pub gain_loss:       f64,
    pub gain_loss_pct:   f64,
    pub portfolio_value: f64,
    pub action_text:     String,
}

impl ExternalAlert {
    pub fn subject(&self) -> String {
        templates::subject(self.kind, &self.symbol)
    }

    /// Plain-text body.
    pub fn render_body(&self) -> String {
        let sign = if self.gain_loss >= 0.0 { "+" } else { "-" };
        format!(
            "{action}\n\n\
             Symbol:          {symbol}\n\
             Current price:   ${current:.2}\n\
             Trigger price:   ${trigger:.2}\n\
             Shares held:     {shares:.4}\n\
             Average cost:    ${cost:.2}\n\
             Market value:    ${value:.2}\n\
             Unrealized P&L:  {sign}${pnl:.2} ({sign}{pct:.1}%)\n\
             Portfolio value: ${portfolio:.2}\n\n\
             This is an automated alert. Not financial advice.",
            action    = self.action_text,
            symbol    = self.symbol,
            current   = self.current_price,
            trigger   = self.trigger_price,
            shares    = self.shares,
            cost      = self.average_cost,
            value     = self.shares * self.current_price,
            pnl       = self.gain_loss.abs(),
            pct       = self.gain_loss_pct.abs(),
            portfolio = self.portfolio_value,
        )
    }
}

// ─── Channel ──────────────────────────────────────────────────────────────────

#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Name recorded in the delivery log.
    fn provider(&self) -> &'static str;

    /// `false` when the provider has no credentials; sends will fail with
    /// [`DeliveryError::NotConfigured`].
    fn is_configured(&self) -> bool;

    async fn send_external_alert(&self, alert: &ExternalAlert) -> Result<(), DeliveryError>;

    /// Send and report which provider handled the attempt.  Chained
    /// channels report the last provider they tried.
    async fn attempt(&self, alert: &ExternalAlert) -> (&'static str, Result<(), DeliveryError>) {
        (self.provider(), self.send_external_alert(alert).await)
    }
}

/// Longest provider error body kept in the delivery log, in characters.
const MAX_ERROR_BODY: usize = 200;

/// Cut to at most `max` characters, never inside a UTF-8 sequence.
fn clip(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}

/// Minimal shape check; the provider does the real validation.
pub fn validate_recipient(recipient: &str) -> Result<(), DeliveryError> {
    let trimmed = recipient.trim();
    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !trimmed.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DeliveryError::InvalidRecipient(recipient.to_string()))
    }
}

/// Stand-in used when no provider credentials are present.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledChannel;

#[async_trait]
impl AlertChannel for DisabledChannel {
    fn provider(&self) -> &'static str {
        "none"
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn send_external_alert(&self, _alert: &ExternalAlert) -> Result<(), DeliveryError> {
        Err(DeliveryError::NotConfigured)
    }
}

// ─── SendGrid ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SendGridChannel {
    http:      Client,
    base_url:  String,
    api_key:   String,
    from:      String,
    from_name: String,
}

impl SendGridChannel {
    pub fn new(http: Client, base_url: &str, api_key: &str, from: &str, from_name: &str) -> Self {
        Self {
            http,
            base_url:  base_url.trim_end_matches('/').to_string(),
            api_key:   api_key.to_string(),
            from:      from.to_string(),
            from_name: from_name.to_string(),
        }
    }

    fn request_body(&self, alert: &ExternalAlert) -> serde_json::Value {
        json!({
            "personalizations": [{ "to": [{ "email": alert.recipient.trim() }] }],
            "from":    { "email": self.from, "name": self.from_name },
            "subject": alert.subject(),
            "content": [{ "type": "text/plain", "value": alert.render_body() }],
        })
    }
}

#[async_trait]
impl AlertChannel for SendGridChannel {
    fn provider(&self) -> &'static str {
        "sendgrid"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn send_external_alert(&self, alert: &ExternalAlert) -> Result<(), DeliveryError> {
        if !self.is_configured() {
            return Err(DeliveryError::NotConfigured);
        }
        validate_recipient(&alert.recipient)?;

        let url = format!("{}/v3/mail/send", self.base_url);

        info!(
            symbol    = %alert.symbol,
            kind      = %alert.kind,
            recipient = %alert.recipient,
            "📨 Sending external alert via SendGrid"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(alert))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "SendGrid unreachable");
                DeliveryError::Unreachable {
                    provider: self.provider(),
                    reason:   e.to_string(),
                }
            })?;

        let status = response.status();
        if status.as_u16() == 200 || status.as_u16() == 202 {
            return Ok(());
        }

        let body = clip(&response.text().await.unwrap_or_default(), MAX_ERROR_BODY);
        error!(http_status = %status, body = %body, "SendGrid rejected alert");
        Err(DeliveryError::Rejected {
            provider: self.provider(),
            status:   status.as_u16(),
            body,
        })
    }
}

// ─── SMTP ─────────────────────────────────────────────────────────────────────

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct SmtpChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from:      Mailbox,
}

impl SmtpChannel {
    /// Builds the transport; no connection is made until the first send.
    pub fn new(smtp: &SmtpSettings, from_name: &str) -> anyhow::Result<Self> {
        let builder = if smtp.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
                .with_context(|| format!("SMTP relay '{}'", smtp.host))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
        };
        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(smtp.username.clone(), smtp.password.clone()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        let address: Address = smtp
            .from_email
            .trim()
            .parse()
            .with_context(|| format!("SMTP sender '{}' is not an email address", smtp.from_email))?;

        Ok(Self {
            transport,
            from: Mailbox::new(Some(from_name.to_string()), address),
        })
    }

    fn message(&self, alert: &ExternalAlert) -> Result<Message, DeliveryError> {
        let to: Mailbox = alert
            .recipient
            .trim()
            .parse()
            .map_err(|_| DeliveryError::InvalidRecipient(alert.recipient.clone()))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(alert.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(alert.render_body())
            .map_err(|e| DeliveryError::Smtp(e.to_string()))
    }
}

#[async_trait]
impl AlertChannel for SmtpChannel {
    fn provider(&self) -> &'static str {
        "smtp"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn send_external_alert(&self, alert: &ExternalAlert) -> Result<(), DeliveryError> {
        validate_recipient(&alert.recipient)?;
        let message = self.message(alert)?;

        info!(
            symbol    = %alert.symbol,
            kind      = %alert.kind,
            recipient = %alert.recipient,
            "📨 Sending external alert via SMTP"
        );

        self.transport.send(message).await.map(|_| ()).map_err(|e| {
            error!(error = %e, "SMTP send failed");
            DeliveryError::Smtp(e.to_string())
        })
    }
}

// ─── Fallback chain ───────────────────────────────────────────────────────────

/// Tries each configured channel in order until one accepts the alert.
pub struct FallbackChannel {
    chain: Vec<Arc<dyn AlertChannel>>,
}

impl FallbackChannel {
    pub fn new(chain: Vec<Arc<dyn AlertChannel>>) -> Self {
        Self { chain }
    }

    fn configured(&self) -> impl Iterator<Item = &Arc<dyn AlertChannel>> {
        self.chain.iter().filter(|c| c.is_configured())
    }
}

#[async_trait]
impl AlertChannel for FallbackChannel {
    /// The provider tried first.
    fn provider(&self) -> &'static str {
        self.configured().next().map_or("none", |c| c.provider())
    }

    fn is_configured(&self) -> bool {
        self.configured().next().is_some()
    }

    async fn send_external_alert(&self, alert: &ExternalAlert) -> Result<(), DeliveryError> {
        self.attempt(alert).await.1
    }

    async fn attempt(&self, alert: &ExternalAlert) -> (&'static str, Result<(), DeliveryError>) {
        let mut last = ("none", Err(DeliveryError::NotConfigured));
        for channel in self.configured() {
            let (provider, result) = channel.attempt(alert).await;
            match result {
                Ok(()) => return (provider, Ok(())),
                Err(e) => {
                    warn!(provider, error = %e, "External provider failed, trying next");
                    last = (provider, Err(e));
                }
            }
        }
        last
    }
}
