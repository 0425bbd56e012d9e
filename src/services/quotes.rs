//! # services::quotes
//!
//! The quote collaborator: one live price per symbol.  Provider fallback
//! chains are the provider's own concern; the monitor only sees
//! [`QuoteSource`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::CollaboratorError;

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn current_price(&self, symbol: &str) -> Result<f64, CollaboratorError>;
}

/// Finnhub `/quote` client.
#[derive(Clone)]
pub struct FinnhubQuotes {
    http:     Client,
    base_url: String,
    api_key:  String,
}

/// Only the field we read; Finnhub returns more.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// current price
    c: f64,
}

impl FinnhubQuotes {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key:  api_key.to_string(),
        }
    }

    pub fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[async_trait]
impl QuoteSource for FinnhubQuotes {
    async fn current_price(&self, symbol: &str) -> Result<f64, CollaboratorError> {
        if !self.has_key() {
            return Err(CollaboratorError::Unavailable(
                "quote provider (QUOTE_API_KEY missing)".into(),
            ));
        }

        let url = format!("{}/quote", self.base_url);
        let quote: QuoteResponse = self
            .http
            .get(&url)
            .query(&[("symbol", symbol), ("token", self.api_key.as_str())])
            .timeout(Duration::from_secs(5))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // Finnhub answers unknown symbols with all-zero quotes.
        if !quote.c.is_finite() || quote.c <= 0.0 {
            return Err(CollaboratorError::InvalidPrice {
                symbol: symbol.to_string(),
                price:  quote.c,
            });
        }

        debug!(symbol, price = quote.c, "Quote fetched");
        Ok(quote.c)
    }
}
