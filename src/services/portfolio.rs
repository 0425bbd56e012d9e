//! # services::portfolio
//!
//! The portfolio collaborator seen from the monitor: something that can
//! enumerate the current holdings.  [`PortfolioRegistry`] is the in-process
//! implementation the dashboard pushes its holdings into.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::CollaboratorError;
use crate::models::Holding;

#[async_trait]
pub trait HoldingSource: Send + Sync {
    /// Holdings in a stable order; the monitor evaluates them in this order.
    async fn enumerate_holdings(&self) -> Result<Vec<Holding>, CollaboratorError>;
}

/// Registered holdings, replaced wholesale on every registration.
#[derive(Debug, Default)]
pub struct PortfolioRegistry {
    holdings: RwLock<Vec<Holding>>,
}

impl PortfolioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the monitored holdings.  Symbols are normalised to upper case;
    /// a later duplicate replaces an earlier one in place.
    pub async fn register(&self, holdings: Vec<Holding>) -> usize {
        let mut merged: Vec<Holding> = Vec::with_capacity(holdings.len());
        for holding in holdings {
            let holding = Holding {
                symbol: holding.symbol.trim().to_ascii_uppercase(),
                ..holding
            };
            match merged.iter_mut().find(|h| h.symbol == holding.symbol) {
                Some(existing) => *existing = holding,
                None => merged.push(holding),
            }
        }

        let count = merged.len();
        *self.holdings.write().await = merged;
        info!(count, "Portfolio holdings registered");
        count
    }

    pub async fn snapshot(&self) -> Vec<Holding> {
        self.holdings.read().await.clone()
    }

    pub async fn symbols(&self) -> Vec<String> {
        self.holdings.read().await.iter().map(|h| h.symbol.clone()).collect()
    }
}

#[async_trait]
impl HoldingSource for PortfolioRegistry {
    async fn enumerate_holdings(&self) -> Result<Vec<Holding>, CollaboratorError> {
        Ok(self.snapshot().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_normalises_and_dedupes_in_order() {
        let registry = PortfolioRegistry::new();
        let count = registry
            .register(vec![
                Holding { symbol: "nvda".into(), ..Holding::new("", 10.0, 120.0, 1.98) },
                Holding::new("AAPL", 5.0, 170.0, 1.2),
                Holding { symbol: "NVDA".into(), ..Holding::new("", 12.0, 118.0, 1.98).with_reference_price(150.0) },
            ])
            .await;

        assert_eq!(count, 2);
        assert_eq!(registry.symbols().await, vec!["NVDA", "AAPL"]);
        let nvda = &registry.snapshot().await[0];
        assert_eq!(nvda.shares, 12.0);
        assert_eq!(nvda.reference_price, Some(150.0));
    }

    #[tokio::test]
    async fn registration_replaces_previous_holdings() {
        let registry = PortfolioRegistry::new();
        registry.register(vec![Holding::new("AAPL", 1.0, 100.0, 1.0)]).await;
        registry.register(vec![Holding::new("MSFT", 1.0, 300.0, 0.9)]).await;

        let holdings = registry.enumerate_holdings().await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].symbol, "MSFT");
    }
}
