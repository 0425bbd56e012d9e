//! Collaborators the alert core talks to: the portfolio, the quote provider
//! and the external alert channel.

pub mod channel;
pub mod portfolio;
pub mod quotes;

pub use channel::{
    AlertChannel, DisabledChannel, ExternalAlert, FallbackChannel, SendGridChannel, SmtpChannel,
};
pub use portfolio::{HoldingSource, PortfolioRegistry};
pub use quotes::{FinnhubQuotes, QuoteSource};
