use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::asset::Market;
use crate::models::price::{GoldQuote, MarketQuote};

/// Abstraction over a crypto or stock price feed.
///
/// Implementations resolve as many of the requested symbols as they can.
/// A symbol the feed cannot price is left out of the result (and logged)
/// rather than failing the whole call; `Err` means the feed itself is
/// unusable for this request.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Buckets this provider can price.
    fn supported_markets(&self) -> Vec<Market>;

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<MarketQuote>, CoreError>;
}

/// A source of Vietnamese gold buy/sell quotes.
#[async_trait]
pub trait GoldPriceProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_gold_prices(&self) -> Result<Vec<GoldQuote>, CoreError>;
}
