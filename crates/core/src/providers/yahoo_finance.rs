use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::errors::CoreError;
use crate::models::asset::Market;
use crate::models::price::MarketQuote;

use super::traits::QuoteProvider;

/// Yahoo Finance provider for foreign stock prices.
///
/// - **Free**: No API key required.
/// - **No strict rate limits** (unofficial public API).
///
/// Uses the `yahoo_finance_api` crate. The change is computed from the last
/// two daily closes of a short range.
pub struct YahooFinanceProvider {
    connector: yahoo_finance_api::YahooConnector,
}

impl YahooFinanceProvider {
    pub fn new() -> Result<Self, CoreError> {
        let connector = yahoo_finance_api::YahooConnector::new().map_err(|e| CoreError::Api {
            provider: "Yahoo Finance".into(),
            message: format!("Failed to create connector: {e}"),
        })?;
        Ok(Self { connector })
    }

    async fn fetch_one(&self, symbol: &str) -> Result<MarketQuote, CoreError> {
        let upper = symbol.to_uppercase();
        let resp = self
            .connector
            .get_quote_range(&upper, "1d", "5d")
            .await
            .map_err(|e| CoreError::Api {
                provider: "Yahoo Finance".into(),
                message: format!("Failed to fetch quotes for {upper}: {e}"),
            })?;

        let quotes = resp.quotes().map_err(|e| CoreError::Api {
            provider: "Yahoo Finance".into(),
            message: format!("No quote data for {upper}: {e}"),
        })?;

        let (last, previous) = match quotes.as_slice() {
            [.., prev, last] => (last, Some(prev.close)),
            [last] => (last, None),
            [] => {
                return Err(CoreError::Api {
                    provider: "Yahoo Finance".into(),
                    message: format!("Empty quote history for {upper}"),
                })
            }
        };

        let (change, change_percent) = match previous {
            Some(prev) if prev > 0.0 => (last.close - prev, (last.close - prev) / prev * 100.0),
            _ => (0.0, 0.0),
        };

        Ok(MarketQuote {
            symbol: upper,
            name: None,
            price: last.close,
            change,
            change_percent,
            market_cap: None,
            volume: Some(last.volume as f64),
            currency: "usd".to_string(),
            source: self.name().to_string(),
        })
    }
}

#[async_trait]
impl QuoteProvider for YahooFinanceProvider {
    fn name(&self) -> &str {
        "Yahoo Finance"
    }

    fn supported_markets(&self) -> Vec<Market> {
        vec![Market::ForeignStock]
    }

    #[instrument(skip(self), fields(provider = "Yahoo Finance"))]
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<MarketQuote>, CoreError> {
        let mut quotes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.fetch_one(symbol).await {
                Ok(quote) => quotes.push(quote),
                Err(e) => warn!("Yahoo Finance quote for {symbol} failed: {e}"),
            }
        }
        Ok(quotes)
    }
}
