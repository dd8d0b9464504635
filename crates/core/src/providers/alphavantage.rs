use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::errors::CoreError;
use crate::models::asset::Market;
use crate::models::price::MarketQuote;

use super::traits::QuoteProvider;
use super::util::{get_json, http_client, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage API provider for foreign stock prices.
///
/// - **Free tier**: 5 requests/minute, 25/day (across ALL endpoints).
/// - **Requires**: API key.
/// - **Strategy**: one GLOBAL_QUOTE per symbol, spaced by `request_delay`.
///
/// Note: Returns prices in the stock's native currency (typically USD).
pub struct AlphaVantageProvider {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
    request_delay: Duration,
}

impl AlphaVantageProvider {
    pub fn new(api_key: String, retry: RetryPolicy, request_delay: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key, retry, request_delay)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: String,
        retry: RetryPolicy,
        request_delay: Duration,
    ) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into(),
            api_key,
            retry,
            request_delay,
        }
    }

    async fn fetch_one(&self, symbol: &str) -> Result<MarketQuote, CoreError> {
        let upper = symbol.to_uppercase();
        let resp: GlobalQuoteResponse = get_json(
            &self.client,
            self.name(),
            &self.base_url,
            &[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", upper.as_str()),
                ("apikey", self.api_key.as_str()),
            ],
            &self.retry,
        )
        .await?;

        let quote = resp.global_quote.ok_or_else(|| CoreError::Api {
            provider: "Alpha Vantage".into(),
            message: format!("No quote data for {upper}. API limit may be exceeded."),
        })?;

        let price = parse_number(quote.price.as_deref()).ok_or_else(|| CoreError::Api {
            provider: "Alpha Vantage".into(),
            message: format!("Invalid price format for {upper}"),
        })?;

        Ok(MarketQuote {
            symbol: upper,
            name: None,
            price,
            change: parse_number(quote.change.as_deref()).unwrap_or(0.0),
            change_percent: parse_number(quote.change_percent.as_deref().map(|p| p.trim_end_matches('%')))
                .unwrap_or(0.0),
            market_cap: None,
            volume: parse_number(quote.volume.as_deref()),
            currency: "usd".to_string(),
            source: self.name().to_string(),
        })
    }
}

fn parse_number(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
}

// ── Alpha Vantage API response types ────────────────────────────────

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
}

#[derive(Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "09. change")]
    change: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

#[async_trait]
impl QuoteProvider for AlphaVantageProvider {
    fn name(&self) -> &str {
        "Alpha Vantage"
    }

    fn supported_markets(&self) -> Vec<Market> {
        vec![Market::ForeignStock]
    }

    #[instrument(skip(self), fields(provider = "Alpha Vantage"))]
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<MarketQuote>, CoreError> {
        let mut quotes = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            match self.fetch_one(symbol).await {
                Ok(quote) => quotes.push(quote),
                Err(e) => warn!("Alpha Vantage quote for {symbol} failed: {e}"),
            }
        }
        Ok(quotes)
    }
}
