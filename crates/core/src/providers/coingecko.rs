use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::errors::CoreError;
use crate::models::asset::Market;
use crate::models::price::MarketQuote;

use super::traits::QuoteProvider;
use super::util::{get_json, http_client, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko simple-price API for cryptocurrency prices in VND.
///
/// - **Free**: No API key required.
/// - **Batch**: one request prices every requested coin.
///
/// CoinGecko addresses coins by id ("bitcoin"), not ticker. Common tickers
/// are mapped; anything else is tried as its lowercase ticker.
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    coin_ids: HashMap<String, String>,
}

impl CoinGeckoProvider {
    pub fn new(retry: RetryPolicy) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, retry)
    }

    pub fn with_base_url(base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        let coin_ids = [
            ("BTC", "bitcoin"),
            ("ETH", "ethereum"),
            ("BNB", "binancecoin"),
            ("SOL", "solana"),
            ("ADA", "cardano"),
            ("DOT", "polkadot"),
            ("MATIC", "matic-network"),
            ("AVAX", "avalanche-2"),
            ("LINK", "chainlink"),
            ("UNI", "uniswap"),
            ("XRP", "ripple"),
            ("DOGE", "dogecoin"),
            ("USDT", "tether"),
        ]
        .into_iter()
        .map(|(sym, id)| (sym.to_string(), id.to_string()))
        .collect();

        Self {
            client: http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
            coin_ids,
        }
    }

    /// "BTC" → "bitcoin"; unknown tickers fall back to lowercase.
    pub fn coin_id(&self, symbol: &str) -> String {
        let upper = symbol.to_uppercase();
        self.coin_ids
            .get(&upper)
            .cloned()
            .unwrap_or_else(|| symbol.to_lowercase())
    }
}

#[derive(Deserialize)]
struct CoinPrice {
    vnd: Option<f64>,
    vnd_24h_change: Option<f64>,
    vnd_market_cap: Option<f64>,
}

/// Absolute change implied by a price and its 24h percentage move.
pub fn change_from_percent(price: f64, percent: f64) -> f64 {
    let previous = price / (1.0 + percent / 100.0);
    if previous.is_finite() {
        price - previous
    } else {
        0.0
    }
}

#[async_trait]
impl QuoteProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        "CoinGecko"
    }

    fn supported_markets(&self) -> Vec<Market> {
        vec![Market::Crypto]
    }

    #[instrument(skip(self), fields(provider = "CoinGecko"))]
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<MarketQuote>, CoreError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = symbols.iter().map(|s| self.coin_id(s)).collect();
        let joined = ids.join(",");
        let url = format!("{}/simple/price", self.base_url);
        let prices: HashMap<String, CoinPrice> = get_json(
            &self.client,
            self.name(),
            &url,
            &[
                ("ids", joined.as_str()),
                ("vs_currencies", "vnd"),
                ("include_24hr_change", "true"),
                ("include_market_cap", "true"),
            ],
            &self.retry,
        )
        .await?;

        let mut quotes = Vec::with_capacity(symbols.len());
        for (symbol, id) in symbols.iter().zip(&ids) {
            let Some(entry) = prices.get(id) else {
                warn!("CoinGecko returned no data for {symbol} ({id}), skipping");
                continue;
            };
            let Some(price) = entry.vnd else {
                warn!("CoinGecko returned no VND price for {symbol}, skipping");
                continue;
            };
            let percent = entry.vnd_24h_change.unwrap_or(0.0);
            quotes.push(MarketQuote {
                symbol: symbol.to_uppercase(),
                name: None,
                price,
                change: change_from_percent(price, percent),
                change_percent: percent,
                market_cap: entry.vnd_market_cap,
                volume: None,
                currency: "vnd".to_string(),
                source: self.name().to_string(),
            });
        }
        Ok(quotes)
    }
}
