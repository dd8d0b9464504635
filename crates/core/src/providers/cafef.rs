use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::errors::CoreError;
use crate::models::asset::Market;
use crate::models::price::MarketQuote;

use super::traits::QuoteProvider;
use super::util::{get_json, http_client, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://cafef.vn";

/// Display names of the large caps tracked by default.
pub const STOCK_NAMES: &[(&str, &str)] = &[
    ("ACB", "Ngân hàng ACB"),
    ("HPG", "Hòa Phát Group"),
    ("VIC", "Vingroup"),
    ("VHM", "Vinhomes"),
    ("VCB", "Vietcombank"),
    ("BID", "BIDV"),
    ("CTG", "VietinBank"),
    ("MSN", "Masan Group"),
    ("SAB", "Sabeco"),
    ("GAS", "PV Gas"),
    ("PLX", "Petrolimex"),
    ("FPT", "FPT Corporation"),
    ("VNM", "Vinamilk"),
    ("TCB", "Techcombank"),
    ("MWG", "Mobile World"),
    ("POW", "PetroVietnam Power"),
];

pub fn stock_name(symbol: &str) -> Option<&'static str> {
    let upper = symbol.to_uppercase();
    STOCK_NAMES
        .iter()
        .find(|(sym, _)| *sym == upper)
        .map(|(_, name)| *name)
}

/// CafeF price-history endpoint for Vietnamese listed stocks.
///
/// - **Free**: No API key required.
/// - **Per symbol**: one request each, spaced by `request_delay`.
/// - **Units**: prices are published in thousands of VND.
pub struct CafefProvider {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    request_delay: Duration,
}

impl CafefProvider {
    pub fn new(retry: RetryPolicy, request_delay: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, retry, request_delay)
    }

    pub fn with_base_url(base_url: impl Into<String>, retry: RetryPolicy, request_delay: Duration) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
            request_delay,
        }
    }

    async fn fetch_one(&self, symbol: &str) -> Result<Option<MarketQuote>, CoreError> {
        let url = format!(
            "{}/du-lieu/Ajax/PageNew/DataHistory/PriceHistory.ashx",
            self.base_url
        );
        let lower = symbol.to_lowercase();
        let end_date = Utc::now().to_rfc3339();
        let resp: HistoryResponse = get_json(
            &self.client,
            self.name(),
            &url,
            &[
                ("Symbol", lower.as_str()),
                ("EndDate", end_date.as_str()),
                ("PageIndex", "1"),
                ("PageSize", "1"),
            ],
            &self.retry,
        )
        .await?;

        if !resp.success {
            return Ok(None);
        }
        let Some(row) = resp.data.and_then(|d| d.data.into_iter().next()) else {
            return Ok(None);
        };
        let Some(price) = row.adjusted_price else {
            return Ok(None);
        };

        let (change, change_percent) = row
            .change_text
            .as_deref()
            .map(parse_change_text)
            .unwrap_or((0.0, 0.0));

        let upper = symbol.to_uppercase();
        Ok(Some(MarketQuote {
            name: Some(stock_name(&upper).map(str::to_string).unwrap_or_else(|| upper.clone())),
            symbol: upper,
            price: round2(price) * 1000.0,
            change: round2(change) * 1000.0,
            change_percent: round2(change_percent),
            market_cap: None,
            volume: Some(row.volume.unwrap_or(0.0)),
            currency: "vnd".to_string(),
            source: self.name().to_string(),
        }))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn change_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([+-]?\d*\.?\d+)\(([+-]?\d*\.?\d+)\s*%\)$").ok())
        .as_ref()
}

/// Parse CafeF's `"<delta>(<percent> %)"` change text, e.g. `"-0.2(-0.78 %)"`.
///
/// Anything that does not match yields `(0.0, 0.0)`.
pub fn parse_change_text(text: &str) -> (f64, f64) {
    let Some(caps) = change_regex().and_then(|re| re.captures(text.trim())) else {
        return (0.0, 0.0);
    };
    let delta = caps[1].parse().unwrap_or(0.0);
    let percent = caps[2].parse().unwrap_or(0.0);
    (delta, percent)
}

// ── CafeF response types ────────────────────────────────────────────

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(rename = "Success", default)]
    success: bool,
    #[serde(rename = "Data")]
    data: Option<HistoryPage>,
}

#[derive(Deserialize)]
struct HistoryPage {
    #[serde(rename = "Data", default)]
    data: Vec<HistoryRow>,
}

#[derive(Deserialize)]
struct HistoryRow {
    #[serde(rename = "GiaDieuChinh")]
    adjusted_price: Option<f64>,
    #[serde(rename = "KhoiLuongKhopLenh")]
    volume: Option<f64>,
    #[serde(rename = "ThayDoi")]
    change_text: Option<String>,
}

#[async_trait]
impl QuoteProvider for CafefProvider {
    fn name(&self) -> &str {
        "CafeF"
    }

    fn supported_markets(&self) -> Vec<Market> {
        vec![Market::DomesticStock]
    }

    #[instrument(skip(self), fields(provider = "CafeF"))]
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<MarketQuote>, CoreError> {
        let mut quotes = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            match self.fetch_one(symbol).await {
                Ok(Some(quote)) => {
                    debug!("CafeF {symbol}: {}", quote.price);
                    quotes.push(quote);
                }
                Ok(None) => warn!("CafeF returned no data for {symbol}, skipping"),
                Err(e) => warn!("CafeF request for {symbol} failed: {e}"),
            }
        }
        Ok(quotes)
    }
}
