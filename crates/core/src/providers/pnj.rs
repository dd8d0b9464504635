use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::errors::CoreError;
use crate::models::price::{GoldQuote, GoldType};

use super::traits::GoldPriceProvider;
use super::util::{get_json, http_client, RetryPolicy};

pub const DEFAULT_URL: &str = "https://edge-api.pnj.io/ecom-frontend/v3/get-gold-price";

/// PNJ public gold price feed.
///
/// Prices are published per location in thousands of VND with `.` as the
/// thousands separator (`"75.000"` = 75,000,000 VND). Only the first
/// location is used. The feed carries no day-over-day change, so quotes
/// report a change of 0.
pub struct PnjGoldProvider {
    client: Client,
    url: String,
    retry: RetryPolicy,
}

impl PnjGoldProvider {
    pub fn new(retry: RetryPolicy) -> Self {
        Self::with_url(DEFAULT_URL, retry)
    }

    pub fn with_url(url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client: http_client(),
            url: url.into(),
            retry,
        }
    }
}

/// `"75.000"` → `75_000_000.0`. Returns `None` for non-numeric input.
pub fn parse_thousands(raw: &str) -> Option<f64> {
    let digits: String = raw.trim().chars().filter(|c| *c != '.' && *c != ',').collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<f64>().ok().map(|v| v * 1000.0)
}

/// Map a PNJ product name to a gold class.
pub fn classify(name: &str) -> GoldType {
    if name == "SJC" {
        GoldType::Sjc
    } else if name.contains("nữ trang") || name.contains("Nhẫn") {
        GoldType::NuTrang
    } else {
        GoldType::Pnj
    }
}

// ── PNJ response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct PriceResponse {
    #[serde(default)]
    locations: Vec<Location>,
}

#[derive(Deserialize)]
struct Location {
    #[serde(default)]
    gold_type: Vec<GoldEntry>,
}

#[derive(Deserialize)]
struct GoldEntry {
    name: String,
    gia_mua: String,
    gia_ban: String,
}

#[async_trait]
impl GoldPriceProvider for PnjGoldProvider {
    fn name(&self) -> &str {
        "PNJ"
    }

    #[instrument(skip(self), fields(provider = "PNJ"))]
    async fn fetch_gold_prices(&self) -> Result<Vec<GoldQuote>, CoreError> {
        let resp: PriceResponse = get_json(&self.client, self.name(), &self.url, &[], &self.retry).await?;

        let Some(location) = resp.locations.into_iter().next() else {
            warn!("PNJ response contained no locations");
            return Ok(Vec::new());
        };

        let mut quotes = Vec::with_capacity(location.gold_type.len());
        for entry in location.gold_type {
            let (Some(buy), Some(sell)) = (parse_thousands(&entry.gia_mua), parse_thousands(&entry.gia_ban)) else {
                warn!("PNJ entry '{}' has unparseable prices, skipping", entry.name);
                continue;
            };
            quotes.push(GoldQuote {
                gold_type: classify(&entry.name),
                name: entry.name,
                buy_price: buy,
                sell_price: sell,
                change: 0.0,
                change_percent: 0.0,
                source: self.name().to_string(),
            });
        }
        debug!("PNJ returned {} gold quotes", quotes.len());
        Ok(quotes)
    }
}
