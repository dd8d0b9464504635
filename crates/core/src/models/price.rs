use serde::{Deserialize, Serialize};

/// A provider-normalized market quote for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketQuote {
    /// Ticker symbol, uppercased
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    pub price: f64,
    /// Absolute change over the provider's reference period (24h / previous session)
    pub change: f64,
    pub change_percent: f64,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    /// Lowercase ISO code of the quote currency (e.g., "vnd", "usd")
    pub currency: String,
    /// Provider that produced the quote
    pub source: String,
}

/// Gold product classes published by Vietnamese gold retailers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GoldType {
    /// SJC-branded gold bars
    Sjc,
    /// Retailer-branded bars / plain rings
    Pnj,
    /// Jewellery gold (nữ trang) and rings (nhẫn)
    NuTrang,
}

impl GoldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoldType::Sjc => "SJC",
            GoldType::Pnj => "PNJ",
            GoldType::NuTrang => "NUTRANG",
        }
    }
}

impl std::fmt::Display for GoldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A buy/sell quote for one gold product, in VND per chỉ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoldQuote {
    #[serde(rename = "type")]
    pub gold_type: GoldType,
    pub name: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub source: String,
}

/// Simple arithmetic mean across gold quotes (no weighting).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoldAverage {
    pub buy_price: f64,
    pub sell_price: f64,
    pub change: f64,
    pub change_percent: f64,
}

impl GoldAverage {
    /// Mean buy/sell/change, rounded to whole VND.
    /// `change_percent` is relative to the average buy price (0 when that is 0).
    /// Returns `None` for an empty slice.
    pub fn from_quotes(quotes: &[GoldQuote]) -> Option<Self> {
        if quotes.is_empty() {
            return None;
        }
        let n = quotes.len() as f64;
        let avg_buy = quotes.iter().map(|q| q.buy_price).sum::<f64>() / n;
        let avg_sell = quotes.iter().map(|q| q.sell_price).sum::<f64>() / n;
        let avg_change = quotes.iter().map(|q| q.change).sum::<f64>() / n;

        let change_percent = if avg_buy > 0.0 {
            avg_change / avg_buy * 100.0
        } else {
            0.0
        };

        Some(Self {
            buy_price: avg_buy.round(),
            sell_price: avg_sell.round(),
            change: avg_change.round(),
            change_percent,
        })
    }
}
