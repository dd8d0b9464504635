use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::price::{GoldAverage, GoldQuote, MarketQuote};
use crate::errors::CoreError;

/// Document id of the aggregate gold rate shown by default on dashboards.
pub const GOLD_RATE_ID: &str = "gold_vn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateType {
    Crypto,
    Stock,
    Gold,
}

/// Latest known price for one symbol, stored at `rates/{symbol}`.
///
/// Overwritten wholesale on every scheduled run (last writer wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSnapshot {
    pub symbol: String,
    #[serde(rename = "type")]
    pub rate_type: RateType,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buy_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sell_price: Option<f64>,
    pub change: f64,
    pub change_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    pub currency: String,
    pub source: String,
    pub last_updated: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
}

impl RateSnapshot {
    /// Snapshot of a crypto/stock quote. Rejects `next_update <= last_updated`.
    pub fn from_quote(
        quote: &MarketQuote,
        rate_type: RateType,
        last_updated: DateTime<Utc>,
        next_update: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        check_update_window(&quote.symbol, last_updated, next_update)?;
        Ok(Self {
            symbol: quote.symbol.clone(),
            rate_type,
            price: quote.price,
            buy_price: None,
            sell_price: None,
            change: quote.change,
            change_percent: quote.change_percent,
            market_cap: quote.market_cap,
            volume: quote.volume,
            currency: quote.currency.clone(),
            source: quote.source.clone(),
            last_updated,
            next_update,
        })
    }

    /// Aggregate gold snapshot. The reference price is the average sell price.
    pub fn gold_average(
        average: &GoldAverage,
        source: impl Into<String>,
        last_updated: DateTime<Utc>,
        next_update: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        check_update_window("GOLD", last_updated, next_update)?;
        Ok(Self {
            symbol: "GOLD".to_string(),
            rate_type: RateType::Gold,
            price: average.sell_price,
            buy_price: Some(average.buy_price),
            sell_price: Some(average.sell_price),
            change: average.change,
            change_percent: average.change_percent,
            market_cap: None,
            volume: None,
            currency: "vnd".to_string(),
            source: source.into(),
            last_updated,
            next_update,
        })
    }
}

fn check_update_window(
    symbol: &str,
    last_updated: DateTime<Utc>,
    next_update: DateTime<Utc>,
) -> Result<(), CoreError> {
    if next_update <= last_updated {
        return Err(CoreError::ValidationError(format!(
            "Rate for {symbol}: next update {next_update} must be after last update {last_updated}"
        )));
    }
    Ok(())
}

/// One gold product quote for one day, stored at `goldPrices/{date}_{type}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoldPriceRecord {
    #[serde(flatten)]
    pub quote: GoldQuote,
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
}

impl GoldPriceRecord {
    pub fn document_id(&self) -> String {
        format!("{}_{}", self.date, self.quote.gold_type)
    }
}

/// Archive of a day's gold quotes, stored at `goldPriceHistory/{date}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoldPriceHistory {
    pub date: NaiveDate,
    pub prices: Vec<GoldQuote>,
    pub timestamp: DateTime<Utc>,
}

/// Bookkeeping written by the refresh jobs at `systemStatus/priceUpdates`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    #[serde(default)]
    pub last_crypto_stock_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub crypto_count: usize,
    #[serde(default)]
    pub domestic_stock_count: usize,
    #[serde(default)]
    pub foreign_stock_count: usize,
    /// Snapshots actually written during the last crypto/stock run.
    #[serde(default)]
    pub rates_written: usize,
    #[serde(default)]
    pub last_gold_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub gold_count: usize,
}
