use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::errors::CoreError;
use crate::models::asset::Market;
use crate::models::logs::{
    entry_timestamp, AuditLogEntry, DeadLetterEntry, ErrorLogEntry, AUDIT_LOGS, DEAD_LETTERS, ERROR_LOGS,
};
use crate::models::price::{GoldAverage, GoldQuote, MarketQuote};
use crate::models::rate::{GoldPriceHistory, GoldPriceRecord, RateSnapshot, RateType, SyncStatus, GOLD_RATE_ID};
use crate::providers::registry::ProviderRegistry;
use crate::storage::{to_document, DocumentStore, WriteBatch};

use super::investment_service::load_held_symbols;
use super::scheduler::{next_run, Job, ScheduleSettings};

pub const RATES: &str = "rates";
pub const GOLD_PRICES: &str = "goldPrices";
pub const GOLD_PRICE_HISTORY: &str = "goldPriceHistory";
pub const SYSTEM_STATUS: &str = "systemStatus";
pub const PRICE_UPDATES_ID: &str = "priceUpdates";

/// Symbols to refresh, split by price-feed bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketSymbols {
    pub crypto: Vec<String>,
    pub domestic_stock: Vec<String>,
    pub foreign_stock: Vec<String>,
}

impl MarketSymbols {
    pub fn get(&self, market: Market) -> &[String] {
        match market {
            Market::Crypto => &self.crypto,
            Market::DomesticStock => &self.domestic_stock,
            Market::ForeignStock => &self.foreign_stock,
        }
    }
}

/// Result of refreshing one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketOutcome {
    pub market: Market,
    pub requested: usize,
    /// Rate snapshots written
    pub written: usize,
    pub dead_letters: usize,
    /// Set when the bucket failed as a whole
    pub error: Option<String>,
}

impl BucketOutcome {
    fn empty(market: Market, requested: usize) -> Self {
        Self {
            market,
            requested,
            written: 0,
            dead_letters: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoStockSummary {
    pub crypto: BucketOutcome,
    pub domestic_stock: BucketOutcome,
    pub foreign_stock: BucketOutcome,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoldSummary {
    pub quotes: usize,
    pub average: Option<GoldAverage>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub error_logs: usize,
    pub dead_letters: usize,
    pub audit_logs: usize,
}

/// Scheduled market-data synchronizer.
///
/// The public job methods (`refresh_crypto_stock_prices`,
/// `refresh_gold_prices`, `weekly_cleanup`) never fail: errors are logged
/// and recorded in `errorLogs`. The `try_*` variants return them instead.
pub struct MarketSyncService {
    store: Arc<dyn DocumentStore>,
    registry: ProviderRegistry,
    config: SyncConfig,
    schedule: ScheduleSettings,
}

impl MarketSyncService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: ProviderRegistry,
        config: SyncConfig,
        schedule: ScheduleSettings,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            schedule,
        }
    }

    pub fn schedule(&self) -> &ScheduleSettings {
        &self.schedule
    }

    // ── Crypto / stock ──────────────────────────────────────────────

    pub async fn refresh_crypto_stock_prices(&self) {
        if let Err(e) = self.try_refresh_crypto_stock_prices().await {
            error!("Crypto/stock price update failed: {e}");
            self.log_error("price_update_error", "refresh_crypto_stock_prices", &e)
                .await;
        }
    }

    /// Refresh every held crypto and stock symbol.
    ///
    /// The three buckets run concurrently and independently: a bucket that
    /// fails is recorded in its outcome and in `errorLogs` without
    /// affecting the others.
    #[instrument(skip(self))]
    pub async fn try_refresh_crypto_stock_prices(&self) -> Result<CryptoStockSummary, CoreError> {
        let symbols = self.held_market_symbols().await?;
        let now = Utc::now();
        let next = self.next_update(Job::CryptoStock, now);
        info!(
            "Refreshing {} crypto, {} domestic and {} foreign symbols",
            symbols.crypto.len(),
            symbols.domestic_stock.len(),
            symbols.foreign_stock.len()
        );

        let (crypto, domestic_stock, foreign_stock) = tokio::join!(
            self.refresh_bucket(Market::Crypto, &symbols.crypto, now, next),
            self.refresh_bucket(Market::DomesticStock, &symbols.domestic_stock, now, next),
            self.refresh_bucket(Market::ForeignStock, &symbols.foreign_stock, now, next),
        );

        let written = crypto.written + domestic_stock.written + foreign_stock.written;
        let summary = CryptoStockSummary {
            crypto,
            domestic_stock,
            foreign_stock,
            timestamp: now,
        };

        self.update_status(|status| {
            status.last_crypto_stock_update = Some(now);
            status.crypto_count = summary.crypto.requested;
            status.domestic_stock_count = summary.domestic_stock.requested;
            status.foreign_stock_count = summary.foreign_stock.requested;
            status.rates_written = written;
        })
        .await?;
        self.audit("price_update", json!({ "job": "crypto_stock", "summary": &summary }))
            .await?;

        info!("Crypto/stock prices updated: {written} snapshots written");
        Ok(summary)
    }

    /// Refresh a single bucket from the held symbols.
    ///
    /// Store failures are returned; provider failures, including a market
    /// with no provider, are reported in the outcome.
    pub async fn refresh_market(&self, market: Market) -> Result<BucketOutcome, CoreError> {
        let symbols = self.held_market_symbols().await?;
        let now = Utc::now();
        let next = self.next_update(Job::CryptoStock, now);
        let outcome = self.sync_bucket(market, symbols.get(market), now, next).await?;

        self.update_status(|status| {
            status.last_crypto_stock_update = Some(now);
            match market {
                Market::Crypto => status.crypto_count = outcome.requested,
                Market::DomesticStock => status.domestic_stock_count = outcome.requested,
                Market::ForeignStock => status.foreign_stock_count = outcome.requested,
            }
        })
        .await?;
        self.audit("price_update", json!({ "job": "manual", "market": market, "outcome": &outcome }))
            .await?;
        Ok(outcome)
    }

    /// Held symbols split into buckets: crypto, stocks on the configured
    /// domestic list, and every other stock.
    pub async fn held_market_symbols(&self) -> Result<MarketSymbols, CoreError> {
        let held = load_held_symbols(self.store.as_ref()).await?;
        let (domestic, foreign): (Vec<String>, Vec<String>) = held
            .stock
            .into_iter()
            .partition(|s| self.config.is_domestic(s));
        Ok(MarketSymbols {
            crypto: held.crypto.into_iter().collect(),
            domestic_stock: domestic,
            foreign_stock: foreign,
        })
    }

    async fn refresh_bucket(
        &self,
        market: Market,
        symbols: &[String],
        now: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> BucketOutcome {
        match self.sync_bucket(market, symbols, now, next).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{market} price update failed: {e}");
                self.log_error("price_update_error", &format!("refresh_{market}"), &e)
                    .await;
                BucketOutcome {
                    error: Some(e.to_string()),
                    ..BucketOutcome::empty(market, symbols.len())
                }
            }
        }
    }

    async fn sync_bucket(
        &self,
        market: Market,
        symbols: &[String],
        now: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<BucketOutcome, CoreError> {
        let mut outcome = BucketOutcome::empty(market, symbols.len());
        if symbols.is_empty() {
            debug!("No {market} symbols to refresh");
            return Ok(outcome);
        }

        let providers = self.registry.providers_for(market);
        if providers.is_empty() {
            let err = CoreError::NoProvider(market.to_string());
            error!("{market} price update skipped: {err}");
            self.log_error("price_update_error", &format!("refresh_{market}"), &err)
                .await;
            outcome.error = Some(err.to_string());
            return Ok(outcome);
        }

        let mut pending: BTreeSet<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        let mut resolved: Vec<MarketQuote> = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        for provider in &providers {
            if pending.is_empty() {
                break;
            }
            let request: Vec<String> = pending.iter().cloned().collect();
            match provider.fetch_quotes(&request).await {
                Ok(quotes) => {
                    for quote in quotes {
                        if pending.remove(&quote.symbol.to_uppercase()) {
                            resolved.push(quote);
                        }
                    }
                }
                Err(e) => {
                    warn!("{} failed for {market}: {e}", provider.name());
                    failures.push(format!("{}: {e}", provider.name()));
                }
            }
        }

        let rate_type = match market {
            Market::Crypto => RateType::Crypto,
            Market::DomesticStock | Market::ForeignStock => RateType::Stock,
        };

        let mut batch = WriteBatch::new();
        for quote in &resolved {
            let snapshot = RateSnapshot::from_quote(quote, rate_type, now, next)?;
            batch.set(RATES, &snapshot.symbol, &snapshot)?;
        }
        let reason = if failures.is_empty() {
            "no provider returned a quote".to_string()
        } else {
            failures.join("; ")
        };
        for symbol in &pending {
            let letter = DeadLetterEntry {
                job: "refresh_crypto_stock_prices".to_string(),
                market,
                symbol: symbol.clone(),
                reason: reason.clone(),
                timestamp: now,
            };
            batch.set(DEAD_LETTERS, Uuid::new_v4().to_string(), &letter)?;
        }
        if !batch.is_empty() {
            self.store.commit(batch).await?;
        }

        outcome.written = resolved.len();
        outcome.dead_letters = pending.len();
        if !pending.is_empty() {
            warn!("{} {market} symbols unresolved: {:?}", pending.len(), pending);
        }

        if resolved.is_empty() && failures.len() == providers.len() {
            let err = CoreError::Api {
                provider: market.to_string(),
                message: reason,
            };
            error!("Every {market} provider failed: {err}");
            self.log_error("price_update_error", &format!("refresh_{market}"), &err)
                .await;
            outcome.error = Some(err.to_string());
        }

        Ok(outcome)
    }

    // ── Gold ────────────────────────────────────────────────────────

    pub async fn refresh_gold_prices(&self) {
        if let Err(e) = self.try_refresh_gold_prices().await {
            error!("Gold price update failed: {e}");
            self.log_error("gold_update_error", "refresh_gold_prices", &e)
                .await;
        }
    }

    /// Fetch all gold sources and store per-product records, the day's
    /// archive and the aggregate `rates/gold_vn` snapshot in one batch.
    ///
    /// When no source returns anything, nothing is written.
    #[instrument(skip(self))]
    pub async fn try_refresh_gold_prices(&self) -> Result<GoldSummary, CoreError> {
        let now = Utc::now();
        let date = self.schedule.local_date(now);

        let mut quotes: Vec<GoldQuote> = Vec::new();
        let mut sources: Vec<String> = Vec::new();
        for provider in self.registry.gold_providers() {
            match provider.fetch_gold_prices().await {
                Ok(found) if !found.is_empty() => {
                    sources.push(provider.name().to_string());
                    quotes.extend(found);
                }
                Ok(_) => warn!("{} returned no gold prices", provider.name()),
                Err(e) => warn!("{} gold fetch failed: {e}", provider.name()),
            }
        }

        let Some(average) = GoldAverage::from_quotes(&quotes) else {
            warn!("No gold prices fetched, skipping update");
            return Ok(GoldSummary {
                quotes: 0,
                average: None,
                date,
            });
        };

        let next = self.next_update(Job::Gold, now);
        let mut batch = WriteBatch::new();
        for quote in &quotes {
            let record = GoldPriceRecord {
                quote: quote.clone(),
                date,
                timestamp: now,
            };
            batch.set(GOLD_PRICES, record.document_id(), &record)?;
        }
        batch.set(
            GOLD_PRICE_HISTORY,
            date.to_string(),
            &GoldPriceHistory {
                date,
                prices: quotes.clone(),
                timestamp: now,
            },
        )?;
        let snapshot = RateSnapshot::gold_average(&average, sources.join(","), now, next)?;
        batch.set(RATES, GOLD_RATE_ID, &snapshot)?;
        self.store.commit(batch).await?;

        self.update_status(|status| {
            status.last_gold_update = Some(now);
            status.gold_count = quotes.len();
        })
        .await?;
        self.audit(
            "gold_price_update",
            json!({ "count": quotes.len(), "average": &average, "date": date }),
        )
        .await?;

        info!(
            "Gold prices updated: {} quotes, avg buy {} / sell {}",
            quotes.len(),
            average.buy_price,
            average.sell_price
        );
        Ok(GoldSummary {
            quotes: quotes.len(),
            average: Some(average),
            date,
        })
    }

    // ── Cleanup ─────────────────────────────────────────────────────

    pub async fn weekly_cleanup(&self) {
        if let Err(e) = self.try_weekly_cleanup().await {
            error!("Weekly cleanup failed: {e}");
            self.log_error("cleanup_error", "weekly_cleanup", &e).await;
        }
    }

    /// Delete error logs and dead letters past the error retention, and
    /// audit logs past the audit retention.
    #[instrument(skip(self))]
    pub async fn try_weekly_cleanup(&self) -> Result<CleanupSummary, CoreError> {
        let now = Utc::now();
        let error_cutoff = months_before(now, self.config.error_retention_months);
        let audit_cutoff = months_before(now, self.config.audit_retention_months);

        let summary = CleanupSummary {
            error_logs: self.purge(ERROR_LOGS, error_cutoff).await?,
            dead_letters: self.purge(DEAD_LETTERS, error_cutoff).await?,
            audit_logs: self.purge(AUDIT_LOGS, audit_cutoff).await?,
        };

        self.audit("weekly_cleanup", json!(&summary)).await?;
        info!(
            "Cleanup removed {} error logs, {} dead letters, {} audit logs",
            summary.error_logs, summary.dead_letters, summary.audit_logs
        );
        Ok(summary)
    }

    /// Delete entries older than `cutoff`, committing at most
    /// `cleanup_batch_size` deletes per batch.
    async fn purge(&self, collection: &str, cutoff: DateTime<Utc>) -> Result<usize, CoreError> {
        let stale: Vec<String> = self
            .store
            .list(collection)
            .await?
            .into_iter()
            .filter(|doc| entry_timestamp(&doc.data).is_some_and(|ts| ts < cutoff))
            .map(|doc| doc.id)
            .collect();

        for chunk in stale.chunks(self.config.cleanup_batch_size.max(1)) {
            let mut batch = WriteBatch::new();
            for id in chunk {
                batch.delete(collection, id.as_str());
            }
            self.store.commit(batch).await?;
        }
        if !stale.is_empty() {
            debug!("Purged {} entries from {collection}", stale.len());
        }
        Ok(stale.len())
    }

    // ── Bookkeeping ─────────────────────────────────────────────────

    pub async fn status(&self) -> Result<SyncStatus, CoreError> {
        match self.store.get(SYSTEM_STATUS, PRICE_UPDATES_ID).await? {
            Some(doc) => doc.decode(),
            None => Ok(SyncStatus::default()),
        }
    }

    async fn update_status(&self, apply: impl FnOnce(&mut SyncStatus)) -> Result<(), CoreError> {
        let mut status = self.status().await?;
        apply(&mut status);
        self.store
            .set(SYSTEM_STATUS, PRICE_UPDATES_ID, to_document(&status)?)
            .await?;
        Ok(())
    }

    async fn audit(&self, action: &str, details: serde_json::Value) -> Result<(), CoreError> {
        let entry = AuditLogEntry::new(action, details);
        self.store.add(AUDIT_LOGS, to_document(&entry)?).await?;
        Ok(())
    }

    /// Best effort: a failure to record the error is only traced.
    async fn log_error(&self, kind: &str, function: &str, err: &CoreError) {
        let entry = ErrorLogEntry::new(kind, function, err);
        let result = match to_document(&entry) {
            Ok(doc) => self.store.add(ERROR_LOGS, doc).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("Could not record error log entry: {e}");
        }
    }

    fn next_update(&self, job: Job, now: DateTime<Utc>) -> DateTime<Utc> {
        next_run(job, &self.schedule, now).unwrap_or_else(|| now + chrono::Duration::days(1))
    }
}

fn months_before(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
