use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::CoreError;
use crate::models::asset::Market;
use crate::storage::encryption::random_bytes;

use super::sync_service::{BucketOutcome, MarketSyncService};

/// Decides whether a caller may trigger jobs manually.
#[async_trait]
pub trait AdminVerifier: Send + Sync {
    /// `token` is the raw credential, with any `Bearer ` prefix already removed.
    async fn verify(&self, token: &str) -> bool;
}

/// Accepts tokens whose Argon2 hash matches one of the configured PHC strings.
pub struct HashedTokenVerifier {
    hashes: Vec<String>,
}

impl HashedTokenVerifier {
    pub fn new(hashes: Vec<String>) -> Self {
        Self { hashes }
    }

    /// Argon2id PHC string for a token, for storing in configuration.
    pub fn hash_token(token: &str) -> Result<String, CoreError> {
        let salt = SaltString::encode_b64(&random_bytes::<16>()?)
            .map_err(|e| CoreError::Encryption(format!("Invalid salt: {e}")))?;
        Argon2::default()
            .hash_password(token.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CoreError::Encryption(format!("Token hashing failed: {e}")))
    }
}

#[async_trait]
impl AdminVerifier for HashedTokenVerifier {
    async fn verify(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        self.hashes.iter().any(|phc| match PasswordHash::new(phc) {
            Ok(parsed) => Argon2::default()
                .verify_password(token.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                warn!("Ignoring malformed admin token hash: {e}");
                false
            }
        })
    }
}

/// Which prices a manual trigger refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Crypto,
    /// Both the domestic and the foreign stock buckets
    Stock,
    Gold,
    All,
}

impl std::str::FromStr for TriggerKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "crypto" => Ok(TriggerKind::Crypto),
            "stock" => Ok(TriggerKind::Stock),
            "gold" => Ok(TriggerKind::Gold),
            "all" => Ok(TriggerKind::All),
            other => Err(CoreError::ValidationError(format!(
                "Unknown trigger type '{other}' (expected crypto, stock, gold or all)"
            ))),
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Crypto => write!(f, "crypto"),
            TriggerKind::Stock => write!(f, "stock"),
            TriggerKind::Gold => write!(f, "gold"),
            TriggerKind::All => write!(f, "all"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualTriggerResponse {
    pub success: bool,
    pub message: String,
    /// Rate snapshots written per bucket
    pub crypto: usize,
    pub domestic_stock: usize,
    pub foreign_stock: usize,
    /// Gold quotes stored
    pub gold: usize,
    pub timestamp: DateTime<Utc>,
}

/// Authenticated, on-demand entry point to the synchronizer jobs.
///
/// Unlike the scheduled entry points, job errors are returned to the caller.
pub struct AdminTrigger {
    verifier: Arc<dyn AdminVerifier>,
    sync: Arc<MarketSyncService>,
}

impl AdminTrigger {
    pub fn new(verifier: Arc<dyn AdminVerifier>, sync: Arc<MarketSyncService>) -> Self {
        Self { verifier, sync }
    }

    /// `authorization` is the raw header value, e.g. `Bearer <token>`.
    pub async fn handle(
        &self,
        authorization: Option<&str>,
        kind: TriggerKind,
    ) -> Result<ManualTriggerResponse, CoreError> {
        let token = authorization
            .map(|h| h.trim())
            .map(|h| h.strip_prefix("Bearer ").unwrap_or(h).trim())
            .filter(|t| !t.is_empty())
            .ok_or(CoreError::Unauthorized)?;
        if !self.verifier.verify(token).await {
            warn!("Rejected manual {kind} trigger: invalid token");
            return Err(CoreError::Unauthorized);
        }

        info!("Manual {kind} price update triggered");
        let mut response = ManualTriggerResponse {
            success: true,
            message: String::new(),
            crypto: 0,
            domestic_stock: 0,
            foreign_stock: 0,
            gold: 0,
            timestamp: Utc::now(),
        };
        let mut errors: Vec<String> = Vec::new();

        match kind {
            TriggerKind::Crypto => {
                let outcome = self.sync.refresh_market(Market::Crypto).await?;
                response.crypto = collect(&outcome, &mut errors);
            }
            TriggerKind::Stock => {
                let domestic = self.sync.refresh_market(Market::DomesticStock).await?;
                response.domestic_stock = collect(&domestic, &mut errors);
                let foreign = self.sync.refresh_market(Market::ForeignStock).await?;
                response.foreign_stock = collect(&foreign, &mut errors);
            }
            TriggerKind::Gold => {
                response.gold = self.sync.try_refresh_gold_prices().await?.quotes;
            }
            TriggerKind::All => {
                let summary = self.sync.try_refresh_crypto_stock_prices().await?;
                response.crypto = collect(&summary.crypto, &mut errors);
                response.domestic_stock = collect(&summary.domestic_stock, &mut errors);
                response.foreign_stock = collect(&summary.foreign_stock, &mut errors);
                response.gold = self.sync.try_refresh_gold_prices().await?.quotes;
            }
        }

        response.success = errors.is_empty();
        response.message = if errors.is_empty() {
            format!("Price update completed for {kind}")
        } else {
            format!("Price update for {kind} finished with errors: {}", errors.join("; "))
        };
        Ok(response)
    }
}

fn collect(outcome: &BucketOutcome, errors: &mut Vec<String>) -> usize {
    if let Some(err) = &outcome.error {
        errors.push(format!("{}: {err}", outcome.market));
    }
    outcome.written
}
