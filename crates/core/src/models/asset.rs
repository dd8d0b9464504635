use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::owner::OwnerScope;

/// The type/category of a tracked investment.
/// Determines which price feed refreshes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Cryptocurrencies (BTC, ETH, etc.) — CoinGecko
    Crypto,
    /// Listed equities — CafeF for the domestic board, Yahoo / Alpha Vantage otherwise
    Stock,
    /// Physical gold — PNJ
    Gold,
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetType::Crypto => write!(f, "crypto"),
            AssetType::Stock => write!(f, "stock"),
            AssetType::Gold => write!(f, "gold"),
        }
    }
}

/// Price-feed bucket used by the crypto/stock refresh job.
///
/// Buckets are fetched independently; one failing never affects the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Market {
    Crypto,
    DomesticStock,
    ForeignStock,
}

impl Market {
    pub const ALL: [Market; 3] = [Market::Crypto, Market::DomesticStock, Market::ForeignStock];
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Market::Crypto => write!(f, "crypto"),
            Market::DomesticStock => write!(f, "domestic-stock"),
            Market::ForeignStock => write!(f, "foreign-stock"),
        }
    }
}

/// An investment position recorded by a user, stored in `investments/{id}`.
///
/// The synchronizer reads these to decide which symbols to refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investment {
    pub id: Uuid,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub couple_id: Option<String>,
    /// Ticker symbol, uppercased (e.g., "BTC", "VNM", "AAPL", "SJC")
    pub symbol: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub quantity: f64,
    /// Cash paid, deducted from the available balance.
    pub total_cost: Decimal,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Investment {
    pub fn new(
        owner: &OwnerScope,
        symbol: impl Into<String>,
        asset_type: AssetType,
        quantity: f64,
        total_cost: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: owner.user_id.clone(),
            couple_id: owner.couple_id.clone(),
            symbol: symbol.into().trim().to_uppercase(),
            asset_type,
            quantity,
            total_cost,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    pub fn owner(&self) -> OwnerScope {
        OwnerScope {
            user_id: self.user_id.clone(),
            couple_id: self.couple_id.clone(),
        }
    }
}
