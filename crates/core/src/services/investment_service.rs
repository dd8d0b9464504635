use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::errors::CoreError;
use crate::models::asset::{AssetType, Investment};
use crate::models::balance::LedgerTransaction;
use crate::models::owner::OwnerScope;
use crate::storage::{to_document, DocumentStore};

use super::ledger_service::LedgerService;

pub const INVESTMENTS: &str = "investments";

/// Distinct symbols currently held, grouped by asset type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldSymbols {
    pub crypto: BTreeSet<String>,
    pub stock: BTreeSet<String>,
    pub gold: BTreeSet<String>,
}

/// Every symbol across all investments. Documents that fail to decode are
/// skipped with a warning.
pub async fn load_held_symbols(store: &dyn DocumentStore) -> Result<HeldSymbols, CoreError> {
    let mut held = HeldSymbols::default();
    for doc in store.list(INVESTMENTS).await? {
        let investment = match doc.decode::<Investment>() {
            Ok(inv) => inv,
            Err(e) => {
                warn!("Skipping investment {}: {e}", doc.id);
                continue;
            }
        };
        let symbol = investment.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            continue;
        }
        match investment.asset_type {
            AssetType::Crypto => held.crypto.insert(symbol),
            AssetType::Stock => held.stock.insert(symbol),
            AssetType::Gold => held.gold.insert(symbol),
        };
    }
    Ok(held)
}

/// Records investment purchases and charges them to the ledger.
pub struct InvestmentService {
    store: Arc<dyn DocumentStore>,
    ledger: Arc<LedgerService>,
}

impl InvestmentService {
    pub fn new(store: Arc<dyn DocumentStore>, ledger: Arc<LedgerService>) -> Self {
        Self { store, ledger }
    }

    /// Persist the investment, then deduct its cost from the available
    /// balance with the investment id as the ledger source.
    pub async fn record_investment(
        &self,
        owner: &OwnerScope,
        symbol: &str,
        asset_type: AssetType,
        quantity: f64,
        total_cost: Decimal,
        description: &str,
    ) -> Result<(Investment, LedgerTransaction), CoreError> {
        if symbol.trim().is_empty() {
            return Err(CoreError::ValidationError("Symbol must not be empty".into()));
        }
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(CoreError::ValidationError(format!(
                "Quantity must be positive, got {quantity}"
            )));
        }
        if total_cost <= Decimal::ZERO {
            return Err(CoreError::ValidationError(format!(
                "Total cost must be positive, got {total_cost}"
            )));
        }

        let investment = Investment::new(owner, symbol, asset_type, quantity, total_cost, description);
        let id = investment.id.to_string();
        self.store
            .set(INVESTMENTS, &id, to_document(&investment)?)
            .await?;

        let label = if description.is_empty() {
            format!("Investment: {} {}", investment.quantity, investment.symbol)
        } else {
            description.to_string()
        };
        let entry = self
            .ledger
            .deduct_investment(owner, total_cost, &label, &id)
            .await?;

        info!("{owner}: recorded {asset_type} investment {} ({total_cost})", investment.symbol);
        Ok((investment, entry))
    }

    /// Investments belonging to the owner scope, newest first.
    ///
    /// A couple scope sees the couple's investments; a single-user scope
    /// sees only that user's personal ones.
    pub async fn list_investments(&self, owner: &OwnerScope) -> Result<Vec<Investment>, CoreError> {
        let mut investments: Vec<Investment> = self
            .store
            .list(INVESTMENTS)
            .await?
            .iter()
            .map(|d| d.decode::<Investment>())
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|inv| match &owner.couple_id {
                Some(couple) => inv.couple_id.as_ref() == Some(couple),
                None => inv.couple_id.is_none() && inv.user_id == owner.user_id,
            })
            .collect();
        investments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(investments)
    }

    pub async fn held_symbols(&self) -> Result<HeldSymbols, CoreError> {
        load_held_symbols(self.store.as_ref()).await
    }
}
