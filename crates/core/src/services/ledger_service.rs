use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::balance::{BalanceRecord, LedgerEntryType, LedgerTransaction, MonthKey};
use crate::models::owner::OwnerScope;
use crate::storage::{to_document, DocumentStore};

/// Conditional-write attempts per mutation before giving up with `Conflict`.
pub const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Tracks the available balance of a user or couple.
///
/// Every mutation:
/// 1. reads the current month's record (opening it from the latest prior
///    month's balance if this is the first mutation of the month),
/// 2. writes the updated record back, conditional on the version it read,
/// 3. appends an immutable [`LedgerTransaction`].
///
/// Mutations for one owner scope are serialized in-process. Writers in other
/// processes are caught by the version check in step 2; on `Conflict` steps
/// 1-2 are re-run, up to [`MAX_WRITE_ATTEMPTS`] times.
///
/// There is no compensation: if step 3 fails after step 2 succeeded, the
/// error is returned and the record keeps the new balance.
pub struct LedgerService {
    store: Arc<dyn DocumentStore>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Balance of the current month, else of the latest earlier month, else 0.
    pub async fn get_current_balance(&self, owner: &OwnerScope) -> Result<Decimal, CoreError> {
        let month = MonthKey::current();
        if let Some(doc) = self
            .store
            .get(&owner.balance_collection(), &month.to_string())
            .await?
        {
            return Ok(doc.decode::<BalanceRecord>()?.balance);
        }
        self.balance_before_month(owner, month).await
    }

    pub async fn add_income(
        &self,
        owner: &OwnerScope,
        amount: Decimal,
        description: &str,
        source_id: &str,
    ) -> Result<LedgerTransaction, CoreError> {
        self.mutate(owner, LedgerEntryType::Income, amount, description, source_id)
            .await
    }

    /// The balance may go negative; overspending is recorded, not refused.
    pub async fn deduct_spending(
        &self,
        owner: &OwnerScope,
        amount: Decimal,
        description: &str,
        source_id: &str,
    ) -> Result<LedgerTransaction, CoreError> {
        self.mutate(owner, LedgerEntryType::Spending, amount, description, source_id)
            .await
    }

    pub async fn deduct_investment(
        &self,
        owner: &OwnerScope,
        amount: Decimal,
        description: &str,
        source_id: &str,
    ) -> Result<LedgerTransaction, CoreError> {
        self.mutate(owner, LedgerEntryType::Investment, amount, description, source_id)
            .await
    }

    /// Monthly records, newest month first.
    pub async fn get_balance_history(&self, owner: &OwnerScope) -> Result<Vec<BalanceRecord>, CoreError> {
        let mut records = self.load_records(owner).await?;
        records.sort_by(|a, b| b.month.cmp(&a.month));
        Ok(records)
    }

    /// Ledger entries, newest first.
    pub async fn get_transaction_history(
        &self,
        owner: &OwnerScope,
    ) -> Result<Vec<LedgerTransaction>, CoreError> {
        let docs = self.store.list(&owner.transaction_collection()).await?;
        let mut entries = docs
            .iter()
            .map(|d| d.decode::<LedgerTransaction>())
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| {
            (b.timestamp, b.month, b.sequence).cmp(&(a.timestamp, a.month, a.sequence))
        });
        Ok(entries)
    }

    async fn mutate(
        &self,
        owner: &OwnerScope,
        entry_type: LedgerEntryType,
        amount: Decimal,
        description: &str,
        source_id: &str,
    ) -> Result<LedgerTransaction, CoreError> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::ValidationError(format!(
                "{entry_type} amount must be positive, got {amount}"
            )));
        }

        let lock = self.owner_lock(owner);
        let result = {
            let _guard = lock.lock().await;
            self.mutate_with_retry(owner, entry_type, amount, description, source_id)
                .await
        };
        self.release_lock(owner, lock);
        result
    }

    async fn mutate_with_retry(
        &self,
        owner: &OwnerScope,
        entry_type: LedgerEntryType,
        amount: Decimal,
        description: &str,
        source_id: &str,
    ) -> Result<LedgerTransaction, CoreError> {
        let mut attempt = 1;
        loop {
            match self
                .try_mutate(owner, entry_type, amount, description, source_id)
                .await
            {
                Err(CoreError::Conflict { collection, id }) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(
                        "Balance record {collection}/{id} changed concurrently (attempt {attempt}/{MAX_WRITE_ATTEMPTS}), retrying"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_mutate(
        &self,
        owner: &OwnerScope,
        entry_type: LedgerEntryType,
        amount: Decimal,
        description: &str,
        source_id: &str,
    ) -> Result<LedgerTransaction, CoreError> {
        let now = Utc::now();
        let month = MonthKey::from_datetime(now);
        let collection = owner.balance_collection();
        let month_id = month.to_string();

        let (mut record, expected_version) = match self.store.get(&collection, &month_id).await? {
            Some(doc) => (doc.decode::<BalanceRecord>()?, Some(doc.version)),
            None => {
                let opening = self.balance_before_month(owner, month).await?;
                debug!("Opening {month} for {owner} with carried balance {opening}");
                (BalanceRecord::open(owner, month, opening, now), None)
            }
        };

        let balance_before = record.balance;
        let delta = record.apply(entry_type, amount, now);
        let version = self
            .store
            .set_if_version(&collection, &month_id, to_document(&record)?, expected_version)
            .await?;

        let entry = LedgerTransaction {
            id: Uuid::new_v4(),
            user_id: owner.user_id.clone(),
            couple_id: owner.couple_id.clone(),
            entry_type,
            amount: delta,
            description: description.to_string(),
            source_id: source_id.to_string(),
            balance_before,
            balance_after: record.balance,
            month,
            sequence: version,
            timestamp: now,
        };
        self.store
            .set(
                &owner.transaction_collection(),
                &entry.id.to_string(),
                to_document(&entry)?,
            )
            .await?;

        info!(
            "{owner}: {entry_type} {amount} ({balance_before} -> {})",
            record.balance
        );
        Ok(entry)
    }

    /// Balance of the latest month strictly before `month`, or 0.
    async fn balance_before_month(&self, owner: &OwnerScope, month: MonthKey) -> Result<Decimal, CoreError> {
        // Usual case: the owner was active last month.
        if let Some(doc) = self
            .store
            .get(&owner.balance_collection(), &month.previous().to_string())
            .await?
        {
            return Ok(doc.decode::<BalanceRecord>()?.balance);
        }
        Ok(self
            .load_records(owner)
            .await?
            .into_iter()
            .filter(|r| r.month < month)
            .max_by_key(|r| r.month)
            .map(|r| r.balance)
            .unwrap_or(Decimal::ZERO))
    }

    async fn load_records(&self, owner: &OwnerScope) -> Result<Vec<BalanceRecord>, CoreError> {
        self.store
            .list(&owner.balance_collection())
            .await?
            .iter()
            .map(|d| d.decode::<BalanceRecord>())
            .collect()
    }

    /// Owner scopes that currently have a mutation in flight or queued.
    pub fn active_partitions(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn owner_lock(&self, owner: &OwnerScope) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(owner.partition()).or_default().clone()
    }

    /// Drop the partition's lock once no other mutation holds or awaits it.
    /// Clones are only taken under the map lock, so the count is stable here.
    fn release_lock(&self, owner: &OwnerScope, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let key = owner.partition();
        // One reference in the map, one held here.
        if locks.get(&key).is_some_and(|held| Arc::ptr_eq(held, &lock)) && Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }
    }
}
