use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::owner::OwnerScope;
use crate::errors::CoreError;

/// Calendar month key, serialized as `"YYYY-MM"`.
///
/// Ordering is chronological, which is also the lexical order of the string
/// form, so month-descending queries can sort on either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, CoreError> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return Err(CoreError::ValidationError(format!(
                "Invalid month key: {year:04}-{month:02}"
            )));
        }
        Ok(Self { year, month })
    }

    /// Month containing the given instant, in UTC.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn current() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month immediately before this one.
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for MonthKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::ValidationError(format!("Invalid month key: '{s}' (expected YYYY-MM)"));
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.to_string()
    }
}

/// Kind of balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryType {
    Income,
    Spending,
    Investment,
}

impl LedgerEntryType {
    /// Signed delta applied to the balance for a positive `amount`.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            LedgerEntryType::Income => amount,
            LedgerEntryType::Spending | LedgerEntryType::Investment => -amount,
        }
    }
}

impl std::fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerEntryType::Income => write!(f, "income"),
            LedgerEntryType::Spending => write!(f, "spending"),
            LedgerEntryType::Investment => write!(f, "investment"),
        }
    }
}

/// Monthly aggregate of income, spending and investment for one owner scope.
///
/// Stored at `{partition}/availableBalance/{YYYY-MM}`. Created lazily on the
/// first mutation of a month and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRecord {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub couple_id: Option<String>,
    pub month: MonthKey,
    /// Available balance at the end of the latest mutation.
    pub balance: Decimal,
    /// Balance carried over from the latest prior month when this record was opened.
    #[serde(default)]
    pub opening_balance: Decimal,
    #[serde(default)]
    pub income_added: Decimal,
    #[serde(default)]
    pub spending_deducted: Decimal,
    #[serde(default)]
    pub investment_deducted: Decimal,
    #[serde(default)]
    pub net_change: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BalanceRecord {
    /// A fresh record for `month`, starting from the carried-over balance.
    pub fn open(owner: &OwnerScope, month: MonthKey, opening_balance: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            user_id: owner.user_id.clone(),
            couple_id: owner.couple_id.clone(),
            month,
            balance: opening_balance,
            opening_balance,
            income_added: Decimal::ZERO,
            spending_deducted: Decimal::ZERO,
            investment_deducted: Decimal::ZERO,
            net_change: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a positive `amount` of the given kind. Returns the signed delta.
    pub fn apply(&mut self, entry_type: LedgerEntryType, amount: Decimal, now: DateTime<Utc>) -> Decimal {
        match entry_type {
            LedgerEntryType::Income => self.income_added += amount,
            LedgerEntryType::Spending => self.spending_deducted += amount,
            LedgerEntryType::Investment => self.investment_deducted += amount,
        }
        let delta = entry_type.signed(amount);
        self.balance += delta;
        self.net_change = self.computed_net_change();
        self.updated_at = now;
        delta
    }

    pub fn computed_net_change(&self) -> Decimal {
        self.income_added - self.spending_deducted - self.investment_deducted
    }

    /// `net_change` matches the accumulators and the balance matches opening + net.
    pub fn is_consistent(&self) -> bool {
        self.net_change == self.computed_net_change()
            && self.balance == self.opening_balance + self.net_change
    }
}

/// Immutable audit entry for one balance mutation.
///
/// Stored in `{partition}/availableBalanceTransactions/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub couple_id: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: LedgerEntryType,
    /// Positive for income, negative for spending and investment.
    pub amount: Decimal,
    pub description: String,
    /// Id of the income, transaction or investment that caused this entry.
    pub source_id: String,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub month: MonthKey,
    /// Version of the monthly record produced by this entry.
    #[serde(default)]
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn is_consistent(&self) -> bool {
        self.balance_after - self.balance_before == self.amount
    }
}
