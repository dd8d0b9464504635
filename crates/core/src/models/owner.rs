use serde::{Deserialize, Serialize};

/// Partition key for ledger data: a single user, or a couple sharing a ledger.
///
/// When `couple_id` is set the couple's partition is used and `user_id`
/// records who performed the mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerScope {
    pub user_id: String,
    #[serde(default)]
    pub couple_id: Option<String>,
}

impl OwnerScope {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            couple_id: None,
        }
    }

    pub fn couple(user_id: impl Into<String>, couple_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            couple_id: Some(couple_id.into()),
        }
    }

    /// `couples/{id}` for a shared ledger, `users/{id}` otherwise.
    pub fn partition(&self) -> String {
        match &self.couple_id {
            Some(couple_id) => format!("couples/{couple_id}"),
            None => format!("users/{}", self.user_id),
        }
    }

    /// Collection holding one `BalanceRecord` per month.
    pub fn balance_collection(&self) -> String {
        format!("{}/availableBalance", self.partition())
    }

    /// Collection holding the append-only `LedgerTransaction` log.
    pub fn transaction_collection(&self) -> String {
        format!("{}/availableBalanceTransactions", self.partition())
    }
}

impl std::fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.partition())
    }
}
