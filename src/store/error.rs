//! Store error types

use uuid::Uuid;

/// Classified failures from the ledger store.
///
/// Every non-success path out of a unit of work maps to exactly one of
/// these; nothing is swallowed or partially compensated.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("account not found: {0}")]
    AccountNotFound(i64),

    #[error("entry not found: {0}")]
    EntryNotFound(i64),

    #[error("transfer not found: {0}")]
    TransferNotFound(i64),

    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("invalid transfer amount: {0}")]
    InvalidAmount(i64),

    #[error("insufficient balance on account {account_id}: has {balance}, transfer needs {requested}")]
    InsufficientBalance {
        account_id: i64,
        balance: i64,
        requested: i64,
    },

    /// Commit-time serialization failure. The unit rolled back in full, so
    /// the caller may retry the whole call.
    #[error("serialization conflict at commit")]
    Conflict,

    #[error("store unavailable: {0}")]
    Unavailable(sqlx::Error),
}

impl StoreError {
    /// Whether retrying the whole call can succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict | StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // 40001 = serialization_failure, 40P01 = deadlock_detected. Both
        // mean the unit rolled back with no state persisted.
        if let Some(db) = err.as_database_error() {
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
                return StoreError::Conflict;
            }
        }
        StoreError::Unavailable(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(StoreError::Conflict.is_retryable());
        assert!(StoreError::Unavailable(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!StoreError::AccountNotFound(7).is_retryable());
        assert!(!StoreError::InvalidAmount(0).is_retryable());
        assert!(!StoreError::InsufficientBalance {
            account_id: 7,
            balance: 10,
            requested: 100
        }
        .is_retryable());
    }
}
