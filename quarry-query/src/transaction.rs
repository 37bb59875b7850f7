//! Transaction configuration and lifecycle.
//!
//! A transaction moves through a small state machine:
//!
//! ```text
//! open ──commit──▶ committing ──▶ committed
//!   │
//!   ├──rollback──▶ rolling-back ──▶ rolled-back
//!   │
//!   └──failure───▶ aborted ──▶ rolling-back ──▶ rolled-back
//! ```
//!
//! Only an open transaction accepts statements. An aborted one rejects them
//! with [`ErrorCode::TransactionAborted`](crate::ErrorCode::TransactionAborted)
//! and can only roll back; finished ones reject everything with
//! [`ErrorCode::TransactionClosed`](crate::ErrorCode::TransactionClosed).
//!
//! ```rust
//! use quarry_query::{TransactionBehavior, TransactionConfig, TransactionState};
//!
//! let config = TransactionConfig::new().behavior(TransactionBehavior::Exclusive);
//! assert_eq!(config.begin_sql(), "BEGIN EXCLUSIVE");
//!
//! let state = TransactionState::Open;
//! assert!(state.ensure_usable().is_ok());
//! assert!(TransactionState::Committed.ensure_usable().is_err());
//! ```

use std::fmt;
use std::time::Duration;

use quarry_schema::TransactionBehavior;
use tracing::debug;

use crate::error::{QueryError, QueryResult};

/// Configuration for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionConfig {
    /// Lock behavior at `BEGIN`.
    pub behavior: TransactionBehavior,
    /// Timeout for the whole transaction block.
    pub timeout: Option<Duration>,
}

impl TransactionConfig {
    /// Create a new transaction config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lock behavior.
    pub fn behavior(mut self, behavior: TransactionBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Set the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Generate the BEGIN statement.
    pub fn begin_sql(&self) -> &'static str {
        debug!(behavior = ?self.behavior, "Transaction BEGIN");
        self.behavior.begin_sql()
    }

    /// The COMMIT statement.
    pub fn commit_sql(&self) -> &'static str {
        "COMMIT"
    }

    /// The ROLLBACK statement.
    pub fn rollback_sql(&self) -> &'static str {
        "ROLLBACK"
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionState {
    /// Accepting statements.
    #[default]
    Open,
    /// A statement failed; only rollback is possible.
    Aborted,
    /// COMMIT issued.
    Committing,
    /// Finished successfully.
    Committed,
    /// ROLLBACK issued.
    RollingBack,
    /// Finished without effect.
    RolledBack,
}

impl TransactionState {
    /// Whether the transaction has reached a final state.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    /// Fail unless statements may run.
    pub fn ensure_usable(&self) -> QueryResult<()> {
        match self {
            Self::Open => Ok(()),
            Self::Aborted => Err(QueryError::transaction_aborted(
                "A previous statement failed; the transaction will roll back",
            )),
            _ => Err(QueryError::transaction_closed()),
        }
    }

    /// Fail unless the transaction may commit.
    pub fn ensure_committable(&self) -> QueryResult<()> {
        self.ensure_usable()
    }

    /// Whether a rollback still has to be issued.
    pub fn needs_rollback(&self) -> bool {
        matches!(self, Self::Open | Self::Aborted)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Aborted => "aborted",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::RollingBack => "rolling-back",
            Self::RolledBack => "rolled-back",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_transaction_config_default() {
        let config = TransactionConfig::new();
        assert_eq!(config.behavior, TransactionBehavior::Immediate);
        assert!(config.timeout.is_none());
        assert_eq!(config.begin_sql(), "BEGIN IMMEDIATE");
    }

    #[test]
    fn test_transaction_config_builder() {
        let config = TransactionConfig::new()
            .behavior(TransactionBehavior::Deferred)
            .timeout(Duration::from_secs(30));

        assert_eq!(config.begin_sql(), "BEGIN DEFERRED");
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.commit_sql(), "COMMIT");
        assert_eq!(config.rollback_sql(), "ROLLBACK");
    }

    #[test]
    fn test_state_usability() {
        assert!(TransactionState::Open.ensure_usable().is_ok());
        assert_eq!(
            TransactionState::Aborted.ensure_usable().unwrap_err().code,
            ErrorCode::TransactionAborted
        );
        for state in [
            TransactionState::Committing,
            TransactionState::Committed,
            TransactionState::RollingBack,
            TransactionState::RolledBack,
        ] {
            assert_eq!(
                state.ensure_usable().unwrap_err().code,
                ErrorCode::TransactionClosed
            );
        }
    }

    #[test]
    fn test_state_rollback_need() {
        assert!(TransactionState::Open.needs_rollback());
        assert!(TransactionState::Aborted.needs_rollback());
        assert!(!TransactionState::Committed.needs_rollback());
        assert!(TransactionState::RolledBack.is_finished());
        assert_eq!(TransactionState::RollingBack.to_string(), "rolling-back");
    }
}
