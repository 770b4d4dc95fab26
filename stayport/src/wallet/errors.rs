//! Wallet error types.

use thiserror::Error;

use super::models::WithdrawalStatus;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Insufficient available balance (recorded balance minus pending holds)
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: i64, required: i64 },

    /// Wallet not found
    #[error("Wallet not found: {0}")]
    WalletNotFound(i64),

    /// Wallet is frozen and rejects balance-affecting operations
    #[error("Wallet {0} is frozen")]
    WalletFrozen(i64),

    /// Invalid amount (must be positive)
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// External reference already used by another transaction
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(i64),

    /// Transaction already settled; settled transactions are immutable
    #[error("Transaction {id} is {status} and cannot be settled again")]
    ImmutableTransaction { id: i64, status: String },

    /// Withdrawal below the configured minimum
    #[error("Withdrawal amount {requested} is below the minimum of {minimum}")]
    BelowMinimumWithdrawal { minimum: i64, requested: i64 },

    /// Withdrawal request not found
    #[error("Withdrawal request not found: {0}")]
    WithdrawalNotFound(i64),

    /// Withdrawal is not in the state the operation expects
    #[error("Withdrawal {id} is {actual}, expected {expected}")]
    InvalidWithdrawalState {
        id: i64,
        expected: WithdrawalStatus,
        actual: WithdrawalStatus,
    },

    /// Balance arithmetic overflow
    #[error("Balance overflow")]
    BalanceOverflow,
}

impl WalletError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Database errors are sanitized to prevent information disclosure about
    /// the internal system structure, and wallet IDs are redacted.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            // Sanitize database errors - don't expose SQL details
            WalletError::Database(_) => "Internal server error".to_string(),
            WalletError::WalletNotFound(_) => "Wallet not found".to_string(),
            WalletError::TransactionNotFound(_) => "Transaction not found".to_string(),
            WalletError::ImmutableTransaction { .. } => {
                "Transaction already settled".to_string()
            }
            // All other errors state the limiting constraint and are safe to expose
            _ => self.to_string(),
        }
    }

    /// Whether the caller may retry the operation with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::Database(_))
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;
