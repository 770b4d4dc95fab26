//! Wallet ledger module.
//!
//! The wallet system is append-only: money movements are transactions, and
//! a wallet's balance is the signed sum of its completed transactions,
//! materialized for reads. Pending transactions either hold funds
//! (withdrawals) or await settlement (gateway credits); settled transactions
//! are immutable. Corrections are compensating entries, never edits.

pub mod errors;
pub mod models;
pub mod service;

pub use errors::{WalletError, WalletResult};
pub use models::{
    BankDetails, OwnerId, OwnerKind, TransactionId, TxCategory, TxDirection, TxStatus, Wallet,
    WalletId, WalletLifecycle, WalletTransaction, WithdrawalRequest, WithdrawalStatus,
};
pub use service::WalletService;
