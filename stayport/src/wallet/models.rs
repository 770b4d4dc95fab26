//! Wallet data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wallet ID type
pub type WalletId = i64;

/// Principal (user or partner account) ID type
pub type OwnerId = i64;

/// Transaction ID type
pub type TransactionId = i64;

/// Kind of principal a wallet belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Guest,
    Partner,
}

impl OwnerKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OwnerKind::Guest => "guest",
            OwnerKind::Partner => "partner",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "guest" => Some(OwnerKind::Guest),
            "partner" => Some(OwnerKind::Partner),
            _ => None,
        }
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wallet lifecycle state. Wallets are never deleted, only frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletLifecycle {
    Active,
    Frozen,
}

impl WalletLifecycle {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            WalletLifecycle::Active => "active",
            WalletLifecycle::Frozen => "frozen",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(WalletLifecycle::Active),
            "frozen" => Some(WalletLifecycle::Frozen),
            _ => None,
        }
    }
}

/// Wallet model.
///
/// `balance` is a materialized projection: it always equals the signed sum
/// of completed transactions for the wallet, and is recomputable from the
/// transaction log for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner_id: OwnerId,
    pub owner_kind: OwnerKind,
    /// Balance in minor currency units.
    pub balance: i64,
    pub lifecycle: WalletLifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Transaction direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
    Credit,
    Debit,
}

impl TxDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TxDirection::Credit => "credit",
            TxDirection::Debit => "debit",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(TxDirection::Credit),
            "debit" => Some(TxDirection::Debit),
            _ => None,
        }
    }

    /// Sign applied to `amount` when summing the ledger.
    #[must_use]
    pub const fn sign(self) -> i64 {
        match self {
            TxDirection::Credit => 1,
            TxDirection::Debit => -1,
        }
    }
}

/// Transaction category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxCategory {
    BookingPayout,
    Topup,
    Withdrawal,
    Refund,
    Commission,
    Manual,
}

impl TxCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TxCategory::BookingPayout => "booking_payout",
            TxCategory::Topup => "topup",
            TxCategory::Withdrawal => "withdrawal",
            TxCategory::Refund => "refund",
            TxCategory::Commission => "commission",
            TxCategory::Manual => "manual",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booking_payout" => Some(TxCategory::BookingPayout),
            "topup" => Some(TxCategory::Topup),
            "withdrawal" => Some(TxCategory::Withdrawal),
            "refund" => Some(TxCategory::Refund),
            "commission" => Some(TxCategory::Commission),
            "manual" => Some(TxCategory::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for TxCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction settlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

impl TxStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Completed => "completed",
            TxStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TxStatus::Pending),
            "completed" => Some(TxStatus::Completed),
            "failed" => Some(TxStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger entry. Immutable once `status` leaves `pending`.
///
/// `external_ref`, when present, is unique across all transactions and acts
/// as the idempotency key for gateway events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub direction: TxDirection,
    /// Always positive; the direction carries the sign.
    pub amount: i64,
    pub category: TxCategory,
    pub status: TxStatus,
    pub external_ref: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl WalletTransaction {
    /// Signed contribution of this transaction to the wallet balance.
    /// Only completed transactions contribute.
    #[must_use]
    pub fn signed_amount(&self) -> i64 {
        match self.status {
            TxStatus::Completed => self.direction.sign() * self.amount,
            TxStatus::Pending | TxStatus::Failed => 0,
        }
    }
}

/// Withdrawal request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl WithdrawalStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
            WithdrawalStatus::Paid => "paid",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WithdrawalStatus::Pending),
            "approved" => Some(WithdrawalStatus::Approved),
            "rejected" => Some(WithdrawalStatus::Rejected),
            "paid" => Some(WithdrawalStatus::Paid),
            _ => None,
        }
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bank account details captured at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub account_name: String,
    pub account_number: String,
    pub ifsc_code: String,
}

/// Withdrawal request.
///
/// The requested amount is held against the wallet's *available* balance via
/// a linked pending debit transaction. Rejection settles that debit to
/// `failed`, which releases the hold without touching history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: i64,
    pub wallet_id: WalletId,
    /// The pending debit transaction holding the amount.
    pub transaction_id: TransactionId,
    pub amount: i64,
    pub status: WithdrawalStatus,
    pub bank_details: BankDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
