//! Store trait definitions for testability and dependency injection.
//!
//! These traits are the only write paths for wallet balances and inventory
//! holds. Every balance- or capacity-affecting method is atomic at the store
//! level: the guard (available balance, nightly capacity, external-ref
//! uniqueness, expected current status) and the write happen in a single
//! store step, never as a read-then-write from the caller's side.
//!
//! Two implementations exist: [`PgStore`](super::postgres::PgStore) backed
//! by PostgreSQL, and [`MemoryStore`](super::memory::MemoryStore) for tests
//! and local development.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingId, BookingResult, BookingStatus, NewBooking, PaymentStatus};
use crate::coupon::{CouponResult, NewOffer, Offer};
use crate::inventory::{InventoryResult, NewRoomType, RoomType, RoomTypeId};
use crate::wallet::{
    BankDetails, OwnerId, OwnerKind, TransactionId, TxCategory, Wallet, WalletId,
    WalletLifecycle, WalletResult, WalletTransaction, WithdrawalRequest, WithdrawalStatus,
};

/// Settlement outcome for a pending transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Apply the signed amount to the wallet balance.
    Completed,
    /// Release the hold; the balance is untouched.
    Failed,
}

/// Trait for wallet ledger operations.
///
/// The transaction log is the source of truth; `Wallet::balance` is a
/// materialized projection of it. Methods that create a `completed`
/// transaction apply the balance delta in the same atomic step.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Get wallet by id.
    async fn get_wallet(&self, wallet_id: WalletId) -> WalletResult<Wallet>;

    /// Find a principal's wallet, if one exists yet.
    async fn find_wallet_by_owner(
        &self,
        owner_id: OwnerId,
        kind: OwnerKind,
    ) -> WalletResult<Option<Wallet>>;

    /// Get a principal's wallet, creating an empty one on first use.
    async fn get_or_create_wallet(&self, owner_id: OwnerId, kind: OwnerKind)
    -> WalletResult<Wallet>;

    /// Freeze or reactivate a wallet.
    async fn set_lifecycle(
        &self,
        wallet_id: WalletId,
        lifecycle: WalletLifecycle,
    ) -> WalletResult<Wallet>;

    /// Record a settled credit and apply it to the balance atomically.
    ///
    /// Fails with `DuplicateTransaction` if `external_ref` is already taken.
    async fn credit_completed(
        &self,
        wallet_id: WalletId,
        amount: i64,
        category: TxCategory,
        external_ref: Option<&str>,
        description: Option<&str>,
    ) -> WalletResult<WalletTransaction>;

    /// Record a pending credit awaiting gateway confirmation.
    ///
    /// `external_ref` is mandatory here: it is the idempotency key a later
    /// settlement is matched by.
    async fn credit_pending(
        &self,
        wallet_id: WalletId,
        amount: i64,
        category: TxCategory,
        external_ref: &str,
        description: Option<&str>,
    ) -> WalletResult<WalletTransaction>;

    /// Record a settled debit, guarded by the available balance
    /// (recorded balance minus pending debit holds) in the same step.
    async fn debit_completed(
        &self,
        wallet_id: WalletId,
        amount: i64,
        category: TxCategory,
        external_ref: Option<&str>,
        description: Option<&str>,
    ) -> WalletResult<WalletTransaction>;

    /// Record a pending debit hold (withdrawal reservation), guarded by the
    /// available balance in the same step. The recorded balance is not
    /// touched until the hold settles.
    async fn debit_pending(
        &self,
        wallet_id: WalletId,
        amount: i64,
        category: TxCategory,
        description: Option<&str>,
    ) -> WalletResult<WalletTransaction>;

    /// Settle a pending transaction exactly once.
    ///
    /// `Completed` applies the signed amount to the balance; `Failed`
    /// releases the hold. A transaction whose status already left `pending`
    /// yields `ImmutableTransaction` - settled history is never rewritten.
    async fn settle_transaction(
        &self,
        transaction_id: TransactionId,
        outcome: SettleOutcome,
    ) -> WalletResult<WalletTransaction>;

    /// Look up a transaction by its gateway reference.
    async fn find_transaction_by_ref(
        &self,
        external_ref: &str,
    ) -> WalletResult<Option<WalletTransaction>>;

    /// Most recent transactions for a wallet.
    async fn transactions(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> WalletResult<Vec<WalletTransaction>>;

    /// Signed sum of completed transactions; the recomputed balance.
    async fn completed_sum(&self, wallet_id: WalletId) -> WalletResult<i64>;

    /// Sum of pending debit holds counted against the available balance.
    async fn pending_debit_total(&self, wallet_id: WalletId) -> WalletResult<i64>;

    /// Fail every gateway-keyed pending transaction created before `cutoff`.
    ///
    /// Pendings without an `external_ref` are not waiting on the gateway
    /// (withdrawal holds wait on review) and are left alone. A swept
    /// transaction can never be completed later; a legitimate gateway event
    /// arriving afterwards is treated as a duplicate.
    async fn sweep_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> WalletResult<Vec<WalletTransaction>>;

    /// Record a withdrawal request linked to its pending debit hold.
    async fn insert_withdrawal(
        &self,
        wallet_id: WalletId,
        transaction_id: TransactionId,
        amount: i64,
        bank_details: &BankDetails,
    ) -> WalletResult<WithdrawalRequest>;

    /// Get withdrawal request by id.
    async fn get_withdrawal(&self, id: i64) -> WalletResult<WithdrawalRequest>;

    /// Move a withdrawal from `expected` to `to`, failing if a concurrent
    /// reviewer got there first.
    async fn update_withdrawal_status(
        &self,
        id: i64,
        expected: WithdrawalStatus,
        to: WithdrawalStatus,
    ) -> WalletResult<WithdrawalRequest>;

    /// Withdrawal requests for a wallet, newest first.
    async fn withdrawals(&self, wallet_id: WalletId) -> WalletResult<Vec<WithdrawalRequest>>;
}

/// Trait for nightly inventory operations.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Get room type by id.
    async fn get_room_type(&self, id: RoomTypeId) -> InventoryResult<RoomType>;

    /// Insert a room type (onboarding boundary; used here for seeding).
    async fn insert_room_type(&self, new: NewRoomType) -> InventoryResult<RoomType>;

    /// Hold `rooms` units per night across `[check_in, check_out)` for the
    /// booking reference, all-or-nothing. Either every night has capacity
    /// and all holds are written, or nothing is and `OutOfInventory` names
    /// the first full night.
    async fn reserve(
        &self,
        room_type_id: RoomTypeId,
        reference: Uuid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        rooms: i32,
    ) -> InventoryResult<()>;

    /// Drop every hold for a booking reference. Idempotent; returns the
    /// number of holds released.
    async fn release(&self, reference: Uuid) -> InventoryResult<u64>;

    /// Units held for a room type on one night.
    async fn held_on(&self, room_type_id: RoomTypeId, night: NaiveDate) -> InventoryResult<i64>;
}

/// Trait for booking persistence.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Insert a booking row.
    async fn insert_booking(&self, new: NewBooking) -> BookingResult<Booking>;

    /// Get booking by id.
    async fn get_booking(&self, id: BookingId) -> BookingResult<Booking>;

    /// Find booking by external reference.
    async fn find_by_reference(&self, reference: Uuid) -> BookingResult<Option<Booking>>;

    /// Find booking by its gateway order id.
    async fn find_by_payment_ref(&self, payment_ref: &str) -> BookingResult<Option<Booking>>;

    /// Attach the gateway order id created for the prepaid flow.
    async fn set_payment_ref(&self, id: BookingId, payment_ref: &str) -> BookingResult<Booking>;

    /// Compare-and-set status transition: applies `to` only while the row
    /// still holds `expected`, so two racing transitions cannot both win.
    async fn transition_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        to: BookingStatus,
    ) -> BookingResult<Booking>;

    /// Set the payment status, independent of the booking lifecycle.
    async fn set_payment_status(
        &self,
        id: BookingId,
        payment_status: PaymentStatus,
    ) -> BookingResult<Booking>;

    /// Bookings for a user, newest first.
    async fn bookings_for_user(&self, user_id: OwnerId, limit: i64)
    -> BookingResult<Vec<Booking>>;

    /// Active bookings (confirmed or checked-in) whose checkout date has
    /// passed, eligible for the scheduled completion rollover.
    async fn due_for_completion(&self, today: NaiveDate) -> BookingResult<Vec<Booking>>;
}

/// Trait for offer lookup and usage accounting.
#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Find an offer by canonical code.
    async fn find_offer(&self, canonical_code: &str) -> CouponResult<Option<Offer>>;

    /// Insert an offer (admin boundary; used here for seeding).
    async fn insert_offer(&self, new: NewOffer) -> CouponResult<Offer>;

    /// How many of the user's bookings carry this code, excluding cancelled
    /// and no-show bookings whose usage was given back.
    async fn coupon_usage(&self, user_id: OwnerId, canonical_code: &str) -> CouponResult<i64>;
}
