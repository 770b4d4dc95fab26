//! In-memory store backend.
//!
//! Every operation runs inside one mutex critical section, which makes the
//! per-wallet and per-(unit, night) serializability guarantees trivial. Used
//! by the test suites and by `sp_server --memory` for local development;
//! production runs on [`PgStore`](super::postgres::PgStore).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::booking::{
    Booking, BookingError, BookingId, BookingResult, BookingStatus, NewBooking, PaymentStatus,
};
use crate::coupon::{CouponResult, NewOffer, Offer, canonical_code};
use crate::inventory::{
    InventoryError, InventoryResult, NewRoomType, RoomType, RoomTypeId, nights,
};
use crate::wallet::{
    BankDetails, OwnerId, OwnerKind, TransactionId, TxCategory, TxDirection, TxStatus, Wallet,
    WalletError, WalletId, WalletLifecycle, WalletResult, WalletTransaction, WithdrawalRequest,
    WithdrawalStatus,
};

use super::store::{BookingStore, InventoryStore, LedgerStore, OfferStore, SettleOutcome};

/// One held room-unit for one night.
#[derive(Debug, Clone)]
struct Hold {
    room_type_id: RoomTypeId,
    reference: Uuid,
    night: NaiveDate,
}

#[derive(Debug, Default)]
struct Inner {
    wallets: HashMap<WalletId, Wallet>,
    transactions: Vec<WalletTransaction>,
    withdrawals: Vec<WithdrawalRequest>,
    room_types: HashMap<RoomTypeId, RoomType>,
    holds: Vec<Hold>,
    bookings: Vec<Booking>,
    offers: HashMap<String, Offer>,
    next_wallet_id: i64,
    next_transaction_id: i64,
    next_withdrawal_id: i64,
    next_room_type_id: i64,
    next_booking_id: i64,
    next_offer_id: i64,
}

impl Inner {
    fn next(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn wallet_mut(&mut self, wallet_id: WalletId) -> WalletResult<&mut Wallet> {
        self.wallets
            .get_mut(&wallet_id)
            .ok_or(WalletError::WalletNotFound(wallet_id))
    }

    fn active_wallet_mut(&mut self, wallet_id: WalletId) -> WalletResult<&mut Wallet> {
        let wallet = self.wallet_mut(wallet_id)?;
        if wallet.lifecycle == WalletLifecycle::Frozen {
            return Err(WalletError::WalletFrozen(wallet_id));
        }
        Ok(wallet)
    }

    fn pending_debits(&self, wallet_id: WalletId) -> i64 {
        self.transactions
            .iter()
            .filter(|t| {
                t.wallet_id == wallet_id
                    && t.direction == TxDirection::Debit
                    && t.status == TxStatus::Pending
            })
            .map(|t| t.amount)
            .sum()
    }

    fn check_ref_free(&self, external_ref: Option<&str>) -> WalletResult<()> {
        if let Some(ext) = external_ref
            && self
                .transactions
                .iter()
                .any(|t| t.external_ref.as_deref() == Some(ext))
        {
            return Err(WalletError::DuplicateTransaction(ext.to_string()));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn push_transaction(
        &mut self,
        wallet_id: WalletId,
        direction: TxDirection,
        amount: i64,
        category: TxCategory,
        status: TxStatus,
        external_ref: Option<&str>,
        description: Option<&str>,
    ) -> WalletTransaction {
        let now = Utc::now();
        let tx = WalletTransaction {
            id: Self::next(&mut self.next_transaction_id),
            wallet_id,
            direction,
            amount,
            category,
            status,
            external_ref: external_ref.map(ToString::to_string),
            description: description.map(ToString::to_string),
            created_at: now,
            settled_at: (status != TxStatus::Pending).then_some(now),
        };
        self.transactions.push(tx.clone());
        tx
    }
}

/// In-memory implementation of all store traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store mutex poisoned")
    }
}

fn require_positive(amount: i64) -> WalletResult<()> {
    if amount <= 0 {
        return Err(WalletError::InvalidAmount(amount));
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_wallet(&self, wallet_id: WalletId) -> WalletResult<Wallet> {
        self.lock()
            .wallets
            .get(&wallet_id)
            .cloned()
            .ok_or(WalletError::WalletNotFound(wallet_id))
    }

    async fn find_wallet_by_owner(
        &self,
        owner_id: OwnerId,
        kind: OwnerKind,
    ) -> WalletResult<Option<Wallet>> {
        Ok(self
            .lock()
            .wallets
            .values()
            .find(|w| w.owner_id == owner_id && w.owner_kind == kind)
            .cloned())
    }

    async fn get_or_create_wallet(
        &self,
        owner_id: OwnerId,
        kind: OwnerKind,
    ) -> WalletResult<Wallet> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .wallets
            .values()
            .find(|w| w.owner_id == owner_id && w.owner_kind == kind)
        {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let wallet = Wallet {
            id: Inner::next(&mut inner.next_wallet_id),
            owner_id,
            owner_kind: kind,
            balance: 0,
            lifecycle: WalletLifecycle::Active,
            created_at: now,
            updated_at: now,
        };
        inner.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn set_lifecycle(
        &self,
        wallet_id: WalletId,
        lifecycle: WalletLifecycle,
    ) -> WalletResult<Wallet> {
        let mut inner = self.lock();
        let wallet = inner.wallet_mut(wallet_id)?;
        wallet.lifecycle = lifecycle;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn credit_completed(
        &self,
        wallet_id: WalletId,
        amount: i64,
        category: TxCategory,
        external_ref: Option<&str>,
        description: Option<&str>,
    ) -> WalletResult<WalletTransaction> {
        require_positive(amount)?;
        let mut inner = self.lock();
        inner.check_ref_free(external_ref)?;
        let wallet = inner.active_wallet_mut(wallet_id)?;
        wallet.balance = wallet
            .balance
            .checked_add(amount)
            .ok_or(WalletError::BalanceOverflow)?;
        wallet.updated_at = Utc::now();
        Ok(inner.push_transaction(
            wallet_id,
            TxDirection::Credit,
            amount,
            category,
            TxStatus::Completed,
            external_ref,
            description,
        ))
    }

    async fn credit_pending(
        &self,
        wallet_id: WalletId,
        amount: i64,
        category: TxCategory,
        external_ref: &str,
        description: Option<&str>,
    ) -> WalletResult<WalletTransaction> {
        require_positive(amount)?;
        let mut inner = self.lock();
        inner.check_ref_free(Some(external_ref))?;
        inner.active_wallet_mut(wallet_id)?;
        Ok(inner.push_transaction(
            wallet_id,
            TxDirection::Credit,
            amount,
            category,
            TxStatus::Pending,
            Some(external_ref),
            description,
        ))
    }

    async fn debit_completed(
        &self,
        wallet_id: WalletId,
        amount: i64,
        category: TxCategory,
        external_ref: Option<&str>,
        description: Option<&str>,
    ) -> WalletResult<WalletTransaction> {
        require_positive(amount)?;
        let mut inner = self.lock();
        inner.check_ref_free(external_ref)?;
        let held = inner.pending_debits(wallet_id);
        let wallet = inner.active_wallet_mut(wallet_id)?;
        let available = wallet.balance - held;
        if available < amount {
            return Err(WalletError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        wallet.balance -= amount;
        wallet.updated_at = Utc::now();
        Ok(inner.push_transaction(
            wallet_id,
            TxDirection::Debit,
            amount,
            category,
            TxStatus::Completed,
            external_ref,
            description,
        ))
    }

    async fn debit_pending(
        &self,
        wallet_id: WalletId,
        amount: i64,
        category: TxCategory,
        description: Option<&str>,
    ) -> WalletResult<WalletTransaction> {
        require_positive(amount)?;
        let mut inner = self.lock();
        let held = inner.pending_debits(wallet_id);
        let wallet = inner.active_wallet_mut(wallet_id)?;
        let available = wallet.balance - held;
        if available < amount {
            return Err(WalletError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        Ok(inner.push_transaction(
            wallet_id,
            TxDirection::Debit,
            amount,
            category,
            TxStatus::Pending,
            None,
            description,
        ))
    }

    async fn settle_transaction(
        &self,
        transaction_id: TransactionId,
        outcome: SettleOutcome,
    ) -> WalletResult<WalletTransaction> {
        let mut inner = self.lock();
        let idx = inner
            .transactions
            .iter()
            .position(|t| t.id == transaction_id)
            .ok_or(WalletError::TransactionNotFound(transaction_id))?;
        if inner.transactions[idx].status != TxStatus::Pending {
            return Err(WalletError::ImmutableTransaction {
                id: transaction_id,
                status: inner.transactions[idx].status.to_string(),
            });
        }
        let (wallet_id, direction, amount) = {
            let t = &inner.transactions[idx];
            (t.wallet_id, t.direction, t.amount)
        };
        if outcome == SettleOutcome::Completed {
            let wallet = inner.wallet_mut(wallet_id)?;
            let next_balance = match direction {
                TxDirection::Credit => wallet
                    .balance
                    .checked_add(amount)
                    .ok_or(WalletError::BalanceOverflow)?,
                TxDirection::Debit => wallet.balance - amount,
            };
            wallet.balance = next_balance;
            wallet.updated_at = Utc::now();
        }
        let tx = &mut inner.transactions[idx];
        tx.status = match outcome {
            SettleOutcome::Completed => TxStatus::Completed,
            SettleOutcome::Failed => TxStatus::Failed,
        };
        tx.settled_at = Some(Utc::now());
        Ok(tx.clone())
    }

    async fn find_transaction_by_ref(
        &self,
        external_ref: &str,
    ) -> WalletResult<Option<WalletTransaction>> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .find(|t| t.external_ref.as_deref() == Some(external_ref))
            .cloned())
    }

    async fn transactions(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> WalletResult<Vec<WalletTransaction>> {
        let inner = self.lock();
        Ok(inner
            .transactions
            .iter()
            .rev()
            .filter(|t| t.wallet_id == wallet_id)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn completed_sum(&self, wallet_id: WalletId) -> WalletResult<i64> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .map(WalletTransaction::signed_amount)
            .sum())
    }

    async fn pending_debit_total(&self, wallet_id: WalletId) -> WalletResult<i64> {
        Ok(self.lock().pending_debits(wallet_id))
    }

    async fn sweep_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> WalletResult<Vec<WalletTransaction>> {
        let mut inner = self.lock();
        let now = Utc::now();
        let mut swept = Vec::new();
        for tx in &mut inner.transactions {
            // Only gateway-keyed pendings are waiting on a capture.
            // Withdrawal holds stay until review settles them.
            if tx.status == TxStatus::Pending && tx.external_ref.is_some() && tx.created_at < cutoff
            {
                tx.status = TxStatus::Failed;
                tx.settled_at = Some(now);
                swept.push(tx.clone());
            }
        }
        Ok(swept)
    }

    async fn insert_withdrawal(
        &self,
        wallet_id: WalletId,
        transaction_id: TransactionId,
        amount: i64,
        bank_details: &BankDetails,
    ) -> WalletResult<WithdrawalRequest> {
        let mut inner = self.lock();
        let now = Utc::now();
        let request = WithdrawalRequest {
            id: Inner::next(&mut inner.next_withdrawal_id),
            wallet_id,
            transaction_id,
            amount,
            status: WithdrawalStatus::Pending,
            bank_details: bank_details.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.withdrawals.push(request.clone());
        Ok(request)
    }

    async fn get_withdrawal(&self, id: i64) -> WalletResult<WithdrawalRequest> {
        self.lock()
            .withdrawals
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or(WalletError::WithdrawalNotFound(id))
    }

    async fn update_withdrawal_status(
        &self,
        id: i64,
        expected: WithdrawalStatus,
        to: WithdrawalStatus,
    ) -> WalletResult<WithdrawalRequest> {
        let mut inner = self.lock();
        let request = inner
            .withdrawals
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or(WalletError::WithdrawalNotFound(id))?;
        if request.status != expected {
            return Err(WalletError::InvalidWithdrawalState {
                id,
                expected,
                actual: request.status,
            });
        }
        request.status = to;
        request.updated_at = Utc::now();
        Ok(request.clone())
    }

    async fn withdrawals(&self, wallet_id: WalletId) -> WalletResult<Vec<WithdrawalRequest>> {
        Ok(self
            .lock()
            .withdrawals
            .iter()
            .rev()
            .filter(|w| w.wallet_id == wallet_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn get_room_type(&self, id: RoomTypeId) -> InventoryResult<RoomType> {
        self.lock()
            .room_types
            .get(&id)
            .cloned()
            .ok_or(InventoryError::RoomTypeNotFound(id))
    }

    async fn insert_room_type(&self, new: NewRoomType) -> InventoryResult<RoomType> {
        let mut inner = self.lock();
        let room_type = RoomType {
            id: Inner::next(&mut inner.next_room_type_id),
            property_id: new.property_id,
            name: new.name,
            total_inventory: new.total_inventory,
            price_per_night: new.price_per_night,
            max_occupancy: new.max_occupancy,
            is_active: new.is_active,
        };
        inner.room_types.insert(room_type.id, room_type.clone());
        Ok(room_type)
    }

    async fn reserve(
        &self,
        room_type_id: RoomTypeId,
        reference: Uuid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        rooms: i32,
    ) -> InventoryResult<()> {
        if check_out <= check_in {
            return Err(InventoryError::InvalidRange {
                check_in,
                check_out,
            });
        }
        let mut inner = self.lock();
        let total = inner
            .room_types
            .get(&room_type_id)
            .ok_or(InventoryError::RoomTypeNotFound(room_type_id))?
            .total_inventory;

        // All-or-nothing: check every night before writing any hold.
        for night in nights(check_in, check_out) {
            let held = inner
                .holds
                .iter()
                .filter(|h| h.room_type_id == room_type_id && h.night == night)
                .count() as i64;
            if held + i64::from(rooms) > i64::from(total) {
                return Err(InventoryError::OutOfInventory {
                    room_type_id,
                    night,
                });
            }
        }
        for night in nights(check_in, check_out) {
            for _ in 0..rooms {
                inner.holds.push(Hold {
                    room_type_id,
                    reference,
                    night,
                });
            }
        }
        Ok(())
    }

    async fn release(&self, reference: Uuid) -> InventoryResult<u64> {
        let mut inner = self.lock();
        let before = inner.holds.len();
        inner.holds.retain(|h| h.reference != reference);
        Ok((before - inner.holds.len()) as u64)
    }

    async fn held_on(&self, room_type_id: RoomTypeId, night: NaiveDate) -> InventoryResult<i64> {
        Ok(self
            .lock()
            .holds
            .iter()
            .filter(|h| h.room_type_id == room_type_id && h.night == night)
            .count() as i64)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, new: NewBooking) -> BookingResult<Booking> {
        let mut inner = self.lock();
        let now = Utc::now();
        let booking = Booking {
            id: Inner::next(&mut inner.next_booking_id),
            reference: new.reference,
            user_id: new.user_id,
            property_id: new.property_id,
            room_type_id: new.room_type_id,
            check_in: new.check_in,
            check_out: new.check_out,
            rooms: new.rooms,
            guests: new.guests,
            status: new.status,
            payment_status: new.payment_status,
            total_amount: new.total_amount,
            discount_amount: new.discount_amount,
            coupon_code: new.coupon_code,
            partner_payout: new.partner_payout,
            partner_id: new.partner_id,
            payment_ref: None,
            created_at: now,
            updated_at: now,
        };
        inner.bookings.push(booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, id: BookingId) -> BookingResult<Booking> {
        self.lock()
            .bookings
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or(BookingError::BookingNotFound(id))
    }

    async fn find_by_reference(&self, reference: Uuid) -> BookingResult<Option<Booking>> {
        Ok(self
            .lock()
            .bookings
            .iter()
            .find(|b| b.reference == reference)
            .cloned())
    }

    async fn find_by_payment_ref(&self, payment_ref: &str) -> BookingResult<Option<Booking>> {
        Ok(self
            .lock()
            .bookings
            .iter()
            .find(|b| b.payment_ref.as_deref() == Some(payment_ref))
            .cloned())
    }

    async fn set_payment_ref(&self, id: BookingId, payment_ref: &str) -> BookingResult<Booking> {
        let mut inner = self.lock();
        let booking = inner
            .bookings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(BookingError::BookingNotFound(id))?;
        booking.payment_ref = Some(payment_ref.to_string());
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn transition_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        to: BookingStatus,
    ) -> BookingResult<Booking> {
        let mut inner = self.lock();
        let booking = inner
            .bookings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(BookingError::BookingNotFound(id))?;
        if booking.status != expected {
            return Err(BookingError::ConcurrentTransition { id, expected });
        }
        booking.status = to;
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn set_payment_status(
        &self,
        id: BookingId,
        payment_status: PaymentStatus,
    ) -> BookingResult<Booking> {
        let mut inner = self.lock();
        let booking = inner
            .bookings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(BookingError::BookingNotFound(id))?;
        booking.payment_status = payment_status;
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn bookings_for_user(
        &self,
        user_id: OwnerId,
        limit: i64,
    ) -> BookingResult<Vec<Booking>> {
        Ok(self
            .lock()
            .bookings
            .iter()
            .rev()
            .filter(|b| b.user_id == user_id)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn due_for_completion(&self, today: NaiveDate) -> BookingResult<Vec<Booking>> {
        Ok(self
            .lock()
            .bookings
            .iter()
            .filter(|b| {
                matches!(
                    b.status,
                    BookingStatus::Confirmed | BookingStatus::CheckedIn
                ) && b.check_out <= today
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OfferStore for MemoryStore {
    async fn find_offer(&self, code: &str) -> CouponResult<Option<Offer>> {
        Ok(self.lock().offers.get(&canonical_code(code)).cloned())
    }

    async fn insert_offer(&self, new: NewOffer) -> CouponResult<Offer> {
        let mut inner = self.lock();
        let offer = Offer {
            id: Inner::next(&mut inner.next_offer_id),
            code: canonical_code(&new.code),
            discount_type: new.discount_type,
            discount_value: new.discount_value,
            valid_from: new.valid_from,
            valid_until: new.valid_until,
            min_booking_amount: new.min_booking_amount,
            usage_limit_per_user: new.usage_limit_per_user,
            is_active: new.is_active,
        };
        inner.offers.insert(offer.code.clone(), offer.clone());
        Ok(offer)
    }

    async fn coupon_usage(&self, user_id: OwnerId, code: &str) -> CouponResult<i64> {
        let canonical = canonical_code(code);
        Ok(self
            .lock()
            .bookings
            .iter()
            .filter(|b| {
                b.user_id == user_id
                    && b.coupon_code.as_deref() == Some(canonical.as_str())
                    && !matches!(b.status, BookingStatus::Cancelled | BookingStatus::NoShow)
            })
            .count() as i64)
    }
}
