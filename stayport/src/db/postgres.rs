//! PostgreSQL store backend.
//!
//! Atomicity notes: guarded debits use a single conditional `UPDATE` whose
//! `WHERE` clause re-checks the available balance, so two concurrent debits
//! can never both pass a check only one can satisfy. Reservations take a
//! row lock on the room type for the duration of the capacity check and
//! hold insertion, which serializes contention per unit.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::booking::{
    Booking, BookingError, BookingId, BookingResult, BookingStatus, NewBooking, PaymentStatus,
};
use crate::coupon::{CouponResult, DiscountType, NewOffer, Offer, canonical_code};
use crate::inventory::{
    InventoryError, InventoryResult, NewRoomType, RoomType, RoomTypeId, nights,
};
use crate::wallet::{
    BankDetails, OwnerId, OwnerKind, TransactionId, TxCategory, TxDirection, TxStatus, Wallet,
    WalletError, WalletId, WalletLifecycle, WalletResult, WalletTransaction, WithdrawalRequest,
    WithdrawalStatus,
};

use super::store::{BookingStore, InventoryStore, LedgerStore, OfferStore, SettleOutcome};

/// PostgreSQL implementation of all store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_error(what: &str, value: &str) -> sqlx::Error {
    sqlx::Error::Decode(format!("unknown {what}: {value}").into())
}

fn map_wallet(row: &PgRow) -> Result<Wallet, sqlx::Error> {
    let kind: String = row.get("owner_kind");
    let lifecycle: String = row.get("lifecycle");
    Ok(Wallet {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        owner_kind: OwnerKind::parse(&kind).ok_or_else(|| decode_error("owner kind", &kind))?,
        balance: row.get("balance"),
        lifecycle: WalletLifecycle::parse(&lifecycle)
            .ok_or_else(|| decode_error("wallet lifecycle", &lifecycle))?,
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
    })
}

fn map_transaction(row: &PgRow) -> Result<WalletTransaction, sqlx::Error> {
    let direction: String = row.get("direction");
    let category: String = row.get("category");
    let status: String = row.get("status");
    Ok(WalletTransaction {
        id: row.get("id"),
        wallet_id: row.get("wallet_id"),
        direction: TxDirection::parse(&direction)
            .ok_or_else(|| decode_error("transaction direction", &direction))?,
        amount: row.get("amount"),
        category: TxCategory::parse(&category)
            .ok_or_else(|| decode_error("transaction category", &category))?,
        status: TxStatus::parse(&status)
            .ok_or_else(|| decode_error("transaction status", &status))?,
        external_ref: row.get("external_ref"),
        description: row.get("description"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        settled_at: row
            .get::<Option<chrono::NaiveDateTime>, _>("settled_at")
            .map(|dt| dt.and_utc()),
    })
}

fn map_withdrawal(row: &PgRow) -> Result<WithdrawalRequest, sqlx::Error> {
    let status: String = row.get("status");
    let bank_json: String = row.get("bank_details");
    Ok(WithdrawalRequest {
        id: row.get("id"),
        wallet_id: row.get("wallet_id"),
        transaction_id: row.get("transaction_id"),
        amount: row.get("amount"),
        status: WithdrawalStatus::parse(&status)
            .ok_or_else(|| decode_error("withdrawal status", &status))?,
        bank_details: serde_json::from_str(&bank_json)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
    })
}

fn map_booking(row: &PgRow) -> Result<Booking, sqlx::Error> {
    let status: String = row.get("status");
    let payment_status: String = row.get("payment_status");
    Ok(Booking {
        id: row.get("id"),
        reference: row.get("reference"),
        user_id: row.get("user_id"),
        property_id: row.get("property_id"),
        room_type_id: row.get("room_type_id"),
        check_in: row.get("check_in"),
        check_out: row.get("check_out"),
        rooms: row.get("rooms"),
        guests: row.get("guests"),
        status: BookingStatus::parse(&status)
            .ok_or_else(|| decode_error("booking status", &status))?,
        payment_status: PaymentStatus::parse(&payment_status)
            .ok_or_else(|| decode_error("payment status", &payment_status))?,
        total_amount: row.get("total_amount"),
        discount_amount: row.get("discount_amount"),
        coupon_code: row.get("coupon_code"),
        partner_payout: row.get("partner_payout"),
        partner_id: row.get("partner_id"),
        payment_ref: row.get("payment_ref"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
    })
}

fn map_room_type(row: &PgRow) -> RoomType {
    RoomType {
        id: row.get("id"),
        property_id: row.get("property_id"),
        name: row.get("name"),
        total_inventory: row.get("total_inventory"),
        price_per_night: row.get("price_per_night"),
        max_occupancy: row.get("max_occupancy"),
        is_active: row.get("is_active"),
    }
}

fn map_offer(row: &PgRow) -> Result<Offer, sqlx::Error> {
    let discount_type: String = row.get("discount_type");
    Ok(Offer {
        id: row.get("id"),
        code: row.get("code"),
        discount_type: DiscountType::parse(&discount_type)
            .ok_or_else(|| decode_error("discount type", &discount_type))?,
        discount_value: row.get("discount_value"),
        valid_from: row.get("valid_from"),
        valid_until: row.get("valid_until"),
        min_booking_amount: row.get("min_booking_amount"),
        usage_limit_per_user: row.get("usage_limit_per_user"),
        is_active: row.get("is_active"),
    })
}

/// Map a unique-constraint violation on `external_ref` to the domain error.
fn map_ref_conflict(err: sqlx::Error, external_ref: Option<&str>) -> WalletError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.constraint() == Some("wallet_transactions_external_ref_key")
    {
        return WalletError::DuplicateTransaction(
            external_ref.unwrap_or_default().to_string(),
        );
    }
    WalletError::Database(err)
}

impl PgStore {
    /// Lock the wallet row and return (balance, lifecycle), diagnosing a
    /// missing wallet.
    async fn lock_wallet(
        tx: &mut Transaction<'_, Postgres>,
        wallet_id: WalletId,
    ) -> WalletResult<(i64, WalletLifecycle)> {
        let row = sqlx::query("SELECT balance, lifecycle FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(wallet_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(WalletError::WalletNotFound(wallet_id))?;
        let lifecycle: String = row.get("lifecycle");
        let lifecycle = WalletLifecycle::parse(&lifecycle)
            .ok_or_else(|| decode_error("wallet lifecycle", &lifecycle))?;
        Ok((row.get("balance"), lifecycle))
    }

    async fn pending_debits_locked(
        tx: &mut Transaction<'_, Postgres>,
        wallet_id: WalletId,
    ) -> WalletResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS held
             FROM wallet_transactions
             WHERE wallet_id = $1 AND direction = 'debit' AND status = 'pending'",
        )
        .bind(wallet_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.get("held"))
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_transaction(
        tx: &mut Transaction<'_, Postgres>,
        wallet_id: WalletId,
        direction: TxDirection,
        amount: i64,
        category: TxCategory,
        status: TxStatus,
        external_ref: Option<&str>,
        description: Option<&str>,
    ) -> WalletResult<WalletTransaction> {
        let row = sqlx::query(
            r#"
            INSERT INTO wallet_transactions
                (wallet_id, direction, amount, category, status, external_ref, description, settled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7,
                    CASE WHEN $5 = 'pending' THEN NULL ELSE NOW() END)
            RETURNING id, wallet_id, direction, amount, category, status, external_ref,
                      description, created_at, settled_at
            "#,
        )
        .bind(wallet_id)
        .bind(direction.as_str())
        .bind(amount)
        .bind(category.as_str())
        .bind(status.as_str())
        .bind(external_ref)
        .bind(description)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_ref_conflict(e, external_ref))?;
        Ok(map_transaction(&row)?)
    }
}

fn require_positive(amount: i64) -> WalletResult<()> {
    if amount <= 0 {
        return Err(WalletError::InvalidAmount(amount));
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn get_wallet(&self, wallet_id: WalletId) -> WalletResult<Wallet> {
        let row = sqlx::query(
            "SELECT id, owner_id, owner_kind, balance, lifecycle, created_at, updated_at
             FROM wallets WHERE id = $1",
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(WalletError::WalletNotFound(wallet_id))?;
        Ok(map_wallet(&row)?)
    }

    async fn find_wallet_by_owner(
        &self,
        owner_id: OwnerId,
        kind: OwnerKind,
    ) -> WalletResult<Option<Wallet>> {
        let row = sqlx::query(
            "SELECT id, owner_id, owner_kind, balance, lifecycle, created_at, updated_at
             FROM wallets WHERE owner_id = $1 AND owner_kind = $2",
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_wallet).transpose().map_err(Into::into)
    }

    async fn get_or_create_wallet(
        &self,
        owner_id: OwnerId,
        kind: OwnerKind,
    ) -> WalletResult<Wallet> {
        let row = sqlx::query(
            r#"
            INSERT INTO wallets (owner_id, owner_kind, balance, lifecycle)
            VALUES ($1, $2, 0, 'active')
            ON CONFLICT (owner_id, owner_kind) DO UPDATE SET owner_id = EXCLUDED.owner_id
            RETURNING id, owner_id, owner_kind, balance, lifecycle, created_at, updated_at
            "#,
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(map_wallet(&row)?)
    }

    async fn set_lifecycle(
        &self,
        wallet_id: WalletId,
        lifecycle: WalletLifecycle,
    ) -> WalletResult<Wallet> {
        let row = sqlx::query(
            "UPDATE wallets SET lifecycle = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING id, owner_id, owner_kind, balance, lifecycle, created_at, updated_at",
        )
        .bind(wallet_id)
        .bind(lifecycle.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(WalletError::WalletNotFound(wallet_id))?;
        Ok(map_wallet(&row)?)
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
        let mut tx = self.pool.begin().await?;
        let (_, lifecycle) = Self::lock_wallet(&mut tx, wallet_id).await?;
        if lifecycle == WalletLifecycle::Frozen {
            return Err(WalletError::WalletFrozen(wallet_id));
        }
        sqlx::query("UPDATE wallets SET balance = balance + $1, updated_at = NOW() WHERE id = $2")
            .bind(amount)
            .bind(wallet_id)
            .execute(&mut *tx)
            .await?;
        let entry = Self::insert_transaction(
            &mut tx,
            wallet_id,
            TxDirection::Credit,
            amount,
            category,
            TxStatus::Completed,
            external_ref,
            description,
        )
        .await?;
        tx.commit().await?;
        Ok(entry)
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
        let mut tx = self.pool.begin().await?;
        let (_, lifecycle) = Self::lock_wallet(&mut tx, wallet_id).await?;
        if lifecycle == WalletLifecycle::Frozen {
            return Err(WalletError::WalletFrozen(wallet_id));
        }
        let entry = Self::insert_transaction(
            &mut tx,
            wallet_id,
            TxDirection::Credit,
            amount,
            category,
            TxStatus::Pending,
            Some(external_ref),
            description,
        )
        .await?;
        tx.commit().await?;
        Ok(entry)
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
        let mut tx = self.pool.begin().await?;

        // Check-and-decrement in one statement: the balance must cover the
        // amount plus every pending debit hold.
        let updated = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = balance - $1, updated_at = NOW()
            WHERE id = $2
              AND lifecycle = 'active'
              AND balance - $1 >= COALESCE((
                  SELECT SUM(amount) FROM wallet_transactions
                  WHERE wallet_id = $2 AND direction = 'debit' AND status = 'pending'
              ), 0)
            RETURNING balance
            "#,
        )
        .bind(amount)
        .bind(wallet_id)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            // Either the wallet doesn't exist, is frozen, or the available
            // balance is short. Diagnose which.
            let (balance, lifecycle) = Self::lock_wallet(&mut tx, wallet_id).await?;
            if lifecycle == WalletLifecycle::Frozen {
                return Err(WalletError::WalletFrozen(wallet_id));
            }
            let held = Self::pending_debits_locked(&mut tx, wallet_id).await?;
            return Err(WalletError::InsufficientBalance {
                available: balance - held,
                required: amount,
            });
        }

        let entry = Self::insert_transaction(
            &mut tx,
            wallet_id,
            TxDirection::Debit,
            amount,
            category,
            TxStatus::Completed,
            external_ref,
            description,
        )
        .await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn debit_pending(
        &self,
        wallet_id: WalletId,
        amount: i64,
        category: TxCategory,
        description: Option<&str>,
    ) -> WalletResult<WalletTransaction> {
        require_positive(amount)?;
        let mut tx = self.pool.begin().await?;
        // The wallet row lock serializes concurrent hold placements.
        let (balance, lifecycle) = Self::lock_wallet(&mut tx, wallet_id).await?;
        if lifecycle == WalletLifecycle::Frozen {
            return Err(WalletError::WalletFrozen(wallet_id));
        }
        let held = Self::pending_debits_locked(&mut tx, wallet_id).await?;
        let available = balance - held;
        if available < amount {
            return Err(WalletError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        let entry = Self::insert_transaction(
            &mut tx,
            wallet_id,
            TxDirection::Debit,
            amount,
            category,
            TxStatus::Pending,
            None,
            description,
        )
        .await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn settle_transaction(
        &self,
        transaction_id: TransactionId,
        outcome: SettleOutcome,
    ) -> WalletResult<WalletTransaction> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT id, wallet_id, direction, amount, category, status, external_ref,
                    description, created_at, settled_at
             FROM wallet_transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(WalletError::TransactionNotFound(transaction_id))?;
        let entry = map_transaction(&row)?;

        if entry.status != TxStatus::Pending {
            return Err(WalletError::ImmutableTransaction {
                id: transaction_id,
                status: entry.status.to_string(),
            });
        }

        let status = match outcome {
            SettleOutcome::Completed => TxStatus::Completed,
            SettleOutcome::Failed => TxStatus::Failed,
        };
        let row = sqlx::query(
            "UPDATE wallet_transactions SET status = $2, settled_at = NOW()
             WHERE id = $1
             RETURNING id, wallet_id, direction, amount, category, status, external_ref,
                       description, created_at, settled_at",
        )
        .bind(transaction_id)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let settled = map_transaction(&row)?;

        if outcome == SettleOutcome::Completed {
            let delta = settled.direction.sign() * settled.amount;
            sqlx::query(
                "UPDATE wallets SET balance = balance + $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(delta)
            .bind(settled.wallet_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(settled)
    }

    async fn find_transaction_by_ref(
        &self,
        external_ref: &str,
    ) -> WalletResult<Option<WalletTransaction>> {
        let row = sqlx::query(
            "SELECT id, wallet_id, direction, amount, category, status, external_ref,
                    description, created_at, settled_at
             FROM wallet_transactions WHERE external_ref = $1",
        )
        .bind(external_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref()
            .map(map_transaction)
            .transpose()
            .map_err(Into::into)
    }

    async fn transactions(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> WalletResult<Vec<WalletTransaction>> {
        let rows = sqlx::query(
            "SELECT id, wallet_id, direction, amount, category, status, external_ref,
                    description, created_at, settled_at
             FROM wallet_transactions
             WHERE wallet_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
        )
        .bind(wallet_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(map_transaction)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn completed_sum(&self, wallet_id: WalletId) -> WalletResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE direction WHEN 'credit' THEN amount ELSE -amount END), 0)
                AS total
            FROM wallet_transactions
            WHERE wallet_id = $1 AND status = 'completed'
            "#,
        )
        .bind(wallet_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }

    async fn pending_debit_total(&self, wallet_id: WalletId) -> WalletResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS held
             FROM wallet_transactions
             WHERE wallet_id = $1 AND direction = 'debit' AND status = 'pending'",
        )
        .bind(wallet_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("held"))
    }

    async fn sweep_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> WalletResult<Vec<WalletTransaction>> {
        let rows = sqlx::query(
            "UPDATE wallet_transactions SET status = 'failed', settled_at = NOW()
             WHERE status = 'pending' AND external_ref IS NOT NULL AND created_at < $1
             RETURNING id, wallet_id, direction, amount, category, status, external_ref,
                       description, created_at, settled_at",
        )
        .bind(cutoff.naive_utc())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(map_transaction)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn insert_withdrawal(
        &self,
        wallet_id: WalletId,
        transaction_id: TransactionId,
        amount: i64,
        bank_details: &BankDetails,
    ) -> WalletResult<WithdrawalRequest> {
        let bank_json =
            serde_json::to_string(bank_details).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let row = sqlx::query(
            r#"
            INSERT INTO withdrawal_requests (wallet_id, transaction_id, amount, status, bank_details)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING id, wallet_id, transaction_id, amount, status, bank_details,
                      created_at, updated_at
            "#,
        )
        .bind(wallet_id)
        .bind(transaction_id)
        .bind(amount)
        .bind(bank_json)
        .fetch_one(&self.pool)
        .await?;
        Ok(map_withdrawal(&row)?)
    }

    async fn get_withdrawal(&self, id: i64) -> WalletResult<WithdrawalRequest> {
        let row = sqlx::query(
            "SELECT id, wallet_id, transaction_id, amount, status, bank_details,
                    created_at, updated_at
             FROM withdrawal_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(WalletError::WithdrawalNotFound(id))?;
        Ok(map_withdrawal(&row)?)
    }

    async fn update_withdrawal_status(
        &self,
        id: i64,
        expected: WithdrawalStatus,
        to: WithdrawalStatus,
    ) -> WalletResult<WithdrawalRequest> {
        let row = sqlx::query(
            "UPDATE withdrawal_requests SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING id, wallet_id, transaction_id, amount, status, bank_details,
                       created_at, updated_at",
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(map_withdrawal(&row)?),
            None => {
                let current = self.get_withdrawal(id).await?;
                Err(WalletError::InvalidWithdrawalState {
                    id,
                    expected,
                    actual: current.status,
                })
            }
        }
    }

    async fn withdrawals(&self, wallet_id: WalletId) -> WalletResult<Vec<WithdrawalRequest>> {
        let rows = sqlx::query(
            "SELECT id, wallet_id, transaction_id, amount, status, bank_details,
                    created_at, updated_at
             FROM withdrawal_requests
             WHERE wallet_id = $1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(map_withdrawal)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn get_room_type(&self, id: RoomTypeId) -> InventoryResult<RoomType> {
        let row = sqlx::query(
            "SELECT id, property_id, name, total_inventory, price_per_night, max_occupancy,
                    is_active
             FROM room_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(InventoryError::RoomTypeNotFound(id))?;
        Ok(map_room_type(&row))
    }

    async fn insert_room_type(&self, new: NewRoomType) -> InventoryResult<RoomType> {
        let row = sqlx::query(
            r#"
            INSERT INTO room_types
                (property_id, name, total_inventory, price_per_night, max_occupancy, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, property_id, name, total_inventory, price_per_night, max_occupancy,
                      is_active
            "#,
        )
        .bind(new.property_id)
        .bind(&new.name)
        .bind(new.total_inventory)
        .bind(new.price_per_night)
        .bind(new.max_occupancy)
        .bind(new.is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(map_room_type(&row))
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
        let mut tx = self.pool.begin().await?;

        // Row lock on the unit serializes all reservations for it; the
        // capacity check below is therefore race-free.
        let row = sqlx::query("SELECT total_inventory FROM room_types WHERE id = $1 FOR UPDATE")
            .bind(room_type_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(InventoryError::RoomTypeNotFound(room_type_id))?;
        let total: i32 = row.get("total_inventory");

        for night in nights(check_in, check_out) {
            let row = sqlx::query(
                "SELECT COUNT(*) AS held FROM room_holds
                 WHERE room_type_id = $1 AND night = $2",
            )
            .bind(room_type_id)
            .bind(night)
            .fetch_one(&mut *tx)
            .await?;
            let held: i64 = row.get("held");
            if held + i64::from(rooms) > i64::from(total) {
                // Dropping the transaction rolls everything back.
                return Err(InventoryError::OutOfInventory {
                    room_type_id,
                    night,
                });
            }
            sqlx::query(
                "INSERT INTO room_holds (room_type_id, booking_reference, night)
                 SELECT $1, $2, $3 FROM generate_series(1, $4)",
            )
            .bind(room_type_id)
            .bind(reference)
            .bind(night)
            .bind(rooms)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn release(&self, reference: Uuid) -> InventoryResult<u64> {
        let result = sqlx::query("DELETE FROM room_holds WHERE booking_reference = $1")
            .bind(reference)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn held_on(&self, room_type_id: RoomTypeId, night: NaiveDate) -> InventoryResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS held FROM room_holds WHERE room_type_id = $1 AND night = $2",
        )
        .bind(room_type_id)
        .bind(night)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("held"))
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn insert_booking(&self, new: NewBooking) -> BookingResult<Booking> {
        let row = sqlx::query(
            r#"
            INSERT INTO bookings
                (reference, user_id, property_id, room_type_id, check_in, check_out,
                 rooms, guests, status, payment_status, total_amount, discount_amount,
                 coupon_code, partner_payout, partner_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id, reference, user_id, property_id, room_type_id, check_in, check_out,
                      rooms, guests, status, payment_status, total_amount, discount_amount,
                      coupon_code, partner_payout, partner_id, payment_ref,
                      created_at, updated_at
            "#,
        )
        .bind(new.reference)
        .bind(new.user_id)
        .bind(new.property_id)
        .bind(new.room_type_id)
        .bind(new.check_in)
        .bind(new.check_out)
        .bind(new.rooms)
        .bind(new.guests)
        .bind(new.status.as_str())
        .bind(new.payment_status.as_str())
        .bind(new.total_amount)
        .bind(new.discount_amount)
        .bind(&new.coupon_code)
        .bind(new.partner_payout)
        .bind(new.partner_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(map_booking(&row)?)
    }

    async fn get_booking(&self, id: BookingId) -> BookingResult<Booking> {
        let row = sqlx::query(
            "SELECT id, reference, user_id, property_id, room_type_id, check_in, check_out,
                    rooms, guests, status, payment_status, total_amount, discount_amount,
                    coupon_code, partner_payout, partner_id, payment_ref, created_at, updated_at
             FROM bookings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BookingError::BookingNotFound(id))?;
        Ok(map_booking(&row)?)
    }

    async fn find_by_reference(&self, reference: Uuid) -> BookingResult<Option<Booking>> {
        let row = sqlx::query(
            "SELECT id, reference, user_id, property_id, room_type_id, check_in, check_out,
                    rooms, guests, status, payment_status, total_amount, discount_amount,
                    coupon_code, partner_payout, partner_id, payment_ref, created_at, updated_at
             FROM bookings WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_booking).transpose().map_err(Into::into)
    }

    async fn find_by_payment_ref(&self, payment_ref: &str) -> BookingResult<Option<Booking>> {
        let row = sqlx::query(
            "SELECT id, reference, user_id, property_id, room_type_id, check_in, check_out,
                    rooms, guests, status, payment_status, total_amount, discount_amount,
                    coupon_code, partner_payout, partner_id, payment_ref, created_at, updated_at
             FROM bookings WHERE payment_ref = $1",
        )
        .bind(payment_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_booking).transpose().map_err(Into::into)
    }

    async fn set_payment_ref(&self, id: BookingId, payment_ref: &str) -> BookingResult<Booking> {
        let row = sqlx::query(
            "UPDATE bookings SET payment_ref = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING id, reference, user_id, property_id, room_type_id, check_in, check_out,
                       rooms, guests, status, payment_status, total_amount, discount_amount,
                       coupon_code, partner_payout, partner_id, payment_ref,
                       created_at, updated_at",
        )
        .bind(id)
        .bind(payment_ref)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BookingError::BookingNotFound(id))?;
        Ok(map_booking(&row)?)
    }

    async fn transition_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        to: BookingStatus,
    ) -> BookingResult<Booking> {
        let row = sqlx::query(
            "UPDATE bookings SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING id, reference, user_id, property_id, room_type_id, check_in, check_out,
                       rooms, guests, status, payment_status, total_amount, discount_amount,
                       coupon_code, partner_payout, partner_id, payment_ref,
                       created_at, updated_at",
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(map_booking(&row)?),
            None => {
                // Distinguish a missing booking from a lost race.
                self.get_booking(id).await?;
                Err(BookingError::ConcurrentTransition { id, expected })
            }
        }
    }

    async fn set_payment_status(
        &self,
        id: BookingId,
        payment_status: PaymentStatus,
    ) -> BookingResult<Booking> {
        let row = sqlx::query(
            "UPDATE bookings SET payment_status = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING id, reference, user_id, property_id, room_type_id, check_in, check_out,
                       rooms, guests, status, payment_status, total_amount, discount_amount,
                       coupon_code, partner_payout, partner_id, payment_ref,
                       created_at, updated_at",
        )
        .bind(id)
        .bind(payment_status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BookingError::BookingNotFound(id))?;
        Ok(map_booking(&row)?)
    }

    async fn bookings_for_user(
        &self,
        user_id: OwnerId,
        limit: i64,
    ) -> BookingResult<Vec<Booking>> {
        let rows = sqlx::query(
            "SELECT id, reference, user_id, property_id, room_type_id, check_in, check_out,
                    rooms, guests, status, payment_status, total_amount, discount_amount,
                    coupon_code, partner_payout, partner_id, payment_ref, created_at, updated_at
             FROM bookings
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(map_booking)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn due_for_completion(&self, today: NaiveDate) -> BookingResult<Vec<Booking>> {
        let rows = sqlx::query(
            "SELECT id, reference, user_id, property_id, room_type_id, check_in, check_out,
                    rooms, guests, status, payment_status, total_amount, discount_amount,
                    coupon_code, partner_payout, partner_id, payment_ref, created_at, updated_at
             FROM bookings
             WHERE status IN ('confirmed', 'checked_in') AND check_out <= $1",
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(map_booking)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }
}

#[async_trait]
impl OfferStore for PgStore {
    async fn find_offer(&self, code: &str) -> CouponResult<Option<Offer>> {
        let row = sqlx::query(
            "SELECT id, code, discount_type, discount_value, valid_from, valid_until,
                    min_booking_amount, usage_limit_per_user, is_active
             FROM offers WHERE code = $1",
        )
        .bind(canonical_code(code))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_offer).transpose().map_err(Into::into)
    }

    async fn insert_offer(&self, new: NewOffer) -> CouponResult<Offer> {
        let row = sqlx::query(
            r#"
            INSERT INTO offers
                (code, discount_type, discount_value, valid_from, valid_until,
                 min_booking_amount, usage_limit_per_user, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, code, discount_type, discount_value, valid_from, valid_until,
                      min_booking_amount, usage_limit_per_user, is_active
            "#,
        )
        .bind(canonical_code(&new.code))
        .bind(new.discount_type.as_str())
        .bind(new.discount_value)
        .bind(new.valid_from)
        .bind(new.valid_until)
        .bind(new.min_booking_amount)
        .bind(new.usage_limit_per_user)
        .bind(new.is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(map_offer(&row)?)
    }

    async fn coupon_usage(&self, user_id: OwnerId, code: &str) -> CouponResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS used FROM bookings
             WHERE user_id = $1 AND coupon_code = $2
               AND status NOT IN ('cancelled', 'no_show')",
        )
        .bind(user_id)
        .bind(canonical_code(code))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("used"))
    }
}
