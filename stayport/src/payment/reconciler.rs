//! Gateway event reconciliation and booking lifecycle actions.
//!
//! Every state change here is keyed and idempotent: captures are matched to
//! their pending transaction by `external_ref`, refunds and reversals carry
//! deterministic references derived from the booking reference, and booking
//! status moves through compare-and-set transitions. A replayed webhook or a
//! retried partner action therefore converges instead of double-applying.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::booking::{Booking, BookingError, BookingId, BookingStatus, PaymentStatus};
use crate::db::{BookingStore, InventoryStore, LedgerStore, SettleOutcome};
use crate::wallet::{OwnerKind, TxCategory, TxStatus, WalletError, WalletId, WalletTransaction};

use super::errors::{PaymentError, PaymentResult};
use super::gateway::SignatureVerifier;

/// A payment capture event as delivered by the gateway webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCapture {
    pub order_id: String,
    pub payment_id: String,
    /// Amount the gateway claims was captured, minor units.
    pub amount: i64,
    /// Hex HMAC over `"{order_id}|{payment_id}"`.
    pub signature: String,
}

/// Result of applying a capture.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// The pending transaction was settled by this event.
    Applied(WalletTransaction),
    /// The event was already applied (or the transaction was swept);
    /// resolved as success so the gateway stops retrying.
    Duplicate,
}

/// Applies gateway and partner events to bookings and the ledger.
pub struct PaymentReconciler {
    ledger: Arc<dyn LedgerStore>,
    bookings: Arc<dyn BookingStore>,
    inventory: Arc<dyn InventoryStore>,
    verifier: SignatureVerifier,
    /// Gateway-keyed pending transactions older than this are swept to
    /// failed.
    pending_window: Duration,
}

impl PaymentReconciler {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        bookings: Arc<dyn BookingStore>,
        inventory: Arc<dyn InventoryStore>,
        verifier: SignatureVerifier,
        pending_window: Duration,
    ) -> Self {
        Self {
            ledger,
            bookings,
            inventory,
            verifier,
            pending_window,
        }
    }

    /// Apply a gateway capture exactly once.
    ///
    /// A verified signature or amount mismatch fails the pending
    /// transaction permanently; a later replay of the same order is then a
    /// duplicate, never a second chance. No balance moves before both
    /// checks pass.
    pub async fn apply_capture(&self, capture: &GatewayCapture) -> PaymentResult<CaptureOutcome> {
        let tx = self
            .ledger
            .find_transaction_by_ref(&capture.order_id)
            .await?
            .ok_or_else(|| PaymentError::UnknownOrder(capture.order_id.clone()))?;

        match tx.status {
            TxStatus::Completed => {
                info!(
                    "duplicate capture for order {} ignored; transaction {} already completed",
                    capture.order_id, tx.id
                );
                // An earlier attempt may have settled the money and then
                // failed partway through the booking-side work. Converge
                // from the recorded transaction before answering.
                if tx.category == TxCategory::BookingPayout {
                    self.route_booking_capture(&capture.order_id, &tx).await?;
                }
                return Ok(CaptureOutcome::Duplicate);
            }
            TxStatus::Failed => {
                warn!(
                    "capture for order {} arrived after transaction {} was failed; ignored",
                    capture.order_id, tx.id
                );
                return Ok(CaptureOutcome::Duplicate);
            }
            TxStatus::Pending => {}
        }

        if !self
            .verifier
            .verify(&capture.order_id, &capture.payment_id, &capture.signature)
        {
            warn!(
                "security: signature mismatch on capture for order {}",
                capture.order_id
            );
            self.ledger
                .settle_transaction(tx.id, SettleOutcome::Failed)
                .await?;
            return Err(PaymentError::SignatureMismatch {
                order_id: capture.order_id.clone(),
            });
        }

        if capture.amount != tx.amount {
            warn!(
                "security: amount mismatch on order {}: recorded {}, captured {}",
                capture.order_id, tx.amount, capture.amount
            );
            self.ledger
                .settle_transaction(tx.id, SettleOutcome::Failed)
                .await?;
            return Err(PaymentError::AmountMismatch {
                order_id: capture.order_id.clone(),
                expected: tx.amount,
                got: capture.amount,
            });
        }

        let settled = match self
            .ledger
            .settle_transaction(tx.id, SettleOutcome::Completed)
            .await
        {
            Ok(settled) => settled,
            // A sweep or a termination failed the transaction between the
            // status read above and here; the order is dead.
            Err(WalletError::ImmutableTransaction { .. }) => {
                warn!(
                    "capture for order {} lost the settle race; ignored",
                    capture.order_id
                );
                return Ok(CaptureOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            "capture applied: order {} settled transaction {} for {}",
            capture.order_id, settled.id, settled.amount
        );

        if settled.category == TxCategory::BookingPayout {
            self.route_booking_capture(&capture.order_id, &settled)
                .await?;
        }

        Ok(CaptureOutcome::Applied(settled))
    }

    /// Confirm and mark paid the booking behind a settled payout credit,
    /// then retain the platform commission. A capture landing on a booking
    /// that was cancelled or no-showed in the meantime is refunded instead.
    async fn route_booking_capture(
        &self,
        order_id: &str,
        settled: &WalletTransaction,
    ) -> PaymentResult<()> {
        let Some(booking) = self.bookings.find_by_payment_ref(order_id).await? else {
            warn!("settled payout {} has no booking for order {order_id}", settled.id);
            return Ok(());
        };

        if matches!(
            booking.status,
            BookingStatus::Cancelled | BookingStatus::NoShow
        ) {
            if booking.payment_status != PaymentStatus::Refunded {
                warn!(
                    "capture for order {order_id} landed on {} booking {}; refunding",
                    booking.status, booking.id
                );
                self.compensate_paid(&booking).await?;
            }
            return Ok(());
        }

        if booking.status == BookingStatus::Pending {
            match self
                .bookings
                .transition_status(booking.id, BookingStatus::Pending, BookingStatus::Confirmed)
                .await
            {
                Ok(_) => {}
                // Someone else confirmed or cancelled in between; the CAS
                // loss is not this event's problem.
                Err(BookingError::ConcurrentTransition { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.bookings
            .set_payment_status(booking.id, PaymentStatus::Paid)
            .await?;
        self.retain_commission(&booking, settled.wallet_id, order_id)
            .await?;

        // A termination may have won the status CAS after the check above
        // and found nothing to unwind yet; re-read and compensate here.
        let current = self.bookings.get_booking(booking.id).await?;
        if matches!(
            current.status,
            BookingStatus::Cancelled | BookingStatus::NoShow
        ) && current.payment_status != PaymentStatus::Refunded
        {
            self.compensate_paid(&booking).await?;
        }
        Ok(())
    }

    /// Debit the platform share from the partner wallet, keyed by the order
    /// id so a replay cannot retain it twice.
    async fn retain_commission(
        &self,
        booking: &Booking,
        wallet_id: WalletId,
        order_id: &str,
    ) -> PaymentResult<()> {
        let commission = booking.total_amount - booking.partner_payout;
        if commission <= 0 {
            return Ok(());
        }
        let commission_ref = format!("comm_{order_id}");
        match self
            .ledger
            .debit_completed(
                wallet_id,
                commission,
                TxCategory::Commission,
                Some(&commission_ref),
                Some("Platform commission"),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(WalletError::DuplicateTransaction(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Partner marks a pay-at-property booking as settled in cash.
    /// Affects the payment status only, independent of the booking status.
    pub async fn mark_paid(&self, id: BookingId) -> PaymentResult<Booking> {
        let booking = self.bookings.get_booking(id).await?;
        if booking.payment_status == PaymentStatus::Paid {
            return Ok(booking);
        }
        Ok(self
            .bookings
            .set_payment_status(id, PaymentStatus::Paid)
            .await?)
    }

    /// Partner checks the guest in.
    pub async fn check_in(&self, id: BookingId) -> PaymentResult<Booking> {
        Ok(self.transition(id, BookingStatus::CheckedIn).await?)
    }

    /// Partner completes the stay. Releases the holds for the date range and
    /// pays out the partner for cash bookings.
    pub async fn complete(&self, id: BookingId) -> PaymentResult<Booking> {
        let booking = self.transition(id, BookingStatus::Completed).await?;
        self.inventory.release(booking.reference).await.map_err(BookingError::from)?;
        self.payout_on_completion(&booking).await?;
        Ok(booking)
    }

    /// Cancel a booking, releasing inventory and compensating payments.
    pub async fn cancel(&self, id: BookingId) -> PaymentResult<Booking> {
        self.terminate(id, BookingStatus::Cancelled).await
    }

    /// Partner reports the guest never arrived.
    pub async fn no_show(&self, id: BookingId) -> PaymentResult<Booking> {
        self.terminate(id, BookingStatus::NoShow).await
    }

    /// Scheduled rollover: complete every active booking whose checkout has
    /// passed. Per-booking failures are logged and skipped so one bad row
    /// cannot stall the sweep.
    pub async fn rollover_completed(&self, today: NaiveDate) -> PaymentResult<Vec<Booking>> {
        let due = self.bookings.due_for_completion(today).await?;
        let mut completed = Vec::with_capacity(due.len());
        for booking in due {
            match self.complete(booking.id).await {
                Ok(b) => completed.push(b),
                Err(e) => warn!("rollover skipped booking {}: {e}", booking.id),
            }
        }
        Ok(completed)
    }

    /// Fail gateway-keyed pending transactions older than the configured
    /// window. Withdrawal holds wait on review and are left alone.
    pub async fn sweep_stale(&self) -> PaymentResult<Vec<WalletTransaction>> {
        let cutoff = Utc::now() - self.pending_window;
        let swept = self.ledger.sweep_stale_pending(cutoff).await?;
        if !swept.is_empty() {
            info!("swept {} stale pending transactions", swept.len());
        }
        Ok(swept)
    }

    /// Validated compare-and-set status move.
    async fn transition(&self, id: BookingId, to: BookingStatus) -> Result<Booking, BookingError> {
        let booking = self.bookings.get_booking(id).await?;
        if !booking.status.can_transition_to(to) {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to,
            });
        }
        self.bookings.transition_status(id, booking.status, to).await
    }

    /// Cancellation and no-show share the same compensation: win the status
    /// CAS first so exactly one actor compensates, then release the holds
    /// and unwind money. Each money step carries a deterministic reference,
    /// so a retry after a partial failure converges.
    async fn terminate(&self, id: BookingId, target: BookingStatus) -> PaymentResult<Booking> {
        let booking = self.transition(id, target).await?;

        self.inventory
            .release(booking.reference)
            .await
            .map_err(BookingError::from)?;

        if booking.payment_status == PaymentStatus::Paid {
            let updated = self.compensate_paid(&booking).await?;
            info!(
                "booking {} moved to {target} with refund of {}",
                booking.id, booking.total_amount
            );
            return Ok(updated);
        }

        // Unpaid prepaid booking: fail the pending payout so a late capture
        // is treated as a duplicate rather than reviving a dead booking. If
        // a capture settled the payout while this termination was in flight,
        // the money already moved and the paid compensation applies instead.
        if let Some(order_id) = &booking.payment_ref
            && let Some(tx) = self.ledger.find_transaction_by_ref(order_id).await?
        {
            let capture_won = match tx.status {
                TxStatus::Pending => match self
                    .ledger
                    .settle_transaction(tx.id, SettleOutcome::Failed)
                    .await
                {
                    Ok(_) => false,
                    Err(WalletError::ImmutableTransaction { .. }) => self
                        .ledger
                        .find_transaction_by_ref(order_id)
                        .await?
                        .is_some_and(|t| t.status == TxStatus::Completed),
                    Err(e) => return Err(e.into()),
                },
                TxStatus::Completed => true,
                TxStatus::Failed => false,
            };
            if capture_won {
                warn!(
                    "capture settled order {order_id} during {target} of booking {}; refunding",
                    booking.id
                );
                return self.compensate_paid(&booking).await;
            }
        }
        Ok(booking)
    }

    /// Unwind the money of a charged booking: refund the guest, converge the
    /// partner ledger, mark the payment refunded. Every step is keyed, so
    /// whichever actor runs this last converges on the same state.
    async fn compensate_paid(&self, booking: &Booking) -> PaymentResult<Booking> {
        self.refund_guest(booking).await?;
        self.reverse_payout(booking).await?;
        Ok(self
            .bookings
            .set_payment_status(booking.id, PaymentStatus::Refunded)
            .await?)
    }

    /// Credit the guest wallet with the full charged amount, keyed by the
    /// booking reference so a retried cancellation cannot refund twice.
    async fn refund_guest(&self, booking: &Booking) -> PaymentResult<()> {
        if booking.total_amount == 0 {
            return Ok(());
        }
        let wallet = self
            .ledger
            .get_or_create_wallet(booking.user_id, OwnerKind::Guest)
            .await?;
        let refund_ref = format!("refund_{}", booking.reference);
        match self
            .ledger
            .credit_completed(
                wallet.id,
                booking.total_amount,
                TxCategory::Refund,
                Some(&refund_ref),
                Some("Booking refund"),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(WalletError::DuplicateTransaction(_)) => {
                info!("refund for booking {} already issued", booking.id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Unwind the partner payout for a refunded prepaid booking. A pending
    /// payout is failed in place; a settled one gets a compensating debit of
    /// the partner's net share, after making sure the commission debit the
    /// capture owed actually landed.
    async fn reverse_payout(&self, booking: &Booking) -> PaymentResult<()> {
        let Some(order_id) = &booking.payment_ref else {
            return Ok(());
        };
        let Some(tx) = self.ledger.find_transaction_by_ref(order_id).await? else {
            return Ok(());
        };
        match tx.status {
            TxStatus::Pending => {
                self.ledger
                    .settle_transaction(tx.id, SettleOutcome::Failed)
                    .await?;
                Ok(())
            }
            TxStatus::Completed => {
                self.retain_commission(booking, tx.wallet_id, order_id)
                    .await?;
                if booking.partner_payout == 0 {
                    return Ok(());
                }
                let reversal_ref = format!("reversal_{}", booking.reference);
                match self
                    .ledger
                    .debit_completed(
                        tx.wallet_id,
                        booking.partner_payout,
                        TxCategory::Refund,
                        Some(&reversal_ref),
                        Some("Payout reversal"),
                    )
                    .await
                {
                    Ok(_) => Ok(()),
                    Err(WalletError::DuplicateTransaction(_)) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            TxStatus::Failed => Ok(()),
        }
    }

    /// Cash bookings have no gateway payout; completion credits the partner
    /// their net share directly, commission already retained by the split.
    async fn payout_on_completion(&self, booking: &Booking) -> PaymentResult<()> {
        if booking.payment_ref.is_some()
            || booking.payment_status != PaymentStatus::Paid
            || booking.partner_payout == 0
        {
            return Ok(());
        }
        let payout_ref = format!("payout_{}", booking.reference);
        let wallet = self
            .ledger
            .get_or_create_wallet(booking.partner_id, OwnerKind::Partner)
            .await?;
        match self
            .ledger
            .credit_completed(
                wallet.id,
                booking.partner_payout,
                TxCategory::BookingPayout,
                Some(&payout_ref),
                Some("Stay payout"),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(WalletError::DuplicateTransaction(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
