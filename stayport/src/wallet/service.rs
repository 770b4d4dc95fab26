//! Wallet service: the public surface over the ledger store.
//!
//! All balance-affecting guards (frozen wallet, available balance, duplicate
//! external reference) live in the store layer so they are atomic; this
//! service adds the business rules around them: the withdrawal minimum, the
//! hold lifecycle linking a withdrawal to its pending debit, and the top-up
//! handshake with the payment gateway.

use std::sync::Arc;

use log::info;

use crate::db::{LedgerStore, SettleOutcome};
use crate::payment::{GatewayOrder, PaymentGateway, PaymentResult};

use super::errors::{WalletError, WalletResult};
use super::models::{
    BankDetails, OwnerId, OwnerKind, TransactionId, TxCategory, Wallet, WalletId,
    WalletLifecycle, WalletTransaction, WithdrawalRequest, WithdrawalStatus,
};

/// Wallet operations over an injected ledger store.
pub struct WalletService {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    /// Smallest amount a withdrawal may request, minor units.
    min_withdrawal: i64,
}

impl WalletService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        min_withdrawal: i64,
    ) -> Self {
        Self {
            ledger,
            gateway,
            min_withdrawal,
        }
    }

    /// Get a principal's wallet, creating an empty active one on first use.
    pub async fn get_or_create_wallet(
        &self,
        owner_id: OwnerId,
        kind: OwnerKind,
    ) -> WalletResult<Wallet> {
        self.ledger.get_or_create_wallet(owner_id, kind).await
    }

    /// Get wallet by id.
    pub async fn get_wallet(&self, wallet_id: WalletId) -> WalletResult<Wallet> {
        self.ledger.get_wallet(wallet_id).await
    }

    /// Recorded balance minus pending withdrawal holds: what the owner can
    /// actually spend or withdraw right now.
    pub async fn available_balance(&self, wallet_id: WalletId) -> WalletResult<i64> {
        let wallet = self.ledger.get_wallet(wallet_id).await?;
        let held = self.ledger.pending_debit_total(wallet_id).await?;
        Ok(wallet.balance - held)
    }

    /// Most recent transactions, newest first.
    pub async fn transactions(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> WalletResult<Vec<WalletTransaction>> {
        self.ledger.transactions(wallet_id, limit).await
    }

    /// Staff credit entry, settled immediately.
    pub async fn credit(
        &self,
        wallet_id: WalletId,
        amount: i64,
        category: TxCategory,
        external_ref: Option<&str>,
        description: Option<&str>,
    ) -> WalletResult<WalletTransaction> {
        self.ledger
            .credit_completed(wallet_id, amount, category, external_ref, description)
            .await
    }

    /// Staff debit entry, guarded by the available balance.
    pub async fn debit(
        &self,
        wallet_id: WalletId,
        amount: i64,
        category: TxCategory,
        external_ref: Option<&str>,
        description: Option<&str>,
    ) -> WalletResult<WalletTransaction> {
        self.ledger
            .debit_completed(wallet_id, amount, category, external_ref, description)
            .await
    }

    /// Request a withdrawal: a pending debit holds the amount against the
    /// available balance, and a review record links to it.
    pub async fn request_withdrawal(
        &self,
        wallet_id: WalletId,
        amount: i64,
        bank_details: BankDetails,
    ) -> WalletResult<WithdrawalRequest> {
        if amount < self.min_withdrawal {
            return Err(WalletError::BelowMinimumWithdrawal {
                minimum: self.min_withdrawal,
                requested: amount,
            });
        }
        let hold = self
            .ledger
            .debit_pending(
                wallet_id,
                amount,
                TxCategory::Withdrawal,
                Some("Withdrawal request"),
            )
            .await?;
        let request = self
            .ledger
            .insert_withdrawal(wallet_id, hold.id, amount, &bank_details)
            .await?;
        info!(
            "withdrawal {} requested for wallet {wallet_id}, holding {amount}",
            request.id
        );
        Ok(request)
    }

    /// Review a pending withdrawal.
    ///
    /// The status move is a compare-and-set, so of two concurrent reviewers
    /// exactly one settles the linked hold. Approval settles the debit and
    /// marks the request paid; rejection fails the debit, which releases the
    /// hold without touching the transaction history.
    pub async fn review_withdrawal(
        &self,
        id: i64,
        approve: bool,
    ) -> WalletResult<WithdrawalRequest> {
        let request = self.ledger.get_withdrawal(id).await?;
        if request.status != WithdrawalStatus::Pending {
            return Err(WalletError::InvalidWithdrawalState {
                id,
                expected: WithdrawalStatus::Pending,
                actual: request.status,
            });
        }

        if approve {
            let approved = self
                .ledger
                .update_withdrawal_status(id, WithdrawalStatus::Pending, WithdrawalStatus::Approved)
                .await?;
            self.ledger
                .settle_transaction(approved.transaction_id, SettleOutcome::Completed)
                .await?;
            let paid = self
                .ledger
                .update_withdrawal_status(id, WithdrawalStatus::Approved, WithdrawalStatus::Paid)
                .await?;
            info!("withdrawal {id} approved and paid out {}", paid.amount);
            Ok(paid)
        } else {
            let rejected = self
                .ledger
                .update_withdrawal_status(id, WithdrawalStatus::Pending, WithdrawalStatus::Rejected)
                .await?;
            self.ledger
                .settle_transaction(rejected.transaction_id, SettleOutcome::Failed)
                .await?;
            info!("withdrawal {id} rejected, hold of {} released", rejected.amount);
            Ok(rejected)
        }
    }

    /// Withdrawal requests for a wallet, newest first.
    pub async fn withdrawals(&self, wallet_id: WalletId) -> WalletResult<Vec<WithdrawalRequest>> {
        self.ledger.withdrawals(wallet_id).await
    }

    /// Start a wallet top-up: creates a gateway order and a pending credit
    /// keyed by the order id. The credit settles when the capture webhook
    /// (or the client's verify call) passes signature verification.
    pub async fn begin_topup(
        &self,
        owner_id: OwnerId,
        kind: OwnerKind,
        amount: i64,
        currency: &str,
    ) -> PaymentResult<(GatewayOrder, WalletTransaction)> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount(amount).into());
        }
        let wallet = self.ledger.get_or_create_wallet(owner_id, kind).await?;
        let order = self.gateway.create_order(amount, currency).await?;
        let tx = self
            .ledger
            .credit_pending(
                wallet.id,
                amount,
                TxCategory::Topup,
                &order.order_id,
                Some("Wallet top-up"),
            )
            .await?;
        info!(
            "top-up of {amount} started for wallet {}, order {}",
            wallet.id, order.order_id
        );
        Ok((order, tx))
    }

    /// Recompute the balance from the transaction log. Used by
    /// reconciliation audits; a mismatch with `Wallet::balance` means the
    /// projection drifted and the log wins.
    pub async fn recompute_balance(&self, wallet_id: WalletId) -> WalletResult<i64> {
        self.ledger.completed_sum(wallet_id).await
    }

    /// Freeze a wallet. Frozen wallets reject every balance-affecting
    /// operation until reactivated.
    pub async fn freeze(&self, wallet_id: WalletId) -> WalletResult<Wallet> {
        self.ledger
            .set_lifecycle(wallet_id, WalletLifecycle::Frozen)
            .await
    }

    /// Reactivate a frozen wallet.
    pub async fn unfreeze(&self, wallet_id: WalletId) -> WalletResult<Wallet> {
        self.ledger
            .set_lifecycle(wallet_id, WalletLifecycle::Active)
            .await
    }

    /// Settle a pending transaction directly. Exposed for operational
    /// tooling; the webhook path goes through the reconciler.
    pub async fn settle(
        &self,
        transaction_id: TransactionId,
        outcome: SettleOutcome,
    ) -> WalletResult<WalletTransaction> {
        self.ledger.settle_transaction(transaction_id, outcome).await
    }
}
