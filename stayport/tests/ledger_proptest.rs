//! Property-based tests for the wallet ledger.
//!
//! Drives random operation sequences against the in-memory store and checks
//! that the materialized balance never drifts from the transaction log and
//! that guarded debits can never overdraw.

use std::sync::Arc;

use proptest::prelude::*;

use stayport::db::{LedgerStore, MemoryStore, SettleOutcome};
use stayport::wallet::{OwnerKind, TxCategory};

/// One randomly generated ledger operation.
#[derive(Debug, Clone)]
enum Op {
    CreditCompleted(i64),
    DebitCompleted(i64),
    /// Pending credit settled to the given outcome.
    CreditSettled(i64, bool),
    /// Pending debit left unsettled, holding available balance.
    DebitHold(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let amount = 1i64..10_000;
    prop_oneof![
        amount.clone().prop_map(Op::CreditCompleted),
        amount.clone().prop_map(Op::DebitCompleted),
        (amount.clone(), any::<bool>()).prop_map(|(a, ok)| Op::CreditSettled(a, ok)),
        amount.prop_map(Op::DebitHold),
    ]
}

async fn run_ops(ops: Vec<Op>) -> (i64, i64, i64) {
    let store = Arc::new(MemoryStore::new());
    let wallet = store.get_or_create_wallet(1, OwnerKind::Guest).await.unwrap();

    for (i, op) in ops.into_iter().enumerate() {
        match op {
            Op::CreditCompleted(amount) => {
                store
                    .credit_completed(wallet.id, amount, TxCategory::Manual, None, None)
                    .await
                    .unwrap();
            }
            Op::DebitCompleted(amount) => {
                // May be refused for insufficient available balance.
                let _ = store
                    .debit_completed(wallet.id, amount, TxCategory::Manual, None, None)
                    .await;
            }
            Op::CreditSettled(amount, ok) => {
                let reference = format!("prop_{i}");
                let tx = store
                    .credit_pending(wallet.id, amount, TxCategory::Topup, &reference, None)
                    .await
                    .unwrap();
                let outcome = if ok {
                    SettleOutcome::Completed
                } else {
                    SettleOutcome::Failed
                };
                store.settle_transaction(tx.id, outcome).await.unwrap();
            }
            Op::DebitHold(amount) => {
                let _ = store
                    .debit_pending(wallet.id, amount, TxCategory::Withdrawal, None)
                    .await;
            }
        }
    }

    let wallet = store.get_wallet(wallet.id).await.unwrap();
    let recomputed = store.completed_sum(wallet.id).await.unwrap();
    let held = store.pending_debit_total(wallet.id).await.unwrap();
    (wallet.balance, recomputed, held)
}

proptest! {
    #[test]
    fn balance_always_equals_the_completed_sum(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
        let (balance, recomputed, held) = runtime.block_on(run_ops(ops));

        // The projection never drifts from the log.
        prop_assert_eq!(balance, recomputed);
        // Guarded debits and holds can never overdraw.
        prop_assert!(balance >= 0, "balance went negative: {}", balance);
        prop_assert!(held >= 0 && held <= balance, "holds {} exceed balance {}", held, balance);
    }
}
