//! End-to-end booking flows over the in-memory store: contention,
//! cancellation, coupons and the payment handshake.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use stayport::booking::{
    BookingError, BookingOrchestrator, BookingRequest, BookingStatus, CommissionPolicy,
    PaymentStatus,
};
use stayport::coupon::{CouponError, CouponValidator, DiscountType, NewOffer};
use stayport::db::{
    BookingStore, InventoryStore, LedgerStore, MemoryStore, OfferStore, SettleOutcome,
};
use stayport::inventory::{InventoryError, NewRoomType};
use stayport::payment::{
    CaptureOutcome, GatewayCapture, MockGateway, PaymentError, PaymentReconciler,
};
use stayport::wallet::{OwnerKind, TxStatus, WalletError, WalletLifecycle};

const SECRET: &str = "booking-secret";
const PARTNER: i64 = 900;

struct Engine {
    store: Arc<MemoryStore>,
    gateway: Arc<MockGateway>,
    orchestrator: BookingOrchestrator,
    reconciler: PaymentReconciler,
}

fn engine() -> Engine {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MockGateway::new(SECRET));
    let orchestrator = BookingOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        CouponValidator::new(store.clone()),
        gateway.clone(),
        CommissionPolicy::new(1_500), // 15%
        "INR",
    );
    let reconciler = PaymentReconciler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        gateway.verifier(),
        Duration::minutes(30),
    );
    Engine {
        store,
        gateway,
        orchestrator,
        reconciler,
    }
}

async fn seed_room(store: &MemoryStore, total: i32, price: i64) -> i64 {
    store
        .insert_room_type(NewRoomType {
            property_id: 11,
            name: "Deluxe".to_string(),
            total_inventory: total,
            price_per_night: price,
            max_occupancy: 2,
            is_active: true,
        })
        .await
        .unwrap()
        .id
}

fn d(s: &str) -> NaiveDate {
    s.parse().expect("valid date")
}

fn request(user: i64, room: i64, check_in: &str, check_out: &str) -> BookingRequest {
    BookingRequest {
        user_id: user,
        room_type_id: room,
        check_in: d(check_in),
        check_out: d(check_out),
        rooms: 1,
        guests: 2,
        coupon_code: None,
        quoted_discount: None,
        pay_at_property: false,
        partner_id: PARTNER,
    }
}

/// Settle the prepaid booking's gateway order as the webhook would.
async fn pay(engine: &Engine, order_id: &str, amount: i64) {
    let capture = GatewayCapture {
        order_id: order_id.to_string(),
        payment_id: format!("pay_{order_id}"),
        amount,
        signature: engine.gateway.sign(order_id, &format!("pay_{order_id}")),
    };
    engine.reconciler.apply_capture(&capture).await.unwrap();
}

#[tokio::test]
async fn prepaid_booking_confirms_and_settles_the_payout() {
    let eng = engine();
    let room = seed_room(&eng.store, 3, 2_000).await;

    let booking = eng
        .orchestrator
        .create_booking(request(1, room, "2026-09-10", "2026-09-12"))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.total_amount, 4_000);
    assert_eq!(booking.partner_payout, 3_400);
    let order_id = booking.payment_ref.clone().unwrap();

    // Payout is pending until the gateway confirms.
    let partner_wallet = eng
        .store
        .get_or_create_wallet(PARTNER, OwnerKind::Partner)
        .await
        .unwrap();
    assert_eq!(partner_wallet.balance, 0);

    pay(&eng, &order_id, 4_000).await;

    let booking = eng.orchestrator.get_booking(booking.id).await.unwrap();
    assert_eq!(booking.payment_status, PaymentStatus::Paid);
    // Gross credited, commission retained: partner keeps the net share.
    let partner_wallet = eng.store.get_wallet(partner_wallet.id).await.unwrap();
    assert_eq!(partner_wallet.balance, 3_400);
}

#[tokio::test]
async fn capacity_is_never_exceeded_under_contention() {
    let eng = engine();
    let room = seed_room(&eng.store, 1, 2_000).await;
    let orchestrator = Arc::new(eng.orchestrator);

    let a = {
        let o = orchestrator.clone();
        let req = request(1, room, "2026-09-10", "2026-09-12");
        tokio::spawn(async move { o.create_booking(req).await })
    };
    let b = {
        let o = orchestrator.clone();
        let req = request(2, room, "2026-09-10", "2026-09-12");
        tokio::spawn(async move { o.create_booking(req).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let lost = results
        .into_iter()
        .find(|r| r.is_err())
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        lost,
        BookingError::Inventory(InventoryError::OutOfInventory { .. })
    ));
    assert_eq!(eng.store.held_on(room, d("2026-09-10")).await.unwrap(), 1);
}

#[tokio::test]
async fn cancellation_frees_the_overlapping_night() {
    let eng = engine();
    let room = seed_room(&eng.store, 1, 2_000).await;

    // Guest A holds Aug 10-12; B wants Aug 11-13 and collides on the 11th.
    let a = eng
        .orchestrator
        .create_booking(request(1, room, "2026-08-10", "2026-08-12"))
        .await
        .unwrap();
    let err = eng
        .orchestrator
        .create_booking(request(2, room, "2026-08-11", "2026-08-13"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::Inventory(InventoryError::OutOfInventory { .. })
    ));

    let cancelled = eng.reconciler.cancel(a.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(eng.store.held_on(room, d("2026-08-11")).await.unwrap(), 0);

    let retry = eng
        .orchestrator
        .create_booking(request(2, room, "2026-08-11", "2026-08-13"))
        .await
        .unwrap();
    assert_eq!(retry.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn cancelling_a_paid_booking_refunds_and_unwinds_the_payout() {
    let eng = engine();
    let room = seed_room(&eng.store, 2, 2_000).await;

    let booking = eng
        .orchestrator
        .create_booking(request(1, room, "2026-09-10", "2026-09-12"))
        .await
        .unwrap();
    let order_id = booking.payment_ref.clone().unwrap();
    pay(&eng, &order_id, 4_000).await;

    let cancelled = eng.reconciler.cancel(booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);

    let guest = eng
        .store
        .get_or_create_wallet(1, OwnerKind::Guest)
        .await
        .unwrap();
    assert_eq!(guest.balance, 4_000);
    let partner = eng
        .store
        .get_or_create_wallet(PARTNER, OwnerKind::Partner)
        .await
        .unwrap();
    assert_eq!(partner.balance, 0);
    assert_eq!(eng.store.held_on(room, d("2026-09-10")).await.unwrap(), 0);

    // Cancelling again is rejected, and nothing moves twice.
    let err = eng.reconciler.cancel(booking.id).await.unwrap_err();
    assert!(err.client_message().contains("Cannot transition"));
    let guest = eng.store.get_wallet(guest.id).await.unwrap();
    assert_eq!(guest.balance, 4_000);
}

#[tokio::test]
async fn cancelling_an_unpaid_prepaid_booking_kills_the_pending_payout() {
    let eng = engine();
    let room = seed_room(&eng.store, 2, 2_000).await;

    let booking = eng
        .orchestrator
        .create_booking(request(1, room, "2026-09-10", "2026-09-12"))
        .await
        .unwrap();
    let order_id = booking.payment_ref.clone().unwrap();

    eng.reconciler.cancel(booking.id).await.unwrap();

    let tx = eng
        .store
        .find_transaction_by_ref(&order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TxStatus::Failed);
}

#[tokio::test]
async fn commission_is_recovered_on_the_capture_retry() {
    let eng = engine();
    let room = seed_room(&eng.store, 2, 2_000).await;

    let booking = eng
        .orchestrator
        .create_booking(request(1, room, "2026-09-10", "2026-09-12"))
        .await
        .unwrap();
    let order_id = booking.payment_ref.clone().unwrap();

    // Freeze the partner wallet: the capture settles the payout credit but
    // the commission debit is rejected mid-routing.
    let partner = eng
        .store
        .get_or_create_wallet(PARTNER, OwnerKind::Partner)
        .await
        .unwrap();
    eng.store
        .set_lifecycle(partner.id, WalletLifecycle::Frozen)
        .await
        .unwrap();

    let capture = GatewayCapture {
        order_id: order_id.clone(),
        payment_id: "pay_1".to_string(),
        amount: 4_000,
        signature: eng.gateway.sign(&order_id, "pay_1"),
    };
    let err = eng.reconciler.apply_capture(&capture).await.unwrap_err();
    assert!(matches!(
        err,
        PaymentError::Wallet(WalletError::WalletFrozen(_))
    ));
    assert_eq!(eng.store.get_wallet(partner.id).await.unwrap().balance, 4_000);

    // The gateway retry answers duplicate but still lands the owed
    // commission.
    eng.store
        .set_lifecycle(partner.id, WalletLifecycle::Active)
        .await
        .unwrap();
    let outcome = eng.reconciler.apply_capture(&capture).await.unwrap();
    assert!(matches!(outcome, CaptureOutcome::Duplicate));
    assert_eq!(eng.store.get_wallet(partner.id).await.unwrap().balance, 3_400);
    let commission = eng
        .store
        .find_transaction_by_ref(&format!("comm_{order_id}"))
        .await
        .unwrap();
    assert!(commission.is_some());
}

#[tokio::test]
async fn capture_landing_on_a_cancelled_booking_refunds_the_guest() {
    let eng = engine();
    let room = seed_room(&eng.store, 2, 2_000).await;

    let booking = eng
        .orchestrator
        .create_booking(request(1, room, "2026-09-10", "2026-09-12"))
        .await
        .unwrap();
    let order_id = booking.payment_ref.clone().unwrap();

    // The cancellation wins the status race before the capture lands.
    eng.store
        .transition_status(booking.id, BookingStatus::Confirmed, BookingStatus::Cancelled)
        .await
        .unwrap();

    pay(&eng, &order_id, 4_000).await;

    let after = eng.store.get_booking(booking.id).await.unwrap();
    assert_eq!(after.status, BookingStatus::Cancelled);
    assert_eq!(after.payment_status, PaymentStatus::Refunded);
    let guest = eng
        .store
        .get_or_create_wallet(1, OwnerKind::Guest)
        .await
        .unwrap();
    assert_eq!(guest.balance, 4_000);
    let partner = eng
        .store
        .get_or_create_wallet(PARTNER, OwnerKind::Partner)
        .await
        .unwrap();
    assert_eq!(partner.balance, 0);
}

#[tokio::test]
async fn cancellation_racing_a_capture_converges_on_a_refund() {
    let eng = engine();
    let room = seed_room(&eng.store, 2, 2_000).await;

    let booking = eng
        .orchestrator
        .create_booking(request(1, room, "2026-09-10", "2026-09-12"))
        .await
        .unwrap();
    let order_id = booking.payment_ref.clone().unwrap();

    // The capture settles the payout after the cancellation has read the
    // booking as unpaid.
    let tx = eng
        .store
        .find_transaction_by_ref(&order_id)
        .await
        .unwrap()
        .unwrap();
    eng.store
        .settle_transaction(tx.id, SettleOutcome::Completed)
        .await
        .unwrap();

    let cancelled = eng.reconciler.cancel(booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
    let guest = eng
        .store
        .get_or_create_wallet(1, OwnerKind::Guest)
        .await
        .unwrap();
    assert_eq!(guest.balance, 4_000);
    let partner = eng
        .store
        .get_or_create_wallet(PARTNER, OwnerKind::Partner)
        .await
        .unwrap();
    assert_eq!(partner.balance, 0);
}

#[tokio::test]
async fn server_discount_wins_over_the_client_quote() {
    let eng = engine();
    let room = seed_room(&eng.store, 2, 2_000).await;
    eng.store
        .insert_offer(NewOffer {
            code: "WINTER15".to_string(),
            discount_type: DiscountType::Percent,
            discount_value: 15,
            valid_from: d("2026-01-01"),
            valid_until: d("2026-12-31"),
            min_booking_amount: 1_000,
            usage_limit_per_user: 1,
            is_active: true,
        })
        .await
        .unwrap();

    let mut req = request(1, room, "2026-09-10", "2026-09-12");
    req.coupon_code = Some("winter15".to_string());
    req.quoted_discount = Some(9_999); // stale or tampered client quote

    let booking = eng.orchestrator.create_booking(req).await.unwrap();
    assert_eq!(booking.discount_amount, 600); // 15% of 4000
    assert_eq!(booking.total_amount, 3_400);
    assert_eq!(booking.coupon_code.as_deref(), Some("WINTER15"));

    // Second use by the same guest exceeds the per-user limit.
    let mut again = request(1, room, "2026-10-10", "2026-10-12");
    again.coupon_code = Some("WINTER15".to_string());
    let err = eng.orchestrator.create_booking(again).await.unwrap_err();
    assert!(matches!(
        err,
        BookingError::Coupon(CouponError::UsageExceeded { .. })
    ));
}

#[tokio::test]
async fn cancelled_bookings_give_the_coupon_use_back() {
    let eng = engine();
    let room = seed_room(&eng.store, 2, 2_000).await;
    eng.store
        .insert_offer(NewOffer {
            code: "ONCE".to_string(),
            discount_type: DiscountType::Flat,
            discount_value: 500,
            valid_from: d("2026-01-01"),
            valid_until: d("2026-12-31"),
            min_booking_amount: 0,
            usage_limit_per_user: 1,
            is_active: true,
        })
        .await
        .unwrap();

    let mut req = request(1, room, "2026-09-10", "2026-09-12");
    req.coupon_code = Some("ONCE".to_string());
    let booking = eng.orchestrator.create_booking(req).await.unwrap();
    eng.reconciler.cancel(booking.id).await.unwrap();

    let mut retry = request(1, room, "2026-10-10", "2026-10-12");
    retry.coupon_code = Some("ONCE".to_string());
    let booking = eng.orchestrator.create_booking(retry).await.unwrap();
    assert_eq!(booking.discount_amount, 500);
}

#[tokio::test]
async fn validation_rejects_bad_dates_and_overflowing_guests() {
    let eng = engine();
    let room = seed_room(&eng.store, 2, 2_000).await;

    let mut inverted = request(1, room, "2026-09-12", "2026-09-10");
    inverted.rooms = 1;
    assert!(matches!(
        eng.orchestrator.create_booking(inverted).await.unwrap_err(),
        BookingError::InvalidDates { .. }
    ));

    let mut crowded = request(1, room, "2026-09-10", "2026-09-12");
    crowded.guests = 5; // max_occupancy 2 x 2 rooms = 4
    crowded.rooms = 2;
    assert!(matches!(
        eng.orchestrator.create_booking(crowded).await.unwrap_err(),
        BookingError::OverOccupancy {
            guests: 5,
            capacity: 4
        }
    ));

    let mut no_rooms = request(1, room, "2026-09-10", "2026-09-12");
    no_rooms.rooms = 0;
    assert!(matches!(
        eng.orchestrator.create_booking(no_rooms).await.unwrap_err(),
        BookingError::InvalidRooms(0)
    ));
}

#[tokio::test]
async fn pay_at_property_lifecycle_with_cash_settlement() {
    let eng = engine();
    let room = seed_room(&eng.store, 2, 2_000).await;

    let mut req = request(1, room, "2026-09-10", "2026-09-12");
    req.pay_at_property = true;
    let booking = eng.orchestrator.create_booking(req).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert!(booking.payment_ref.is_none());

    // Cash settles the payment status without moving the booking status.
    let paid = eng.reconciler.mark_paid(booking.id).await.unwrap();
    assert_eq!(paid.status, BookingStatus::Pending);
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    // Idempotent.
    eng.reconciler.mark_paid(booking.id).await.unwrap();
}

#[tokio::test]
async fn stay_lifecycle_to_completion_releases_holds_and_pays_cash_bookings() {
    let eng = engine();
    let room = seed_room(&eng.store, 2, 2_000).await;

    let booking = eng
        .orchestrator
        .create_booking(request(1, room, "2026-09-10", "2026-09-12"))
        .await
        .unwrap();
    let order_id = booking.payment_ref.clone().unwrap();
    pay(&eng, &order_id, 4_000).await;

    let checked_in = eng.reconciler.check_in(booking.id).await.unwrap();
    assert_eq!(checked_in.status, BookingStatus::CheckedIn);
    let completed = eng.reconciler.complete(booking.id).await.unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);
    assert_eq!(eng.store.held_on(room, d("2026-09-10")).await.unwrap(), 0);

    // Prepaid payout already settled at capture; completion adds nothing.
    let partner = eng
        .store
        .get_or_create_wallet(PARTNER, OwnerKind::Partner)
        .await
        .unwrap();
    assert_eq!(partner.balance, 3_400);
}

#[tokio::test]
async fn rollover_completes_overstayed_bookings() {
    let eng = engine();
    let room = seed_room(&eng.store, 2, 2_000).await;

    let mut cash = request(1, room, "2026-08-20", "2026-08-22");
    cash.pay_at_property = true;
    let booking = eng.orchestrator.create_booking(cash).await.unwrap();
    // Cash booking confirmed by staff, paid on arrival, never checked out
    // in the system.
    eng.store
        .transition_status(booking.id, BookingStatus::Pending, BookingStatus::Confirmed)
        .await
        .unwrap();
    eng.reconciler.mark_paid(booking.id).await.unwrap();

    let completed = eng.reconciler.rollover_completed(d("2026-08-25")).await.unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].status, BookingStatus::Completed);

    // Completion pays the cash booking's net share to the partner.
    let partner = eng
        .store
        .get_or_create_wallet(PARTNER, OwnerKind::Partner)
        .await
        .unwrap();
    assert_eq!(partner.balance, booking.partner_payout);

    // Running the rollover again finds nothing to do.
    let again = eng.reconciler.rollover_completed(d("2026-08-25")).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn no_show_releases_inventory() {
    let eng = engine();
    let room = seed_room(&eng.store, 1, 2_000).await;

    let mut req = request(1, room, "2026-09-10", "2026-09-12");
    req.pay_at_property = true;
    let booking = eng.orchestrator.create_booking(req).await.unwrap();

    let gone = eng.reconciler.no_show(booking.id).await.unwrap();
    assert_eq!(gone.status, BookingStatus::NoShow);
    assert_eq!(eng.store.held_on(room, d("2026-09-10")).await.unwrap(), 0);
}

#[tokio::test]
async fn gateway_failure_rolls_the_whole_booking_back() {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MockGateway::failing(SECRET, "gateway down"));
    let orchestrator = BookingOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        CouponValidator::new(store.clone()),
        gateway,
        CommissionPolicy::new(1_500),
        "INR",
    );
    let room = seed_room(&store, 1, 2_000).await;

    let err = orchestrator
        .create_booking(request(1, room, "2026-09-10", "2026-09-12"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Gateway(_)));
    // No orphan holds: the nights are bookable again.
    assert_eq!(store.held_on(room, d("2026-09-10")).await.unwrap(), 0);
}

#[tokio::test]
async fn inactive_rooms_cannot_be_booked() {
    let eng = engine();
    let id = eng
        .store
        .insert_room_type(NewRoomType {
            property_id: 11,
            name: "Retired".to_string(),
            total_inventory: 5,
            price_per_night: 1_000,
            max_occupancy: 2,
            is_active: false,
        })
        .await
        .unwrap()
        .id;

    let err = eng
        .orchestrator
        .create_booking(request(1, id, "2026-09-10", "2026-09-12"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::Inventory(InventoryError::RoomTypeInactive(_))
    ));
}
