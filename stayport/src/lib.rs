//! # StayPort
//!
//! Booking, inventory and wallet reconciliation core for the StayPort
//! property-booking marketplace.
//!
//! The marketplace surface (property onboarding, search, dashboards) lives
//! elsewhere; this crate owns the three things that can corrupt money or
//! availability under concurrency:
//!
//! - a **wallet ledger** whose balance is a materialized projection over an
//!   append-only transaction log,
//! - a **nightly inventory store** where reservations are all-or-nothing
//!   across a date range and never exceed a unit's capacity,
//! - a **payment reconciler** that applies gateway and partner events to
//!   bookings exactly once, keyed by the gateway's external reference.
//!
//! ## Core Modules
//!
//! - [`wallet`]: balances, transactions, withdrawal holds
//! - [`inventory`]: room types and per-night reservation holds
//! - [`coupon`]: offer lookup and discount computation
//! - [`booking`]: booking creation and the status transition table
//! - [`payment`]: gateway boundary, signature checks, event reconciliation
//! - [`db`]: store traits with PostgreSQL and in-memory backends
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use stayport::db::MemoryStore;
//! use stayport::wallet::{OwnerKind, WalletService};
//! use stayport::payment::MockGateway;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let gateway = Arc::new(MockGateway::new("secret"));
//! let wallets = WalletService::new(store, gateway, 10_000);
//! let wallet = wallets.get_or_create_wallet(1, OwnerKind::Guest).await?;
//! assert_eq!(wallet.balance, 0);
//! # Ok(())
//! # }
//! ```

/// Booking creation and status transitions.
pub mod booking;
/// Offer lookup and discount validation.
pub mod coupon;
/// Persistence layer: store traits, PostgreSQL and in-memory backends.
pub mod db;
/// Room types and nightly reservation holds.
pub mod inventory;
/// Payment gateway boundary and event reconciliation.
pub mod payment;
/// Wallet ledger: balances, transactions, withdrawals.
pub mod wallet;

pub use booking::{Booking, BookingOrchestrator, BookingRequest, BookingStatus, PaymentStatus};
pub use coupon::{CouponValidator, Offer};
pub use inventory::RoomType;
pub use payment::{MockGateway, PaymentGateway, PaymentReconciler, SignatureVerifier};
pub use wallet::{Wallet, WalletService, WalletTransaction};
