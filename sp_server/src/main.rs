//! Booking marketplace reconciliation server.
//!
//! Wires the store backend, payment gateway, domain services and HTTP
//! router together, and runs the background sweeps (stale pending
//! transactions, overdue booking completion).

use std::sync::Arc;

use anyhow::Error;
use chrono::{Duration, Utc};
use ctrlc::set_handler;
use pico_args::Arguments;
use stayport::BookingOrchestrator;
use stayport::WalletService;
use stayport::booking::CommissionPolicy;
use stayport::coupon::CouponValidator;
use stayport::db::{
    BookingStore, Database, InventoryStore, LedgerStore, MemoryStore, OfferStore, PgStore,
};
use stayport::payment::{MockGateway, PaymentReconciler, SignatureVerifier};
use tracing::{error, info};

use sp_server::api::auth::TokenVerifier;
use sp_server::api::{AppState, create_router};
use sp_server::config::ServerConfig;
use sp_server::{logging, metrics};

const HELP: &str = "\
Run the StayPort booking and wallet reconciliation server

USAGE:
  sp_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8088]
  --db-url     URL         Database connection string  [default: env DATABASE_URL or postgres://postgres@localhost/stayport_db]

FLAGS:
  --memory                 Serve from the in-memory store (no PostgreSQL)
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  JWT_SECRET               JWT signing secret (required)
  GATEWAY_WEBHOOK_SECRET   Payment gateway webhook secret (required)
  METRICS_BIND             Prometheus exporter address (optional)
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override = pargs.opt_value_from_str("--bind")?;
    let db_url_override = pargs.opt_value_from_str("--db-url")?;
    let use_memory_store = pargs.contains("--memory");

    // Catching signals for exit.
    set_handler(|| std::process::exit(0))?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, db_url_override, use_memory_store)?;
    config.validate()?;

    if let Ok(metrics_bind) = std::env::var("METRICS_BIND") {
        let addr = metrics_bind.parse()?;
        metrics::init_metrics(addr).map_err(Error::msg)?;
        info!("Prometheus exporter listening on {addr}");
    }

    info!("Starting booking server at {}", config.bind);

    let tokens = Arc::new(TokenVerifier::new(&config.security.jwt_secret));
    let gateway = Arc::new(MockGateway::new(config.security.webhook_secret.clone()));
    let verifier = SignatureVerifier::new(config.security.webhook_secret.clone());

    let state = if config.use_memory_store {
        info!("Serving from the in-memory store");
        let store = Arc::new(MemoryStore::new());
        build_state(&config, store, gateway, verifier, tokens, None)
    } else {
        info!("Connecting to database: {}", config.database.database_url);
        let db = Database::new(&config.database).await?;
        info!("Database connected successfully");
        let store = Arc::new(PgStore::new(db.pool().clone()));
        build_state(&config, store, gateway, verifier, tokens, Some(db))
    };

    spawn_background_sweeps(state.reconciler.clone());

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down server...");

    Ok(())
}

/// Assemble the domain services over any store backend.
fn build_state<S>(
    config: &ServerConfig,
    store: Arc<S>,
    gateway: Arc<MockGateway>,
    verifier: SignatureVerifier,
    tokens: Arc<TokenVerifier>,
    database: Option<Database>,
) -> AppState
where
    S: LedgerStore + InventoryStore + BookingStore + OfferStore + 'static,
{
    let commission = CommissionPolicy::new(config.business.commission_basis_points);
    let coupons = CouponValidator::new(store.clone());

    let wallets = Arc::new(WalletService::new(
        store.clone(),
        gateway.clone(),
        config.business.min_withdrawal,
    ));
    let bookings = Arc::new(BookingOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        coupons,
        gateway,
        commission,
        config.business.currency.clone(),
    ));
    let reconciler = Arc::new(PaymentReconciler::new(
        store.clone(),
        store.clone(),
        store,
        verifier,
        Duration::minutes(config.business.pending_window_minutes),
    ));

    AppState {
        bookings,
        reconciler,
        wallets,
        tokens,
        database,
        currency: config.business.currency.clone(),
    }
}

/// Periodic maintenance: sweep stale pending transactions every minute and
/// roll overdue bookings to completed every hour.
fn spawn_background_sweeps(reconciler: Arc<PaymentReconciler>) {
    let sweeper = reconciler.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            match sweeper.sweep_stale().await {
                Ok(swept) if !swept.is_empty() => {
                    metrics::stale_transactions_swept(swept.len() as u64);
                }
                Ok(_) => {}
                Err(e) => error!("stale transaction sweep failed: {e}"),
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match reconciler.rollover_completed(Utc::now().date_naive()).await {
                Ok(completed) if !completed.is_empty() => {
                    info!("rolled {} overdue bookings to completed", completed.len());
                    metrics::bookings_rolled_over(completed.len() as u64);
                }
                Ok(_) => {}
                Err(e) => error!("completion rollover failed: {e}"),
            }
        }
    });
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
