//! Structured logging configuration.
//!
//! Installs a tracing subscriber that also captures `log` records from the
//! stayport crate, with levels configurable via `RUST_LOG`.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging.
///
/// Defaults to `info` with the noisier dependencies turned down; override
/// with the `RUST_LOG` environment variable.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a security event with structured fields.
///
/// Used for signature mismatches, amount mismatches and rejected
/// authentication, so audits can filter on `event_type`.
pub fn log_security_event(event_type: &str, user_id: Option<i64>, message: &str) {
    tracing::warn!(
        event_type = event_type,
        user_id = user_id,
        "SECURITY: {}",
        message
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_event_does_not_panic() {
        log_security_event("test_event", Some(1), "test message");
        log_security_event("anonymous_event", None, "no principal");
    }
}
