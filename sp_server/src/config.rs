//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration.

use std::net::SocketAddr;

use stayport::db::DatabaseConfig;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Marketplace business rules
    pub business: BusinessConfig,
    /// Run against the in-memory store instead of PostgreSQL
    pub use_memory_store: bool,
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// JWT signing secret (required)
    pub jwt_secret: String,
    /// Payment gateway webhook secret (required)
    pub webhook_secret: String,
}

/// Business rules injected into the domain services
#[derive(Debug, Clone)]
pub struct BusinessConfig {
    /// Platform commission in basis points of the booking total
    pub commission_basis_points: i64,
    /// Minimum withdrawal amount, minor currency units
    pub min_withdrawal: i64,
    /// Currency code passed to the payment gateway
    pub currency: String,
    /// Minutes before a pending transaction is swept to failed
    pub pending_window_minutes: i64,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// CLI arguments take priority over the environment; required
    /// variables with no safe default produce an error, not a fallback.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or invalid.
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        use_memory_store: bool,
    ) -> Result<Self, ConfigError> {
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| {
                "127.0.0.1:8088"
                    .parse()
                    .expect("Default bind address is valid")
            });

        let database_url = database_url_override
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| "postgres://postgres@localhost/stayport_db".to_string());

        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", 20),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", 5),
            connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT", 10),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT", 600),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME", 1800),
        };

        // Security configuration (REQUIRED)
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        let webhook_secret =
            std::env::var("GATEWAY_WEBHOOK_SECRET").map_err(|_| ConfigError::MissingRequired {
                var: "GATEWAY_WEBHOOK_SECRET".to_string(),
                hint: "Shared secret from the payment gateway dashboard".to_string(),
            })?;

        if jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if webhook_secret.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "GATEWAY_WEBHOOK_SECRET".to_string(),
                reason: "Must be at least 16 characters".to_string(),
            });
        }

        let security = SecurityConfig {
            jwt_secret,
            webhook_secret,
        };

        let business = BusinessConfig {
            commission_basis_points: parse_env_or("COMMISSION_BASIS_POINTS", 1_500),
            min_withdrawal: parse_env_or("MIN_WITHDRAWAL", 10_000),
            currency: std::env::var("CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            pending_window_minutes: parse_env_or("PENDING_WINDOW_MINUTES", 30),
        };

        Ok(ServerConfig {
            bind,
            database,
            security,
            business,
            use_memory_store,
        })
    }

    /// Validate configuration after loading.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the offending variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=10_000).contains(&self.business.commission_basis_points) {
            return Err(ConfigError::Invalid {
                var: "COMMISSION_BASIS_POINTS".to_string(),
                reason: "Must be between 0 and 10000 (0% to 100%)".to_string(),
            });
        }

        if self.business.min_withdrawal <= 0 {
            return Err(ConfigError::Invalid {
                var: "MIN_WITHDRAWAL".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.business.pending_window_minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "PENDING_WINDOW_MINUTES".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.business.currency.len() != 3 {
            return Err(ConfigError::Invalid {
                var: "CURRENCY".to_string(),
                reason: "Must be a 3-letter ISO currency code".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:8088".parse().unwrap(),
            database: DatabaseConfig::development(),
            security: SecurityConfig {
                jwt_secret: "a".repeat(32),
                webhook_secret: "b".repeat(16),
            },
            business: BusinessConfig {
                commission_basis_points: 1_500,
                min_withdrawal: 10_000,
                currency: "INR".to_string(),
                pending_window_minutes: 30,
            },
            use_memory_store: true,
        }
    }

    #[test]
    fn config_error_display_names_the_variable() {
        let err = ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Use openssl".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("JWT_SECRET"));
        assert!(msg.contains("Use openssl"));
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn commission_above_100_percent_is_rejected() {
        let mut config = valid_config();
        config.business.commission_basis_points = 10_001;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn zero_minimum_withdrawal_is_rejected() {
        let mut config = valid_config();
        config.business.min_withdrawal = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn malformed_currency_is_rejected() {
        let mut config = valid_config();
        config.business.currency = "RUPEES".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
