use rand::RngCore;
use tracing::warn;

use crate::error::ConfigError;

const DEFAULT_ADDR: &str = "0.0.0.0:9001";
const DEFAULT_DB_PATH: &str = "courier.db";
const DEFAULT_TOKEN_TTL_HOURS: &str = "24";

/// Runtime configuration, read once at startup from the environment
/// (with `.env` support).
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: String,
    pub db_path: String,
    pub token_secret: Vec<u8>,
    pub token_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let addr = std::env::var("COURIER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        let db_path = std::env::var("COURIER_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        let token_ttl_hours = std::env::var("COURIER_TOKEN_TTL_HOURS")
            .unwrap_or_else(|_| DEFAULT_TOKEN_TTL_HOURS.to_string())
            .parse()
            .map_err(|e| ConfigError(format!("Invalid COURIER_TOKEN_TTL_HOURS: {}", e)))?;

        let token_secret = match std::env::var("COURIER_TOKEN_SECRET") {
            Ok(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => {
                // An ephemeral secret invalidates all outstanding tokens
                // on restart.
                warn!("COURIER_TOKEN_SECRET not set, using an ephemeral secret");
                let mut secret = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut secret);
                secret.to_vec()
            }
        };

        Ok(Config {
            addr,
            db_path,
            token_secret,
            token_ttl_hours,
        })
    }
}
