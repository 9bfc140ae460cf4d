//! Secret bootstrap from the settings table
//!
//! The token HMAC secret, the vault key for sealing tokens, and the internal
//! service secret are generated on first run and persisted in settings, then
//! loaded into one [`Secrets`] object that is passed to the components that
//! need it. Environment variables override the stored values (useful when
//! multiple instances must share key material).

use crate::{token, Error, Result};
use sqlx::SqlitePool;
use tracing::info;

const TOKEN_HMAC_SECRET_KEY: &str = "token_hmac_secret";
const VAULT_KEY_KEY: &str = "vault_key";
const INTERNAL_SECRET_KEY: &str = "internal_service_secret";

/// Key material loaded once at startup
#[derive(Clone)]
pub struct Secrets {
    /// HMAC-SHA256 key for runtime token verification
    pub token_hmac_secret: Vec<u8>,
    /// AES-256-GCM key for sealing tokens for redisplay
    pub vault_key: [u8; 32],
    /// Shared secret for the service-to-service surface
    pub internal_secret: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl Secrets {
    /// Load secrets, generating and persisting any that are missing.
    pub async fn load_or_init(pool: &SqlitePool) -> Result<Self> {
        let token_hmac_b64 = match std::env::var("LOCSYNC_TOKEN_SECRET") {
            Ok(value) if !value.is_empty() => value,
            _ => load_or_generate(pool, TOKEN_HMAC_SECRET_KEY).await?,
        };
        let vault_key_b64 = match std::env::var("LOCSYNC_VAULT_KEY") {
            Ok(value) if !value.is_empty() => value,
            _ => load_or_generate(pool, VAULT_KEY_KEY).await?,
        };
        let internal_secret = match std::env::var("LOCSYNC_INTERNAL_SECRET") {
            Ok(value) if !value.is_empty() => value,
            _ => load_or_generate(pool, INTERNAL_SECRET_KEY).await?,
        };

        use base64::Engine;
        let token_hmac_secret = base64::engine::general_purpose::STANDARD
            .decode(&token_hmac_b64)
            .map_err(|e| Error::Crypto(format!("invalid token HMAC secret: {}", e)))?;
        let vault_key = token::decode_key_b64(&vault_key_b64)?;

        Ok(Self {
            token_hmac_secret,
            vault_key,
            internal_secret,
        })
    }
}

/// Read a stored secret, generating it on first run. INSERT OR IGNORE then
/// re-read handles two instances initializing concurrently.
async fn load_or_generate(pool: &SqlitePool, key: &str) -> Result<String> {
    let existing: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    if let Some(value) = existing {
        return Ok(value);
    }

    let generated = token::generate_key_b64()?;
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(&generated)
        .execute(pool)
        .await?;
    info!("Generated setting '{}' on first run", key);

    // Re-read: a concurrent initializer may have won the insert race.
    let value: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    Ok(value)
}
