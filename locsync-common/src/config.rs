//! Server configuration loading
//!
//! Configuration is resolved once at startup and passed explicitly into the
//! components that need it. Resolution priority for every field:
//!
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Secrets (token HMAC key, vault key, internal service secret) are not part
//! of this struct; they live in the `settings` table and are initialized on
//! first run (see [`crate::db::secrets`]).

use crate::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default HTTP bind address
const DEFAULT_BIND: &str = "127.0.0.1:5760";

/// Default database file name, relative to the working directory
const DEFAULT_DB_PATH: &str = "locsync.db";

/// Staleness window for liveness heartbeats: an active session whose last
/// heartbeat is older than this is lazily expired with reason `timeout`.
pub const HEARTBEAT_STALENESS: Duration = Duration::from_secs(60);

/// Gate window: a session is "open enough to accept capture" for this long
/// after it opened, independent of heartbeat cadence. Distinct from
/// [`HEARTBEAT_STALENESS`]; the two must not be conflated.
pub const SESSION_GATE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Resolved server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address
    pub bind: SocketAddr,
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    /// Heartbeat staleness window (overridable for tests)
    pub heartbeat_staleness: Duration,
    /// Session gate TTL
    pub session_gate_ttl: Duration,
}

/// Raw TOML config file shape; all fields optional
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    bind: Option<String>,
    db_path: Option<String>,
}

impl Config {
    /// Resolve configuration from CLI arguments, environment, and an
    /// optional TOML file.
    pub fn resolve(
        cli_bind: Option<&str>,
        cli_db_path: Option<&str>,
        config_file: Option<&Path>,
    ) -> Result<Self> {
        let file = match config_file {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };

        let bind = cli_bind
            .map(str::to_string)
            .or_else(|| std::env::var("LOCSYNC_BIND").ok())
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", bind, e)))?;

        let db_path = cli_db_path
            .map(str::to_string)
            .or_else(|| std::env::var("LOCSYNC_DB").ok())
            .or(file.db_path)
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        Ok(Self {
            bind,
            db_path: PathBuf::from(db_path),
            heartbeat_staleness: HEARTBEAT_STALENESS,
            session_gate_ttl: SESSION_GATE_TTL,
        })
    }
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read config file {:?}: {}", path, e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Cannot parse config file {:?}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_when_nothing_given() {
        let config = Config::resolve(None, None, None).unwrap();
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.heartbeat_staleness, Duration::from_secs(60));
        assert!(config.session_gate_ttl > config.heartbeat_staleness);
    }

    #[test]
    fn cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind = \"127.0.0.1:9999\"\ndb_path = \"/tmp/file.db\"").unwrap();

        let config =
            Config::resolve(Some("127.0.0.1:8888"), None, Some(file.path())).unwrap();
        assert_eq!(config.bind.to_string(), "127.0.0.1:8888");
        // db_path not given on CLI, falls through to the file
        assert_eq!(config.db_path, PathBuf::from("/tmp/file.db"));
    }

    #[test]
    fn invalid_bind_is_rejected() {
        let result = Config::resolve(Some("not-an-address"), None, None);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
