//! Environment-driven configuration, loaded once and validated before use.
//! Every value comes from the process environment rather than a TOML file,
//! since this is a daemon meant to run from a container image, not a
//! developer's machine.

use std::env;

/// Signaling server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. Required.
    pub database_url: String,
    /// Port the HTTP/WebSocket listener binds. Defaults to 4000.
    pub port: u16,
    /// Origin allowed to make cross-origin requests (the web client).
    pub client_url: String,
    /// `development` or `production`. Controls whether a missing
    /// `METADATA_ENCRYPTION_KEY` is fatal.
    pub node_env: String,
    /// Field-encryption key: 64 hex characters, or a passphrase to derive
    /// one from via Argon2id. Required in production.
    pub metadata_encryption_key: Option<String>,
    /// TURN server URL, e.g. `turn:relay.example.com:3478`.
    pub turn_server: Option<String>,
    /// Shared secret for minting time-limited TURN credentials.
    pub turn_secret: Option<String>,
    /// Whether to also advertise a `turns:` (TLS) relay entry.
    pub turns_enabled: bool,
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is unset or `PORT` is set but not
    /// a valid `u16`.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let port = match env::var("PORT") {
            Ok(raw) => raw.parse().map_err(|_| anyhow::anyhow!("PORT must be a valid port number, got {raw:?}"))?,
            Err(_) => 4000,
        };

        let client_url = env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let node_env = env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string());
        let metadata_encryption_key = env::var("METADATA_ENCRYPTION_KEY").ok();
        let turn_server = env::var("TURN_SERVER").ok();
        let turn_secret = env::var("TURN_SECRET").ok();
        let turns_enabled = env::var("TURNS_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            database_url,
            port,
            client_url,
            node_env,
            metadata_encryption_key,
            turn_server,
            turn_secret,
            turns_enabled,
        })
    }

    /// True when running in the production deployment variant.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.node_env == "production"
    }

    /// Validate the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is empty, if running in
    /// production without `METADATA_ENCRYPTION_KEY`, or if TURN relay is
    /// only half-configured.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL must not be empty");
        }

        if self.is_production() && self.metadata_encryption_key.is_none() {
            anyhow::bail!("METADATA_ENCRYPTION_KEY is required when NODE_ENV=production");
        }

        if self.turn_server.is_some() != self.turn_secret.is_some() {
            anyhow::bail!("TURN_SERVER and TURN_SECRET must be set together");
        }

        if self.turns_enabled && self.turn_server.is_none() {
            anyhow::bail!("TURNS_ENABLED requires TURN_SERVER and TURN_SECRET to also be set");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            database_url: "postgres://localhost/sig".to_string(),
            port: 4000,
            client_url: "http://localhost:3000".to_string(),
            node_env: "development".to_string(),
            metadata_encryption_key: None,
            turn_server: None,
            turn_secret: None,
            turns_enabled: false,
        }
    }

    #[test]
    fn development_without_encryption_key_is_valid() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn production_without_encryption_key_is_rejected() {
        let mut config = base();
        config.node_env = "production".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn half_configured_turn_is_rejected() {
        let mut config = base();
        config.turn_server = Some("turn:relay.example.com:3478".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn turns_without_turn_server_is_rejected() {
        let mut config = base();
        config.turns_enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_database_url_is_rejected() {
        let mut config = base();
        config.database_url = "   ".to_string();
        assert!(config.validate().is_err());
    }
}
