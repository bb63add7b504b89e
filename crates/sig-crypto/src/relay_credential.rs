//! Time-limited HMAC-derived credentials for the external TURN relay, and
//! the connectivity-establishment server list built from them.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{CryptoError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Default credential time-to-live: 24 hours.
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

/// One connectivity-establishment server entry, as handed to the browser's
/// `RTCPeerConnection` constructor.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IceServer {
    /// One or more server URLs sharing the same credentials.
    pub urls: Vec<String>,
    /// Minted username, present only for TURN/TURNS entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Minted credential, present only for TURN/TURNS entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Static, deployment-level configuration for relay credential minting.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Always-present public STUN server URL.
    pub stun_url: String,
    /// `host:port` of the TURN relay, if one is configured.
    pub turn_server: Option<String>,
    /// Shared secret used to mint time-limited TURN credentials.
    pub turn_secret: Option<String>,
    /// Whether a `turns:` (TLS) entry should also be advertised.
    pub turns_enabled: bool,
    /// Credential lifetime.
    pub ttl_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            stun_url: "stun:stun.l.google.com:19302".to_string(),
            turn_server: None,
            turn_secret: None,
            turns_enabled: false,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

/// Mints time-limited TURN credentials and assembles the ICE server list.
pub struct RelayCredentialMinter {
    config: RelayConfig,
}

impl RelayCredentialMinter {
    /// Build a minter from static configuration.
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Mint a `(username, credential)` pair valid from `now` for this
    /// minter's configured TTL. `user_tag` identifies the caller (e.g. an
    /// endpoint id) in the minted username for downstream auditing on the
    /// relay side; it carries no authorization meaning to this server.
    pub fn mint(&self, now_unix: u64, user_tag: &str) -> Result<(String, String)> {
        let secret = self
            .config
            .turn_secret
            .as_ref()
            .ok_or_else(|| CryptoError::CredentialGenerationFailed("no turn secret configured".into()))?;

        let expiry = now_unix + self.config.ttl_secs;
        let username = format!("{expiry}:{user_tag}");

        let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
            .map_err(|e| CryptoError::CredentialGenerationFailed(e.to_string()))?;
        mac.update(username.as_bytes());
        let credential = STANDARD.encode(mac.finalize().into_bytes());

        Ok((username, credential))
    }

    /// Build the full ICE server list: a public STUN entry always, plus a
    /// STUN + UDP/TCP TURN pair with shared minted credentials when a relay
    /// is configured, plus a `turns:` entry when enabled. Any failure while
    /// minting TURN credentials falls back to the STUN-only list — the
    /// credential endpoint must never refuse the request.
    #[must_use]
    pub fn ice_servers(&self, now_unix: u64, user_tag: &str) -> Vec<IceServer> {
        let mut servers = vec![IceServer {
            urls: vec![self.config.stun_url.clone()],
            username: None,
            credential: None,
        }];

        let Some(turn_server) = &self.config.turn_server else {
            return servers;
        };

        match self.mint(now_unix, user_tag) {
            Ok((username, credential)) => {
                servers.push(IceServer {
                    urls: vec![
                        format!("stun:{turn_server}"),
                        format!("turn:{turn_server}?transport=udp"),
                        format!("turn:{turn_server}?transport=tcp"),
                    ],
                    username: Some(username.clone()),
                    credential: Some(credential.clone()),
                });

                if self.config.turns_enabled {
                    servers.push(IceServer {
                        urls: vec![format!("turns:{turn_server}?transport=tcp")],
                        username: Some(username),
                        credential: Some(credential),
                    });
                }
            }
            Err(error) => {
                tracing::warn!(%error, "turn credential minting failed, falling back to stun-only");
            }
        }

        servers
    }
}
