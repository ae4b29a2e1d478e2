//! Configuration for the agent client and the local module store.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::build::PairingPolicy;
use crate::error::{BabError, BabResult};

/// Environment variable for the chat backend base URL.
pub const CHAT_URL_ENV: &str = "BAB_CHAT_URL";
/// Environment variable for the module store base URL.
pub const MODULE_STORE_URL_ENV: &str = "BAB_MODULE_STORE_URL";
/// Environment variable for the request timeout in seconds.
pub const REQUEST_TIMEOUT_ENV: &str = "BAB_REQUEST_TIMEOUT_SECS";
/// Environment variable for the client storage expiry in days.
pub const FLAG_TTL_ENV: &str = "BAB_FLAG_TTL_DAYS";
/// Environment variable selecting the speech/tone pairing policy.
pub const PAIRING_POLICY_ENV: &str = "BAB_PAIRING_POLICY";
/// Environment variable for the file-backed client storage.
pub const STORAGE_PATH_ENV: &str = "BAB_STORAGE_PATH";
/// Environment variable for the local module store port.
pub const PORT_ENV: &str = "BAB_PORT";

const DEFAULT_CHAT_URL: &str = "http://localhost:3000";
const DEFAULT_MODULE_STORE_URL: &str = "http://localhost:5001";
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Longest accepted client storage expiry, in days.
pub const MAX_FLAG_TTL_DAYS: u64 = 3650;

/// Configuration shared by the HTTP clients and the session objects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the chat backend.
    pub chat_base_url: String,
    /// Base URL of the module store.
    pub module_store_url: String,
    /// Request timeout.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Expiry of client-side flags and snapshots, in days.
    pub flag_ttl_days: u64,
    /// Whether speech and tone must be selected together.
    pub pairing_policy: PairingPolicy,
    /// Location of the file-backed client storage, if any.
    pub storage_path: Option<PathBuf>,
    /// Port of the local module store server.
    pub server_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chat_base_url: DEFAULT_CHAT_URL.to_string(),
            module_store_url: DEFAULT_MODULE_STORE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            flag_ttl_days: 7,
            pairing_policy: PairingPolicy::default(),
            storage_path: None,
            server_port: crate::server::DEFAULT_PORT,
        }
    }
}

impl ClientConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the configuration from the process environment.
    ///
    /// # Errors
    /// Returns an error if a variable is set to an unparsable value or the
    /// resulting configuration does not validate.
    pub fn from_env() -> BabResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    /// Returns an error if a value cannot be parsed or validation fails.
    pub fn from_lookup<F>(lookup: F) -> BabResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(CHAT_URL_ENV) {
            config.chat_base_url = url;
        }
        if let Some(url) = lookup(MODULE_STORE_URL_ENV) {
            config.module_store_url = url;
        }
        if let Some(raw) = lookup(REQUEST_TIMEOUT_ENV) {
            let secs = parse_number(REQUEST_TIMEOUT_ENV, &raw)?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(FLAG_TTL_ENV) {
            config.flag_ttl_days = parse_number(FLAG_TTL_ENV, &raw)?;
        }
        if let Some(raw) = lookup(PAIRING_POLICY_ENV) {
            config.pairing_policy = raw
                .parse()
                .map_err(|e| BabError::Config(format!("{PAIRING_POLICY_ENV}: {e}")))?;
        }
        if let Some(path) = lookup(STORAGE_PATH_ENV) {
            config.storage_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(PORT_ENV) {
            config.server_port = raw
                .trim()
                .parse()
                .map_err(|_| BabError::Config(format!("{PORT_ENV} must be a port, got {raw:?}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the chat backend URL.
    #[must_use]
    pub fn with_chat_url(mut self, url: impl Into<String>) -> Self {
        self.chat_base_url = url.into();
        self
    }

    /// Set the module store URL.
    #[must_use]
    pub fn with_module_store_url(mut self, url: impl Into<String>) -> Self {
        self.module_store_url = url.into();
        self
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the client storage expiry.
    #[must_use]
    pub const fn with_flag_ttl_days(mut self, days: u64) -> Self {
        self.flag_ttl_days = days;
        self
    }

    /// Set the speech/tone pairing policy.
    #[must_use]
    pub const fn with_pairing_policy(mut self, policy: PairingPolicy) -> Self {
        self.pairing_policy = policy;
        self
    }

    /// Set the file-backed storage location.
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Expiry applied to client-side flags and snapshots.
    ///
    /// Values above [`MAX_FLAG_TTL_DAYS`] are capped.
    #[must_use]
    pub const fn flag_ttl(&self) -> Duration {
        let days = if self.flag_ttl_days > MAX_FLAG_TTL_DAYS {
            MAX_FLAG_TTL_DAYS
        } else {
            self.flag_ttl_days
        };
        Duration::from_secs(days * SECONDS_PER_DAY)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if a URL is malformed, a duration is zero, or the
    /// storage expiry exceeds [`MAX_FLAG_TTL_DAYS`].
    pub fn validate(&self) -> BabResult<()> {
        Url::parse(&self.chat_base_url)?;
        Url::parse(&self.module_store_url)?;

        if self.request_timeout.is_zero() {
            return Err(BabError::Config("request_timeout must be > 0".to_string()));
        }

        if self.flag_ttl_days == 0 {
            return Err(BabError::Config("flag_ttl_days must be > 0".to_string()));
        }
        if self.flag_ttl_days > MAX_FLAG_TTL_DAYS {
            return Err(BabError::Config(format!(
                "flag_ttl_days must be <= {MAX_FLAG_TTL_DAYS}, got {}",
                self.flag_ttl_days
            )));
        }

        Ok(())
    }
}

fn parse_number(key: &str, raw: &str) -> BabResult<u64> {
    raw.trim()
        .parse()
        .map_err(|_| BabError::Config(format!("{key} must be a positive integer, got {raw:?}")))
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.flag_ttl_days, 7);
        assert_eq!(config.pairing_policy, PairingPolicy::Relaxed);
        assert!(config.validate().is_ok());
        assert_eq!(config.flag_ttl(), Duration::from_secs(7 * 86_400));
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new()
            .with_chat_url("http://chat.local:4000")
            .with_timeout(Duration::from_secs(60))
            .with_pairing_policy(PairingPolicy::Strict);

        assert_eq!(config.chat_base_url, "http://chat.local:4000");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.pairing_policy, PairingPolicy::Strict);
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (MODULE_STORE_URL_ENV, "http://store.local:5555"),
            (FLAG_TTL_ENV, "3"),
            (PAIRING_POLICY_ENV, "strict"),
            (PORT_ENV, "6001"),
        ]);
        let config = ClientConfig::from_lookup(|key| vars.get(key).map(ToString::to_string));

        assert!(config.is_ok());
        let config = config.unwrap_or_default();
        assert_eq!(config.module_store_url, "http://store.local:5555");
        assert_eq!(config.flag_ttl_days, 3);
        assert_eq!(config.pairing_policy, PairingPolicy::Strict);
        assert_eq!(config.server_port, 6001);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let bad_ttl = ClientConfig::from_lookup(|key| (key == FLAG_TTL_ENV).then(|| "soon".to_string()));
        assert!(matches!(bad_ttl, Err(BabError::Config(_))));

        let bad_url =
            ClientConfig::from_lookup(|key| (key == CHAT_URL_ENV).then(|| "not a url".to_string()));
        assert!(matches!(bad_url, Err(BabError::InvalidUrl(_))));
    }

    #[test]
    fn test_oversized_ttl_is_rejected() {
        let huge = ClientConfig::from_lookup(|key| {
            (key == FLAG_TTL_ENV).then(|| "300000000000".to_string())
        });
        assert!(matches!(huge, Err(BabError::Config(_))));

        let at_limit = ClientConfig::from_lookup(|key| {
            (key == FLAG_TTL_ENV).then(|| MAX_FLAG_TTL_DAYS.to_string())
        });
        assert!(at_limit.is_ok());

        let unchecked = ClientConfig::new().with_flag_ttl_days(u64::MAX);
        assert_eq!(
            unchecked.flag_ttl(),
            Duration::from_secs(MAX_FLAG_TTL_DAYS * 86_400)
        );
        assert!(crate::storage::StoredValue::new("x", Some(unchecked.flag_ttl())).is_ok());
    }

    #[test]
    fn test_zero_ttl_is_invalid() {
        let config = ClientConfig::new().with_flag_ttl_days(0);
        assert!(config.validate().is_err());
    }
}
