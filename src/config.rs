//! Client configuration and construction-time validation.
//!
//! A [`ClientConfig`] is plain data; [`ClientConfig::validate`] turns it into
//! the typed pieces the client runs on, or a [`ConfigError`] describing the
//! first violation. No partially-validated client ever exists.

use std::time::Duration;
use url::Url;

use crate::crypto::PublicKey;
use crate::error::ConfigError;

/// Default freshness window for verified rules containers.
pub const DEFAULT_RULES_CACHE_TTL: Duration = Duration::from_secs(300);
/// Default deadline for a single HTTP round trip.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The client-configured set of SuperAdmin public keys together with the
/// number of distinct keys that must sign the rules container.
///
/// Set once at construction, immutable and freely shareable afterwards.
/// Invariant: `1 <= min_valid_signatures <= keys.len()`.
#[derive(Debug, Clone)]
pub struct SuperAdminSet {
    keys: Vec<PublicKey>,
    min_valid_signatures: usize,
}

impl SuperAdminSet {
    pub fn new(keys: Vec<PublicKey>, min_valid_signatures: usize) -> Result<Self, ConfigError> {
        if keys.is_empty() {
            return Err(ConfigError::NoSuperAdminKeys);
        }
        if min_valid_signatures == 0 || min_valid_signatures > keys.len() {
            return Err(ConfigError::BadSignatureThreshold {
                configured: min_valid_signatures,
                keys: keys.len(),
            });
        }
        Ok(SuperAdminSet {
            keys,
            min_valid_signatures,
        })
    }

    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    pub fn min_valid_signatures(&self) -> usize {
        self.min_valid_signatures
    }
}

/// A SuperAdmin key as supplied by the application: either a PEM string to
/// be parsed here, or a key parsed elsewhere.
#[derive(Debug, Clone)]
pub enum SuperAdminKey {
    Pem(String),
    Parsed(PublicKey),
}

impl From<PublicKey> for SuperAdminKey {
    fn from(key: PublicKey) -> Self {
        SuperAdminKey::Parsed(key)
    }
}

impl From<&str> for SuperAdminKey {
    fn from(pem: &str) -> Self {
        SuperAdminKey::Pem(pem.to_owned())
    }
}

/// Configuration bundle for [`crate::client::CustodyClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server, e.g. `https://custody.example.com`.
    pub host: String,
    /// API key attached to every request.
    pub api_key: String,
    /// Hex-encoded API secret used to sign requests.
    pub api_secret: String,
    /// SuperAdmin keys authorized to sign the governance rules.
    pub super_admin_keys: Vec<SuperAdminKey>,
    /// Distinct SuperAdmin signatures required on the rules container.
    pub min_valid_signatures: usize,
    /// Freshness window for cached verified rules. Zero disables caching.
    pub rules_cache_ttl: Duration,
    /// Deadline for a single HTTP round trip.
    pub http_timeout: Duration,
}

impl ClientConfig {
    pub fn new(
        host: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        ClientConfig {
            host: host.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            super_admin_keys: Vec::new(),
            min_valid_signatures: 1,
            rules_cache_ttl: DEFAULT_RULES_CACHE_TTL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    pub fn super_admin_key(mut self, key: impl Into<SuperAdminKey>) -> Self {
        self.super_admin_keys.push(key.into());
        self
    }

    pub fn min_valid_signatures(mut self, n: usize) -> Self {
        self.min_valid_signatures = n;
        self
    }

    pub fn rules_cache_ttl(mut self, ttl: Duration) -> Self {
        self.rules_cache_ttl = ttl;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Check every invariant and produce the validated pieces the client is
    /// built from.
    pub(crate) fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        let base_url = Url::parse(&self.host).map_err(ConfigError::BadHost)?;
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.api_secret.is_empty() {
            return Err(ConfigError::BadApiSecret);
        }
        let api_secret = hex::decode(&self.api_secret).map_err(|_| ConfigError::BadApiSecret)?;

        let mut keys = Vec::with_capacity(self.super_admin_keys.len());
        for (index, key) in self.super_admin_keys.iter().enumerate() {
            match key {
                SuperAdminKey::Parsed(key) => keys.push(key.clone()),
                SuperAdminKey::Pem(pem) => keys.push(
                    PublicKey::from_pem(pem)
                        .map_err(|source| ConfigError::BadSuperAdminKey { index, source })?,
                ),
            }
        }
        let super_admins = SuperAdminSet::new(keys, self.min_valid_signatures)?;

        Ok(ValidatedConfig {
            base_url,
            api_key: self.api_key.clone(),
            api_secret,
            super_admins,
            rules_cache_ttl: self.rules_cache_ttl,
            http_timeout: self.http_timeout,
        })
    }
}

/// The outcome of validation: everything the client needs, already typed.
#[derive(Debug, Clone)]
pub(crate) struct ValidatedConfig {
    pub base_url: Url,
    pub api_key: String,
    pub api_secret: Vec<u8>,
    pub super_admins: SuperAdminSet,
    pub rules_cache_ttl: Duration,
    pub http_timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_keys;

    fn base_config() -> ClientConfig {
        ClientConfig::new("https://custody.example.com", "key-1", "deadbeef")
            .super_admin_key(test_keys::public_key_pem(1).as_str())
    }

    #[test]
    fn valid_config_passes() {
        let validated = base_config().validate().unwrap();
        assert_eq!(validated.base_url.host_str(), Some("custody.example.com"));
        assert_eq!(validated.api_secret, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(validated.super_admins.min_valid_signatures(), 1);
        assert_eq!(validated.rules_cache_ttl, DEFAULT_RULES_CACHE_TTL);
        assert_eq!(validated.http_timeout, DEFAULT_HTTP_TIMEOUT);
    }

    #[test]
    fn empty_host_is_rejected() {
        let config = ClientConfig::new("  ", "key", "aa");
        assert!(matches!(config.validate(), Err(ConfigError::MissingHost)));
    }

    #[test]
    fn non_hex_secret_is_rejected() {
        let config = ClientConfig::new("https://h", "key", "not-hex")
            .super_admin_key(test_keys::public_key_pem(1).as_str());
        assert!(matches!(config.validate(), Err(ConfigError::BadApiSecret)));
    }

    #[test]
    fn missing_super_admin_keys_are_rejected() {
        let config = ClientConfig::new("https://h", "key", "aa");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoSuperAdminKeys)
        ));
    }

    #[test]
    fn zero_signature_threshold_is_rejected() {
        let config = base_config().min_valid_signatures(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadSignatureThreshold {
                configured: 0,
                keys: 1
            })
        ));
    }

    #[test]
    fn threshold_above_key_count_is_rejected() {
        let config = base_config().min_valid_signatures(3);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadSignatureThreshold {
                configured: 3,
                keys: 1
            })
        ));
    }

    #[test]
    fn bad_pem_reports_its_index() {
        let config = base_config().super_admin_key("garbage");
        match config.validate() {
            Err(ConfigError::BadSuperAdminKey { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected BadSuperAdminKey, got {other:?}"),
        }
    }

    #[test]
    fn already_parsed_keys_are_accepted() {
        let key = PublicKey::from_pem(&test_keys::public_key_pem(2)).unwrap();
        let config = ClientConfig::new("https://h", "key", "aa").super_admin_key(key);
        assert!(config.validate().is_ok());
    }
}
