//! The HTTPS client façade.
//!
//! [`CustodyClient`] composes the verification core: it fetches envelopes,
//! rules, keys, and requests from the server, authenticates every
//! security-relevant response through the verification pipeline, and maps
//! transport failures onto the typed [`ApiError`] surface. The HTTP round
//! trip is the only suspension point; verification itself is pure CPU work.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::instrument;
use url::Url;

use crate::config::{ClientConfig, SuperAdminSet};
use crate::crypto::PublicKey;
use crate::envelope::{Envelope, WhitelistedAddress, WhitelistedAsset};
use crate::error::{ApiError, ConfigError, Error};
use crate::rules::RulesContainer;
use crate::rules_cache::RulesCache;
use crate::types::{ErrorBody, GovernanceRules, SignRequest, SuperAdminKeyEntry};
use crate::verifier::verify_envelope;

const HEADER_API_KEY: &str = "X-Api-Key";
const HEADER_SIGNATURE: &str = "X-Api-Signature";

/// Client for the custody server.
///
/// Construction validates the full configuration; a client either exists
/// with all invariants holding or is never produced. The client is cheap to
/// clone-by-`Arc` and safe to share across threads: configuration is
/// immutable and the rules cache is internally synchronized.
pub struct CustodyClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    api_secret: Vec<u8>,
    super_admins: SuperAdminSet,
    rules_cache: RulesCache,
}

impl CustodyClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let validated = config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(validated.http_timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;
        let mut base_url = validated.base_url;
        // Keep joins relative to the configured root.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        Ok(CustodyClient {
            http,
            base_url,
            api_key: validated.api_key,
            api_secret: validated.api_secret,
            super_admins: validated.super_admins,
            rules_cache: RulesCache::new(validated.rules_cache_ttl),
        })
    }

    /// Fetch a whitelisted-address envelope and verify it. The returned
    /// envelope's [`Envelope::verified`] view is populated on success.
    #[instrument(skip(self))]
    pub async fn whitelisted_address(
        &self,
        id: &str,
    ) -> Result<Envelope<WhitelistedAddress>, Error> {
        let envelope: Envelope<WhitelistedAddress> = self
            .get(&format!("whitelisted_addresses/{id}/envelope"))
            .await?;
        verify_envelope(&envelope, &self.rules_cache, &self.super_admins)?;
        Ok(envelope)
    }

    /// Fetch a whitelisted contract/token asset envelope and verify it.
    #[instrument(skip(self))]
    pub async fn whitelisted_asset(&self, id: &str) -> Result<Envelope<WhitelistedAsset>, Error> {
        let envelope: Envelope<WhitelistedAsset> = self
            .get(&format!("whitelisted_contracts/{id}/envelope"))
            .await?;
        verify_envelope(&envelope, &self.rules_cache, &self.super_admins)?;
        Ok(envelope)
    }

    /// Fetch the current governance ruleset and verify it under the
    /// configured SuperAdmin set.
    #[instrument(skip(self))]
    pub async fn governance_rules(&self) -> Result<Arc<RulesContainer>, Error> {
        let rules: GovernanceRules = self.get("governance/rules").await?;
        let container = self.rules_cache.get_or_verify(
            rules.rules_container.as_bytes(),
            rules.rules_signatures.as_bytes(),
            &self.super_admins,
        )?;
        Ok(container)
    }

    /// Fetch the server's SuperAdmin key listing, parsing each PEM eagerly.
    ///
    /// Informational: the set this client verifies against is the one fixed
    /// at construction, never the server-reported one.
    #[instrument(skip(self))]
    pub async fn super_admin_public_keys(&self) -> Result<Vec<(String, PublicKey)>, Error> {
        let entries: Vec<SuperAdminKeyEntry> = self.get("governance/public_keys").await?;
        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            let key = PublicKey::from_pem(&entry.public_key_pem).map_err(|e| {
                ApiError::BadBody(format!("public key for `{}`: {e}", entry.user_id))
            })?;
            keys.push((entry.user_id, key));
        }
        Ok(keys)
    }

    /// Fetch a transaction request. When metadata is present, its
    /// `payload_as_string` must hash to the signed `hash` field; a request
    /// whose binding fails is never returned.
    #[instrument(skip(self))]
    pub async fn request(&self, id: &str) -> Result<SignRequest, Error> {
        let request: SignRequest = self.get(&format!("requests/{id}")).await?;
        if let Some(metadata) = &request.metadata {
            metadata.verify_payload_hash()?;
        }
        Ok(request)
    }

    /// Drop all cached verified rules; the next read re-verifies.
    pub fn clear_rules_cache(&self) {
        self.rules_cache.clear();
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ApiError::BadBody(format!("invalid request path `{path}`: {e}")))?;
        let response = self
            .http
            .get(url)
            .header(HEADER_API_KEY, &self.api_key)
            .header(HEADER_SIGNATURE, self.sign_request("GET", path))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let bytes = response.bytes().await.unwrap_or_default();
            let body: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
            return Err(classify_status(status, body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::BadBody(e.to_string()))
    }

    /// HMAC-SHA256 over `METHOD /path` under the API secret, hex-encoded.
    fn sign_request(&self, method: &str, path: &str) -> String {
        use hmac::{Hmac, Mac};
        let mut mac = <Hmac<sha2::Sha256> as Mac>::new_from_slice(&self.api_secret)
            .expect("HMAC accepts any key length");
        mac.update(method.as_bytes());
        mac.update(b" /");
        mac.update(path.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn classify_status(status: StatusCode, body: ErrorBody) -> ApiError {
    let message = body
        .message
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_owned());
    match status.as_u16() {
        400 => ApiError::Validation {
            code: body.code,
            message,
        },
        401 => ApiError::Authentication { message },
        403 => ApiError::Authorization { message },
        404 => ApiError::NotFound { message },
        429 => ApiError::RateLimited { message },
        status @ 500..=599 => ApiError::Server {
            status,
            code: body.code,
            message,
        },
        status => ApiError::Unexpected { status, message },
    }
}
