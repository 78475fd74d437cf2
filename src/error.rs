//! Typed failure surface of the SDK.
//!
//! Errors carry structured context and are never collapsed into strings:
//! integrity and whitelist failures are terminal for the operation that hit
//! them, API failures carry the transport status (retriable only for 429 and
//! 5xx), configuration failures abort client construction. None of the
//! messages embed signature or payload material.

pub use crate::codec::CodecError;
pub use crate::crypto::KeyParseError;

/// The rules container could not be authenticated under the configured
/// SuperAdmin set. Never retriable.
#[derive(thiserror::Error, Debug)]
pub enum IntegrityError {
    /// Fewer distinct SuperAdmin keys verified than the configured minimum.
    #[error(
        "insufficient SuperAdmin signatures over rules container: matched {matched}, required {required}"
    )]
    InsufficientSignatures { matched: usize, required: usize },
    /// The detached signature bundle did not decode.
    #[error("malformed rules signature bundle: {0}")]
    BadSignatureBundle(#[source] CodecError),
    /// The container bytes did not decode after signature verification.
    #[error("malformed rules container: {0}")]
    BadContainer(#[source] CodecError),
}

/// A signed whitelisting envelope failed verification against an
/// authenticated rules container. Never retriable.
#[derive(thiserror::Error, Debug)]
pub enum WhitelistError {
    /// A group threshold was not met by distinct valid signatures.
    #[error(
        "insufficient approvals for group `{group_id}`: {valid} valid signatures, {required} required"
    )]
    InsufficientApprovals {
        group_id: String,
        valid: usize,
        required: usize,
    },
    /// No whitelisting rule matches the envelope's blockchain/network.
    #[error("no applicable whitelisting rule for {blockchain}/{network}")]
    NoApplicableRule {
        blockchain: String,
        network: String,
    },
    /// The parsed payload names a different blockchain or network than the
    /// envelope it arrived in.
    #[error("payload is bound to {payload}, envelope says {envelope}")]
    MismatchedBlockchain { payload: String, envelope: String },
    /// The signed payload bytes did not decode into the expected shape.
    #[error("malformed signed payload: {0}")]
    BadPayload(#[source] CodecError),
}

/// Transport-level failure talking to the server.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// 400 — the request was malformed; a client bug, never retriable.
    #[error("validation failed (400): {message}")]
    Validation {
        code: Option<String>,
        message: String,
    },
    /// 401 — credentials missing or rejected.
    #[error("authentication failed (401): {message}")]
    Authentication { message: String },
    /// 403 — authenticated but not allowed.
    #[error("authorization failed (403): {message}")]
    Authorization { message: String },
    /// 404 — the addressed resource does not exist.
    #[error("not found (404): {message}")]
    NotFound { message: String },
    /// 429 — rate limited; retriable.
    #[error("rate limited (429): {message}")]
    RateLimited { message: String },
    /// 5xx — server-side failure; retriable.
    #[error("server error ({status}): {message}")]
    Server {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// Any other unexpected status.
    #[error("unexpected status {status}: {message}")]
    Unexpected { status: u16, message: String },
    /// The response body did not decode into the expected DTO.
    #[error("malformed response body: {0}")]
    BadBody(String),
    /// Connection, TLS, or timeout failure below HTTP.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// Whether the transport may retry this failure. Only rate limiting and
    /// server-side errors qualify; everything else indicates a client bug or
    /// a terminal condition.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. } | ApiError::Server { .. })
    }
}

/// Request metadata could not be interpreted. Never retriable.
#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    /// `payload_as_string` is present but is not a JSON array of entries.
    #[error("metadata payload is not a JSON array of entries: {0}")]
    NotAnEntryArray(String),
    /// `sha256(payload_as_string)` differs from the signed `hash` field.
    #[error("metadata hash mismatch: signed {expected}, computed {computed}")]
    HashMismatch { expected: String, computed: String },
    /// An entry value had the wrong shape for its key.
    #[error("malformed `{key}` entry: {detail}")]
    BadEntry { key: &'static str, detail: String },
}

/// Client construction rejected its configuration. Fatal: no
/// partially-configured client is ever produced.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("host must be a non-empty URL")]
    MissingHost,
    #[error("host is not a valid URL: {0}")]
    BadHost(#[source] url::ParseError),
    #[error("api_key must be non-empty")]
    MissingApiKey,
    #[error("api_secret must be non-empty hex")]
    BadApiSecret,
    #[error("at least one SuperAdmin public key is required")]
    NoSuperAdminKeys,
    #[error("SuperAdmin key {index} rejected: {source}")]
    BadSuperAdminKey {
        index: usize,
        #[source]
        source: KeyParseError,
    },
    #[error(
        "min_valid_signatures {configured} out of range: must be at least 1 and at most {keys} (the number of configured keys)"
    )]
    BadSignatureThreshold { configured: usize, keys: usize },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Umbrella error returned by the client façade.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Whitelist(#[from] WhitelistError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
