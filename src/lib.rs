//! Rust client SDK for a remote custody / key-management service.
//!
//! The server holds the keys; the application approves and signs blockchain
//! transactions and manages whitelisted destination addresses through it.
//! The server is *not* trusted unconditionally: everything security-relevant
//! it returns is verified client-side against a set of SuperAdmin public
//! keys fixed at client construction. A compromised or man-in-the-middled
//! server cannot substitute a destination address, change an amount, or
//! lower an approval threshold without detection.
//!
//! # The trust boundary
//!
//! - **Governance rules** arrive as opaque bytes plus a detached
//!   multi-signature; they are decoded and used only after enough distinct
//!   SuperAdmin keys have verified over the exact raw bytes
//!   ([`rules_verify`]).
//! - **Whitelisting envelopes** (addresses and contract/token assets) carry
//!   a signed payload and per-user signatures; they are approved only when
//!   the group thresholds of the applicable rule are met by distinct valid
//!   signers ([`verifier`]).
//! - **Request metadata** is read exclusively from the hash-bound
//!   `payload_as_string`; the structured sibling the wire also carries is
//!   never even deserialized ([`metadata`]).
//!
//! # Modules
//!
//! - [`client`] — the [`CustodyClient`] façade: fetch + verify over HTTPS.
//! - [`config`] — configuration bundle and construction-time validation.
//! - [`crypto`] — SHA-256, P-256 public keys, ECDSA verification.
//! - [`codec`] — the tag-value binary wire format.
//! - [`rules`] — the rules container model and its codec.
//! - [`rules_verify`] — SuperAdmin multi-signature verification.
//! - [`rules_cache`] — TTL-bounded singleflight memoization of verified rules.
//! - [`resolver`] — three-tier whitelisting rule resolution.
//! - [`envelope`] — envelope DTOs and signed payload parsers.
//! - [`verifier`] — the envelope verification pipeline.
//! - [`metadata`] — tamper-evident request metadata extraction.
//! - [`types`] — remaining wire DTOs (requests, statuses, key listings).
//! - [`error`] — the typed failure surface.
//!
//! # Example
//!
//! ```rust,no_run
//! use custody_sdk::{ClientConfig, CustodyClient};
//!
//! # async fn run() -> Result<(), custody_sdk::Error> {
//! let config = ClientConfig::new("https://custody.example.com", "api-key", "6869")
//!     .super_admin_key(SUPER_ADMIN_PEM)
//!     .min_valid_signatures(2);
//! let client = CustodyClient::new(&config)?;
//!
//! let envelope = client.whitelisted_address("wl-42").await?;
//! let verified = envelope.verified().expect("verified on success");
//! println!("trusted destination: {}", verified.payload.address);
//! # Ok(())
//! # }
//! # const SUPER_ADMIN_PEM: &str = "";
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod metadata;
pub mod resolver;
pub mod rules;
pub mod rules_cache;
pub mod rules_verify;
pub mod types;
pub mod util;
pub mod verifier;

pub use client::CustodyClient;
pub use config::{ClientConfig, SuperAdminSet};
pub use envelope::{Envelope, WhitelistedAddress, WhitelistedAsset};
pub use error::{ApiError, ConfigError, Error, IntegrityError, MetadataError, WhitelistError};
pub use rules::RulesContainer;
