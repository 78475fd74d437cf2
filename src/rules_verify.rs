//! SuperAdmin multi-signature verification of the rules container.
//!
//! The container bytes are authenticated exactly as they arrived: no
//! re-canonicalization, no decode before counting. A configured key counts
//! as matched when at least one signature in the detached bundle verifies
//! under it; duplicates from the same key count once. Only once enough
//! distinct keys have matched are the bytes decoded into a
//! [`RulesContainer`].

use tracing::{debug, instrument};

use crate::config::SuperAdminSet;
use crate::error::IntegrityError;
use crate::rules::{RulesContainer, UserSignatures};

/// Verify `raw_signatures` over the exact `raw_container` bytes under the
/// configured SuperAdmin set, then decode the container.
///
/// The `user_id` attached to each signature is advisory only: every
/// signature is tried against every configured key, so a bundle whose ids
/// are wrong (or absent from the set) still verifies if the signatures do.
#[instrument(skip_all, err(level = "debug"))]
pub fn verify_rules(
    raw_container: &[u8],
    raw_signatures: &[u8],
    super_admins: &SuperAdminSet,
) -> Result<RulesContainer, IntegrityError> {
    let bundle =
        UserSignatures::decode(raw_signatures).map_err(IntegrityError::BadSignatureBundle)?;

    let mut matched = 0usize;
    for key in super_admins.keys() {
        let hit = bundle
            .entries
            .iter()
            .any(|entry| key.verify(raw_container, &entry.signature));
        if hit {
            matched += 1;
        } else {
            debug!(key = %key, "no signature in bundle verifies under key");
        }
    }

    let required = super_admins.min_valid_signatures();
    if matched < required {
        return Err(IntegrityError::InsufficientSignatures { matched, required });
    }
    debug!(matched, required, "rules container authenticated");

    RulesContainer::decode(raw_container).map_err(IntegrityError::BadContainer)
}
