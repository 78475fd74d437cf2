//! The envelope verification pipeline.
//!
//! Both whitelisted-address and whitelisted-asset envelopes run the same
//! steps; only the payload parser and the rule family differ (the
//! [`VerifiedPayload`] seam):
//!
//! 1. authenticate the rules context through the cache,
//! 2. keep only signature entries whose hash list covers the payload digest,
//! 3. resolve the applicable approval policy for the envelope's target,
//! 4. verify each covering signature under its rule user's key,
//! 5. tally distinct valid signers against every parallel sequence of group
//!    thresholds,
//! 6. parse the payload bytes and cross-check them against the envelope,
//! 7. publish the verified view into the envelope's write-once slot.
//!
//! Integrity failures (step 1) and approval failures (steps 3-6) keep their
//! categories; neither is ever upgraded or retried here.

use std::collections::HashSet;
use tracing::{debug, instrument};

use crate::config::SuperAdminSet;
use crate::envelope::{Envelope, Verified, VerifiedPayload};
use crate::error::{Error, WhitelistError};
use crate::rules::{RulesContainer, SequentialThresholds};
use crate::rules_cache::RulesCache;
use crate::crypto::Sha256Digest;

/// Verify `envelope` against its own rules context and publish the verified
/// view. Idempotent: an already-verified envelope returns its existing view.
#[instrument(skip_all, fields(envelope = %envelope.id), err(level = "debug"))]
pub fn verify_envelope<'a, P: VerifiedPayload>(
    envelope: &'a Envelope<P>,
    cache: &RulesCache,
    super_admins: &SuperAdminSet,
) -> Result<&'a Verified<P>, Error> {
    if let Some(verified) = envelope.verified() {
        return Ok(verified);
    }

    let rules = cache.get_or_verify(
        envelope.rules_container.as_bytes(),
        envelope.rules_signatures.as_bytes(),
        super_admins,
    )?;

    let payload_bytes = envelope.signed_payload.payload.as_bytes();
    let digest = Sha256Digest::of(payload_bytes).to_string();

    let thresholds =
        P::resolve_thresholds(&rules, &envelope.blockchain, &envelope.network).ok_or_else(|| {
            WhitelistError::NoApplicableRule {
                blockchain: envelope.blockchain.clone(),
                network: envelope.network.clone(),
            }
        })?;

    let signers = valid_signers(envelope, &rules, payload_bytes, &digest);
    check_thresholds(thresholds, &rules, &signers)?;

    let payload = P::parse(payload_bytes).map_err(WhitelistError::BadPayload)?;
    payload.check_envelope(&envelope.blockchain, &envelope.network)?;

    Ok(envelope.publish(Verified { payload, rules }))
}

/// Distinct rule users whose signature covers the payload digest and
/// verifies over the payload bytes. Entries that do not cover the digest,
/// name an unknown user, or fail ECDSA verification are discarded.
fn valid_signers<'a, P: VerifiedPayload>(
    envelope: &'a Envelope<P>,
    rules: &RulesContainer,
    payload_bytes: &[u8],
    digest_hex: &str,
) -> HashSet<&'a str> {
    let mut signers = HashSet::new();
    for entry in &envelope.signed_payload.signatures {
        let user_id = entry.user_signature.user_id.as_str();
        if !entry.covers(digest_hex) {
            debug!(user_id, "signature entry does not cover payload digest");
            continue;
        }
        let Some(user) = rules.user(user_id) else {
            debug!(user_id, "signature from user absent from rules container");
            continue;
        };
        let Some(key) = &user.public_key else {
            debug!(user_id, "rule user has no parseable public key");
            continue;
        };
        if key.verify(payload_bytes, entry.user_signature.signature.as_bytes()) {
            signers.insert(user_id);
        } else {
            debug!(user_id, "signature does not verify over payload");
        }
    }
    signers
}

/// Every parallel sequence must be satisfied; a sequence is satisfied when
/// each of its group thresholds, in order, is met by distinct valid signers
/// belonging to that group.
fn check_thresholds(
    parallel: &[SequentialThresholds],
    rules: &RulesContainer,
    signers: &HashSet<&str>,
) -> Result<(), WhitelistError> {
    for sequence in parallel {
        for step in &sequence.steps {
            let valid = match rules.group(&step.group_id) {
                Some(group) => group
                    .user_ids
                    .iter()
                    .filter(|user_id| signers.contains(user_id.as_str()))
                    .count(),
                None => 0,
            };
            let required = step.minimum_signatures as usize;
            if valid < required {
                return Err(WhitelistError::InsufficientApprovals {
                    group_id: step.group_id.clone(),
                    valid,
                    required,
                });
            }
        }
    }
    Ok(())
}
