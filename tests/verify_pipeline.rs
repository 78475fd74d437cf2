//! End-to-end verification scenarios against encoder-built containers and
//! real P-256 signatures: rule resolution tiers, SuperAdmin thresholds,
//! sequential-in-parallel approvals, cache freshness, and tamper detection.

use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::{EncodePublicKey, LineEnding};
use std::sync::Arc;
use std::time::Duration;

use custody_sdk::config::SuperAdminSet;
use custody_sdk::crypto::{PublicKey, Sha256Digest};
use custody_sdk::envelope::{Envelope, WhitelistedAddress};
use custody_sdk::error::{Error, IntegrityError, WhitelistError};
use custody_sdk::resolver::resolve_address_rule;
use custody_sdk::rules::{
    AddressRule, GroupThreshold, RuleGroup, RuleUser, RulesContainer, SequentialThresholds,
    UserSignature, UserSignatures,
};
use custody_sdk::rules_cache::RulesCache;
use custody_sdk::rules_verify::verify_rules;
use custody_sdk::types::SignRequest;
use custody_sdk::util::Base64Bytes;
use custody_sdk::verifier::verify_envelope;

fn signing_key(seed: u8) -> SigningKey {
    let mut scalar = [0u8; 32];
    scalar[0] = 0x01;
    scalar[31] = seed;
    SigningKey::from_slice(&scalar).expect("fixed scalar is a valid P-256 secret")
}

fn public_key(seed: u8) -> PublicKey {
    let pem = signing_key(seed)
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("PEM encoding");
    PublicKey::from_pem(&pem).expect("generated PEM parses")
}

fn pem(seed: u8) -> String {
    signing_key(seed)
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("PEM encoding")
}

fn sign_der(seed: u8, message: &[u8]) -> Vec<u8> {
    let signature: Signature = signing_key(seed).sign(message);
    signature.to_der().to_bytes().to_vec()
}

fn rule(currency: Option<&str>, network: Option<&str>, group: &str, min: u32) -> AddressRule {
    AddressRule {
        currency: currency.map(str::to_owned),
        network: network.map(str::to_owned),
        parallel_thresholds: vec![SequentialThresholds {
            steps: vec![GroupThreshold {
                group_id: group.into(),
                minimum_signatures: min,
            }],
        }],
        lines: vec![],
        include_network_in_payload: true,
    }
}

fn user(id: &str, seed: u8) -> RuleUser {
    RuleUser {
        id: id.into(),
        public_key_pem: pem(seed),
        public_key: Some(public_key(seed)),
        roles: vec![],
    }
}

/// Container with users u1..u3 (seeds 1..=3), `team1` membership as given,
/// and one ETH/mainnet rule requiring `min` signatures from team1.
fn container(team1: &[&str], min: u32) -> RulesContainer {
    let mut container = RulesContainer::decode(&[]).expect("empty container decodes");
    container.users.push(user("u1", 1));
    container.users.push(user("u2", 2));
    container.users.push(user("u3", 3));
    container.groups.push(RuleGroup {
        id: "team1".into(),
        user_ids: team1.iter().map(|id| id.to_string()).collect(),
    });
    container
        .address_rules
        .push(rule(Some("ETH"), Some("mainnet"), "team1", min));
    container
}

const SUPER_ADMIN_SEED: u8 = 10;

fn super_admins() -> SuperAdminSet {
    SuperAdminSet::new(vec![public_key(SUPER_ADMIN_SEED)], 1).unwrap()
}

fn rules_signatures(container_bytes: &[u8]) -> Vec<u8> {
    UserSignatures {
        entries: vec![UserSignature {
            user_id: "sa".into(),
            signature: sign_der(SUPER_ADMIN_SEED, container_bytes),
        }],
    }
    .encode()
}

fn address_envelope(
    container: &RulesContainer,
    signer_seeds: &[(u8, &str)],
) -> Envelope<WhitelistedAddress> {
    let container_bytes = container.encode();
    let payload = WhitelistedAddress {
        blockchain: "ETH".into(),
        network: Some("mainnet".into()),
        address: "0x1111".into(),
        label: "payout".into(),
        memo: None,
        address_type: "external".into(),
    }
    .encode();
    let digest = Sha256Digest::of(&payload).to_string();
    let signatures: Vec<serde_json::Value> = signer_seeds
        .iter()
        .map(|(seed, user_id)| {
            serde_json::json!({
                "user_signature": {
                    "user_id": user_id,
                    "signature": Base64Bytes::encode(sign_der(*seed, &payload)),
                    "comment": ""
                },
                "hashes": [digest]
            })
        })
        .collect();
    serde_json::from_value(serde_json::json!({
        "id": "wl-1",
        "blockchain": "ETH",
        "network": "mainnet",
        "status": "APPROVED",
        "action": "CREATE",
        "signed_address": {
            "payload": Base64Bytes::encode(&payload),
            "signatures": signatures
        },
        "rules_container": Base64Bytes::encode(&container_bytes),
        "rules_signatures": Base64Bytes::encode(&rules_signatures(&container_bytes))
    }))
    .expect("envelope DTO deserializes")
}

#[test]
fn resolver_walks_the_three_tiers() {
    let rules = vec![
        rule(Some("ETH"), Some("mainnet"), "exact", 1),
        rule(Some("ETH"), None, "chain-wide", 1),
        rule(None, None, "global", 1),
    ];
    let group = |blockchain: &str, network: &str| {
        resolve_address_rule(&rules, blockchain, network)
            .map(|r| r.parallel_thresholds[0].steps[0].group_id.as_str())
    };
    assert_eq!(group("ETH", "mainnet"), Some("exact"));
    assert_eq!(group("ETH", "testnet"), Some("chain-wide"));
    assert_eq!(group("BTC", "mainnet"), Some("global"));

    let only_exact = vec![rule(Some("ETH"), Some("mainnet"), "exact", 1)];
    assert!(resolve_address_rule(&only_exact, "BTC", "mainnet").is_none());
}

#[test]
fn two_of_three_super_admins_authenticate_the_rules() {
    let container_bytes = container(&["u1", "u2", "u3"], 2).encode();
    let set = SuperAdminSet::new(vec![public_key(10), public_key(11), public_key(12)], 2).unwrap();

    let enough = UserSignatures {
        entries: vec![
            UserSignature {
                user_id: "k1".into(),
                signature: sign_der(10, &container_bytes),
            },
            UserSignature {
                user_id: "k2".into(),
                signature: sign_der(11, &container_bytes),
            },
        ],
    }
    .encode();
    assert!(verify_rules(&container_bytes, &enough, &set).is_ok());

    // The same key twice matches once: M = 1 < 2.
    let duplicated = UserSignatures {
        entries: vec![
            UserSignature {
                user_id: "k1".into(),
                signature: sign_der(10, &container_bytes),
            },
            UserSignature {
                user_id: "k1-bis".into(),
                signature: sign_der(10, &container_bytes),
            },
        ],
    }
    .encode();
    match verify_rules(&container_bytes, &duplicated, &set) {
        Err(IntegrityError::InsufficientSignatures { matched, required }) => {
            assert_eq!((matched, required), (1, 2));
        }
        other => panic!("expected InsufficientSignatures, got {other:?}"),
    }
}

#[test]
fn metadata_extraction_from_a_request_dto() {
    let payload = r#"[{"key":"currency","value":"BTC"},{"key":"request_id","value":12345},{"key":"amount","value":{"valueFrom":"1000000","valueTo":"10.5","rate":"0.00001","decimals":8,"currencyFrom":"BTC","currencyTo":"USD"}},{"key":"source","value":{"payload":{"address":"src_addr"}}},{"key":"destination","value":{"payload":{"address":"dst_addr"}}}]"#;
    let request: SignRequest = serde_json::from_value(serde_json::json!({
        "id": "req-1",
        "status": "APPROVED",
        "metadata": {
            "hash": hex::encode(custody_sdk::crypto::sha256(payload.as_bytes())),
            "payload_as_string": payload
        }
    }))
    .unwrap();

    assert_eq!(request.currency().unwrap(), "BTC");
    assert_eq!(request.request_id().unwrap(), 12345);
    assert_eq!(request.source_address().unwrap(), "src_addr");
    assert_eq!(request.destination_address().unwrap(), "dst_addr");
    let amount = request.amount().unwrap().unwrap();
    assert_eq!(amount.value_from, "1000000");
    assert_eq!(amount.decimals, 8);
    request
        .metadata
        .as_ref()
        .unwrap()
        .verify_payload_hash()
        .unwrap();
}

#[test]
fn sequential_in_parallel_approval() {
    let cache = RulesCache::new(Duration::from_secs(60));
    let admins = super_admins();

    // u1 and u2 both in team1, threshold 2: verified.
    let approved = address_envelope(&container(&["u1", "u2", "u3"], 2), &[(1, "u1"), (2, "u2")]);
    let verified = verify_envelope(&approved, &cache, &admins).unwrap();
    assert_eq!(verified.payload.address, "0x1111");

    // u2 signs validly but is not a member of team1: insufficient.
    let outsider = address_envelope(&container(&["u1", "u3"], 2), &[(1, "u1"), (2, "u2")]);
    match verify_envelope(&outsider, &cache, &admins) {
        Err(Error::Whitelist(WhitelistError::InsufficientApprovals {
            group_id,
            valid,
            required,
        })) => {
            assert_eq!(group_id, "team1");
            assert_eq!((valid, required), (1, 2));
        }
        other => panic!("expected InsufficientApprovals, got {other:?}"),
    }

    // A single signature misses the threshold.
    let lone = address_envelope(&container(&["u1", "u2", "u3"], 2), &[(1, "u1")]);
    assert!(matches!(
        verify_envelope(&lone, &cache, &admins),
        Err(Error::Whitelist(WhitelistError::InsufficientApprovals { .. }))
    ));
}

#[test]
fn cache_returns_the_same_entry_until_the_ttl_lapses() {
    let container_bytes = container(&["u1"], 1).encode();
    let signatures = rules_signatures(&container_bytes);
    let admins = super_admins();
    let cache = RulesCache::new(Duration::from_millis(80));

    let first = cache
        .get_or_verify(&container_bytes, &signatures, &admins)
        .unwrap();
    let second = cache
        .get_or_verify(&container_bytes, &signatures, &admins)
        .unwrap();
    // A fresh hit hands back the cached container itself.
    assert!(Arc::ptr_eq(&first, &second));

    std::thread::sleep(Duration::from_millis(120));
    let third = cache
        .get_or_verify(&container_bytes, &signatures, &admins)
        .unwrap();
    // Past the TTL the verifier ran again and produced a new entry.
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(third.users.len(), first.users.len());
}

#[test]
fn tampered_payload_byte_invalidates_every_signature() {
    let envelope = address_envelope(&container(&["u1", "u2", "u3"], 2), &[(1, "u1"), (2, "u2")]);
    let mut raw = serde_json::json!({
        "id": "wl-1",
        "blockchain": "ETH",
        "network": "mainnet",
        "signed_address": {
            "payload": "",
            "signatures": []
        },
        "rules_container": envelope.rules_container.to_string(),
        "rules_signatures": envelope.rules_signatures.to_string()
    });

    // Flip one byte of the payload, leaving hashes and signatures untouched.
    let mut payload = envelope.signed_payload.payload.as_bytes().to_vec();
    payload[0] ^= 0x01;
    raw["signed_address"]["payload"] = Base64Bytes::encode(&payload).into();
    let digest = Sha256Digest::of(envelope.signed_payload.payload.as_bytes()).to_string();
    raw["signed_address"]["signatures"] = envelope
        .signed_payload
        .signatures
        .iter()
        .map(|entry| {
            serde_json::json!({
                "user_signature": {
                    "user_id": entry.user_signature.user_id,
                    "signature": entry.user_signature.signature.to_string(),
                    "comment": ""
                },
                "hashes": [digest]
            })
        })
        .collect::<Vec<_>>()
        .into();

    let tampered: Envelope<WhitelistedAddress> = serde_json::from_value(raw).unwrap();
    let cache = RulesCache::new(Duration::from_secs(60));
    // No hash entry matches the new payload digest, so no signature counts.
    assert!(matches!(
        verify_envelope(&tampered, &cache, &super_admins()),
        Err(Error::Whitelist(WhitelistError::InsufficientApprovals { .. }))
    ));
    assert!(tampered.verified().is_none());
}
