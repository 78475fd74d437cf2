//! Governance rules container: the in-memory model and its binary codec.
//!
//! The server ships the rules as an opaque byte blob plus a detached bundle
//! of SuperAdmin signatures over those exact bytes. This module decodes both
//! blobs into typed form (and encodes them back, losslessly). Signature
//! checking lives in [`crate::rules_verify`]; this module is pure structure.
//!
//! Wildcard strings are canonicalized at the codec boundary: an empty or
//! case-insensitive `"Any"` currency/network decodes to `None`, so the rule
//! resolver never sees the wildcard spelling.

use std::collections::HashSet;
use std::fmt;
use std::fmt::Display;

use crate::codec::{CodecError, Reader, WireType, Writer};
use crate::crypto::PublicKey;

/// Role tag attached to a rule user. Displays as the canonical string tag
/// (`SUPERADMIN`, `HSMSLOT`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    SuperAdmin,
    HsmSlot,
    Admin,
    Approver,
    Unknown(u64),
}

impl Role {
    pub fn from_code(code: u64) -> Role {
        match code {
            1 => Role::SuperAdmin,
            2 => Role::HsmSlot,
            3 => Role::Admin,
            4 => Role::Approver,
            other => Role::Unknown(other),
        }
    }

    pub fn code(&self) -> u64 {
        match self {
            Role::SuperAdmin => 1,
            Role::HsmSlot => 2,
            Role::Admin => 3,
            Role::Approver => 4,
            Role::Unknown(code) => *code,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::SuperAdmin => write!(f, "SUPERADMIN"),
            Role::HsmSlot => write!(f, "HSMSLOT"),
            Role::Admin => write!(f, "ADMIN"),
            Role::Approver => write!(f, "APPROVER"),
            Role::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// Blockchain identifier. Displays as the canonical string tag (`ETH`,
/// `BTC`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blockchain {
    Eth,
    Btc,
    Xtz,
    Algo,
    Dot,
    Sol,
    Unknown(u64),
}

impl Blockchain {
    pub fn from_code(code: u64) -> Blockchain {
        match code {
            1 => Blockchain::Eth,
            2 => Blockchain::Btc,
            3 => Blockchain::Xtz,
            4 => Blockchain::Algo,
            5 => Blockchain::Dot,
            6 => Blockchain::Sol,
            other => Blockchain::Unknown(other),
        }
    }

    pub fn code(&self) -> u64 {
        match self {
            Blockchain::Eth => 1,
            Blockchain::Btc => 2,
            Blockchain::Xtz => 3,
            Blockchain::Algo => 4,
            Blockchain::Dot => 5,
            Blockchain::Sol => 6,
            Blockchain::Unknown(code) => *code,
        }
    }
}

impl Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blockchain::Eth => write!(f, "ETH"),
            Blockchain::Btc => write!(f, "BTC"),
            Blockchain::Xtz => write!(f, "XTZ"),
            Blockchain::Algo => write!(f, "ALGO"),
            Blockchain::Dot => write!(f, "DOT"),
            Blockchain::Sol => write!(f, "SOL"),
            Blockchain::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// A user listed in the rules container.
#[derive(Debug, Clone)]
pub struct RuleUser {
    pub id: String,
    pub public_key_pem: String,
    /// Parsed form of `public_key_pem`. `None` when the PEM does not parse;
    /// such a user exists for membership purposes but can never validate a
    /// signature.
    pub public_key: Option<PublicKey>,
    pub roles: Vec<Role>,
}

impl RuleUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// A named group of user ids, order preserved, duplicates rejected at decode.
#[derive(Debug, Clone)]
pub struct RuleGroup {
    pub id: String,
    pub user_ids: Vec<String>,
}

impl RuleGroup {
    pub fn contains(&self, user_id: &str) -> bool {
        self.user_ids.iter().any(|id| id == user_id)
    }
}

/// One step of a sequential approval requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupThreshold {
    pub group_id: String,
    pub minimum_signatures: u32,
}

/// An ordered sequence of group thresholds, all of which must be met in order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequentialThresholds {
    pub steps: Vec<GroupThreshold>,
}

/// A condition cell inside a rule line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// Any internal wallet under the given derivation path.
    InternalWallet { path: String },
    /// A source kind this client version does not understand. Carried, not
    /// rejected, so newer rule sets still verify.
    Unknown { kind: u64 },
}

/// A per-source override line in an address whitelisting rule.
#[derive(Debug, Clone, Default)]
pub struct RuleLine {
    pub sources: Vec<RuleSource>,
    pub parallel_thresholds: Vec<SequentialThresholds>,
}

/// Whitelisting rule for addresses on a `(currency, network)` target.
/// `None` in `currency`/`network` means wildcard.
#[derive(Debug, Clone, Default)]
pub struct AddressRule {
    pub currency: Option<String>,
    pub network: Option<String>,
    pub parallel_thresholds: Vec<SequentialThresholds>,
    pub lines: Vec<RuleLine>,
    pub include_network_in_payload: bool,
}

/// Whitelisting rule for contract/token assets on a `(blockchain, network)`
/// target. Structurally the address rule minus source lines.
#[derive(Debug, Clone, Default)]
pub struct ContractRule {
    pub blockchain: Option<String>,
    pub network: Option<String>,
    pub parallel_thresholds: Vec<SequentialThresholds>,
}

/// The decoded governance rules document.
///
/// Immutable after decode. The raw bytes it came from remain authoritative;
/// this is a convenience view produced only after SuperAdmin signature
/// verification succeeds (see [`crate::rules_verify::verify_rules`]).
#[derive(Debug, Clone)]
pub struct RulesContainer {
    pub users: Vec<RuleUser>,
    pub groups: Vec<RuleGroup>,
    pub address_rules: Vec<AddressRule>,
    pub contract_rules: Vec<ContractRule>,
    pub min_distinct_user_signatures: u32,
    pub min_distinct_group_signatures: u32,
    pub enforced_rules_hash: Vec<u8>,
    pub timestamp: u64,
    pub engine_identities: Vec<String>,
    pub hsm_slot_id: String,
    hsm_slot_user: Option<usize>,
}

impl RulesContainer {
    /// Decode a container from its wire bytes. Inner sequence order is
    /// preserved exactly as encoded.
    pub fn decode(bytes: &[u8]) -> Result<RulesContainer, CodecError> {
        const MSG: &str = "RulesContainer";
        let mut container = RulesContainer {
            users: Vec::new(),
            groups: Vec::new(),
            address_rules: Vec::new(),
            contract_rules: Vec::new(),
            min_distinct_user_signatures: 0,
            min_distinct_group_signatures: 0,
            enforced_rules_hash: Vec::new(),
            timestamp: 0,
            engine_identities: Vec::new(),
            hsm_slot_id: String::new(),
            hsm_slot_user: None,
        };
        let mut reader = Reader::new(bytes);
        while !reader.is_at_end() {
            let (tag, wire) = reader.read_key(MSG)?;
            match (tag, wire) {
                (1, WireType::Len) => container.users.push(decode_user(reader.read_bytes(MSG)?)?),
                (2, WireType::Len) => container.groups.push(decode_group(reader.read_bytes(MSG)?)?),
                (3, WireType::Len) => container
                    .address_rules
                    .push(decode_address_rule(reader.read_bytes(MSG)?)?),
                (4, WireType::Len) => container
                    .contract_rules
                    .push(decode_contract_rule(reader.read_bytes(MSG)?)?),
                (5, WireType::Varint) => {
                    container.min_distinct_user_signatures = reader.read_varint(MSG)? as u32
                }
                (6, WireType::Varint) => {
                    container.min_distinct_group_signatures = reader.read_varint(MSG)? as u32
                }
                (7, WireType::Len) => {
                    container.enforced_rules_hash = reader.read_bytes(MSG)?.to_vec()
                }
                (8, WireType::Varint) => container.timestamp = reader.read_varint(MSG)?,
                (9, WireType::Len) => container.engine_identities.push(reader.read_string(MSG)?),
                (10, WireType::Len) => container.hsm_slot_id = reader.read_string(MSG)?,
                (tag @ 1..=10, wire) => return Err(CodecError::unexpected(MSG, tag, wire)),
                (_, wire) => reader.skip(wire, MSG)?,
            }
        }
        container.hsm_slot_user = container
            .users
            .iter()
            .position(|user| user.has_role(Role::HsmSlot));
        Ok(container)
    }

    /// Encode back to wire bytes. `decode(encode(c))` reproduces `c`.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        for user in &self.users {
            writer.message_field(1, |w| encode_user(w, user));
        }
        for group in &self.groups {
            writer.message_field(2, |w| encode_group(w, group));
        }
        for rule in &self.address_rules {
            writer.message_field(3, |w| encode_address_rule(w, rule));
        }
        for rule in &self.contract_rules {
            writer.message_field(4, |w| encode_contract_rule(w, rule));
        }
        writer.varint_field(5, u64::from(self.min_distinct_user_signatures));
        writer.varint_field(6, u64::from(self.min_distinct_group_signatures));
        if !self.enforced_rules_hash.is_empty() {
            writer.bytes_field(7, &self.enforced_rules_hash);
        }
        writer.varint_field(8, self.timestamp);
        for identity in &self.engine_identities {
            writer.string_field(9, identity);
        }
        if !self.hsm_slot_id.is_empty() {
            writer.string_field(10, &self.hsm_slot_id);
        }
        writer.finish()
    }

    pub fn user(&self, id: &str) -> Option<&RuleUser> {
        self.users.iter().find(|user| user.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&RuleGroup> {
        self.groups.iter().find(|group| group.id == id)
    }

    /// The first user carrying the `HSMSLOT` role, resolved once at decode.
    pub fn hsm_slot_user(&self) -> Option<&RuleUser> {
        self.hsm_slot_user.map(|index| &self.users[index])
    }
}

/// One detached signature over the raw container bytes. The `user_id` is
/// advisory only; verification tries every configured SuperAdmin key.
#[derive(Debug, Clone)]
pub struct UserSignature {
    pub user_id: String,
    pub signature: Vec<u8>,
}

/// The detached signature bundle shipped alongside the container bytes.
#[derive(Debug, Clone, Default)]
pub struct UserSignatures {
    pub entries: Vec<UserSignature>,
}

impl UserSignatures {
    pub fn decode(bytes: &[u8]) -> Result<UserSignatures, CodecError> {
        const MSG: &str = "UserSignatures";
        let mut bundle = UserSignatures::default();
        let mut reader = Reader::new(bytes);
        while !reader.is_at_end() {
            let (tag, wire) = reader.read_key(MSG)?;
            match (tag, wire) {
                (1, WireType::Len) => {
                    bundle
                        .entries
                        .push(decode_user_signature(reader.read_bytes(MSG)?)?);
                }
                (1, wire) => return Err(CodecError::unexpected(MSG, 1, wire)),
                (_, wire) => reader.skip(wire, MSG)?,
            }
        }
        Ok(bundle)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        for entry in &self.entries {
            writer.message_field(1, |w| {
                w.string_field(1, &entry.user_id);
                w.bytes_field(2, &entry.signature);
            });
        }
        writer.finish()
    }
}

/// Canonicalize a wildcard spelling: empty or case-insensitive `"Any"`
/// means "matches everything" and decodes to `None`.
pub(crate) fn wildcard(value: String) -> Option<String> {
    if value.is_empty() || value.eq_ignore_ascii_case("any") {
        None
    } else {
        Some(value)
    }
}

fn decode_user(bytes: &[u8]) -> Result<RuleUser, CodecError> {
    const MSG: &str = "RuleUser";
    let mut id = None;
    let mut pem = String::new();
    let mut roles = Vec::new();
    let mut reader = Reader::new(bytes);
    while !reader.is_at_end() {
        let (tag, wire) = reader.read_key(MSG)?;
        match (tag, wire) {
            (1, WireType::Len) => id = Some(reader.read_string(MSG)?),
            (2, WireType::Len) => pem = reader.read_string(MSG)?,
            (3, WireType::Varint) => roles.push(Role::from_code(reader.read_varint(MSG)?)),
            (tag @ 1..=3, wire) => return Err(CodecError::unexpected(MSG, tag, wire)),
            (_, wire) => reader.skip(wire, MSG)?,
        }
    }
    let id = id.ok_or(CodecError::missing(MSG, "id"))?;
    let public_key = PublicKey::from_pem(&pem).ok();
    Ok(RuleUser {
        id,
        public_key_pem: pem,
        public_key,
        roles,
    })
}

fn encode_user(writer: &mut Writer, user: &RuleUser) {
    writer.string_field(1, &user.id);
    if !user.public_key_pem.is_empty() {
        writer.string_field(2, &user.public_key_pem);
    }
    for role in &user.roles {
        writer.varint_field(3, role.code());
    }
}

fn decode_group(bytes: &[u8]) -> Result<RuleGroup, CodecError> {
    const MSG: &str = "RuleGroup";
    let mut id = None;
    let mut user_ids: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    let mut reader = Reader::new(bytes);
    while !reader.is_at_end() {
        let (tag, wire) = reader.read_key(MSG)?;
        match (tag, wire) {
            (1, WireType::Len) => id = Some(reader.read_string(MSG)?),
            (2, WireType::Len) => {
                let user_id = reader.read_string(MSG)?;
                if !seen.insert(user_id.clone()) {
                    return Err(CodecError::TagMismatch {
                        message: MSG,
                        detail: format!("duplicate user id `{user_id}` in group"),
                    });
                }
                user_ids.push(user_id);
            }
            (tag @ 1..=2, wire) => return Err(CodecError::unexpected(MSG, tag, wire)),
            (_, wire) => reader.skip(wire, MSG)?,
        }
    }
    Ok(RuleGroup {
        id: id.ok_or(CodecError::missing(MSG, "id"))?,
        user_ids,
    })
}

fn encode_group(writer: &mut Writer, group: &RuleGroup) {
    writer.string_field(1, &group.id);
    for user_id in &group.user_ids {
        writer.string_field(2, user_id);
    }
}

fn decode_threshold(bytes: &[u8]) -> Result<GroupThreshold, CodecError> {
    const MSG: &str = "GroupThreshold";
    let mut group_id = None;
    let mut minimum = None;
    let mut reader = Reader::new(bytes);
    while !reader.is_at_end() {
        let (tag, wire) = reader.read_key(MSG)?;
        match (tag, wire) {
            (1, WireType::Len) => group_id = Some(reader.read_string(MSG)?),
            (2, WireType::Varint) => minimum = Some(reader.read_varint(MSG)? as u32),
            (tag @ 1..=2, wire) => return Err(CodecError::unexpected(MSG, tag, wire)),
            (_, wire) => reader.skip(wire, MSG)?,
        }
    }
    let minimum = minimum.ok_or(CodecError::missing(MSG, "minimum_signatures"))?;
    if minimum == 0 {
        return Err(CodecError::TagMismatch {
            message: MSG,
            detail: "minimum_signatures must be at least 1".to_string(),
        });
    }
    Ok(GroupThreshold {
        group_id: group_id.ok_or(CodecError::missing(MSG, "group_id"))?,
        minimum_signatures: minimum,
    })
}

fn encode_threshold(writer: &mut Writer, threshold: &GroupThreshold) {
    writer.string_field(1, &threshold.group_id);
    writer.varint_field(2, u64::from(threshold.minimum_signatures));
}

fn decode_sequential(bytes: &[u8]) -> Result<SequentialThresholds, CodecError> {
    const MSG: &str = "SequentialThresholds";
    let mut sequence = SequentialThresholds::default();
    let mut reader = Reader::new(bytes);
    while !reader.is_at_end() {
        let (tag, wire) = reader.read_key(MSG)?;
        match (tag, wire) {
            (1, WireType::Len) => sequence
                .steps
                .push(decode_threshold(reader.read_bytes(MSG)?)?),
            (1, wire) => return Err(CodecError::unexpected(MSG, 1, wire)),
            (_, wire) => reader.skip(wire, MSG)?,
        }
    }
    Ok(sequence)
}

fn encode_sequential(writer: &mut Writer, sequence: &SequentialThresholds) {
    for step in &sequence.steps {
        writer.message_field(1, |w| encode_threshold(w, step));
    }
}

fn decode_rule_source(bytes: &[u8]) -> Result<RuleSource, CodecError> {
    const MSG: &str = "RuleSource";
    let mut kind = None;
    let mut path = String::new();
    let mut reader = Reader::new(bytes);
    while !reader.is_at_end() {
        let (tag, wire) = reader.read_key(MSG)?;
        match (tag, wire) {
            (1, WireType::Varint) => kind = Some(reader.read_varint(MSG)?),
            (2, WireType::Len) => path = reader.read_string(MSG)?,
            (tag @ 1..=2, wire) => return Err(CodecError::unexpected(MSG, tag, wire)),
            (_, wire) => reader.skip(wire, MSG)?,
        }
    }
    match kind.ok_or(CodecError::missing(MSG, "kind"))? {
        1 => Ok(RuleSource::InternalWallet { path }),
        other => Ok(RuleSource::Unknown { kind: other }),
    }
}

fn encode_rule_source(writer: &mut Writer, source: &RuleSource) {
    match source {
        RuleSource::InternalWallet { path } => {
            writer.varint_field(1, 1);
            writer.string_field(2, path);
        }
        RuleSource::Unknown { kind } => {
            writer.varint_field(1, *kind);
        }
    }
}

fn decode_rule_line(bytes: &[u8]) -> Result<RuleLine, CodecError> {
    const MSG: &str = "RuleLine";
    let mut line = RuleLine::default();
    let mut reader = Reader::new(bytes);
    while !reader.is_at_end() {
        let (tag, wire) = reader.read_key(MSG)?;
        match (tag, wire) {
            (1, WireType::Len) => line
                .sources
                .push(decode_rule_source(reader.read_bytes(MSG)?)?),
            (2, WireType::Len) => line
                .parallel_thresholds
                .push(decode_sequential(reader.read_bytes(MSG)?)?),
            (tag @ 1..=2, wire) => return Err(CodecError::unexpected(MSG, tag, wire)),
            (_, wire) => reader.skip(wire, MSG)?,
        }
    }
    Ok(line)
}

fn encode_rule_line(writer: &mut Writer, line: &RuleLine) {
    for source in &line.sources {
        writer.message_field(1, |w| encode_rule_source(w, source));
    }
    for sequence in &line.parallel_thresholds {
        writer.message_field(2, |w| encode_sequential(w, sequence));
    }
}

fn decode_address_rule(bytes: &[u8]) -> Result<AddressRule, CodecError> {
    const MSG: &str = "AddressRule";
    let mut rule = AddressRule::default();
    let mut reader = Reader::new(bytes);
    while !reader.is_at_end() {
        let (tag, wire) = reader.read_key(MSG)?;
        match (tag, wire) {
            (1, WireType::Len) => rule.currency = wildcard(reader.read_string(MSG)?),
            (2, WireType::Len) => rule.network = wildcard(reader.read_string(MSG)?),
            (3, WireType::Len) => rule
                .parallel_thresholds
                .push(decode_sequential(reader.read_bytes(MSG)?)?),
            (4, WireType::Len) => rule.lines.push(decode_rule_line(reader.read_bytes(MSG)?)?),
            (5, WireType::Varint) => {
                rule.include_network_in_payload = reader.read_varint(MSG)? != 0
            }
            (tag @ 1..=5, wire) => return Err(CodecError::unexpected(MSG, tag, wire)),
            (_, wire) => reader.skip(wire, MSG)?,
        }
    }
    Ok(rule)
}

fn encode_address_rule(writer: &mut Writer, rule: &AddressRule) {
    writer.string_field(1, rule.currency.as_deref().unwrap_or(""));
    writer.string_field(2, rule.network.as_deref().unwrap_or(""));
    for sequence in &rule.parallel_thresholds {
        writer.message_field(3, |w| encode_sequential(w, sequence));
    }
    for line in &rule.lines {
        writer.message_field(4, |w| encode_rule_line(w, line));
    }
    writer.bool_field(5, rule.include_network_in_payload);
}

fn decode_contract_rule(bytes: &[u8]) -> Result<ContractRule, CodecError> {
    const MSG: &str = "ContractRule";
    let mut rule = ContractRule::default();
    let mut reader = Reader::new(bytes);
    while !reader.is_at_end() {
        let (tag, wire) = reader.read_key(MSG)?;
        match (tag, wire) {
            (1, WireType::Len) => rule.blockchain = wildcard(reader.read_string(MSG)?),
            (2, WireType::Len) => rule.network = wildcard(reader.read_string(MSG)?),
            (3, WireType::Len) => rule
                .parallel_thresholds
                .push(decode_sequential(reader.read_bytes(MSG)?)?),
            (tag @ 1..=3, wire) => return Err(CodecError::unexpected(MSG, tag, wire)),
            (_, wire) => reader.skip(wire, MSG)?,
        }
    }
    Ok(rule)
}

fn encode_contract_rule(writer: &mut Writer, rule: &ContractRule) {
    writer.string_field(1, rule.blockchain.as_deref().unwrap_or(""));
    writer.string_field(2, rule.network.as_deref().unwrap_or(""));
    for sequence in &rule.parallel_thresholds {
        writer.message_field(3, |w| encode_sequential(w, sequence));
    }
}

fn decode_user_signature(bytes: &[u8]) -> Result<UserSignature, CodecError> {
    const MSG: &str = "UserSignature";
    let mut user_id = None;
    let mut signature = None;
    let mut reader = Reader::new(bytes);
    while !reader.is_at_end() {
        let (tag, wire) = reader.read_key(MSG)?;
        match (tag, wire) {
            (1, WireType::Len) => user_id = Some(reader.read_string(MSG)?),
            (2, WireType::Len) => signature = Some(reader.read_bytes(MSG)?.to_vec()),
            (tag @ 1..=2, wire) => return Err(CodecError::unexpected(MSG, tag, wire)),
            (_, wire) => reader.skip(wire, MSG)?,
        }
    }
    Ok(UserSignature {
        user_id: user_id.ok_or(CodecError::missing(MSG, "user_id"))?,
        signature: signature.ok_or(CodecError::missing(MSG, "signature"))?,
    })
}
