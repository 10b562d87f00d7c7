//! Record types published by the node and their validators.
//!
//! Validation is structural: keys must name a peer and values must parse.
//! Record signatures are not checked.
//!
//! - `/ipns/<peer>`: a sequence-numbered name record
//! - `/pk/<peer>`: the protobuf-encoded public key of `<peer>`

use libp2p::identity::PublicKey;
use libp2p::PeerId;
use meridian_core::{NamespacedValidator, RecordKey, RoutingError, Validator};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

pub const NAME_NAMESPACE: &str = "ipns";
pub const PUBLIC_KEY_NAMESPACE: &str = "pk";

/// A name record: `value` published by the peer in the key, at `sequence`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NameRecord {
    pub value: String,
    pub sequence: u64,
}

impl NameRecord {
    pub fn new(value: impl Into<String>, sequence: u64) -> Self {
        Self {
            value: value.into(),
            sequence,
        }
    }

    /// The key this record is published under for `peer`.
    pub fn key_for(peer: &PeerId) -> RecordKey {
        RecordKey::from_parts(NAME_NAMESPACE, &peer.to_base58())
    }

    pub fn encode(&self) -> Result<Vec<u8>, RoutingError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, RoutingError> {
        serde_json::from_slice(data)
            .map_err(|e| RoutingError::InvalidRecord(format!("malformed name record: {e}")))
    }
}

/// The peer a `/<ns>/<peer>` key belongs to.
fn key_owner(key: &RecordKey) -> Result<PeerId, RoutingError> {
    let subject = key
        .as_str()
        .strip_prefix('/')
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, subject)| subject)
        .ok_or_else(|| RoutingError::InvalidRecord(format!("key '{key}' has no subject")))?;
    PeerId::from_str(subject)
        .map_err(|e| RoutingError::InvalidRecord(format!("key '{key}' is not a peer: {e}")))
}

/// Validates [`NameRecord`]s; the highest sequence number wins.
pub struct NameValidator;

impl Validator for NameValidator {
    fn validate(&self, key: &RecordKey, value: &[u8]) -> Result<(), RoutingError> {
        key_owner(key)?;
        let record = NameRecord::decode(value)?;
        if record.value.is_empty() {
            return Err(RoutingError::InvalidRecord(format!("empty name record for '{key}'")));
        }
        Ok(())
    }

    fn select(&self, _key: &RecordKey, values: &[Vec<u8>]) -> Result<usize, RoutingError> {
        let mut best: Option<(usize, u64)> = None;
        for (i, value) in values.iter().enumerate() {
            let sequence = NameRecord::decode(value)?.sequence;
            if best.map_or(true, |(_, seq)| sequence > seq) {
                best = Some((i, sequence));
            }
        }
        best.map(|(i, _)| i)
            .ok_or_else(|| RoutingError::InvalidRecord("no values to select from".into()))
    }
}

/// Validates `/pk/<peer>` records against the peer id they are stored under.
pub struct PublicKeyValidator;

impl Validator for PublicKeyValidator {
    fn validate(&self, key: &RecordKey, value: &[u8]) -> Result<(), RoutingError> {
        let owner = key_owner(key)?;
        let public_key = PublicKey::try_decode_protobuf(value)
            .map_err(|e| RoutingError::InvalidRecord(format!("public key: {e}")))?;
        if PeerId::from_public_key(&public_key) != owner {
            return Err(RoutingError::InvalidRecord(format!(
                "public key does not match '{key}'"
            )));
        }
        Ok(())
    }

    fn select(&self, _key: &RecordKey, _values: &[Vec<u8>]) -> Result<usize, RoutingError> {
        // Every valid value for a key is the same key.
        Ok(0)
    }
}

/// The validator used by the node's routers.
pub fn default_validator() -> NamespacedValidator {
    NamespacedValidator::new()
        .with(NAME_NAMESPACE, Arc::new(NameValidator))
        .with(PUBLIC_KEY_NAMESPACE, Arc::new(PublicKeyValidator))
}
