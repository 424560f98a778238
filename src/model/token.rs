//! Token record: the persisted metadata of one FIDO2 enrollment
//!
//! [`TokenRecord`] is the domain view. [`TokenWire`] is its structural,
//! serde-facing mirror using the on-disk field names; the JSON text encoding
//! is applied only in [`TokenRecord::to_json`] and [`TokenRecord::parse`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{CredentialId, CredentialMaterial, EnrollmentPolicy, KeyslotId, Salt};
use crate::error::{FidoslotResult, RecordError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub keyslots: Vec<KeyslotId>,
    pub credential: CredentialMaterial,
    pub relying_party_id: String,
    pub policy: EnrollmentPolicy,
}

/// On-disk shape of a token record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenWire {
    #[serde(rename = "type")]
    pub kind: String,
    pub keyslots: Vec<String>,
    #[serde(rename = "fido2-credential")]
    pub credential: String,
    #[serde(rename = "fido2-salt")]
    pub salt: String,
    #[serde(rename = "fido2-rp")]
    pub relying_party: String,
    #[serde(rename = "fido2-clientPin-required")]
    pub pin_required: bool,
    #[serde(rename = "fido2-up-required")]
    pub up_required: bool,
    #[serde(rename = "fido2-uv-required")]
    pub uv_required: bool,
}

impl TokenRecord {
    /// Type discriminator of this enrollment scheme
    pub const TYPE: &'static str = "systemd-fido2";

    pub fn build(
        credential_id: CredentialId,
        salt: Salt,
        relying_party_id: &str,
        effective_policy: EnrollmentPolicy,
        keyslots: Vec<KeyslotId>,
    ) -> Self {
        Self {
            keyslots,
            credential: CredentialMaterial::new(credential_id, salt),
            relying_party_id: relying_party_id.to_string(),
            policy: effective_policy,
        }
    }

    pub fn credential_id(&self) -> &CredentialId {
        &self.credential.credential_id
    }

    pub fn salt(&self) -> &Salt {
        &self.credential.salt
    }

    pub fn to_wire(&self) -> TokenWire {
        TokenWire {
            kind: Self::TYPE.to_string(),
            keyslots: self.keyslots.iter().map(KeyslotId::to_string).collect(),
            credential: STANDARD.encode(self.credential.credential_id.as_bytes()),
            salt: STANDARD.encode(self.credential.salt.as_bytes()),
            relying_party: self.relying_party_id.clone(),
            pin_required: self.policy.requires_pin(),
            up_required: self.policy.requires_user_presence(),
            uv_required: self.policy.requires_user_verification(),
        }
    }

    pub fn from_wire(wire: TokenWire) -> Result<Self, RecordError> {
        if wire.kind != Self::TYPE {
            return Err(RecordError::UnsupportedType { found: wire.kind });
        }
        if wire.keyslots.is_empty() {
            return Err(malformed("token references no keyslot"));
        }
        let keyslots = wire
            .keyslots
            .iter()
            .map(|slot| slot.parse::<KeyslotId>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| malformed(e))?;

        let credential_bytes = STANDARD
            .decode(&wire.credential)
            .map_err(|e| malformed(format!("fido2-credential is not base64: {e}")))?;
        let credential_id = CredentialId::from_slice(&credential_bytes).map_err(malformed)?;

        let salt_bytes = STANDARD
            .decode(&wire.salt)
            .map_err(|e| malformed(format!("fido2-salt is not base64: {e}")))?;
        let salt = Salt::from_slice(&salt_bytes).map_err(malformed)?;

        if wire.relying_party.is_empty() {
            return Err(malformed("fido2-rp is empty"));
        }

        Ok(Self {
            keyslots,
            credential: CredentialMaterial::new(credential_id, salt),
            relying_party_id: wire.relying_party,
            policy: EnrollmentPolicy::from_requirements(
                wire.pin_required,
                wire.up_required,
                wire.uv_required,
            ),
        })
    }

    pub fn to_json(&self) -> FidoslotResult<String> {
        serde_json::to_string(&self.to_wire()).map_err(|e| {
            RecordError::Serialize {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Parse a serialized token.
    ///
    /// Tokens of another scheme fail with `RecordError::UnsupportedType` so
    /// header scans can skip them; anything else that does not fit the
    /// schema is `RecordError::Malformed`.
    pub fn parse(serialized: &str) -> FidoslotResult<Self> {
        let value: serde_json::Value = serde_json::from_str(serialized)
            .map_err(|e| malformed(format!("not valid JSON: {e}")))?;

        let kind = value
            .get("type")
            .ok_or_else(|| malformed("missing type"))?
            .as_str()
            .ok_or_else(|| malformed("type is not a string"))?;
        if kind != Self::TYPE {
            return Err(RecordError::UnsupportedType {
                found: kind.to_string(),
            }
            .into());
        }

        let wire: TokenWire = serde_json::from_value(value).map_err(malformed)?;
        Ok(Self::from_wire(wire)?)
    }
}

fn malformed(reason: impl ToString) -> RecordError {
    RecordError::Malformed {
        reason: reason.to_string(),
    }
}
