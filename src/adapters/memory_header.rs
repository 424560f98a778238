//! In-memory volume header
//!
//! Each keyslot wraps the volume key with AES-256-GCM under a key derived
//! from the passphrase with PBKDF2-HMAC-SHA256. The slot index is bound as
//! associated data so wrapped keys cannot be moved between slots. Tokens are
//! kept as JSON objects keyed by token index.

use std::collections::BTreeMap;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{FidoslotResult, KeyslotError};
use crate::model::{KeyslotId, Passphrase, TokenId, VolumeKey};
use crate::ports::{KdfCost, KeyslotManager, TokenStore};

const KDF_NAME: &str = "pbkdf2-sha256";
const MINIMAL_ITERATIONS: u32 = 1000;
const STANDARD_ITERATIONS: u32 = 600_000;
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// LUKS2 token limit
pub const MAX_TOKENS: usize = 32;

impl KdfCost {
    fn iterations(self) -> u32 {
        match self {
            KdfCost::Minimal => MINIMAL_ITERATIONS,
            KdfCost::Standard => STANDARD_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredKeyslot {
    kdf: String,
    iterations: u32,
    salt: String,
    nonce: String,
    wrapped_key: String,
}

/// Keyslots and tokens of one volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHeader {
    uuid: Option<String>,
    device_name: String,
    #[serde(default)]
    keyslots: BTreeMap<u32, StoredKeyslot>,
    #[serde(default)]
    tokens: BTreeMap<usize, serde_json::Value>,
}

impl MemoryHeader {
    pub fn new(uuid: Option<&str>, device_name: &str) -> Self {
        Self {
            uuid: uuid.map(str::to_string),
            device_name: device_name.to_string(),
            keyslots: BTreeMap::new(),
            tokens: BTreeMap::new(),
        }
    }

    /// Empty header with a fresh random UUID
    pub fn format(device_name: &str) -> Self {
        let uuid = uuid::Uuid::new_v4().to_string();
        Self::new(Some(&uuid), device_name)
    }

    pub fn keyslot_ids(&self) -> Vec<KeyslotId> {
        self.keyslots
            .keys()
            .filter_map(|index| KeyslotId::new(*index).ok())
            .collect()
    }

    pub fn has_keyslot(&self, keyslot: KeyslotId) -> bool {
        self.keyslots.contains_key(&(keyslot.index() as u32))
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    fn free_keyslot(&self) -> FidoslotResult<KeyslotId> {
        (0..KeyslotId::MAX_SLOTS as u32)
            .find(|index| !self.keyslots.contains_key(index))
            .map(KeyslotId::new)
            .transpose()?
            .ok_or_else(|| {
                KeyslotError::NoFreeSlot {
                    max: KeyslotId::MAX_SLOTS,
                }
                .into()
            })
    }

    fn open_slot(
        &self,
        keyslot: KeyslotId,
        stored: &StoredKeyslot,
        passphrase: &Passphrase,
    ) -> FidoslotResult<Option<VolumeKey>> {
        if stored.kdf != KDF_NAME {
            warn!("Skipping keyslot {} with unknown kdf {}", keyslot, stored.kdf);
            return Ok(None);
        }
        let salt = decode_field(&stored.salt, "salt")?;
        let nonce = decode_field(&stored.nonce, "nonce")?;
        let wrapped = decode_field(&stored.wrapped_key, "wrapped key")?;
        if nonce.len() != NONCE_LEN {
            return Err(storage(format!("keyslot {keyslot} has a bad nonce")));
        }

        let key = derive_wrapping_key(passphrase, &salt, stored.iterations);
        let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|e| KeyslotError::Wrap {
            reason: e.to_string(),
        })?;
        let aad = slot_aad(keyslot);
        let opened = cipher.decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &wrapped,
                aad: &aad,
            },
        );
        Ok(opened.ok().map(VolumeKey::new))
    }
}

impl KeyslotManager for MemoryHeader {
    fn add_keyslot(
        &mut self,
        volume_key: &VolumeKey,
        passphrase: &Passphrase,
        cost: KdfCost,
    ) -> FidoslotResult<KeyslotId> {
        let keyslot = self.free_keyslot()?;

        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut salt);
        rand::rng().fill_bytes(&mut nonce);

        let iterations = cost.iterations();
        let key = derive_wrapping_key(passphrase, &salt, iterations);
        let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|e| KeyslotError::Wrap {
            reason: e.to_string(),
        })?;
        let aad = slot_aad(keyslot);
        let wrapped = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: volume_key.as_bytes(),
                    aad: &aad,
                },
            )
            .map_err(|e| KeyslotError::Wrap {
                reason: e.to_string(),
            })?;

        self.keyslots.insert(
            keyslot.index() as u32,
            StoredKeyslot {
                kdf: KDF_NAME.to_string(),
                iterations,
                salt: hex::encode(salt),
                nonce: hex::encode(nonce),
                wrapped_key: hex::encode(wrapped),
            },
        );
        debug!("Added keyslot {} ({} iterations)", keyslot, iterations);
        Ok(keyslot)
    }

    fn remove_keyslot(&mut self, keyslot: KeyslotId) -> FidoslotResult<()> {
        self.keyslots
            .remove(&(keyslot.index() as u32))
            .map(|_| debug!("Removed keyslot {}", keyslot))
            .ok_or_else(|| KeyslotError::NotFound { keyslot }.into())
    }

    fn unwrap_keyslot(
        &self,
        passphrase: &Passphrase,
        keyslots: &[KeyslotId],
    ) -> FidoslotResult<(KeyslotId, VolumeKey)> {
        let candidates = if keyslots.is_empty() {
            self.keyslot_ids()
        } else {
            keyslots.to_vec()
        };

        for keyslot in candidates {
            let Some(stored) = self.keyslots.get(&(keyslot.index() as u32)) else {
                debug!("Keyslot {} referenced but not present", keyslot);
                continue;
            };
            if let Some(volume_key) = self.open_slot(keyslot, stored, passphrase)? {
                debug!("Keyslot {} opened", keyslot);
                return Ok((keyslot, volume_key));
            }
        }
        Err(KeyslotError::WrongPassphrase.into())
    }
}

impl TokenStore for MemoryHeader {
    fn volume_uuid(&self) -> Option<String> {
        self.uuid.clone()
    }

    fn device_name(&self) -> String {
        self.device_name.clone()
    }

    fn add_token(&mut self, token: &str) -> FidoslotResult<TokenId> {
        let value: serde_json::Value =
            serde_json::from_str(token).map_err(|e| KeyslotError::TokenWrite {
                reason: format!("token is not JSON: {e}"),
            })?;
        if !value.is_object() {
            return Err(KeyslotError::TokenWrite {
                reason: "token is not a JSON object".to_string(),
            }
            .into());
        }
        let index = (0..MAX_TOKENS)
            .find(|index| !self.tokens.contains_key(index))
            .ok_or_else(|| KeyslotError::TokenWrite {
                reason: format!("all {MAX_TOKENS} token slots are in use"),
            })?;
        self.tokens.insert(index, value);
        debug!("Added token {}", index);
        Ok(TokenId(index))
    }

    fn tokens(&self) -> FidoslotResult<Vec<(TokenId, String)>> {
        Ok(self
            .tokens
            .iter()
            .map(|(index, value)| (TokenId(*index), value.to_string()))
            .collect())
    }
}

fn derive_wrapping_key(passphrase: &Passphrase, salt: &[u8], iterations: u32) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, key.as_mut_slice());
    key
}

fn slot_aad(keyslot: KeyslotId) -> [u8; 4] {
    (keyslot.index() as u32).to_be_bytes()
}

fn decode_field(value: &str, what: &str) -> FidoslotResult<Vec<u8>> {
    hex::decode(value).map_err(|e| storage(format!("keyslot {what} is not hex: {e}")))
}

fn storage(reason: String) -> crate::error::FidoslotError {
    KeyslotError::Storage { reason }.into()
}
