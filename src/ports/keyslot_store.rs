//! Volume header capabilities - keyslots and token metadata

use crate::error::FidoslotResult;
use crate::model::{KeyslotId, Passphrase, TokenId, VolumeKey};

/// Cost of the key derivation protecting a new keyslot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KdfCost {
    /// For high-entropy passphrases such as hmac-secret output
    Minimal,
    /// For human-chosen passphrases
    #[default]
    Standard,
}

/// Capability to manage keyslots that wrap the volume key
pub trait KeyslotManager {
    /// Wrap `volume_key` under `passphrase` in a free keyslot
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// - All keyslots are in use
    /// - Wrapping or writing the header fails
    fn add_keyslot(
        &mut self,
        volume_key: &VolumeKey,
        passphrase: &Passphrase,
        cost: KdfCost,
    ) -> FidoslotResult<KeyslotId>;

    /// Destroy a keyslot
    fn remove_keyslot(&mut self, keyslot: KeyslotId) -> FidoslotResult<()>;

    /// Recover the volume key from the first keyslot `passphrase` opens.
    ///
    /// `keyslots` restricts the search; an empty slice means any keyslot.
    ///
    /// # Errors
    ///
    /// Returns `KeyslotError::WrongPassphrase` if no candidate opens
    fn unwrap_keyslot(
        &self,
        passphrase: &Passphrase,
        keyslots: &[KeyslotId],
    ) -> FidoslotResult<(KeyslotId, VolumeKey)>;
}

/// Capability to store token metadata in the volume header
pub trait TokenStore {
    /// Volume UUID, if the header has one
    fn volume_uuid(&self) -> Option<String>;

    /// Name of the block device or mapping
    fn device_name(&self) -> String;

    /// Append a serialized token
    fn add_token(&mut self, token: &str) -> FidoslotResult<TokenId>;

    /// All serialized tokens, of every scheme
    fn tokens(&self) -> FidoslotResult<Vec<(TokenId, String)>>;
}
