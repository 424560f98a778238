//! Volume header persisted as a JSON file
//!
//! Every mutation is applied to a copy of the header, written out, and only
//! then made visible. A failed write leaves both the file and the in-memory
//! header untouched.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::fs::write_atomically;
use super::memory_header::MemoryHeader;
use crate::error::{FidoslotResult, KeyslotError};
use crate::model::{KeyslotId, Passphrase, TokenId, VolumeKey};
use crate::ports::{KdfCost, KeyslotManager, TokenStore};

#[derive(Debug)]
pub struct HeaderFile {
    path: PathBuf,
    header: MemoryHeader,
}

impl HeaderFile {
    /// Write a new header file. Fails if `path` already exists.
    pub fn create(path: &Path, header: MemoryHeader) -> FidoslotResult<Self> {
        if path.exists() {
            return Err(KeyslotError::Storage {
                reason: format!("{} already exists", path.display()),
            }
            .into());
        }
        let file = Self {
            path: path.to_path_buf(),
            header,
        };
        file.persist(&file.header)?;
        info!("Created volume header {}", path.display());
        Ok(file)
    }

    pub fn open(path: &Path) -> FidoslotResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let header: MemoryHeader =
            serde_json::from_str(&raw).map_err(|e| KeyslotError::Storage {
                reason: format!("parsing {}: {e}", path.display()),
            })?;
        debug!("Loaded volume header {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &MemoryHeader {
        &self.header
    }

    fn persist(&self, header: &MemoryHeader) -> FidoslotResult<()> {
        let raw = serde_json::to_vec_pretty(header).map_err(|e| KeyslotError::Storage {
            reason: e.to_string(),
        })?;
        write_atomically(&self.path, &raw).map_err(|e| KeyslotError::Storage {
            reason: format!("writing {}: {e}", self.path.display()),
        })?;
        Ok(())
    }

    /// Apply `change` to a copy, persist it, then swap it in
    fn update<T>(
        &mut self,
        change: impl FnOnce(&mut MemoryHeader) -> FidoslotResult<T>,
    ) -> FidoslotResult<T> {
        let mut next = self.header.clone();
        let out = change(&mut next)?;
        self.persist(&next)?;
        self.header = next;
        Ok(out)
    }
}

impl KeyslotManager for HeaderFile {
    fn add_keyslot(
        &mut self,
        volume_key: &VolumeKey,
        passphrase: &Passphrase,
        cost: KdfCost,
    ) -> FidoslotResult<KeyslotId> {
        self.update(|header| header.add_keyslot(volume_key, passphrase, cost))
    }

    fn remove_keyslot(&mut self, keyslot: KeyslotId) -> FidoslotResult<()> {
        self.update(|header| header.remove_keyslot(keyslot))
    }

    fn unwrap_keyslot(
        &self,
        passphrase: &Passphrase,
        keyslots: &[KeyslotId],
    ) -> FidoslotResult<(KeyslotId, VolumeKey)> {
        self.header.unwrap_keyslot(passphrase, keyslots)
    }
}

impl TokenStore for HeaderFile {
    fn volume_uuid(&self) -> Option<String> {
        self.header.volume_uuid()
    }

    fn device_name(&self) -> String {
        self.header.device_name()
    }

    fn add_token(&mut self, token: &str) -> FidoslotResult<TokenId> {
        self.update(|header| header.add_token(token))
    }

    fn tokens(&self) -> FidoslotResult<Vec<(TokenId, String)>> {
        self.header.tokens()
    }
}
