use std::fmt;

use rand::RngCore;
use thiserror::Error;

/// Opaque, authenticator-scoped credential identifier
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CredentialId(Vec<u8>);

impl CredentialId {
    /// Upper bound accepted from a persisted token
    pub const MAX_LENGTH: usize = 1023;

    pub fn from_slice(id: &[u8]) -> Result<Self, CredentialError> {
        if id.is_empty() {
            return Err(CredentialError::EmptyCredentialId);
        }
        if id.len() > Self::MAX_LENGTH {
            return Err(CredentialError::CredentialIdTooLong {
                max: Self::MAX_LENGTH,
                actual: id.len(),
            });
        }
        Ok(Self(id.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.0[..self.0.len().min(8)];
        write!(f, "CredentialId({}..)", hex::encode(shown))
    }
}

/// hmac-secret salt, generated once per enrollment
#[derive(Clone, PartialEq, Eq)]
pub struct Salt([u8; 32]);

impl Salt {
    pub const LENGTH: usize = 32;

    /// Fresh salt from the thread-local CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::LENGTH];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_slice(salt: &[u8]) -> Result<Self, CredentialError> {
        if salt.len() != Self::LENGTH {
            return Err(CredentialError::InvalidSaltLength {
                expected: Self::LENGTH,
                actual: salt.len(),
            });
        }
        let mut bytes = [0u8; Self::LENGTH];
        bytes.copy_from_slice(salt);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_array(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({}..)", hex::encode(&self.0[..4]))
    }
}

/// Credential id and salt produced by one enrollment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialMaterial {
    pub credential_id: CredentialId,
    pub salt: Salt,
}

impl CredentialMaterial {
    pub fn new(credential_id: CredentialId, salt: Salt) -> Self {
        Self {
            credential_id,
            salt,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential id is empty")]
    EmptyCredentialId,

    #[error("credential id must be at most {max} bytes, got {actual}")]
    CredentialIdTooLong { max: usize, actual: usize },

    #[error("salt must be exactly {expected} bytes, got {actual}")]
    InvalidSaltLength { expected: usize, actual: usize },
}
