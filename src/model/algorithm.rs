//! Credential algorithm type for FIDO2 credentials

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Public-key algorithm of the credential created at enrollment
///
/// Identified on the wire by its COSE algorithm number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CredentialAlgorithm {
    /// ECDSA P-256 with SHA-256
    #[default]
    Es256,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    Rs256,
    /// EdDSA (Ed25519)
    EdDsa,
}

impl CredentialAlgorithm {
    pub const ALL: [CredentialAlgorithm; 3] = [
        CredentialAlgorithm::Es256,
        CredentialAlgorithm::Rs256,
        CredentialAlgorithm::EdDsa,
    ];

    /// COSE algorithm identifier
    pub fn cose_id(self) -> i32 {
        match self {
            CredentialAlgorithm::Es256 => -7,
            CredentialAlgorithm::Rs256 => -257,
            CredentialAlgorithm::EdDsa => -8,
        }
    }

    /// Convert from a COSE algorithm identifier
    ///
    /// # Errors
    ///
    /// Returns `AlgorithmError::Unsupported` for identifiers other than
    /// ES256, RS256 and EdDSA
    pub fn from_cose_id(id: i32) -> Result<Self, AlgorithmError> {
        match id {
            -7 => Ok(CredentialAlgorithm::Es256),
            -257 => Ok(CredentialAlgorithm::Rs256),
            -8 => Ok(CredentialAlgorithm::EdDsa),
            _ => Err(AlgorithmError::Unsupported {
                algorithm: id.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CredentialAlgorithm::Es256 => "es256",
            CredentialAlgorithm::Rs256 => "rs256",
            CredentialAlgorithm::EdDsa => "eddsa",
        }
    }
}

impl fmt::Display for CredentialAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialAlgorithm {
    type Err = AlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "es256" => Ok(CredentialAlgorithm::Es256),
            "rs256" => Ok(CredentialAlgorithm::Rs256),
            "eddsa" => Ok(CredentialAlgorithm::EdDsa),
            _ => Err(AlgorithmError::Unsupported {
                algorithm: s.to_string(),
            }),
        }
    }
}

/// Errors that can occur when working with algorithms
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlgorithmError {
    #[error("Algorithm not supported: {algorithm}")]
    Unsupported { algorithm: String },
}
