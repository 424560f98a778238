//! Error types for fidoslot
//!
//! Errors are organized hierarchically (device, record, keyslot, domain) and
//! use thiserror for implementation. Every error maps onto one [`ErrorKind`],
//! which is the taxonomy callers branch on.

use thiserror::Error;

use crate::model::{KeyslotId, PolicyFlag};

/// Result type alias for fidoslot operations
pub type FidoslotResult<T> = Result<T, FidoslotError>;

/// Coarse classification of every failure the core can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No compatible authenticator (or none holding the credential) is present
    HardwareUnavailable,
    /// Verification is locked out on the authenticator; re-invoking the whole
    /// operation may succeed
    UserInteractionBlocked,
    /// Requested algorithm or policy cannot be honoured by the authenticator
    PolicyUnsatisfiable,
    /// Transport or storage failure
    IoFailure,
    /// Persisted token is corrupt or unsupported
    MalformedRecord,
    /// The derived passphrase did not unwrap any keyslot
    WrongPassphrase,
    /// Resource exhaustion while encoding or building
    AllocationFailure,
    /// PIN missing, wrong, or permanently blocked
    PinRejected,
    /// The volume header carries no FIDO2 token
    NotEnrolled,
}

/// Top-level error type for all fidoslot operations
#[derive(Error, Debug)]
pub enum FidoslotError {
    /// Authenticator errors
    #[error("FIDO2 device error: {0}")]
    Device(#[from] DeviceError),

    /// Token record errors
    #[error("Token record error: {0}")]
    Record(#[from] RecordError),

    /// Keyslot / volume header errors
    #[error("Keyslot error: {0}")]
    Keyslot(#[from] KeyslotError),

    /// Domain validation errors
    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),

    /// Filesystem errors from file-backed adapters
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authenticator-related errors
#[derive(Error, Debug)]
pub enum DeviceError {
    /// No FIDO2 device found
    #[error("No FIDO2 device found - please connect a security token")]
    NotFound,

    /// The device does not hold the requested credential
    #[error("FIDO2 token does not hold a credential for relying party {relying_party}")]
    CredentialNotFound { relying_party: String },

    /// User verification is locked out until the token is re-plugged
    #[error("User verification is blocked on the FIDO2 token, please try again")]
    UvBlocked,

    /// A PIN is needed but none was supplied
    #[error("FIDO2 token requires a PIN")]
    PinRequired,

    /// Wrong PIN
    #[error("Wrong PIN: attempts remaining: {retries_left}")]
    PinInvalid { retries_left: u8 },

    /// No PIN attempts left
    #[error("PIN of the FIDO2 token is blocked")]
    PinBlocked,

    /// Credential algorithm not offered by the device
    #[error("Algorithm not supported by the FIDO2 token: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// Policy flag the device cannot enforce
    #[error("FIDO2 token cannot enforce {flag}")]
    UnsupportedPolicy { flag: PolicyFlag },

    /// Device returned no hmac-secret output
    #[error("FIDO2 token did not return an hmac-secret")]
    MissingHmacSecret,

    /// Transport-level failure
    #[error("FIDO2 transport failure: {reason}")]
    Transport { reason: String },
}

/// Token record errors
#[derive(Error, Debug)]
pub enum RecordError {
    /// Record is corrupt or misses a required field
    #[error("Malformed FIDO2 token: {reason}")]
    Malformed { reason: String },

    /// Record belongs to a different enrollment scheme
    #[error("Unsupported token type: {found}")]
    UnsupportedType { found: String },

    /// Record could not be serialized
    #[error("Failed to serialize FIDO2 token: {reason}")]
    Serialize { reason: String },

    /// No token of this scheme in the header
    #[error("No FIDO2 token enrolled in the volume header")]
    NotEnrolled,
}

/// Keyslot and volume header errors
#[derive(Error, Debug)]
pub enum KeyslotError {
    /// No keyslot could be unwrapped with the passphrase
    #[error("No keyslot could be unlocked with the FIDO2 derived passphrase")]
    WrongPassphrase,

    /// All keyslots are in use
    #[error("All keyslots are in use (maximum {max})")]
    NoFreeSlot { max: usize },

    /// Keyslot does not exist
    #[error("Keyslot {keyslot} does not exist")]
    NotFound { keyslot: KeyslotId },

    /// Wrapping the volume key failed
    #[error("Failed to wrap volume key: {reason}")]
    Wrap { reason: String },

    /// Encoding a secret into a passphrase failed
    #[error("Failed to encode secret: {reason}")]
    Encoding { reason: String },

    /// Token could not be stored in the header
    #[error("Failed to add token to volume header: {reason}")]
    TokenWrite { reason: String },

    /// Header could not be read or written
    #[error("Volume header storage failure: {reason}")]
    Storage { reason: String },

    /// Token write failed and the freshly added keyslot could not be removed
    #[error("Failed to roll back keyslot {keyslot} after token write failure: {reason}")]
    RollbackFailed { keyslot: KeyslotId, reason: String },
}

/// Domain validation errors
#[derive(Error, Debug)]
pub enum DomainError {
    /// PIN validation error
    #[error("PIN validation error: {0}")]
    Pin(#[from] crate::model::PinError),

    /// Policy error
    #[error("Policy error: {0}")]
    Policy(#[from] crate::model::PolicyError),

    /// Algorithm error
    #[error("Algorithm error: {0}")]
    Algorithm(#[from] crate::model::AlgorithmError),

    /// Credential material error
    #[error("Credential error: {0}")]
    Credential(#[from] crate::model::CredentialError),

    /// Keyslot identifier error
    #[error("Keyslot id error: {0}")]
    KeyslotId(#[from] crate::model::KeyslotIdError),
}

impl FidoslotError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            FidoslotError::Device(err) => match err {
                DeviceError::NotFound | DeviceError::CredentialNotFound { .. } => {
                    ErrorKind::HardwareUnavailable
                }
                DeviceError::UvBlocked => ErrorKind::UserInteractionBlocked,
                DeviceError::PinRequired
                | DeviceError::PinInvalid { .. }
                | DeviceError::PinBlocked => ErrorKind::PinRejected,
                DeviceError::UnsupportedAlgorithm { .. } | DeviceError::UnsupportedPolicy { .. } => {
                    ErrorKind::PolicyUnsatisfiable
                }
                DeviceError::MissingHmacSecret | DeviceError::Transport { .. } => {
                    ErrorKind::IoFailure
                }
            },
            FidoslotError::Record(err) => match err {
                RecordError::Malformed { .. } | RecordError::UnsupportedType { .. } => {
                    ErrorKind::MalformedRecord
                }
                RecordError::Serialize { .. } => ErrorKind::AllocationFailure,
                RecordError::NotEnrolled => ErrorKind::NotEnrolled,
            },
            FidoslotError::Keyslot(err) => match err {
                KeyslotError::WrongPassphrase => ErrorKind::WrongPassphrase,
                KeyslotError::Encoding { .. } => ErrorKind::AllocationFailure,
                KeyslotError::NoFreeSlot { .. }
                | KeyslotError::NotFound { .. }
                | KeyslotError::Wrap { .. }
                | KeyslotError::TokenWrite { .. }
                | KeyslotError::Storage { .. }
                | KeyslotError::RollbackFailed { .. } => ErrorKind::IoFailure,
            },
            FidoslotError::Domain(err) => match err {
                DomainError::Pin(_) => ErrorKind::PinRejected,
                DomainError::Policy(_) | DomainError::Algorithm(_) => {
                    ErrorKind::PolicyUnsatisfiable
                }
                DomainError::Credential(_) | DomainError::KeyslotId(_) => {
                    ErrorKind::MalformedRecord
                }
            },
            FidoslotError::Io(_) => ErrorKind::IoFailure,
        }
    }

    /// True when re-invoking the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::UserInteractionBlocked
    }
}

/// Convert model errors to FidoslotError (via DomainError)
impl From<crate::model::PinError> for FidoslotError {
    fn from(err: crate::model::PinError) -> Self {
        FidoslotError::Domain(DomainError::Pin(err))
    }
}

impl From<crate::model::PolicyError> for FidoslotError {
    fn from(err: crate::model::PolicyError) -> Self {
        FidoslotError::Domain(DomainError::Policy(err))
    }
}

impl From<crate::model::AlgorithmError> for FidoslotError {
    fn from(err: crate::model::AlgorithmError) -> Self {
        FidoslotError::Domain(DomainError::Algorithm(err))
    }
}

impl From<crate::model::CredentialError> for FidoslotError {
    fn from(err: crate::model::CredentialError) -> Self {
        FidoslotError::Domain(DomainError::Credential(err))
    }
}

impl From<crate::model::KeyslotIdError> for FidoslotError {
    fn from(err: crate::model::KeyslotIdError) -> Self {
        FidoslotError::Domain(DomainError::KeyslotId(err))
    }
}
