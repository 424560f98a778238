//! FIDO2 hmac-secret enrollment and unlock for encrypted volume headers
//!
//! An authenticator-derived secret is encoded as a keyslot passphrase, and
//! the credential id, salt and policy needed to derive it again are stored
//! as a `systemd-fido2` token next to the keyslot.

pub mod adapters;
pub mod api;
pub mod error;
pub mod logic;
pub mod model;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use error::{ErrorKind, FidoslotError, FidoslotResult};

// Re-export public API
pub use use_cases::{enroll, list_tokens, unlock, EnrollConfig, UnlockConfig};
