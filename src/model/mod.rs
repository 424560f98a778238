//! Domain types for FIDO2 enrollment
//!
//! These types wrap primitives to:
//! - Prevent primitive obsession
//! - Enforce invariants at construction
//! - Erase secrets when they go out of scope

mod algorithm;
mod credential;
mod identity;
mod keyslot;
mod pin;
mod policy;
mod secret;
mod token;

pub use algorithm::{AlgorithmError, CredentialAlgorithm};
pub use credential::{CredentialError, CredentialId, CredentialMaterial, Salt};
pub use identity::{AuthenticatorSelector, RelyingParty, UserIdentity};
pub use keyslot::{KeyslotId, KeyslotIdError, TokenId};
pub use pin::{Pin, PinCache, PinCachePolicy, PinError};
pub use policy::{EnrollmentPolicy, PolicyError, PolicyFlag};
pub use secret::{DerivedSecret, Passphrase, VolumeKey};
pub use token::{TokenRecord, TokenWire};
