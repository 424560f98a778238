//! Ports (traits) the enrollment core depends on
//!
//! These traits represent ports in hexagonal architecture - the use cases
//! depend on these abstractions, not on a concrete FIDO2 stack or keyslot
//! storage engine.

mod authenticator;
mod keyslot_store;
mod pin_source;

#[cfg(test)]
pub(crate) mod contract_tests;

pub use authenticator::{
    AssertionProvider, AssertionRequest, AuthenticatorFinder, AuthenticatorInfo,
    CredentialIssuer, DeviceInfo, MakeCredentialRequest, MakeCredentialResponse,
};
pub use keyslot_store::{KdfCost, KeyslotManager, TokenStore};
pub use pin_source::PinSource;

/// Everything a session on an authenticator can do; the bound on
/// [`AuthenticatorFinder::Session`]
pub trait AuthenticatorOps: DeviceInfo + CredentialIssuer + AssertionProvider {}

// Blanket implementation for types that implement all authenticator traits
impl<T> AuthenticatorOps for T where T: DeviceInfo + CredentialIssuer + AssertionProvider {}

/// Combined trait for a volume header
pub trait VolumeHeader: KeyslotManager + TokenStore {}

impl<T> VolumeHeader for T where T: KeyslotManager + TokenStore {}
