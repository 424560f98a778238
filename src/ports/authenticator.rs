//! Authenticator capabilities - the hardware contract the core depends on

use super::AuthenticatorOps;
use crate::error::FidoslotResult;
use crate::model::{
    AuthenticatorSelector, CredentialAlgorithm, CredentialId, DerivedSecret, EnrollmentPolicy,
    Pin, RelyingParty, Salt, UserIdentity,
};

/// What a device reports about itself before any credential operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorInfo {
    /// Device path or name
    pub name: String,
    /// A clientPin is configured
    pub client_pin_set: bool,
    /// Built-in user verification is available
    pub uv_supported: bool,
    /// Device performs user verification on every operation
    pub always_uv: bool,
    /// Credential algorithms offered
    pub algorithms: Vec<CredentialAlgorithm>,
}

impl AuthenticatorInfo {
    pub fn supports(&self, algorithm: CredentialAlgorithm) -> bool {
        self.algorithms.contains(&algorithm)
    }
}

/// Create a credential with the hmac-secret extension enabled
#[derive(Debug)]
pub struct MakeCredentialRequest<'a> {
    pub relying_party: &'a RelyingParty,
    pub user: &'a UserIdentity,
    pub algorithm: CredentialAlgorithm,
    pub policy: EnrollmentPolicy,
    pub salt: &'a Salt,
    pub pin: Option<&'a Pin>,
}

/// Result of a make-credential transaction
#[derive(Debug)]
pub struct MakeCredentialResponse {
    pub credential_id: CredentialId,
    pub hmac_secret: DerivedSecret,
    /// Requirements the device actually enforced for this credential
    pub enforced: EnrollmentPolicy,
}

/// Request an assertion for a known credential with the hmac-secret extension
#[derive(Debug)]
pub struct AssertionRequest<'a> {
    pub relying_party_id: &'a str,
    pub credential_id: &'a CredentialId,
    pub salt: &'a Salt,
    pub policy: EnrollmentPolicy,
    pub pin: Option<&'a Pin>,
}

/// Capability to report device information
pub trait DeviceInfo {
    fn info(&self) -> AuthenticatorInfo;
}

/// Capability to create a new hmac-secret credential
pub trait CredentialIssuer {
    /// Create a credential under `request.relying_party` and evaluate the
    /// hmac-secret extension for `request.salt` in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// - Verification is locked out (`DeviceError::UvBlocked`)
    /// - The algorithm or a policy flag is unsupported
    /// - The PIN is missing or wrong
    /// - The transport fails
    fn make_credential(
        &mut self,
        request: &MakeCredentialRequest<'_>,
    ) -> FidoslotResult<MakeCredentialResponse>;
}

/// Capability to replay the hmac-secret of an existing credential
pub trait AssertionProvider {
    /// Evaluate hmac-secret for `request.credential_id` and `request.salt`.
    ///
    /// For a given device, credential, salt and satisfied policy the output
    /// is always the same.
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// - The device does not hold the credential
    /// - Verification is locked out
    /// - The PIN is missing or wrong
    /// - The transport fails
    fn get_assertion(&mut self, request: &AssertionRequest<'_>) -> FidoslotResult<DerivedSecret>;
}

/// Capability to open an operation-scoped session with an authenticator.
///
/// The session is released when dropped.
pub trait AuthenticatorFinder {
    type Session: AuthenticatorOps;

    /// # Errors
    ///
    /// Returns `DeviceError::NotFound` if no device matches `selector`
    fn open(&self, selector: &AuthenticatorSelector) -> FidoslotResult<Self::Session>;
}
