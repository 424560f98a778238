//! Issue credential use case
//!
//! Creates a new hmac-secret credential in a single hardware transaction and
//! returns the credential material together with the first hmac-secret
//! output.

use tracing::{debug, warn};

use crate::error::{DeviceError, FidoslotResult};
use crate::model::{
    AuthenticatorSelector, CredentialAlgorithm, CredentialMaterial, DerivedSecret,
    EnrollmentPolicy, PolicyFlag, RelyingParty, Salt, UserIdentity,
};
use crate::ports::{
    AuthenticatorFinder, AuthenticatorInfo, CredentialIssuer, DeviceInfo, MakeCredentialRequest,
    PinSource,
};

pub const PIN_PROMPT: &str = "Please enter security token PIN";

/// Output of a successful make-credential transaction
#[derive(Debug)]
pub struct IssuedCredential {
    pub credential: CredentialMaterial,
    pub secret: DerivedSecret,
    /// What the device enforces; never weaker than what was requested
    pub effective_policy: EnrollmentPolicy,
}

/// Create a credential with the hmac-secret extension on the selected
/// authenticator.
///
/// The salt is generated before the device is touched. The session is
/// released when this function returns, on success and on error.
///
/// # Errors
///
/// Returns errors if:
/// - No device matches `selector` (`HardwareUnavailable`)
/// - The device cannot create `algorithm` credentials or cannot enforce a
///   requested flag (`PolicyUnsatisfiable`)
/// - Verification is locked out (`UserInteractionBlocked`)
/// - The device reports weaker enforcement than requested
pub fn issue_credential<F, P>(
    finder: &F,
    selector: &AuthenticatorSelector,
    relying_party: &RelyingParty,
    user: &UserIdentity,
    policy: EnrollmentPolicy,
    algorithm: CredentialAlgorithm,
    pins: &mut P,
) -> FidoslotResult<IssuedCredential>
where
    F: AuthenticatorFinder,
    P: PinSource,
{
    let mut session = finder.open(selector)?;
    let info = session.info();
    check_capabilities(&info, policy, algorithm)?;

    let salt = Salt::generate();
    let pin = if info.client_pin_set {
        Some(pins.request_pin(PIN_PROMPT)?)
    } else {
        None
    };

    debug!(
        "Creating {} credential on {} with policy {}",
        algorithm, info.name, policy
    );
    let response = session.make_credential(&MakeCredentialRequest {
        relying_party,
        user,
        algorithm,
        policy,
        salt: &salt,
        pin: pin.as_ref(),
    })?;
    if response.hmac_secret.is_empty() {
        return Err(DeviceError::MissingHmacSecret.into());
    }

    let effective_policy = policy.validate_effective(response.enforced)?;
    if effective_policy != policy {
        warn!(
            "Authenticator {} enforces {} although only {} was requested",
            info.name, effective_policy, policy
        );
    }

    Ok(IssuedCredential {
        credential: CredentialMaterial::new(response.credential_id, salt),
        secret: response.hmac_secret,
        effective_policy,
    })
}

fn check_capabilities(
    info: &AuthenticatorInfo,
    policy: EnrollmentPolicy,
    algorithm: CredentialAlgorithm,
) -> FidoslotResult<()> {
    if !info.supports(algorithm) {
        return Err(DeviceError::UnsupportedAlgorithm {
            algorithm: algorithm.to_string(),
        }
        .into());
    }
    if policy.requires_pin() && !info.client_pin_set {
        return Err(DeviceError::UnsupportedPolicy {
            flag: PolicyFlag::ClientPin,
        }
        .into());
    }
    if policy.requires_user_verification() && !info.uv_supported {
        return Err(DeviceError::UnsupportedPolicy {
            flag: PolicyFlag::UserVerification,
        }
        .into());
    }
    Ok(())
}
