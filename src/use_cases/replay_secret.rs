//! Replay secret use case
//!
//! Asks the authenticator to re-evaluate hmac-secret for a persisted
//! credential and salt under the persisted policy.

use tracing::{debug, warn};

use super::issue_credential::PIN_PROMPT;
use crate::error::{DeviceError, FidoslotError, FidoslotResult};
use crate::model::{
    AuthenticatorSelector, CredentialMaterial, DerivedSecret, EnrollmentPolicy, PinCache,
    PinCachePolicy,
};
use crate::ports::{AssertionProvider, AssertionRequest, AuthenticatorFinder, PinSource};

/// Where the PIN of the current attempt came from
enum PinOrigin {
    NotNeeded,
    Cache,
    Entered,
}

/// Replay the hmac-secret of `credential` in one assertion.
///
/// When the policy requires a PIN, a cached one is used if `cache_policy`
/// allows it. A cached PIN the device rejects is forgotten and the user is
/// asked once. A PIN that worked is remembered if `cache_policy` allows it.
///
/// # Errors
///
/// Returns errors if:
/// - No device matches or the device does not hold the credential
///   (`HardwareUnavailable`)
/// - Verification is locked out (`UserInteractionBlocked`, retryable)
/// - The PIN is missing, wrong, or blocked (`PinRejected`)
#[allow(clippy::too_many_arguments)]
pub fn replay_secret<F, P>(
    finder: &F,
    selector: &AuthenticatorSelector,
    relying_party_id: &str,
    credential: &CredentialMaterial,
    policy: EnrollmentPolicy,
    pin_cache: &mut PinCache,
    cache_policy: PinCachePolicy,
    pins: &mut P,
) -> FidoslotResult<DerivedSecret>
where
    F: AuthenticatorFinder,
    P: PinSource,
{
    let mut session = finder.open(selector)?;

    let (mut pin, mut origin) = if policy.requires_pin() {
        match pin_cache.lookup(cache_policy) {
            Some(cached) => (Some(cached.clone()), PinOrigin::Cache),
            None => (Some(pins.request_pin(PIN_PROMPT)?), PinOrigin::Entered),
        }
    } else {
        (None, PinOrigin::NotNeeded)
    };

    loop {
        let request = AssertionRequest {
            relying_party_id,
            credential_id: &credential.credential_id,
            salt: &credential.salt,
            policy,
            pin: pin.as_ref(),
        };
        match session.get_assertion(&request) {
            Ok(secret) if secret.is_empty() => {
                return Err(DeviceError::MissingHmacSecret.into());
            }
            Ok(secret) => {
                if let (Some(pin), PinOrigin::Entered) = (pin.as_ref(), &origin) {
                    pin_cache.store(pin, cache_policy);
                }
                return Ok(secret);
            }
            Err(FidoslotError::Device(DeviceError::PinInvalid { retries_left }))
                if matches!(origin, PinOrigin::Cache) =>
            {
                warn!(
                    "Cached PIN rejected by the authenticator ({} attempts left)",
                    retries_left
                );
                pin_cache.forget();
                pin = Some(pins.request_pin(PIN_PROMPT)?);
                origin = PinOrigin::Entered;
            }
            Err(FidoslotError::Device(DeviceError::PinRequired))
                if matches!(origin, PinOrigin::NotNeeded) =>
            {
                debug!("Authenticator asks for a PIN the token does not require");
                pin = Some(match pin_cache.lookup(cache_policy) {
                    Some(cached) => cached.clone(),
                    None => pins.request_pin(PIN_PROMPT)?,
                });
                origin = PinOrigin::Entered;
            }
            Err(err) => return Err(err),
        }
    }
}
