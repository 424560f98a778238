//! Software FIDO2 authenticator with the hmac-secret extension
//!
//! Credentials are non-resident: the credential id carries a random nonce
//! and a MAC binding it to the device seed and relying party, so the device
//! recognises its own credentials without storing them. The hmac-secret
//! output is `HMAC-SHA256(credRandom, salt)` with a separate `credRandom`
//! for assertions made with and without user verification, as on real
//! tokens.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::fs::write_atomically;
use crate::error::{DeviceError, FidoslotError, FidoslotResult};
use crate::model::{
    AuthenticatorSelector, CredentialAlgorithm, CredentialId, DerivedSecret, EnrollmentPolicy,
    Pin, PolicyFlag,
};
use crate::ports::{
    AssertionProvider, AssertionRequest, AuthenticatorFinder, AuthenticatorInfo,
    CredentialIssuer, DeviceInfo, MakeCredentialRequest, MakeCredentialResponse,
};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 32;
const TAG_LEN: usize = 16;
const PIN_RETRIES: u8 = 8;

/// Software authenticator state
#[derive(Clone)]
pub struct SoftAuthenticator {
    name: String,
    seed: Zeroizing<[u8; 32]>,
    pin: Option<Pin>,
    pin_retries: u8,
    uv_supported: bool,
    always_uv: bool,
    uv_blocked: bool,
    algorithms: Vec<CredentialAlgorithm>,
}

impl SoftAuthenticator {
    /// New device with a random seed, no PIN, presence only, ES256 and EdDSA
    pub fn new(name: &str) -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        rand::rng().fill_bytes(seed.as_mut_slice());
        Self::from_seed(name, *seed)
    }

    pub fn from_seed(name: &str, seed: [u8; 32]) -> Self {
        Self {
            name: name.to_string(),
            seed: Zeroizing::new(seed),
            pin: None,
            pin_retries: PIN_RETRIES,
            uv_supported: false,
            always_uv: false,
            uv_blocked: false,
            algorithms: vec![CredentialAlgorithm::Es256, CredentialAlgorithm::EdDsa],
        }
    }

    pub fn with_pin(mut self, pin: Pin) -> Self {
        self.pin = Some(pin);
        self
    }

    pub fn with_user_verification(mut self) -> Self {
        self.uv_supported = true;
        self
    }

    pub fn with_always_uv(mut self) -> Self {
        self.always_uv = true;
        self
    }

    pub fn with_algorithms(mut self, algorithms: Vec<CredentialAlgorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lock out user verification, as after too many failed biometric matches
    pub fn block_uv(&mut self) {
        self.uv_blocked = true;
    }

    /// Clear the lockout, as when the token is re-plugged
    pub fn unblock_uv(&mut self) {
        self.uv_blocked = false;
    }

    pub fn pin_retries(&self) -> u8 {
        self.pin_retries
    }

    /// Requirements the device adds on its own
    fn forced_policy(&self) -> EnrollmentPolicy {
        let mut forced = EnrollmentPolicy::empty();
        if self.always_uv {
            if self.uv_supported {
                forced.insert(PolicyFlag::UserVerification);
            } else if self.pin.is_some() {
                forced.insert(PolicyFlag::ClientPin);
            }
        }
        forced
    }

    fn check_supported(&self, policy: EnrollmentPolicy) -> FidoslotResult<()> {
        if policy.requires_pin() && self.pin.is_none() {
            return Err(DeviceError::UnsupportedPolicy {
                flag: PolicyFlag::ClientPin,
            }
            .into());
        }
        if policy.requires_user_verification() {
            if !self.uv_supported {
                return Err(DeviceError::UnsupportedPolicy {
                    flag: PolicyFlag::UserVerification,
                }
                .into());
            }
            if self.uv_blocked {
                return Err(DeviceError::UvBlocked.into());
            }
        }
        Ok(())
    }

    fn check_pin(&mut self, pin: Option<&Pin>) -> FidoslotResult<()> {
        let Some(expected) = self.pin.as_ref() else {
            return Err(DeviceError::UnsupportedPolicy {
                flag: PolicyFlag::ClientPin,
            }
            .into());
        };
        if self.pin_retries == 0 {
            return Err(DeviceError::PinBlocked.into());
        }
        let Some(pin) = pin else {
            return Err(DeviceError::PinRequired.into());
        };
        if pin == expected {
            self.pin_retries = PIN_RETRIES;
            return Ok(());
        }
        self.pin_retries -= 1;
        if self.pin_retries == 0 {
            Err(DeviceError::PinBlocked.into())
        } else {
            Err(DeviceError::PinInvalid {
                retries_left: self.pin_retries,
            }
            .into())
        }
    }

    fn keyed(&self, key: &[u8], parts: &[&[u8]]) -> FidoslotResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(key).map_err(|e| DeviceError::Transport {
            reason: e.to_string(),
        })?;
        for part in parts {
            mac.update(&(part.len() as u32).to_be_bytes());
            mac.update(part);
        }
        Ok(mac)
    }

    fn new_credential_id(&self, relying_party_id: &str) -> FidoslotResult<CredentialId> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let tag = self
            .keyed(
                self.seed.as_slice(),
                &[b"credential".as_slice(), relying_party_id.as_bytes(), nonce.as_slice()],
            )?
            .finalize()
            .into_bytes();

        let mut id = nonce.to_vec();
        id.extend_from_slice(&tag[..TAG_LEN]);
        Ok(CredentialId::from_slice(&id)?)
    }

    fn owns_credential(&self, relying_party_id: &str, id: &CredentialId) -> bool {
        let bytes = id.as_bytes();
        if bytes.len() != NONCE_LEN + TAG_LEN {
            return false;
        }
        let (nonce, tag) = bytes.split_at(NONCE_LEN);
        let parts = [b"credential".as_slice(), relying_party_id.as_bytes(), nonce];
        match self.keyed(self.seed.as_slice(), &parts) {
            Ok(mac) => mac.verify_truncated_left(tag).is_ok(),
            Err(_) => false,
        }
    }

    fn hmac_secret(
        &self,
        id: &CredentialId,
        salt: &[u8],
        uv_performed: bool,
    ) -> FidoslotResult<DerivedSecret> {
        let domain: &[u8] = if uv_performed { b"cred-random-uv" } else { b"cred-random" };
        let mut cred_random = Zeroizing::new([0u8; 32]);
        cred_random.copy_from_slice(
            &self
                .keyed(self.seed.as_slice(), &[domain, id.as_bytes()])?
                .finalize()
                .into_bytes(),
        );
        let mut mac = HmacSha256::new_from_slice(cred_random.as_slice()).map_err(|e| {
            DeviceError::Transport {
                reason: e.to_string(),
            }
        })?;
        mac.update(salt);
        Ok(DerivedSecret::new(mac.finalize().into_bytes().to_vec()))
    }

    /// Load a device persisted with [`SoftAuthenticator::save`]
    pub fn load(path: &Path) -> FidoslotResult<Self> {
        let raw = Zeroizing::new(std::fs::read_to_string(path)?);
        let state: SoftAuthenticatorState =
            serde_json::from_str(&raw).map_err(|e| DeviceError::Transport {
                reason: format!("parsing {}: {e}", path.display()),
            })?;
        Self::try_from(state)
    }

    pub fn save(&self, path: &Path) -> FidoslotResult<()> {
        let raw = Zeroizing::new(
            serde_json::to_vec_pretty(&SoftAuthenticatorState::from(self)).map_err(|e| {
                DeviceError::Transport {
                    reason: e.to_string(),
                }
            })?,
        );
        write_atomically(path, &raw)?;
        info!("Saved software authenticator {} to {}", self.name, path.display());
        Ok(())
    }
}

impl std::fmt::Debug for SoftAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftAuthenticator")
            .field("name", &self.name)
            .field("client_pin_set", &self.pin.is_some())
            .field("uv_supported", &self.uv_supported)
            .field("always_uv", &self.always_uv)
            .field("uv_blocked", &self.uv_blocked)
            .field("algorithms", &self.algorithms)
            .finish()
    }
}

impl DeviceInfo for SoftAuthenticator {
    fn info(&self) -> AuthenticatorInfo {
        AuthenticatorInfo {
            name: self.name.clone(),
            client_pin_set: self.pin.is_some(),
            uv_supported: self.uv_supported,
            always_uv: self.always_uv,
            algorithms: self.algorithms.clone(),
        }
    }
}

impl CredentialIssuer for SoftAuthenticator {
    fn make_credential(
        &mut self,
        request: &MakeCredentialRequest<'_>,
    ) -> FidoslotResult<MakeCredentialResponse> {
        if !self.algorithms.contains(&request.algorithm) {
            return Err(DeviceError::UnsupportedAlgorithm {
                algorithm: request.algorithm.to_string(),
            }
            .into());
        }

        let enforced = request.policy.union(self.forced_policy());
        self.check_supported(enforced)?;
        if self.pin.is_some() {
            self.check_pin(request.pin)?;
        }

        let credential_id = self.new_credential_id(&request.relying_party.id)?;
        let uv_performed = enforced.requires_pin() || enforced.requires_user_verification();
        let hmac_secret = self.hmac_secret(&credential_id, request.salt.as_bytes(), uv_performed)?;

        debug!(
            "Created credential {:?} for {} with policy {}",
            credential_id, request.relying_party.id, enforced
        );
        Ok(MakeCredentialResponse {
            credential_id,
            hmac_secret,
            enforced,
        })
    }
}

impl AssertionProvider for SoftAuthenticator {
    fn get_assertion(&mut self, request: &AssertionRequest<'_>) -> FidoslotResult<DerivedSecret> {
        if !self.owns_credential(request.relying_party_id, request.credential_id) {
            return Err(DeviceError::CredentialNotFound {
                relying_party: request.relying_party_id.to_string(),
            }
            .into());
        }

        let required = request.policy.union(self.forced_policy());
        self.check_supported(required)?;
        if required.requires_pin() {
            self.check_pin(request.pin)?;
        }
        if request.policy.requires_user_presence() {
            debug!("User presence confirmed on {}", self.name);
        }

        let uv_performed =
            request.policy.requires_pin() || request.policy.requires_user_verification();
        self.hmac_secret(request.credential_id, request.salt.as_bytes(), uv_performed)
    }
}

/// Finder over at most one software device.
///
/// Sessions share the device state, so PIN retry counters and lockouts
/// carry over from one session to the next.
#[derive(Debug, Clone, Default)]
pub struct SoftAuthenticatorFinder {
    device: Option<Arc<Mutex<SoftAuthenticator>>>,
}

impl SoftAuthenticatorFinder {
    pub fn new(device: SoftAuthenticator) -> Self {
        Self {
            device: Some(Arc::new(Mutex::new(device))),
        }
    }

    /// Current state of the device, if any
    pub fn device(&self) -> Option<SoftAuthenticator> {
        self.device.as_ref().map(|device| lock(device).clone())
    }
}

fn lock(device: &Mutex<SoftAuthenticator>) -> MutexGuard<'_, SoftAuthenticator> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AuthenticatorFinder for SoftAuthenticatorFinder {
    type Session = SoftSession;

    fn open(&self, selector: &AuthenticatorSelector) -> FidoslotResult<Self::Session> {
        let device = self
            .device
            .as_ref()
            .filter(|device| selector.matches(&lock(device).name))
            .ok_or(FidoslotError::Device(DeviceError::NotFound))?;

        let name = lock(device).name.clone();
        debug!("Opened authenticator session on {}", name);
        Ok(SoftSession {
            name,
            device: Arc::clone(device),
        })
    }
}

/// Session on a software device, closed on drop
#[derive(Debug)]
pub struct SoftSession {
    name: String,
    device: Arc<Mutex<SoftAuthenticator>>,
}

impl Drop for SoftSession {
    fn drop(&mut self) {
        debug!("Closed authenticator session on {}", self.name);
    }
}

impl DeviceInfo for SoftSession {
    fn info(&self) -> AuthenticatorInfo {
        lock(&self.device).info()
    }
}

impl CredentialIssuer for SoftSession {
    fn make_credential(
        &mut self,
        request: &MakeCredentialRequest<'_>,
    ) -> FidoslotResult<MakeCredentialResponse> {
        lock(&self.device).make_credential(request)
    }
}

impl AssertionProvider for SoftSession {
    fn get_assertion(&mut self, request: &AssertionRequest<'_>) -> FidoslotResult<DerivedSecret> {
        lock(&self.device).get_assertion(request)
    }
}

/// JSON shape of a persisted software device
#[derive(Serialize, Deserialize)]
struct SoftAuthenticatorState {
    name: String,
    seed: String,
    #[serde(default)]
    pin: Option<String>,
    #[serde(default)]
    uv_supported: bool,
    #[serde(default)]
    always_uv: bool,
    #[serde(default)]
    uv_blocked: bool,
    algorithms: Vec<String>,
}

impl Drop for SoftAuthenticatorState {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.seed.zeroize();
        self.pin.zeroize();
    }
}

impl From<&SoftAuthenticator> for SoftAuthenticatorState {
    fn from(device: &SoftAuthenticator) -> Self {
        Self {
            name: device.name.clone(),
            seed: hex::encode(device.seed.as_slice()),
            pin: device
                .pin
                .as_ref()
                .map(|pin| String::from_utf8_lossy(pin.as_bytes()).into_owned()),
            uv_supported: device.uv_supported,
            always_uv: device.always_uv,
            uv_blocked: device.uv_blocked,
            algorithms: device.algorithms.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl TryFrom<SoftAuthenticatorState> for SoftAuthenticator {
    type Error = FidoslotError;

    fn try_from(state: SoftAuthenticatorState) -> Result<Self, Self::Error> {
        let seed_bytes = Zeroizing::new(hex::decode(&state.seed).map_err(|e| {
            DeviceError::Transport {
                reason: format!("invalid device seed: {e}"),
            }
        })?);
        let seed: [u8; 32] = seed_bytes.as_slice().try_into().map_err(|_| {
            DeviceError::Transport {
                reason: format!("device seed must be 32 bytes, got {}", seed_bytes.len()),
            }
        })?;

        let mut device = SoftAuthenticator::from_seed(&state.name, seed);
        if let Some(pin) = state.pin.as_deref() {
            device = device.with_pin(pin.parse()?);
        }
        device.uv_supported = state.uv_supported;
        device.always_uv = state.always_uv;
        device.uv_blocked = state.uv_blocked;
        device.algorithms = state
            .algorithms
            .iter()
            .map(|a| a.parse::<CredentialAlgorithm>())
            .collect::<Result<_, _>>()?;
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract_tests_for;
    use crate::error::ErrorKind;
    use crate::model::{RelyingParty, Salt, UserIdentity};
    use crate::ports::contract_tests::authenticator_contract;

    contract_tests_for!(
        soft_authenticator_contract,
        make = || SoftAuthenticatorFinder::new(SoftAuthenticator::from_seed("soft-0", [9u8; 32])),
        tests = {
            test_open_auto => authenticator_contract::test_open_auto,
            test_open_wrong_name => authenticator_contract::test_open_wrong_name,
            test_make_credential_then_assert_is_deterministic => authenticator_contract::test_make_credential_then_assert_is_deterministic,
            test_different_salt_different_secret => authenticator_contract::test_different_salt_different_secret,
            test_unknown_credential => authenticator_contract::test_unknown_credential,
            test_unsupported_algorithm => authenticator_contract::test_unsupported_algorithm,
            test_enforced_policy_is_superset => authenticator_contract::test_enforced_policy_is_superset,
        }
    );

    fn make(
        device: &mut SoftAuthenticator,
        policy: EnrollmentPolicy,
        pin: Option<&Pin>,
    ) -> FidoslotResult<MakeCredentialResponse> {
        let rp = RelyingParty::cryptsetup();
        let user = UserIdentity::for_volume(Some("uuid"), "test");
        let salt = Salt::from_slice(&[3u8; 32]).unwrap();
        device.make_credential(&MakeCredentialRequest {
            relying_party: &rp,
            user: &user,
            algorithm: CredentialAlgorithm::Es256,
            policy,
            salt: &salt,
            pin,
        })
    }

    #[test]
    fn test_pin_set_requires_pin_for_make_credential() {
        let mut device = SoftAuthenticator::from_seed("soft", [1u8; 32])
            .with_pin("1234".parse().unwrap());
        let result = make(&mut device, EnrollmentPolicy::recommended(), None);
        assert!(matches!(
            result.unwrap_err(),
            FidoslotError::Device(DeviceError::PinRequired)
        ));
    }

    #[test]
    fn test_wrong_pin_counts_down_then_blocks() {
        let mut device = SoftAuthenticator::from_seed("soft", [1u8; 32])
            .with_pin("1234".parse().unwrap());
        let wrong: Pin = "9999".parse().unwrap();

        for expected in (1..PIN_RETRIES).rev() {
            match make(&mut device, EnrollmentPolicy::recommended(), Some(&wrong)).unwrap_err() {
                FidoslotError::Device(DeviceError::PinInvalid { retries_left }) => {
                    assert_eq!(retries_left, expected)
                }
                other => panic!("expected PinInvalid: {other:?}"),
            }
        }
        let err = make(&mut device, EnrollmentPolicy::recommended(), Some(&wrong)).unwrap_err();
        assert!(matches!(err, FidoslotError::Device(DeviceError::PinBlocked)));
        assert_eq!(device.pin_retries(), 0);
    }

    #[test]
    fn test_always_uv_forces_pin_without_builtin_uv() {
        let pin: Pin = "1234".parse().unwrap();
        let mut device = SoftAuthenticator::from_seed("soft", [1u8; 32])
            .with_pin(pin.clone())
            .with_always_uv();
        let requested = EnrollmentPolicy::from_flags([PolicyFlag::UserPresence]);
        let response = make(&mut device, requested, Some(&pin)).unwrap();
        assert!(response.enforced.requires_pin());
        assert!(response.enforced.is_superset_of(&requested));
    }

    #[test]
    fn test_uv_blocked() {
        let mut device = SoftAuthenticator::from_seed("soft", [1u8; 32]).with_user_verification();
        device.block_uv();
        let policy = EnrollmentPolicy::from_flags([PolicyFlag::UserVerification]);
        let err = make(&mut device, policy, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserInteractionBlocked);

        device.unblock_uv();
        assert!(make(&mut device, policy, None).is_ok());
    }

    #[test]
    fn test_uv_flag_selects_cred_random() {
        let device = SoftAuthenticator::from_seed("soft", [1u8; 32]);
        let id = device.new_credential_id("io.systemd.cryptsetup").unwrap();
        let without = device.hmac_secret(&id, &[5u8; 32], false).unwrap();
        let with = device.hmac_secret(&id, &[5u8; 32], true).unwrap();
        assert_ne!(without, with);
    }

    #[test]
    fn test_credential_bound_to_relying_party() {
        let device = SoftAuthenticator::from_seed("soft", [1u8; 32]);
        let id = device.new_credential_id("io.systemd.cryptsetup").unwrap();
        assert!(device.owns_credential("io.systemd.cryptsetup", &id));
        assert!(!device.owns_credential("example.org", &id));

        let other = SoftAuthenticator::from_seed("soft", [2u8; 32]);
        assert!(!other.owns_credential("io.systemd.cryptsetup", &id));
    }

    #[test]
    fn test_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authenticator.json");
        let device = SoftAuthenticator::from_seed("soft", [4u8; 32])
            .with_pin("4321".parse().unwrap())
            .with_user_verification();
        device.save(&path).unwrap();

        let loaded = SoftAuthenticator::load(&path).unwrap();
        assert_eq!(loaded.info(), device.info());

        let id = device.new_credential_id("rp").unwrap();
        assert_eq!(
            loaded.hmac_secret(&id, &[0u8; 32], true).unwrap(),
            device.hmac_secret(&id, &[0u8; 32], true).unwrap()
        );
    }

    #[test]
    fn test_pin_retries_carry_over_between_sessions() {
        let pin: Pin = "1234".parse().unwrap();
        let wrong: Pin = "9999".parse().unwrap();
        let finder =
            SoftAuthenticatorFinder::new(SoftAuthenticator::from_seed("soft", [1u8; 32]).with_pin(pin));
        let rp = RelyingParty::cryptsetup();
        let user = UserIdentity::for_volume(Some("uuid"), "test");
        let salt = Salt::from_slice(&[3u8; 32]).unwrap();

        for expected in (1..PIN_RETRIES).rev() {
            let mut session = finder.open(&AuthenticatorSelector::Auto).unwrap();
            let err = session
                .make_credential(&MakeCredentialRequest {
                    relying_party: &rp,
                    user: &user,
                    algorithm: CredentialAlgorithm::Es256,
                    policy: EnrollmentPolicy::recommended(),
                    salt: &salt,
                    pin: Some(&wrong),
                })
                .unwrap_err();
            assert!(matches!(
                err,
                FidoslotError::Device(DeviceError::PinInvalid { retries_left }) if retries_left == expected
            ));
        }
        assert_eq!(finder.device().unwrap().pin_retries(), 1);
    }

    #[test]
    fn test_corrupt_state_file_is_a_device_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authenticator.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = SoftAuthenticator::load(&path).unwrap_err();
        assert!(matches!(
            err,
            FidoslotError::Device(DeviceError::Transport { .. })
        ));
    }

    #[test]
    fn test_debug_hides_seed_and_pin() {
        let device = SoftAuthenticator::from_seed("soft", [0xaa; 32])
            .with_pin("135790".parse().unwrap());
        let debug_str = format!("{:?}", device);
        assert!(!debug_str.contains("aaaa"));
        assert!(!debug_str.contains("135790"));
    }
}
