//! Enroll use case
//!
//! Binds a new FIDO2 credential to the volume: issue the credential, encode
//! the hmac-secret as a passphrase, wrap the volume key in a new keyslot and
//! persist the token record. The keyslot and the record are written as a
//! unit; if the record cannot be stored the keyslot is removed again.

use tracing::{debug, info, warn};

use super::issue_credential::{issue_credential, IssuedCredential};
use crate::error::{ErrorKind, FidoslotError, FidoslotResult, KeyslotError};
use crate::logic::encode_passphrase;
use crate::model::{
    AuthenticatorSelector, CredentialAlgorithm, EnrollmentPolicy, KeyslotId, RelyingParty,
    TokenId, TokenRecord, UserIdentity, VolumeKey,
};
use crate::ports::{AuthenticatorFinder, KdfCost, KeyslotManager, PinSource, VolumeHeader};

/// Enrollment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollConfig {
    /// Which authenticator to use
    pub selector: AuthenticatorSelector,
    /// Relying party the credential is created under
    pub relying_party: RelyingParty,
    /// Requested policy; the device may enforce more
    pub policy: EnrollmentPolicy,
    /// Credential algorithm
    pub algorithm: CredentialAlgorithm,
}

impl Default for EnrollConfig {
    fn default() -> Self {
        Self {
            selector: AuthenticatorSelector::Auto,
            relying_party: RelyingParty::cryptsetup(),
            policy: EnrollmentPolicy::recommended(),
            algorithm: CredentialAlgorithm::Es256,
        }
    }
}

/// Progress of one enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollState {
    Start,
    CredentialIssued,
    SecretEncoded,
    KeyslotWritten(KeyslotId),
    RecordPersisted(TokenId),
    Failed(ErrorKind),
}

impl EnrollState {
    fn advance(&mut self, next: EnrollState) {
        debug!("Enroll: {:?} -> {:?}", self, next);
        *self = next;
    }
}

/// Result of a completed enrollment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub keyslot: KeyslotId,
    pub token_id: TokenId,
    pub record: TokenRecord,
}

/// Enroll a FIDO2 authenticator for the volume behind `header`.
///
/// # Errors
///
/// Returns the first failure of any step. Nothing is left in the header on
/// error, except when removing a freshly written keyslot also fails, which
/// is reported as `KeyslotError::RollbackFailed`.
pub fn enroll<F, H, P>(
    finder: &F,
    header: &mut H,
    volume_key: &VolumeKey,
    config: &EnrollConfig,
    pins: &mut P,
) -> FidoslotResult<Enrollment>
where
    F: AuthenticatorFinder,
    H: VolumeHeader,
    P: PinSource,
{
    let mut state = EnrollState::Start;
    let result = run(finder, header, volume_key, config, pins, &mut state);
    if let Err(err) = &result {
        state.advance(EnrollState::Failed(err.kind()));
    }
    result
}

fn run<F, H, P>(
    finder: &F,
    header: &mut H,
    volume_key: &VolumeKey,
    config: &EnrollConfig,
    pins: &mut P,
    state: &mut EnrollState,
) -> FidoslotResult<Enrollment>
where
    F: AuthenticatorFinder,
    H: VolumeHeader,
    P: PinSource,
{
    if volume_key.is_empty() {
        return Err(KeyslotError::Wrap {
            reason: "volume key is empty".to_string(),
        }
        .into());
    }

    let user = UserIdentity::for_volume(header.volume_uuid().as_deref(), &header.device_name());
    let IssuedCredential {
        credential,
        secret,
        effective_policy,
    } = issue_credential(
        finder,
        &config.selector,
        &config.relying_party,
        &user,
        config.policy,
        config.algorithm,
        pins,
    )?;
    state.advance(EnrollState::CredentialIssued);

    let passphrase = encode_passphrase(&secret)?;
    drop(secret);
    state.advance(EnrollState::SecretEncoded);

    let keyslot = header.add_keyslot(volume_key, &passphrase, KdfCost::Minimal)?;
    drop(passphrase);
    state.advance(EnrollState::KeyslotWritten(keyslot));

    let record = TokenRecord::build(
        credential.credential_id,
        credential.salt,
        &config.relying_party.id,
        effective_policy,
        vec![keyslot],
    );
    let token_id = match record.to_json().and_then(|json| header.add_token(&json)) {
        Ok(token_id) => token_id,
        Err(err) => return Err(roll_back(header, keyslot, err)),
    };
    state.advance(EnrollState::RecordPersisted(token_id));

    info!("New FIDO2 token enrolled as key slot {}.", keyslot);
    Ok(Enrollment {
        keyslot,
        token_id,
        record,
    })
}

fn roll_back<H: KeyslotManager>(
    header: &mut H,
    keyslot: KeyslotId,
    cause: FidoslotError,
) -> FidoslotError {
    warn!(
        "Failed to store token ({}), removing keyslot {} again",
        cause, keyslot
    );
    match header.remove_keyslot(keyslot) {
        Ok(()) => cause,
        Err(rollback) => KeyslotError::RollbackFailed {
            keyslot,
            reason: format!("{cause}; {rollback}"),
        }
        .into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryHeader, SoftAuthenticator, SoftAuthenticatorFinder, StaticPin};
    use crate::model::{Passphrase, PolicyFlag};
    use crate::ports::TokenStore;
    use pretty_assertions::assert_eq;

    /// Header whose token writes and keyslot removals can be made to fail
    struct FlakyHeader {
        inner: MemoryHeader,
        fail_token: bool,
        fail_remove: bool,
    }

    impl FlakyHeader {
        fn new(fail_token: bool, fail_remove: bool) -> Self {
            Self {
                inner: MemoryHeader::new(Some("0b9e-uuid"), "cryptdata"),
                fail_token,
                fail_remove,
            }
        }
    }

    impl KeyslotManager for FlakyHeader {
        fn add_keyslot(
            &mut self,
            volume_key: &VolumeKey,
            passphrase: &Passphrase,
            cost: KdfCost,
        ) -> FidoslotResult<KeyslotId> {
            self.inner.add_keyslot(volume_key, passphrase, cost)
        }

        fn remove_keyslot(&mut self, keyslot: KeyslotId) -> FidoslotResult<()> {
            if self.fail_remove {
                return Err(KeyslotError::Storage {
                    reason: "header is read-only".to_string(),
                }
                .into());
            }
            self.inner.remove_keyslot(keyslot)
        }

        fn unwrap_keyslot(
            &self,
            passphrase: &Passphrase,
            keyslots: &[KeyslotId],
        ) -> FidoslotResult<(KeyslotId, VolumeKey)> {
            self.inner.unwrap_keyslot(passphrase, keyslots)
        }
    }

    impl TokenStore for FlakyHeader {
        fn volume_uuid(&self) -> Option<String> {
            self.inner.volume_uuid()
        }

        fn device_name(&self) -> String {
            self.inner.device_name()
        }

        fn add_token(&mut self, token: &str) -> FidoslotResult<TokenId> {
            if self.fail_token {
                return Err(KeyslotError::TokenWrite {
                    reason: "no space left in header".to_string(),
                }
                .into());
            }
            self.inner.add_token(token)
        }

        fn tokens(&self) -> FidoslotResult<Vec<(TokenId, String)>> {
            self.inner.tokens()
        }
    }

    fn presence_config() -> EnrollConfig {
        EnrollConfig {
            policy: EnrollmentPolicy::from_flags([PolicyFlag::UserPresence]),
            ..EnrollConfig::default()
        }
    }

    fn finder() -> SoftAuthenticatorFinder {
        SoftAuthenticatorFinder::new(SoftAuthenticator::from_seed("soft-0", [4u8; 32]))
    }

    #[test]
    fn test_default_config() {
        let config = EnrollConfig::default();
        assert_eq!(config.selector, AuthenticatorSelector::Auto);
        assert_eq!(config.relying_party.id, "io.systemd.cryptsetup");
        assert_eq!(config.relying_party.name, "Encrypted Volume");
        assert_eq!(config.policy, EnrollmentPolicy::recommended());
        assert_eq!(config.algorithm, CredentialAlgorithm::Es256);
    }

    #[test]
    fn test_enroll_writes_keyslot_and_token() {
        let mut header = MemoryHeader::new(Some("0b9e-uuid"), "cryptdata");
        let key = VolumeKey::new(vec![0x33; 64]);

        let enrollment = enroll(
            &finder(),
            &mut header,
            &key,
            &presence_config(),
            &mut StaticPin::none(),
        )
        .unwrap();

        assert_eq!(enrollment.record.keyslots, vec![enrollment.keyslot]);
        assert_eq!(enrollment.record.relying_party_id, "io.systemd.cryptsetup");
        let tokens = header.tokens().unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(TokenRecord::parse(&tokens[0].1).unwrap(), enrollment.record);
        assert!(header.has_keyslot(enrollment.keyslot));
    }

    #[test]
    fn test_token_write_failure_rolls_back_keyslot() {
        let mut header = FlakyHeader::new(true, false);
        let key = VolumeKey::new(vec![0x33; 32]);

        let err = enroll(
            &finder(),
            &mut header,
            &key,
            &presence_config(),
            &mut StaticPin::none(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            FidoslotError::Keyslot(KeyslotError::TokenWrite { .. })
        ));
        assert!(header.inner.keyslot_ids().is_empty());
        assert!(header.inner.tokens().unwrap().is_empty());
    }

    #[test]
    fn test_failed_rollback_is_reported() {
        let mut header = FlakyHeader::new(true, true);
        let key = VolumeKey::new(vec![0x33; 32]);

        let err = enroll(
            &finder(),
            &mut header,
            &key,
            &presence_config(),
            &mut StaticPin::none(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            FidoslotError::Keyslot(KeyslotError::RollbackFailed { .. })
        ));
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_keyslot_failure_persists_no_token() {
        let mut header = MemoryHeader::new(Some("0b9e-uuid"), "cryptdata");
        let key = VolumeKey::new(vec![0x33; 32]);
        let other = Passphrase::new("aGVsbG8=".to_string());
        for _ in 0..KeyslotId::MAX_SLOTS {
            header.add_keyslot(&key, &other, KdfCost::Minimal).unwrap();
        }

        let err = enroll(
            &finder(),
            &mut header,
            &key,
            &presence_config(),
            &mut StaticPin::none(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            FidoslotError::Keyslot(KeyslotError::NoFreeSlot { .. })
        ));
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(header.tokens().unwrap().is_empty());
        assert_eq!(header.keyslot_ids().len(), KeyslotId::MAX_SLOTS);
    }

    #[test]
    fn test_device_failure_leaves_header_untouched() {
        let mut header = MemoryHeader::new(None, "cryptdata");
        let key = VolumeKey::new(vec![0x33; 32]);
        let config = EnrollConfig {
            algorithm: CredentialAlgorithm::Rs256,
            ..presence_config()
        };

        let err = enroll(&finder(), &mut header, &key, &config, &mut StaticPin::none())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PolicyUnsatisfiable);
        assert!(header.keyslot_ids().is_empty());
        assert_eq!(header.token_count(), 0);
    }

    #[test]
    fn test_empty_volume_key_rejected() {
        let mut header = MemoryHeader::new(None, "cryptdata");
        let err = enroll(
            &finder(),
            &mut header,
            &VolumeKey::new(Vec::new()),
            &presence_config(),
            &mut StaticPin::none(),
        )
        .unwrap_err();
        assert!(matches!(err, FidoslotError::Keyslot(KeyslotError::Wrap { .. })));
    }

    #[test]
    fn test_stricter_device_policy_is_persisted() {
        let device = SoftAuthenticator::from_seed("soft-0", [4u8; 32])
            .with_pin("1234".parse().unwrap())
            .with_always_uv();
        let mut header = MemoryHeader::new(Some("0b9e-uuid"), "cryptdata");

        let enrollment = enroll(
            &SoftAuthenticatorFinder::new(device),
            &mut header,
            &VolumeKey::new(vec![1u8; 32]),
            &presence_config(),
            &mut StaticPin::new(Some("1234".parse().unwrap())),
        )
        .unwrap();

        assert!(enrollment.record.policy.requires_pin());
        assert!(enrollment.record.policy.requires_user_presence());
    }
}
