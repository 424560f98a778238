#[macro_export]
macro_rules! contract_tests_for {
      (
          $mod_name:ident,
          make = $make:expr,
          tests = {
            $( $test_name:ident => $tmpl:path ),+ $(,)?
        }
      ) => {
          mod $mod_name {
              use super::*;

              $(
                  #[test]
                  fn $test_name() {
                      let op = ($make)();
                      $tmpl(op);
                  }
              )+
          }
      };
  }

#[cfg(test)]
pub mod authenticator_contract {
    use crate::{
        error::DeviceError,
        model::{
            AuthenticatorSelector, CredentialAlgorithm, CredentialId, EnrollmentPolicy,
            PolicyFlag, RelyingParty, Salt, UserIdentity,
        },
        ports::{
            AssertionProvider, AssertionRequest, AuthenticatorFinder, CredentialIssuer,
            DeviceInfo, MakeCredentialRequest, MakeCredentialResponse,
        },
        FidoslotError, FidoslotResult,
    };

    fn user() -> UserIdentity {
        UserIdentity::for_volume(Some("5a1c0d7e-contract"), "cryptcontract")
    }

    fn make(
        session: &mut impl CredentialIssuer,
        algorithm: CredentialAlgorithm,
        policy: EnrollmentPolicy,
        salt: &Salt,
    ) -> FidoslotResult<MakeCredentialResponse> {
        let rp = RelyingParty::cryptsetup();
        let user = user();
        session.make_credential(&MakeCredentialRequest {
            relying_party: &rp,
            user: &user,
            algorithm,
            policy,
            salt,
            pin: None,
        })
    }

    fn assert_request<'a>(
        credential_id: &'a CredentialId,
        salt: &'a Salt,
        policy: EnrollmentPolicy,
    ) -> AssertionRequest<'a> {
        AssertionRequest {
            relying_party_id: RelyingParty::CRYPTSETUP_ID,
            credential_id,
            salt,
            policy,
            pin: None,
        }
    }

    fn presence() -> EnrollmentPolicy {
        EnrollmentPolicy::from_flags([PolicyFlag::UserPresence])
    }

    pub(crate) fn test_open_auto(finder: impl AuthenticatorFinder) {
        let session = finder
            .open(&AuthenticatorSelector::Auto)
            .expect("auto selection must find the device");
        assert!(!session.info().name.is_empty());
        assert!(!session.info().algorithms.is_empty());
    }

    pub(crate) fn test_open_wrong_name(finder: impl AuthenticatorFinder) {
        let result = finder.open(&AuthenticatorSelector::Named("/dev/no-such-token".to_string()));
        assert!(matches!(
            result.err(),
            Some(FidoslotError::Device(DeviceError::NotFound))
        ));
    }

    pub(crate) fn test_make_credential_then_assert_is_deterministic(
        finder: impl AuthenticatorFinder,
    ) {
        let salt = Salt::generate();
        let created = {
            let mut session = finder.open(&AuthenticatorSelector::Auto).unwrap();
            make(&mut session, CredentialAlgorithm::Es256, presence(), &salt).unwrap()
        };
        assert!(!created.hmac_secret.is_empty());

        for _ in 0..2 {
            let mut session = finder.open(&AuthenticatorSelector::Auto).unwrap();
            let replayed = session
                .get_assertion(&assert_request(&created.credential_id, &salt, created.enforced))
                .unwrap();
            assert_eq!(replayed, created.hmac_secret);
        }
    }

    pub(crate) fn test_different_salt_different_secret(finder: impl AuthenticatorFinder) {
        let mut session = finder.open(&AuthenticatorSelector::Auto).unwrap();
        let salt = Salt::from_slice(&[0x5a; 32]).unwrap();
        let created = make(&mut session, CredentialAlgorithm::Es256, presence(), &salt).unwrap();

        let mut flipped = *salt.as_array();
        flipped[0] ^= 0x01;
        let other_salt = Salt::from_slice(&flipped).unwrap();
        let other = session
            .get_assertion(&assert_request(&created.credential_id, &other_salt, created.enforced))
            .unwrap();
        assert_ne!(other, created.hmac_secret);
    }

    pub(crate) fn test_unknown_credential(finder: impl AuthenticatorFinder) {
        let mut session = finder.open(&AuthenticatorSelector::Auto).unwrap();
        let foreign = CredentialId::from_slice(&[0xab; 48]).unwrap();
        let salt = Salt::generate();

        let err = session
            .get_assertion(&assert_request(&foreign, &salt, presence()))
            .unwrap_err();
        assert!(matches!(
            err,
            FidoslotError::Device(DeviceError::CredentialNotFound { .. })
        ));
    }

    pub(crate) fn test_unsupported_algorithm(finder: impl AuthenticatorFinder) {
        let mut session = finder.open(&AuthenticatorSelector::Auto).unwrap();
        let missing = CredentialAlgorithm::ALL
            .into_iter()
            .find(|algorithm| !session.info().supports(*algorithm));
        let Some(algorithm) = missing else {
            return;
        };

        let err = make(&mut session, algorithm, presence(), &Salt::generate()).unwrap_err();
        assert!(matches!(
            err,
            FidoslotError::Device(DeviceError::UnsupportedAlgorithm { .. })
        ));
    }

    pub(crate) fn test_enforced_policy_is_superset(finder: impl AuthenticatorFinder) {
        let mut session = finder.open(&AuthenticatorSelector::Auto).unwrap();
        for requested in [EnrollmentPolicy::empty(), presence()] {
            let created = make(
                &mut session,
                CredentialAlgorithm::Es256,
                requested,
                &Salt::generate(),
            )
            .unwrap();
            assert!(created.enforced.is_superset_of(&requested));
        }
    }
}

#[cfg(test)]
pub mod header_contract {
    use crate::{
        error::KeyslotError,
        logic::encode_passphrase,
        model::{DerivedSecret, KeyslotId, Passphrase, VolumeKey},
        ports::{KdfCost, KeyslotManager, TokenStore, VolumeHeader},
        ErrorKind, FidoslotError,
    };

    fn passphrase(byte: u8) -> Passphrase {
        encode_passphrase(&DerivedSecret::new(vec![byte; 32])).unwrap()
    }

    fn volume_key() -> VolumeKey {
        VolumeKey::new((0u8..64).collect())
    }

    pub(crate) fn test_add_then_unwrap(mut header: impl VolumeHeader) {
        let keyslot = header
            .add_keyslot(&volume_key(), &passphrase(1), KdfCost::Minimal)
            .unwrap();

        let (opened, key) = header.unwrap_keyslot(&passphrase(1), &[keyslot]).unwrap();
        assert_eq!(opened, keyslot);
        assert_eq!(key, volume_key());

        let (_, key) = header.unwrap_keyslot(&passphrase(1), &[]).unwrap();
        assert_eq!(key, volume_key());
    }

    pub(crate) fn test_wrong_passphrase(mut header: impl VolumeHeader) {
        header
            .add_keyslot(&volume_key(), &passphrase(1), KdfCost::Minimal)
            .unwrap();

        let err = header.unwrap_keyslot(&passphrase(2), &[]).unwrap_err();
        assert!(matches!(
            err,
            FidoslotError::Keyslot(KeyslotError::WrongPassphrase)
        ));
    }

    pub(crate) fn test_unwrap_restricted_to_listed_slots(mut header: impl VolumeHeader) {
        let first = header
            .add_keyslot(&volume_key(), &passphrase(1), KdfCost::Minimal)
            .unwrap();
        let second = header
            .add_keyslot(&volume_key(), &passphrase(2), KdfCost::Minimal)
            .unwrap();
        assert_ne!(first, second);

        let err = header.unwrap_keyslot(&passphrase(2), &[first]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongPassphrase);

        let (opened, _) = header
            .unwrap_keyslot(&passphrase(2), &[first, second])
            .unwrap();
        assert_eq!(opened, second);
    }

    pub(crate) fn test_remove_keyslot(mut header: impl VolumeHeader) {
        let keyslot = header
            .add_keyslot(&volume_key(), &passphrase(1), KdfCost::Minimal)
            .unwrap();
        header.remove_keyslot(keyslot).unwrap();

        let err = header.unwrap_keyslot(&passphrase(1), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongPassphrase);
    }

    pub(crate) fn test_remove_missing_keyslot(mut header: impl VolumeHeader) {
        let err = header.remove_keyslot(KeyslotId::new(9).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            FidoslotError::Keyslot(KeyslotError::NotFound { .. })
        ));
    }

    pub(crate) fn test_tokens_round_trip(mut header: impl VolumeHeader) {
        assert!(header.tokens().unwrap().is_empty());

        let first = header
            .add_token(r#"{"type":"systemd-tpm2","keyslots":["0"]}"#)
            .unwrap();
        let second = header
            .add_token(r#"{"type":"systemd-fido2","keyslots":["1"]}"#)
            .unwrap();
        assert_ne!(first, second);

        let tokens = header.tokens().unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].0, first);
        let value: serde_json::Value = serde_json::from_str(&tokens[1].1).unwrap();
        assert_eq!(value["type"], "systemd-fido2");
    }

    pub(crate) fn test_reject_non_json_token(mut header: impl VolumeHeader) {
        let err = header.add_token("systemd-fido2").unwrap_err();
        assert!(matches!(
            err,
            FidoslotError::Keyslot(KeyslotError::TokenWrite { .. })
        ));
        assert!(header.tokens().unwrap().is_empty());
    }

    pub(crate) fn test_identity(header: impl TokenStore) {
        assert!(!header.device_name().is_empty());
    }
}
