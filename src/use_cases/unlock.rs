//! Unlock use case
//!
//! Recovers the volume key from a FIDO2 token record: replay the
//! hmac-secret with the stored credential id and salt, encode it as the
//! passphrase, and unwrap a keyslot. Unlock never writes to the header.

use tracing::{debug, info, warn};

use super::replay_secret::replay_secret;
use crate::error::{ErrorKind, FidoslotError, FidoslotResult, RecordError};
use crate::logic::encode_passphrase;
use crate::model::{
    AuthenticatorSelector, KeyslotId, PinCache, PinCachePolicy, TokenId, TokenRecord, VolumeKey,
};
use crate::ports::{AuthenticatorFinder, KeyslotManager, PinSource, TokenStore, VolumeHeader};

/// Unlock configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockConfig {
    pub selector: AuthenticatorSelector,
    pub pin_cache: PinCachePolicy,
}

/// Progress of one unlock attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockState {
    Start,
    RecordParsed,
    SecretReplayed,
    PassphraseEncoded,
    VolumeKeyRecovered(KeyslotId),
    Failed(ErrorKind),
}

impl UnlockState {
    fn advance(&mut self, next: UnlockState) {
        debug!("Unlock: {:?} -> {:?}", self, next);
        *self = next;
    }
}

/// Volume key recovered from a token
#[derive(Debug)]
pub struct Unlocked {
    pub token_id: TokenId,
    pub keyslot: KeyslotId,
    pub volume_key: VolumeKey,
}

/// Recover the volume key with one token record.
///
/// The record's keyslots are tried first, then any keyslot.
///
/// # Errors
///
/// Returns errors if:
/// - The authenticator is missing or does not hold the credential
///   (`HardwareUnavailable`)
/// - Verification is locked out (`UserInteractionBlocked`, retryable)
/// - No keyslot opens with the derived passphrase (`WrongPassphrase`)
pub fn unlock_with_record<F, H, P>(
    finder: &F,
    header: &H,
    record: &TokenRecord,
    config: &UnlockConfig,
    pin_cache: &mut PinCache,
    pins: &mut P,
) -> FidoslotResult<(KeyslotId, VolumeKey)>
where
    F: AuthenticatorFinder,
    H: KeyslotManager,
    P: PinSource,
{
    let mut state = UnlockState::Start;
    state.advance(UnlockState::RecordParsed);
    let result = unlock_steps(finder, header, record, config, pin_cache, pins, &mut state);
    if let Err(err) = &result {
        state.advance(UnlockState::Failed(err.kind()));
    }
    result
}

fn unlock_steps<F, H, P>(
    finder: &F,
    header: &H,
    record: &TokenRecord,
    config: &UnlockConfig,
    pin_cache: &mut PinCache,
    pins: &mut P,
    state: &mut UnlockState,
) -> FidoslotResult<(KeyslotId, VolumeKey)>
where
    F: AuthenticatorFinder,
    H: KeyslotManager,
    P: PinSource,
{
    let secret = replay_secret(
        finder,
        &config.selector,
        &record.relying_party_id,
        &record.credential,
        record.policy,
        pin_cache,
        config.pin_cache,
        pins,
    )?;
    state.advance(UnlockState::SecretReplayed);

    let passphrase = encode_passphrase(&secret)?;
    drop(secret);
    state.advance(UnlockState::PassphraseEncoded);

    let opened = match header.unwrap_keyslot(&passphrase, &record.keyslots) {
        Err(err) if err.kind() == ErrorKind::WrongPassphrase => {
            debug!("Token keyslots did not open, trying all keyslots");
            header.unwrap_keyslot(&passphrase, &[])
        }
        other => other,
    };
    let (keyslot, volume_key) = opened?;
    state.advance(UnlockState::VolumeKeyRecovered(keyslot));
    Ok((keyslot, volume_key))
}

/// FIDO2 token records in the header, in token order.
///
/// Tokens of other schemes are skipped.
///
/// # Errors
///
/// Returns `MalformedRecord` if any token of this scheme cannot be parsed.
pub fn list_tokens<H: TokenStore>(header: &H) -> FidoslotResult<Vec<(TokenId, TokenRecord)>> {
    let mut records = Vec::new();
    for (token_id, serialized) in header.tokens()? {
        match TokenRecord::parse(&serialized) {
            Ok(record) => records.push((token_id, record)),
            Err(FidoslotError::Record(RecordError::UnsupportedType { found })) => {
                debug!("Skipping token {} of type {}", token_id, found);
            }
            Err(err) => {
                warn!("Token {} is corrupt: {}", token_id, err);
                return Err(err);
            }
        }
    }
    Ok(records)
}

/// Recover the volume key with any FIDO2 token in the header.
///
/// Records are tried in token order. A missing device or credential, a
/// policy the device cannot satisfy, or a passphrase that opens nothing
/// moves on to the next record; PIN and I/O failures stop the scan.
///
/// # Errors
///
/// Returns `RecordError::NotEnrolled` if the header has no FIDO2 token. If
/// no record succeeds, a verification lockout is reported in preference to
/// the last error so the caller knows a retry may help.
pub fn unlock<F, H, P>(
    finder: &F,
    header: &H,
    config: &UnlockConfig,
    pin_cache: &mut PinCache,
    pins: &mut P,
) -> FidoslotResult<Unlocked>
where
    F: AuthenticatorFinder,
    H: VolumeHeader,
    P: PinSource,
{
    let records = list_tokens(header)?;
    if records.is_empty() {
        return Err(RecordError::NotEnrolled.into());
    }

    let mut blocked: Option<FidoslotError> = None;
    let mut last: Option<FidoslotError> = None;
    for (token_id, record) in records {
        debug!("Trying FIDO2 token {}", token_id);
        match unlock_with_record(finder, header, &record, config, pin_cache, pins) {
            Ok((keyslot, volume_key)) => {
                info!(
                    "Volume key recovered via key slot {} (token {}).",
                    keyslot, token_id
                );
                return Ok(Unlocked {
                    token_id,
                    keyslot,
                    volume_key,
                });
            }
            Err(err) => match err.kind() {
                ErrorKind::UserInteractionBlocked => {
                    debug!("Token {}: {}", token_id, err);
                    blocked = Some(err);
                }
                ErrorKind::HardwareUnavailable
                | ErrorKind::PolicyUnsatisfiable
                | ErrorKind::WrongPassphrase => {
                    debug!("Token {}: {}", token_id, err);
                    last = Some(err);
                }
                _ => return Err(err),
            },
        }
    }

    Err(blocked
        .or(last)
        .unwrap_or(FidoslotError::Record(RecordError::NotEnrolled)))
}
