//! Convenience entry points over the file-backed adapters
//!
//! The volume header is a JSON [`HeaderFile`] and the authenticator is a
//! [`SoftAuthenticator`] loaded from its state file. Library users with
//! their own keyslot storage or FIDO2 stack call the generic use cases
//! directly.

use std::path::Path;

use crate::adapters::{HeaderFile, MemoryHeader, SoftAuthenticator, SoftAuthenticatorFinder};
use crate::error::FidoslotResult;
use crate::ports::PinSource;
use crate::use_cases::{
    enroll as enroll_use_case, list_tokens as list_tokens_use_case, unlock as unlock_use_case,
    EnrollConfig, Enrollment, UnlockConfig, Unlocked,
};

pub use crate::model::*;
pub use crate::use_cases::{EnrollState, UnlockState};

/// Create an empty header file. A random UUID is used if none is given.
pub fn init_header(path: &Path, uuid: Option<&str>, device_name: &str) -> FidoslotResult<HeaderFile> {
    let header = match uuid {
        Some(uuid) => MemoryHeader::new(Some(uuid), device_name),
        None => MemoryHeader::format(device_name),
    };
    HeaderFile::create(path, header)
}

/// Create and save a software authenticator
pub fn init_authenticator(
    path: &Path,
    name: &str,
    pin: Option<Pin>,
    user_verification: bool,
) -> FidoslotResult<SoftAuthenticator> {
    let mut device = SoftAuthenticator::new(name);
    if let Some(pin) = pin {
        device = device.with_pin(pin);
    }
    if user_verification {
        device = device.with_user_verification();
    }
    device.save(path)?;
    Ok(device)
}

fn finder(authenticator: &Path) -> FidoslotResult<SoftAuthenticatorFinder> {
    Ok(SoftAuthenticatorFinder::new(SoftAuthenticator::load(
        authenticator,
    )?))
}

pub fn enroll_volume(
    header: &Path,
    authenticator: &Path,
    volume_key: &VolumeKey,
    config: &EnrollConfig,
    pins: &mut impl PinSource,
) -> FidoslotResult<Enrollment> {
    let finder = finder(authenticator)?;
    let mut header = HeaderFile::open(header)?;
    enroll_use_case(&finder, &mut header, volume_key, config, pins)
}

pub fn unlock_volume(
    header: &Path,
    authenticator: &Path,
    config: &UnlockConfig,
    pins: &mut impl PinSource,
) -> FidoslotResult<Unlocked> {
    let finder = finder(authenticator)?;
    let header = HeaderFile::open(header)?;
    unlock_use_case(&finder, &header, config, &mut PinCache::new(), pins)
}

pub fn list_volume_tokens(header: &Path) -> FidoslotResult<Vec<(TokenId, TokenRecord)>> {
    list_tokens_use_case(&HeaderFile::open(header)?)
}
