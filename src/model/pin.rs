use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// FIDO2 clientPin, erased on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Pin(Vec<u8>);

impl Pin {
    /// CTAP2 minimum PIN length in bytes
    pub const MIN_LENGTH: usize = 4;

    /// CTAP2 maximum PIN length in bytes
    pub const MAX_LENGTH: usize = 63;

    pub fn new(mut pin: Vec<u8>) -> Result<Self, PinError> {
        let err = if pin.len() < Self::MIN_LENGTH {
            Some(PinError::TooShort)
        } else if pin.len() > Self::MAX_LENGTH {
            Some(PinError::TooLong)
        } else {
            None
        };
        match err {
            Some(err) => {
                pin.zeroize();
                Err(err)
            }
            None => Ok(Self(pin)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Pin {
    type Err = PinError;

    fn from_str(pin: &str) -> Result<Self, Self::Err> {
        Self::new(pin.as_bytes().to_vec())
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pin([REDACTED])")
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinError {
    #[error("PIN must be at least {min} bytes", min = Pin::MIN_LENGTH)]
    TooShort,

    #[error("PIN must be at most {max} bytes", max = Pin::MAX_LENGTH)]
    TooLong,
}

/// Whether a PIN entered earlier in this process may be reused, and whether
/// a freshly entered one is remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinCachePolicy {
    /// Always ask, never remember
    NoCache,
    /// Reuse a cached PIN, do not remember new ones
    AcceptCached,
    /// Ask every time, remember what was entered
    PushCache,
    /// Reuse a cached PIN and remember new ones
    #[default]
    AcceptAndPush,
}

impl PinCachePolicy {
    pub fn accepts_cached(self) -> bool {
        matches!(self, PinCachePolicy::AcceptCached | PinCachePolicy::AcceptAndPush)
    }

    pub fn pushes(self) -> bool {
        matches!(self, PinCachePolicy::PushCache | PinCachePolicy::AcceptAndPush)
    }
}

/// PIN remembered for the lifetime of the owning process.
///
/// Owned by the caller and passed to each unlock explicitly.
#[derive(Default)]
pub struct PinCache {
    cached: Option<Pin>,
}

impl PinCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached PIN if the policy allows reusing it
    pub fn lookup(&self, policy: PinCachePolicy) -> Option<&Pin> {
        if policy.accepts_cached() {
            self.cached.as_ref()
        } else {
            None
        }
    }

    /// Remember `pin` if the policy allows it
    pub fn store(&mut self, pin: &Pin, policy: PinCachePolicy) {
        if policy.pushes() {
            self.cached = Some(pin.clone());
        }
    }

    pub fn forget(&mut self) {
        self.cached = None;
    }

    pub fn is_empty(&self) -> bool {
        self.cached.is_none()
    }
}

impl fmt::Debug for PinCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinCache")
            .field("cached", &self.cached.is_some())
            .finish()
    }
}
