use std::fmt;

use thiserror::Error;

/// One requirement an authenticator enforces before releasing the hmac-secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyFlag {
    /// clientPin must be entered
    ClientPin,
    /// Physical touch
    UserPresence,
    /// Built-in user verification (biometric or on-device PIN)
    UserVerification,
}

impl PolicyFlag {
    pub const ALL: [PolicyFlag; 3] = [
        PolicyFlag::ClientPin,
        PolicyFlag::UserPresence,
        PolicyFlag::UserVerification,
    ];

    fn bit(self) -> u8 {
        match self {
            PolicyFlag::ClientPin => 1 << 0,
            PolicyFlag::UserPresence => 1 << 1,
            PolicyFlag::UserVerification => 1 << 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyFlag::ClientPin => "pin",
            PolicyFlag::UserPresence => "up",
            PolicyFlag::UserVerification => "uv",
        }
    }
}

impl fmt::Display for PolicyFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of [`PolicyFlag`]s an enrollment is locked with.
///
/// Built only from flags, never from raw integers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EnrollmentPolicy {
    set: u8,
}

impl EnrollmentPolicy {
    pub const fn empty() -> Self {
        Self { set: 0 }
    }

    /// PIN and presence, the usual lock for a removable token
    pub fn recommended() -> Self {
        Self::from_flags([PolicyFlag::ClientPin, PolicyFlag::UserPresence])
    }

    pub fn from_flags(flags: impl IntoIterator<Item = PolicyFlag>) -> Self {
        flags
            .into_iter()
            .fold(Self::empty(), |policy, flag| policy.with(flag))
    }

    /// Build from the three persisted booleans
    pub fn from_requirements(pin: bool, user_presence: bool, user_verification: bool) -> Self {
        let mut policy = Self::empty();
        policy.set_flag(PolicyFlag::ClientPin, pin);
        policy.set_flag(PolicyFlag::UserPresence, user_presence);
        policy.set_flag(PolicyFlag::UserVerification, user_verification);
        policy
    }

    pub fn with(mut self, flag: PolicyFlag) -> Self {
        self.insert(flag);
        self
    }

    pub fn insert(&mut self, flag: PolicyFlag) {
        self.set |= flag.bit();
    }

    pub fn set_flag(&mut self, flag: PolicyFlag, enabled: bool) {
        if enabled {
            self.set |= flag.bit();
        } else {
            self.set &= !flag.bit();
        }
    }

    pub fn contains(&self, flag: PolicyFlag) -> bool {
        self.set & flag.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.set == 0
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            set: self.set | other.set,
        }
    }

    pub fn is_superset_of(&self, other: &Self) -> bool {
        self.set & other.set == other.set
    }

    pub fn iter(&self) -> impl Iterator<Item = PolicyFlag> + '_ {
        PolicyFlag::ALL
            .into_iter()
            .filter(move |flag| self.contains(*flag))
    }

    /// Flags present here but absent from `other`
    pub fn difference(&self, other: &Self) -> Self {
        Self {
            set: self.set & !other.set,
        }
    }

    pub fn requires_pin(&self) -> bool {
        self.contains(PolicyFlag::ClientPin)
    }

    pub fn requires_user_presence(&self) -> bool {
        self.contains(PolicyFlag::UserPresence)
    }

    pub fn requires_user_verification(&self) -> bool {
        self.contains(PolicyFlag::UserVerification)
    }

    /// Check that what the authenticator enforced never drops a requested flag.
    ///
    /// Returns the effective policy on success so call sites can chain it.
    pub fn validate_effective(self, effective: Self) -> Result<Self, PolicyError> {
        match self.difference(&effective).iter().next() {
            Some(flag) => Err(PolicyError::Downgrade { flag }),
            None => Ok(effective),
        }
    }
}

impl fmt::Debug for EnrollmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for EnrollmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(PolicyFlag::as_str).collect();
        f.write_str(&names.join("+"))
    }
}

impl FromIterator<PolicyFlag> for EnrollmentPolicy {
    fn from_iter<I: IntoIterator<Item = PolicyFlag>>(iter: I) -> Self {
        Self::from_flags(iter)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("authenticator dropped the requested {flag} requirement")]
    Downgrade { flag: PolicyFlag },
}
