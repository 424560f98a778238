use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Relying party the credentials are scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
}

impl RelyingParty {
    /// Relying party id written into every token record
    pub const CRYPTSETUP_ID: &'static str = "io.systemd.cryptsetup";

    pub const CRYPTSETUP_NAME: &'static str = "Encrypted Volume";

    pub fn cryptsetup() -> Self {
        Self {
            id: Self::CRYPTSETUP_ID.to_string(),
            name: Self::CRYPTSETUP_NAME.to_string(),
        }
    }
}

impl Default for RelyingParty {
    fn default() -> Self {
        Self::cryptsetup()
    }
}

/// User entity of the created credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

impl UserIdentity {
    /// The volume UUID doubles as user id and user name; the device name is
    /// shown to the user.
    pub fn for_volume(uuid: Option<&str>, device_name: &str) -> Self {
        let uuid = uuid.unwrap_or_default();
        Self {
            id: uuid.as_bytes().to_vec(),
            name: uuid.to_string(),
            display_name: device_name.to_string(),
        }
    }
}

/// Which authenticator to talk to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthenticatorSelector {
    /// First device found
    #[default]
    Auto,
    /// Device with this path or name
    Named(String),
}

impl AuthenticatorSelector {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            AuthenticatorSelector::Auto => true,
            AuthenticatorSelector::Named(wanted) => wanted == name,
        }
    }
}

impl FromStr for AuthenticatorSelector {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "" | "auto" => AuthenticatorSelector::Auto,
            other => AuthenticatorSelector::Named(other.to_string()),
        })
    }
}

impl fmt::Display for AuthenticatorSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthenticatorSelector::Auto => f.write_str("auto"),
            AuthenticatorSelector::Named(name) => f.write_str(name),
        }
    }
}
