use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Index of a keyslot in the volume header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyslotId(u32);

impl KeyslotId {
    /// LUKS2 keyslot limit
    pub const MAX_SLOTS: usize = 32;

    pub fn new(index: u32) -> Result<Self, KeyslotIdError> {
        if index as usize >= Self::MAX_SLOTS {
            return Err(KeyslotIdError::OutOfRange {
                index: index.to_string(),
                max: Self::MAX_SLOTS,
            });
        }
        Ok(Self(index))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for KeyslotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keyslots are persisted as plain decimal strings ("0", "7")
impl FromStr for KeyslotId {
    type Err = KeyslotIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(KeyslotIdError::NotDecimal {
                value: s.to_string(),
            });
        }
        let index: u32 = s.parse().map_err(|_| KeyslotIdError::OutOfRange {
            index: s.to_string(),
            max: Self::MAX_SLOTS,
        })?;
        Self::new(index)
    }
}

/// Index of a token in the volume header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub usize);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyslotIdError {
    #[error("keyslot reference is not a decimal number: {value:?}")]
    NotDecimal { value: String },

    #[error("keyslot {index} out of range (maximum {max} slots)")]
    OutOfRange { index: String, max: usize },
}
