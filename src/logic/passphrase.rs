use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{FidoslotResult, KeyslotError};
use crate::model::{DerivedSecret, Passphrase};

/// Length of the passphrase produced for a secret of `secret_len` bytes
/// (padded standard base64).
pub fn passphrase_len(secret_len: usize) -> usize {
    secret_len.div_ceil(3) * 4
}

/// Encode an hmac-secret as the keyslot passphrase.
///
/// Standard alphabet with padding, no line breaks. Existing keyslots only
/// open with exactly this encoding.
pub fn encode_passphrase(secret: &DerivedSecret) -> FidoslotResult<Passphrase> {
    let mut buf = Zeroizing::new(vec![0u8; passphrase_len(secret.len())]);
    let written = STANDARD
        .encode_slice(secret.as_bytes(), buf.as_mut_slice())
        .map_err(|e| KeyslotError::Encoding {
            reason: e.to_string(),
        })?;
    buf.truncate(written);

    let text = String::from_utf8(std::mem::take(&mut *buf)).map_err(|e| {
        e.into_bytes().zeroize();
        KeyslotError::Encoding {
            reason: "base64 output is not ASCII".to_string(),
        }
    })?;

    debug!("Encoded {} byte secret as passphrase", secret.len());
    Ok(Passphrase::new(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        let secret = DerivedSecret::new(b"hmac-secret".to_vec());
        let passphrase = encode_passphrase(&secret).unwrap();
        assert_eq!(passphrase.as_str(), "aG1hYy1zZWNyZXQ=");
    }

    #[test]
    fn test_stable_across_calls() {
        let secret = DerivedSecret::new((0u8..32).collect());
        let first = encode_passphrase(&secret).unwrap();
        let second = encode_passphrase(&secret).unwrap();
        assert_eq!(first.as_str(), second.as_str());
    }

    #[test]
    fn test_length_class() {
        for len in [1usize, 2, 3, 31, 32, 33, 64] {
            let secret = DerivedSecret::new(vec![0xff; len]);
            let passphrase = encode_passphrase(&secret).unwrap();
            assert_eq!(passphrase.len(), passphrase_len(len), "len {len}");
            assert_eq!(passphrase.len() % 4, 0);
            let decoded = STANDARD.decode(passphrase.as_str()).unwrap();
            assert_eq!(decoded.len(), len);
        }
        assert_eq!(passphrase_len(32), 44);
    }

    #[test]
    fn test_text_safe() {
        let secret = DerivedSecret::new((0u8..=255).collect());
        let passphrase = encode_passphrase(&secret).unwrap();
        assert!(passphrase
            .as_str()
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='));
    }
}
