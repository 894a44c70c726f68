//! Locator obfuscation: plaintext locator ↔ (ciphertext, single-use secret).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::{apply_keystream, derive_keystream};
use crate::error::VaultError;
use crate::secret::{self, SecretIdentity};
use crate::util::{decode_hex_vec, to_prefixed_hex};

/// Locator bytes XOR keystream. Same length as the locator's UTF-8 encoding.
///
/// Serialized as `0x`-prefixed lowercase hex, the ledger's `bytes` rendering.
#[derive(Clone, PartialEq, Eq)]
pub struct LocatorCiphertext(Vec<u8>);

impl LocatorCiphertext {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        to_prefixed_hex(&self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, VaultError> {
        decode_hex_vec(value)
            .map(Self)
            .map_err(|reason| VaultError::InvalidHex {
                kind: "locator ciphertext",
                reason,
            })
    }
}

impl fmt::Debug for LocatorCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocatorCiphertext({})", self.to_hex())
    }
}

impl Serialize for LocatorCiphertext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for LocatorCiphertext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// Obfuscate `locator` under a freshly generated secret.
pub fn obfuscate(locator: &str) -> Result<(LocatorCiphertext, SecretIdentity), VaultError> {
    let secret = secret::generate()?;
    let ciphertext = obfuscate_with(locator, &secret)?;
    Ok((ciphertext, secret))
}

/// Obfuscate `locator` under a caller-supplied secret.
///
/// The caller is responsible for never reusing `secret` for another record.
pub fn obfuscate_with(
    locator: &str,
    secret: &SecretIdentity,
) -> Result<LocatorCiphertext, VaultError> {
    let key = derive_keystream(secret);
    let masked = apply_keystream(locator.as_bytes(), key.as_slice())?;
    tracing::debug!(len = masked.len(), "locator obfuscated");
    Ok(LocatorCiphertext(masked))
}

/// Reverse the obfuscation and decode as UTF-8.
///
/// Invalid UTF-8 means the secret doesn't belong to this ciphertext or the
/// ciphertext was altered; that is `MalformedLocator`, never lossy output.
pub fn reveal(ciphertext: &LocatorCiphertext, secret: &SecretIdentity) -> Result<String, VaultError> {
    let key = derive_keystream(secret);
    let plain = apply_keystream(&ciphertext.0, key.as_slice())?;
    String::from_utf8(plain).map_err(|_| VaultError::MalformedLocator)
}
