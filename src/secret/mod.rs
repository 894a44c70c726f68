//! Ephemeral secret generation.
//!
//! Every stored locator gets its own 20-byte, address-shaped secret drawn from
//! the operating system's CSPRNG. The secret is the only key material for the
//! locator's keystream, so it must never repeat and never be persisted in the clear.

use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

use crate::error::VaultError;
use crate::util::decode_hex_array;

/// Byte length of a secret identity (an account address).
pub const SECRET_IDENTITY_LEN: usize = 20;

/// Single-use key material shaped like an account address.
///
/// Zeroized on drop. `Debug` is redacted; use [`SecretIdentity::to_canonical_string`]
/// when the textual form is actually needed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretIdentity([u8; SECRET_IDENTITY_LEN]);

impl SecretIdentity {
    pub fn from_bytes(bytes: [u8; SECRET_IDENTITY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_IDENTITY_LEN] {
        &self.0
    }

    /// `0x` followed by 40 lowercase hex digits. This exact string is the keystream input.
    pub fn to_canonical_string(&self) -> Zeroizing<String> {
        let mut out = String::with_capacity(2 + SECRET_IDENTITY_LEN * 2);
        out.push_str("0x");
        out.push_str(&hex::encode(self.0));
        Zeroizing::new(out)
    }
}

impl Drop for SecretIdentity {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SecretIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretIdentity(<redacted>)")
    }
}

impl FromStr for SecretIdentity {
    type Err = VaultError;

    /// Accepts `0x`-prefixed or bare hex in any case, so checksummed addresses parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex_array::<SECRET_IDENTITY_LEN>(s).map_err(|reason| {
            VaultError::InvalidHex {
                kind: "secret identity",
                reason,
            }
        })?;
        Ok(Self(bytes))
    }
}

/// Draw a fresh secret from the OS entropy source.
///
/// Fails with `EntropyUnavailable` rather than falling back to anything weaker.
pub fn generate() -> Result<SecretIdentity, VaultError> {
    generate_from(&mut OsRng)
}

/// Draw a fresh secret from the supplied CSPRNG.
pub fn generate_from<R: RngCore + CryptoRng>(rng: &mut R) -> Result<SecretIdentity, VaultError> {
    let mut bytes = [0u8; SECRET_IDENTITY_LEN];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| VaultError::EntropyUnavailable(e.to_string()))?;
    let secret = SecretIdentity(bytes);
    bytes.zeroize();
    Ok(secret)
}
