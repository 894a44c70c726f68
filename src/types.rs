//! Fixed-width identifiers that cross the ledger boundary.
//!
//! All of them render as `0x`-prefixed lowercase hex and serialize as that
//! string, so ledger documents and relayer payloads stay human-readable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::VaultError;
use crate::util::{decode_hex_array, to_prefixed_hex};

macro_rules! hex_identifier {
    ($(#[$meta:meta])* $name:ident, $len:expr, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&to_prefixed_hex(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = VaultError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_hex_array::<$len>(s)
                    .map(Self)
                    .map_err(|reason| VaultError::InvalidHex { kind: $kind, reason })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_identifier!(
    /// Opaque ledger reference (`bytes32`) standing in for a threshold-encrypted secret.
    EncryptedSecretHandle,
    32,
    "encrypted secret handle"
);

hex_identifier!(
    /// Address of the ledger contract a handle was produced for.
    ContractScope,
    20,
    "contract address"
);

hex_identifier!(
    /// An owning party, identified by its Ed25519 verifying key.
    Principal,
    32,
    "principal"
);

impl EncryptedSecretHandle {
    /// The all-zero handle is the ledger's uninitialized value and never refers to a secret.
    pub fn is_well_formed(&self) -> bool {
        self.0.iter().any(|b| *b != 0)
    }
}

impl Principal {
    pub fn from_verifying_key(key: &ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    pub fn verifying_key(&self) -> Result<ed25519_dalek::VerifyingKey, VaultError> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| VaultError::SignatureVerificationFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_scope_parses_checksummed_address() {
        let scope: ContractScope = "0x1888Fb8F76b2be017BfE63256dF35eB3F038d7ce"
            .parse()
            .expect("checksummed address should parse");
        assert_eq!(
            scope.to_string(),
            "0x1888fb8f76b2be017bfe63256df35eb3f038d7ce",
            "display must be lowercase"
        );
    }

    #[test]
    fn test_handle_rejects_short_hex() {
        let result = "0x1234".parse::<EncryptedSecretHandle>();
        let err = result.expect_err("two bytes is not a handle");
        assert!(
            err.to_string().contains("encrypted secret handle"),
            "error should name the identifier kind, got: {}",
            err
        );
    }

    #[test]
    fn test_zero_handle_is_not_well_formed() {
        assert!(!EncryptedSecretHandle::from_bytes([0u8; 32]).is_well_formed());
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        assert!(EncryptedSecretHandle::from_bytes(bytes).is_well_formed());
    }

    #[test]
    fn test_identifiers_serialize_as_hex_strings() {
        let handle = EncryptedSecretHandle::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&handle).expect("handle should serialize");
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(32)));

        let back: EncryptedSecretHandle =
            serde_json::from_str(&json).expect("handle should deserialize");
        assert_eq!(back, handle);
    }

    #[test]
    fn test_principal_round_trips_through_verifying_key() {
        let signing = ed25519_dalek::SigningKey::from_bytes(&[42u8; 32]);
        let principal = Principal::from_verifying_key(&signing.verifying_key());
        let key = principal.verifying_key().expect("valid key bytes");
        assert_eq!(key, signing.verifying_key());
    }
}
