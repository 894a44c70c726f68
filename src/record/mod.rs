//! Record module: the envelope persisted on the ledger for each stored locator.
//!
//! Name and creation time are public metadata. The locator itself only appears
//! as keystream ciphertext, and the secret that unlocks it only as an opaque
//! threshold-encrypted handle.

use serde::{Deserialize, Serialize};

use crate::auth::HandleRef;
use crate::error::VaultError;
use crate::locator::LocatorCiphertext;
use crate::types::{ContractScope, EncryptedSecretHandle};

/// One ledger entry. Immutable once appended.
///
/// Fields are in alphabetical order so the JSON rendering is deterministic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordEnvelope {
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: u64,
    /// Threshold-encrypted handle for the secret identity.
    pub encrypted_secret_handle: EncryptedSecretHandle,
    /// Locator bytes XOR keystream.
    pub locator_ciphertext: LocatorCiphertext,
    /// Display name; public.
    pub name: String,
    /// Position in the owner's append-only record list.
    pub owner_index: u64,
}

impl RecordEnvelope {
    /// Check the invariants `assemble` enforces. Used on envelopes read back from storage too.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.name.trim().is_empty() {
            return Err(VaultError::InvalidEnvelope("name must not be empty".into()));
        }
        if self.locator_ciphertext.is_empty() {
            return Err(VaultError::InvalidEnvelope(
                "locator ciphertext must not be empty".into(),
            ));
        }
        if !self.encrypted_secret_handle.is_well_formed() {
            return Err(VaultError::InvalidEnvelope(format!(
                "encrypted secret handle {} is not well-formed",
                self.encrypted_secret_handle
            )));
        }
        Ok(())
    }

    /// The handle paired with the contract it was encrypted for.
    pub fn handle_ref(&self, contract: ContractScope) -> HandleRef {
        HandleRef {
            contract,
            handle: self.encrypted_secret_handle,
        }
    }
}

/// Build and validate an envelope. Pure; the ledger does the persisting.
pub fn assemble(
    name: &str,
    locator_ciphertext: LocatorCiphertext,
    encrypted_secret_handle: EncryptedSecretHandle,
    created_at: u64,
    owner_index: u64,
) -> Result<RecordEnvelope, VaultError> {
    let envelope = RecordEnvelope {
        created_at,
        encrypted_secret_handle,
        locator_ciphertext,
        name: name.to_string(),
        owner_index,
    };
    envelope.validate()?;
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> EncryptedSecretHandle {
        EncryptedSecretHandle::from_bytes([7u8; 32])
    }

    fn ciphertext() -> LocatorCiphertext {
        LocatorCiphertext::from_bytes(vec![1, 2, 3])
    }

    #[test]
    fn test_assemble_valid_envelope() {
        let envelope = assemble("memory.jpg", ciphertext(), handle(), 1_700_000_000, 0)
            .expect("valid inputs should assemble");
        assert_eq!(envelope.name, "memory.jpg");
        assert_eq!(envelope.owner_index, 0);
        assert_eq!(envelope.created_at, 1_700_000_000);
    }

    #[test]
    fn test_assemble_rejects_empty_name() {
        for name in ["", "   "] {
            let result = assemble(name, ciphertext(), handle(), 0, 0);
            assert!(
                matches!(result, Err(VaultError::InvalidEnvelope(_))),
                "blank name {:?} must be rejected",
                name
            );
        }
    }

    #[test]
    fn test_assemble_rejects_empty_ciphertext() {
        let result = assemble("a", LocatorCiphertext::from_bytes(vec![]), handle(), 0, 0);
        assert!(matches!(result, Err(VaultError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_assemble_rejects_zero_handle() {
        let zero = EncryptedSecretHandle::from_bytes([0u8; 32]);
        let result = assemble("a", ciphertext(), zero, 0, 0);
        assert!(matches!(result, Err(VaultError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_envelope_json_keys_are_alphabetical_camel_case() {
        let envelope = assemble("memory.jpg", ciphertext(), handle(), 1, 2).expect("assemble");
        let json = serde_json::to_string(&envelope).expect("serialize");

        let created = json.find("\"createdAt\"").expect("createdAt missing");
        let handle_pos = json.find("\"encryptedSecretHandle\"").expect("handle missing");
        let cipher = json.find("\"locatorCiphertext\"").expect("ciphertext missing");
        let name = json.find("\"name\"").expect("name missing");
        let index = json.find("\"ownerIndex\"").expect("ownerIndex missing");
        assert!(created < handle_pos && handle_pos < cipher && cipher < name && name < index);
        assert!(json.contains("\"locatorCiphertext\":\"0x010203\""));
    }

    #[test]
    fn test_handle_ref_pairs_handle_with_contract() {
        let envelope = assemble("a", ciphertext(), handle(), 0, 0).expect("assemble");
        let scope = ContractScope::from_bytes([9u8; 20]);
        let r = envelope.handle_ref(scope);
        assert_eq!(r.contract, scope);
        assert_eq!(r.handle, handle());
    }
}
