//! Authorization requests for releasing threshold-encrypted secrets.
//!
//! A request names a one-time public key, the handles to release, the ledger
//! contracts they belong to, and a validity window. It is encoded as EIP-712
//! style typed data so the signer commits to a domain-separated digest rather
//! than to ambiguous bytes:
//!
//! ```text
//! digest = keccak256(0x19 ‖ 0x01 ‖ domainSeparator ‖ hashStruct(message))
//! message = UserDecryptRequestVerification(
//!     bytes publicKey, address[] contractAddresses,
//!     uint256 startTimestamp, uint256 durationDays)
//! ```
//!
//! Binding the window and the contract list into the signature keeps a captured
//! signature from being replayed against other contracts or after expiry; the
//! decryption service enforces both bounds.

use std::time::Duration;

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::keccak256;
use crate::error::VaultError;
use crate::types::{ContractScope, EncryptedSecretHandle, Principal};
use crate::util::to_prefixed_hex;

pub const SECONDS_PER_DAY: u64 = 86_400;

pub const DEFAULT_DOMAIN_NAME: &str = "Decryption";
pub const DEFAULT_DOMAIN_VERSION: &str = "1";

pub const PRIMARY_TYPE: &str = "UserDecryptRequestVerification";

const USER_DECRYPT_TYPE: &str = "UserDecryptRequestVerification(bytes publicKey,address[] contractAddresses,uint256 startTimestamp,uint256 durationDays)";

const EIP712_DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Signing domain of the decryption service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    pub chain_id: u64,
    pub name: String,
    pub verifying_contract: ContractScope,
    pub version: String,
}

impl Eip712Domain {
    pub fn new(chain_id: u64, verifying_contract: ContractScope) -> Self {
        Self {
            chain_id,
            name: DEFAULT_DOMAIN_NAME.to_string(),
            verifying_contract,
            version: DEFAULT_DOMAIN_VERSION.to_string(),
        }
    }

    pub fn separator(&self) -> [u8; 32] {
        let mut enc = Vec::with_capacity(32 * 5);
        enc.extend_from_slice(&keccak256(EIP712_DOMAIN_TYPE.as_bytes()));
        enc.extend_from_slice(&keccak256(self.name.as_bytes()));
        enc.extend_from_slice(&keccak256(self.version.as_bytes()));
        enc.extend_from_slice(&uint_word(self.chain_id));
        enc.extend_from_slice(&address_word(&self.verifying_contract));
        keccak256(&enc)
    }
}

/// A handle together with the contract it was encrypted for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleRef {
    #[serde(rename = "contractAddress")]
    pub contract: ContractScope,
    pub handle: EncryptedSecretHandle,
}

/// A request to release specific encrypted secrets to a one-time public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub duration_days: u32,
    pub handle_refs: Vec<HandleRef>,
    pub issued_at: u64,
    pub public_key: Vec<u8>,
    pub scopes: Vec<ContractScope>,
}

impl AuthorizationRequest {
    /// Validate inputs and construct a request.
    ///
    /// `validity` must be a positive whole number of days (the service schema counts days).
    /// Duplicate handles and scopes are collapsed. Every handle's contract must be
    /// in `scopes`, and every scope must cover at least one handle.
    pub fn build(
        public_key: &[u8],
        handle_refs: &[HandleRef],
        scopes: &[ContractScope],
        now: u64,
        validity: Duration,
    ) -> Result<Self, VaultError> {
        if public_key.is_empty() {
            return Err(VaultError::InvalidRequest("public key must not be empty".into()));
        }
        if handle_refs.is_empty() {
            return Err(VaultError::InvalidRequest("at least one handle is required".into()));
        }
        if scopes.is_empty() {
            return Err(VaultError::InvalidRequest(
                "at least one contract scope is required".into(),
            ));
        }
        let duration_days = validity_days(validity)?;

        let mut refs: Vec<HandleRef> = Vec::with_capacity(handle_refs.len());
        for r in handle_refs {
            if !r.handle.is_well_formed() {
                return Err(VaultError::InvalidRequest(format!(
                    "handle {} is not well-formed",
                    r.handle
                )));
            }
            if !refs.contains(r) {
                refs.push(*r);
            }
        }

        let mut scope_list: Vec<ContractScope> = Vec::with_capacity(scopes.len());
        for s in scopes {
            if !scope_list.contains(s) {
                scope_list.push(*s);
            }
        }

        if let Some(stray) = refs.iter().find(|r| !scope_list.contains(&r.contract)) {
            return Err(VaultError::InvalidRequest(format!(
                "handle {} belongs to contract {} outside the requested scope",
                stray.handle, stray.contract
            )));
        }
        if let Some(unused) = scope_list
            .iter()
            .find(|s| !refs.iter().any(|r| r.contract == **s))
        {
            return Err(VaultError::InvalidRequest(format!(
                "contract {} is in scope but no requested handle belongs to it",
                unused
            )));
        }

        Ok(Self {
            duration_days,
            handle_refs: refs,
            issued_at: now,
            public_key: public_key.to_vec(),
            scopes: scope_list,
        })
    }

    pub fn expires_at(&self) -> u64 {
        self.issued_at
            .saturating_add(u64::from(self.duration_days).saturating_mul(SECONDS_PER_DAY))
    }

    /// Reject when `now` is outside `[issued_at - skew, expires_at)`.
    pub fn check_window(&self, now: u64, skew: u64) -> Result<(), VaultError> {
        if self.issued_at > now.saturating_add(skew) {
            return Err(VaultError::AuthorizationRejected(format!(
                "authorization is not valid before {}",
                self.issued_at
            )));
        }
        if now >= self.expires_at() {
            return Err(VaultError::AuthorizationRejected(format!(
                "authorization expired at {}",
                self.expires_at()
            )));
        }
        Ok(())
    }

    pub fn handles(&self) -> impl Iterator<Item = &EncryptedSecretHandle> {
        self.handle_refs.iter().map(|r| &r.handle)
    }

    pub fn typed_data(&self, domain: &Eip712Domain) -> TypedData {
        TypedData {
            domain: domain.clone(),
            message: UserDecryptMessage {
                contract_addresses: self.scopes.clone(),
                duration_days: self.duration_days.to_string(),
                public_key: to_prefixed_hex(&self.public_key),
                start_timestamp: self.issued_at.to_string(),
            },
            primary_type: PRIMARY_TYPE.to_string(),
        }
    }

    /// The 32-byte digest a credential signs.
    pub fn signing_digest(&self, domain: &Eip712Domain) -> [u8; 32] {
        let mut enc = Vec::with_capacity(32 * 5);
        enc.extend_from_slice(&keccak256(USER_DECRYPT_TYPE.as_bytes()));
        enc.extend_from_slice(&keccak256(&self.public_key));
        let mut addresses = Vec::with_capacity(32 * self.scopes.len());
        for scope in &self.scopes {
            addresses.extend_from_slice(&address_word(scope));
        }
        enc.extend_from_slice(&keccak256(&addresses));
        enc.extend_from_slice(&uint_word(self.issued_at));
        enc.extend_from_slice(&uint_word(u64::from(self.duration_days)));
        let struct_hash = keccak256(&enc);

        let mut outer = Vec::with_capacity(2 + 64);
        outer.extend_from_slice(&[0x19, 0x01]);
        outer.extend_from_slice(&domain.separator());
        outer.extend_from_slice(&struct_hash);
        keccak256(&outer)
    }
}

fn validity_days(validity: Duration) -> Result<u32, VaultError> {
    if validity.is_zero() {
        return Err(VaultError::InvalidRequest("validity must be positive".into()));
    }
    if validity.subsec_nanos() != 0 || validity.as_secs() % SECONDS_PER_DAY != 0 {
        return Err(VaultError::InvalidRequest(
            "validity must be a whole number of days".into(),
        ));
    }
    u32::try_from(validity.as_secs() / SECONDS_PER_DAY)
        .map_err(|_| VaultError::InvalidRequest("validity is too long".into()))
}

fn uint_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &ContractScope) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// Human-inspectable rendering of what a signer is asked to authorize.
///
/// Keys are declared in alphabetical order so `canonical_json` is deterministic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    pub domain: Eip712Domain,
    pub message: UserDecryptMessage,
    pub primary_type: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserDecryptMessage {
    pub contract_addresses: Vec<ContractScope>,
    pub duration_days: String,
    pub public_key: String,
    pub start_timestamp: String,
}

/// Compact JSON with alphabetically ordered keys.
///
/// Do NOT enable serde_json's `preserve_order` feature; ordering comes from
/// declaration order.
pub fn canonical_json(typed: &TypedData) -> Result<String, VaultError> {
    serde_json::to_string(typed).map_err(|e| VaultError::InvalidRequest(e.to_string()))
}

// ── Credentials ─────────────────────────────────────────────────────────────

/// Signing capability of the owning principal.
pub trait Credential: Send + Sync {
    fn principal(&self) -> Principal;

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>, VaultError>;
}

/// Ed25519 credential held in process memory.
#[derive(Debug)]
pub struct LocalCredential {
    signing_key: SigningKey,
}

impl LocalCredential {
    pub fn generate() -> Result<Self, VaultError> {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng
            .try_fill_bytes(seed.as_mut())
            .map_err(|e| VaultError::EntropyUnavailable(e.to_string()))?;
        Ok(Self::from_seed(&seed))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl Credential for LocalCredential {
    fn principal(&self) -> Principal {
        Principal::from_verifying_key(&self.signing_key.verifying_key())
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>, VaultError> {
        Ok(self.signing_key.sign(digest).to_bytes().to_vec())
    }
}

/// Sign `request` for `domain` with `credential`.
pub fn sign_request(
    request: &AuthorizationRequest,
    domain: &Eip712Domain,
    credential: &dyn Credential,
) -> Result<Vec<u8>, VaultError> {
    credential.sign_digest(&request.signing_digest(domain))
}

/// Verify a signature over `request` by `principal`. For decryption-service implementations.
pub fn verify_authorization(
    request: &AuthorizationRequest,
    domain: &Eip712Domain,
    principal: &Principal,
    signature: &[u8],
) -> Result<(), VaultError> {
    let sig_array: [u8; 64] = signature.try_into().map_err(|_| {
        VaultError::SignatureVerificationFailed("signature must be exactly 64 bytes".into())
    })?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig_array);
    principal
        .verifying_key()?
        .verify_strict(&request.signing_digest(domain), &sig)
        .map_err(|e| VaultError::SignatureVerificationFailed(e.to_string()))
}
