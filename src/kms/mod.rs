//! KMS module: threshold encryption of secret identities and a local decryption service.
//!
//! `ThresholdEncryptor` is the write side of the threshold layer: it turns a
//! secret identity into an opaque handle that only the network can decrypt.
//! `LocalKms` implements it together with `DecryptionService`, holding a single
//! network age key in place of a threshold committee. It is the stand-in used
//! for local vaults and tests; a remote vault talks to `HttpRelayer` instead.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::auth::{verify_authorization, AuthorizationRequest, Eip712Domain};
use crate::crypto::{
    age_decrypt, age_encrypt, age_identity_from_seed, keccak256, recipient_from_public_key,
};
use crate::error::VaultError;
use crate::relayer::{DecryptionService, SealedSecret};
use crate::secret::SecretIdentity;
use crate::types::{ContractScope, EncryptedSecretHandle, Principal};
use crate::util::{decode_hex_array, unix_now, write_atomic, StateLock};

/// How far in the future a request's start time may be before it is rejected.
pub const CLOCK_SKEW_SECS: u64 = 300;

/// Encrypts a secret identity under the threshold network's key.
pub trait ThresholdEncryptor: Send + Sync {
    /// Seal `secret` for records written by `writer` to the ledger at `scope`.
    /// `writer` is granted decryption rights on the returned handle.
    fn encrypt_for_ledger(
        &self,
        secret: &SecretIdentity,
        writer: &Principal,
        scope: &ContractScope,
    ) -> Result<EncryptedSecretHandle, VaultError>;
}

impl<T: ThresholdEncryptor + ?Sized> ThresholdEncryptor for &T {
    fn encrypt_for_ledger(
        &self,
        secret: &SecretIdentity,
        writer: &Principal,
        scope: &ContractScope,
    ) -> Result<EncryptedSecretHandle, VaultError> {
        (**self).encrypt_for_ledger(secret, writer, scope)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct HandleEntry {
    acl: BTreeSet<Principal>,
    scope: ContractScope,
    /// age ciphertext to the network key, base64.
    sealed: String,
}

/// On-disk form of `LocalKms` (kms.json).
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KmsFile {
    handles: BTreeMap<EncryptedSecretHandle, HandleEntry>,
    network_seed: String,
}

pub struct LocalKms {
    network_seed: Zeroizing<[u8; 32]>,
    network: age::x25519::Identity,
    domain: Eip712Domain,
    handles: RwLock<BTreeMap<EncryptedSecretHandle, HandleEntry>>,
    path: Option<PathBuf>,
    clock: fn() -> u64,
}

impl LocalKms {
    /// In-memory KMS with a fresh network key.
    pub fn new(domain: Eip712Domain) -> Result<Self, VaultError> {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng
            .try_fill_bytes(seed.as_mut())
            .map_err(|e| VaultError::EntropyUnavailable(e.to_string()))?;
        Self::from_parts(seed, domain, BTreeMap::new(), None)
    }

    /// Load the KMS state at `path`, creating it on first use.
    pub fn open(path: &Path, domain: Eip712Domain) -> Result<Self, VaultError> {
        let _lock = StateLock::exclusive(path)?;
        if !path.exists() {
            let mut kms = Self::new(domain)?;
            kms.path = Some(path.to_path_buf());
            kms.persist(&BTreeMap::new())?;
            tracing::info!(path = %path.display(), "created local KMS state");
            return Ok(kms);
        }
        let file = read_state(path)?;
        let seed = decode_seed(&file.network_seed)?;
        tracing::debug!(path = %path.display(), handles = file.handles.len(), "loaded local KMS state");
        Self::from_parts(seed, domain, file.handles, Some(path.to_path_buf()))
    }

    fn from_parts(
        network_seed: Zeroizing<[u8; 32]>,
        domain: Eip712Domain,
        handles: BTreeMap<EncryptedSecretHandle, HandleEntry>,
        path: Option<PathBuf>,
    ) -> Result<Self, VaultError> {
        let network = age_identity_from_seed(&network_seed)?;
        Ok(Self {
            network_seed,
            network,
            domain,
            handles: RwLock::new(handles),
            path,
            clock: unix_now,
        })
    }

    /// Replace the clock used for validity checks.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Grant `principal` decryption rights on `handle`.
    pub fn allow(&self, handle: &EncryptedSecretHandle, principal: &Principal) -> Result<(), VaultError> {
        self.update(|handles| {
            let entry = handles.get_mut(handle).ok_or(VaultError::HandleNotFound(*handle))?;
            entry.acl.insert(*principal);
            Ok(())
        })
    }

    pub fn is_allowed(&self, handle: &EncryptedSecretHandle, principal: &Principal) -> Result<bool, VaultError> {
        Ok(self
            .snapshot()?
            .get(handle)
            .map(|entry| entry.acl.contains(principal))
            .unwrap_or(false))
    }

    pub fn handle_count(&self) -> Result<usize, VaultError> {
        Ok(self.snapshot()?.len())
    }

    /// Apply `change` to the current handle map and persist the result.
    ///
    /// A file-backed KMS re-reads kms.json under the exclusive state lock first,
    /// so writers in other processes are merged with, not overwritten. The
    /// in-memory map only takes the new state once it is on disk.
    fn update<F>(&self, change: F) -> Result<(), VaultError>
    where
        F: FnOnce(&mut BTreeMap<EncryptedSecretHandle, HandleEntry>) -> Result<(), VaultError>,
    {
        let _lock = self.path.as_deref().map(StateLock::exclusive).transpose()?;
        let mut current = self.write_lock()?;
        let mut next = match &self.path {
            Some(path) => self.load_handles(path)?,
            None => current.clone(),
        };
        change(&mut next)?;
        self.persist(&next)?;
        *current = next;
        Ok(())
    }

    /// The handle map as it stands now, re-read under the shared lock when file-backed.
    fn snapshot(&self) -> Result<BTreeMap<EncryptedSecretHandle, HandleEntry>, VaultError> {
        let Some(path) = &self.path else {
            return Ok(self.read_lock()?.clone());
        };
        let _lock = StateLock::shared(path)?;
        let handles = self.load_handles(path)?;
        *self.write_lock()? = handles.clone();
        Ok(handles)
    }

    fn load_handles(&self, path: &Path) -> Result<BTreeMap<EncryptedSecretHandle, HandleEntry>, VaultError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let file = read_state(path)?;
        let seed = decode_seed(&file.network_seed)?;
        if *seed != *self.network_seed {
            return Err(VaultError::Storage(format!(
                "network key in {} changed while it was open",
                path.display()
            )));
        }
        Ok(file.handles)
    }

    fn read_lock(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<EncryptedSecretHandle, HandleEntry>>, VaultError> {
        self.handles
            .read()
            .map_err(|_| VaultError::Storage("KMS state lock poisoned".into()))
    }

    fn write_lock(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<EncryptedSecretHandle, HandleEntry>>, VaultError> {
        self.handles
            .write()
            .map_err(|_| VaultError::Storage("KMS state lock poisoned".into()))
    }

    fn persist(&self, handles: &BTreeMap<EncryptedSecretHandle, HandleEntry>) -> Result<(), VaultError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = KmsFile {
            handles: handles.clone(),
            network_seed: hex::encode(self.network_seed.as_slice()),
        };
        let json = Zeroizing::new(
            serde_json::to_string_pretty(&file)
                .map_err(|e| VaultError::Storage(format!("failed to encode KMS state: {}", e)))?,
        );
        write_atomic(path, json.as_bytes(), true)
    }

    fn open_entry(&self, handle: &EncryptedSecretHandle, entry: &HandleEntry) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let sealed = base64::engine::general_purpose::STANDARD
            .decode(entry.sealed.as_bytes())
            .map_err(|e| VaultError::Storage(format!("corrupt entry for {}: {}", handle, e)))?;
        age_decrypt(&sealed, &self.network)
    }
}

fn read_state(path: &Path) -> Result<KmsFile, VaultError> {
    let raw = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
        VaultError::Storage(format!("failed to read {}: {}", path.display(), e))
    })?);
    serde_json::from_str(&raw)
        .map_err(|e| VaultError::Storage(format!("corrupt KMS state {}: {}", path.display(), e)))
}

fn decode_seed(hex_seed: &str) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    decode_hex_array::<32>(hex_seed)
        .map(Zeroizing::new)
        .map_err(|e| VaultError::Storage(format!("invalid network seed: {}", e)))
}

impl ThresholdEncryptor for LocalKms {
    fn encrypt_for_ledger(
        &self,
        secret: &SecretIdentity,
        writer: &Principal,
        scope: &ContractScope,
    ) -> Result<EncryptedSecretHandle, VaultError> {
        let sealed = age_encrypt(secret.to_canonical_string().as_bytes(), &self.network.to_public())?;
        let handle = EncryptedSecretHandle::from_bytes(keccak256(&sealed));

        let entry = HandleEntry {
            acl: BTreeSet::from([*writer]),
            scope: *scope,
            sealed: base64::engine::general_purpose::STANDARD.encode(&sealed),
        };
        self.update(|handles| {
            handles.insert(handle, entry);
            Ok(())
        })?;
        tracing::debug!(%handle, %scope, "secret sealed to network key");
        Ok(handle)
    }
}

impl DecryptionService for LocalKms {
    fn domain(&self) -> Eip712Domain {
        self.domain.clone()
    }

    fn release(
        &self,
        request: &AuthorizationRequest,
        signature: &[u8],
        requester: &Principal,
    ) -> Result<Vec<SealedSecret>, VaultError> {
        request.check_window((self.clock)(), CLOCK_SKEW_SECS)?;
        verify_authorization(request, &self.domain, requester, signature)
            .map_err(|e| VaultError::AuthorizationRejected(e.to_string()))?;
        let recipient = recipient_from_public_key(&request.public_key)?;

        let handles = self.snapshot()?;
        let mut released = Vec::with_capacity(request.handle_refs.len());
        for handle_ref in &request.handle_refs {
            if !request.scopes.contains(&handle_ref.contract) {
                return Err(VaultError::AuthorizationRejected(format!(
                    "contract {} is not in the signed scope",
                    handle_ref.contract
                )));
            }
            let Some(entry) = handles.get(&handle_ref.handle) else {
                tracing::debug!(handle = %handle_ref.handle, "unknown handle omitted from release");
                continue;
            };
            if entry.scope != handle_ref.contract {
                return Err(VaultError::AuthorizationRejected(format!(
                    "handle {} was not produced for contract {}",
                    handle_ref.handle, handle_ref.contract
                )));
            }
            if !entry.acl.contains(requester) {
                return Err(VaultError::AuthorizationRejected(format!(
                    "{} is not allowed to decrypt handle {}",
                    requester, handle_ref.handle
                )));
            }
            let plaintext = self.open_entry(&handle_ref.handle, entry)?;
            released.push(SealedSecret {
                handle: handle_ref.handle,
                sealed: age_encrypt(&plaintext, &recipient)?,
            });
        }
        tracing::info!(
            requester = %requester,
            requested = request.handle_refs.len(),
            released = released.len(),
            "released secrets"
        );
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::auth::{sign_request, Credential, HandleRef, LocalCredential, SECONDS_PER_DAY};
    use crate::crypto::OneTimeKeypair;

    const NOW: u64 = 1_700_000_000;

    fn fixed_clock() -> u64 {
        NOW
    }

    fn scope() -> ContractScope {
        ContractScope::from_bytes([0x18; 20])
    }

    fn domain() -> Eip712Domain {
        Eip712Domain::new(11_155_111, ContractScope::from_bytes([0xb6; 20]))
    }

    fn kms() -> LocalKms {
        LocalKms::new(domain()).expect("kms").with_clock(fixed_clock)
    }

    fn signed(
        kms: &LocalKms,
        credential: &LocalCredential,
        refs: &[HandleRef],
        issued_at: u64,
    ) -> (AuthorizationRequest, Vec<u8>, OneTimeKeypair) {
        let keypair = OneTimeKeypair::generate();
        let request = AuthorizationRequest::build(
            &keypair.public_key_bytes(),
            refs,
            &[scope()],
            issued_at,
            Duration::from_secs(10 * SECONDS_PER_DAY),
        )
        .expect("build");
        let signature = sign_request(&request, &kms.domain(), credential).expect("sign");
        (request, signature, keypair)
    }

    #[test]
    fn test_encrypt_then_release_to_writer() {
        let kms = kms();
        let owner = LocalCredential::from_seed(&[1u8; 32]);
        let secret = SecretIdentity::from_bytes([0x42; 20]);
        let handle = kms
            .encrypt_for_ledger(&secret, &owner.principal(), &scope())
            .expect("encrypt");
        assert!(handle.is_well_formed());

        let refs = [HandleRef { contract: scope(), handle }];
        let (request, signature, keypair) = signed(&kms, &owner, &refs, NOW);
        let released = kms.release(&request, &signature, &owner.principal()).expect("release");
        assert_eq!(released.len(), 1);

        let opened = keypair.open(&released[0].sealed).expect("open");
        assert_eq!(opened.as_slice(), secret.to_canonical_string().as_bytes());
    }

    #[test]
    fn test_handles_are_distinct_for_equal_secrets() {
        let kms = kms();
        let owner = LocalCredential::from_seed(&[1u8; 32]).principal();
        let secret = SecretIdentity::from_bytes([0x42; 20]);
        let a = kms.encrypt_for_ledger(&secret, &owner, &scope()).expect("first");
        let b = kms.encrypt_for_ledger(&secret, &owner, &scope()).expect("second");
        assert_ne!(a, b, "age uses a fresh ephemeral key per seal");
    }

    #[test]
    fn test_release_rejects_principal_outside_acl() {
        let kms = kms();
        let owner = LocalCredential::from_seed(&[1u8; 32]);
        let stranger = LocalCredential::from_seed(&[2u8; 32]);
        let handle = kms
            .encrypt_for_ledger(&SecretIdentity::from_bytes([1; 20]), &owner.principal(), &scope())
            .expect("encrypt");

        let refs = [HandleRef { contract: scope(), handle }];
        let (request, signature, _) = signed(&kms, &stranger, &refs, NOW);
        let result = kms.release(&request, &signature, &stranger.principal());
        assert!(matches!(result, Err(VaultError::AuthorizationRejected(_))));

        kms.allow(&handle, &stranger.principal()).expect("grant");
        assert!(kms.is_allowed(&handle, &stranger.principal()).expect("lookup"));
        let released = kms
            .release(&request, &signature, &stranger.principal())
            .expect("granted principal may decrypt");
        assert_eq!(released.len(), 1);
    }

    #[test]
    fn test_release_rejects_signature_from_other_key() {
        let kms = kms();
        let owner = LocalCredential::from_seed(&[1u8; 32]);
        let forger = LocalCredential::from_seed(&[9u8; 32]);
        let handle = kms
            .encrypt_for_ledger(&SecretIdentity::from_bytes([1; 20]), &owner.principal(), &scope())
            .expect("encrypt");
        let refs = [HandleRef { contract: scope(), handle }];
        let (request, signature, _) = signed(&kms, &forger, &refs, NOW);
        let result = kms.release(&request, &signature, &owner.principal());
        assert!(matches!(result, Err(VaultError::AuthorizationRejected(_))));
    }

    #[test]
    fn test_release_enforces_validity_window() {
        let kms = kms();
        let owner = LocalCredential::from_seed(&[1u8; 32]);
        let handle = kms
            .encrypt_for_ledger(&SecretIdentity::from_bytes([1; 20]), &owner.principal(), &scope())
            .expect("encrypt");
        let refs = [HandleRef { contract: scope(), handle }];

        let expired_start = NOW - 10 * SECONDS_PER_DAY;
        let (request, signature, _) = signed(&kms, &owner, &refs, expired_start);
        assert!(matches!(
            kms.release(&request, &signature, &owner.principal()),
            Err(VaultError::AuthorizationRejected(_))
        ));

        let (request, signature, _) = signed(&kms, &owner, &refs, NOW + CLOCK_SKEW_SECS + 1);
        assert!(matches!(
            kms.release(&request, &signature, &owner.principal()),
            Err(VaultError::AuthorizationRejected(_))
        ));

        let (request, signature, _) = signed(&kms, &owner, &refs, NOW + CLOCK_SKEW_SECS);
        assert!(kms.release(&request, &signature, &owner.principal()).is_ok());
    }

    #[test]
    fn test_release_rejects_handle_from_other_contract() {
        let kms = kms();
        let owner = LocalCredential::from_seed(&[1u8; 32]);
        let other = ContractScope::from_bytes([0x77; 20]);
        let handle = kms
            .encrypt_for_ledger(&SecretIdentity::from_bytes([1; 20]), &owner.principal(), &other)
            .expect("encrypt");
        let refs = [HandleRef { contract: scope(), handle }];
        let (request, signature, _) = signed(&kms, &owner, &refs, NOW);
        assert!(matches!(
            kms.release(&request, &signature, &owner.principal()),
            Err(VaultError::AuthorizationRejected(_))
        ));
    }

    #[test]
    fn test_unknown_handles_are_omitted() {
        let kms = kms();
        let owner = LocalCredential::from_seed(&[1u8; 32]);
        let known = kms
            .encrypt_for_ledger(&SecretIdentity::from_bytes([1; 20]), &owner.principal(), &scope())
            .expect("encrypt");
        let unknown = EncryptedSecretHandle::from_bytes([0xEE; 32]);
        let refs = [
            HandleRef { contract: scope(), handle: known },
            HandleRef { contract: scope(), handle: unknown },
        ];
        let (request, signature, _) = signed(&kms, &owner, &refs, NOW);
        let released = kms.release(&request, &signature, &owner.principal()).expect("release");
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].handle, known);
    }

    #[test]
    fn test_open_persists_and_reloads_state() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("kms.json");
        let owner = LocalCredential::from_seed(&[1u8; 32]);
        let secret = SecretIdentity::from_bytes([0x5A; 20]);

        let handle = {
            let kms = LocalKms::open(&path, domain()).expect("create");
            kms.encrypt_for_ledger(&secret, &owner.principal(), &scope())
                .expect("encrypt")
        };

        let reopened = LocalKms::open(&path, domain()).expect("reopen").with_clock(fixed_clock);
        assert_eq!(reopened.handle_count().expect("count"), 1);
        let refs = [HandleRef { contract: scope(), handle }];
        let (request, signature, keypair) = signed(&reopened, &owner, &refs, NOW);
        let released = reopened
            .release(&request, &signature, &owner.principal())
            .expect("release after reload");
        let opened = keypair.open(&released[0].sealed).expect("open");
        assert_eq!(opened.as_slice(), secret.to_canonical_string().as_bytes());
    }

    #[test]
    fn test_two_instances_on_one_file_keep_both_handles() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("kms.json");
        let alice = LocalCredential::from_seed(&[1u8; 32]).principal();
        let bob = LocalCredential::from_seed(&[2u8; 32]).principal();

        // Both opened before either writes, as two CLI processes would be.
        let first = LocalKms::open(&path, domain()).expect("open first");
        let second = LocalKms::open(&path, domain()).expect("open second");
        let a = first
            .encrypt_for_ledger(&SecretIdentity::from_bytes([0xA1; 20]), &alice, &scope())
            .expect("encrypt through first");
        let b = second
            .encrypt_for_ledger(&SecretIdentity::from_bytes([0xB2; 20]), &bob, &scope())
            .expect("encrypt through second");

        let reopened = LocalKms::open(&path, domain()).expect("reopen");
        assert_eq!(reopened.handle_count().expect("count"), 2, "no handle may be overwritten");
        assert!(reopened.is_allowed(&a, &alice).expect("lookup a"));
        assert!(reopened.is_allowed(&b, &bob).expect("lookup b"));

        // An open instance sees the other's writes without reopening.
        assert!(first.is_allowed(&b, &bob).expect("first sees b"));
        first.allow(&b, &alice).expect("grant through first");
        assert!(second.is_allowed(&b, &alice).expect("second sees grant"));
    }

    #[test]
    fn test_concurrent_encrypts_across_instances() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("kms.json");
        LocalKms::open(&path, domain()).expect("create");
        let owner = LocalCredential::from_seed(&[1u8; 32]).principal();

        let workers: Vec<_> = (0..4u8)
            .map(|worker| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let kms = LocalKms::open(&path, domain()).expect("open");
                    (0..5u8)
                        .map(|n| {
                            kms.encrypt_for_ledger(
                                &SecretIdentity::from_bytes([worker * 16 + n; 20]),
                                &owner,
                                &scope(),
                            )
                            .expect("encrypt")
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let handles: Vec<EncryptedSecretHandle> = workers
            .into_iter()
            .flat_map(|w| w.join().expect("worker thread"))
            .collect();

        let reopened = LocalKms::open(&path, domain()).expect("reopen");
        assert_eq!(reopened.handle_count().expect("count"), 20);
        for handle in &handles {
            assert!(reopened.is_allowed(handle, &owner).expect("lookup"), "{} was lost", handle);
        }
    }

    #[test]
    fn test_failed_persist_leaves_state_unchanged() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("kms.json");
        let kms = LocalKms::open(&path, domain()).expect("create");
        let owner = LocalCredential::from_seed(&[1u8; 32]).principal();

        // A directory where the temp file goes makes the atomic write fail.
        let blocker = dir.path().join(".kms.json.tmp");
        std::fs::create_dir(&blocker).expect("create blocker");
        let result = kms.encrypt_for_ledger(&SecretIdentity::from_bytes([7; 20]), &owner, &scope());
        assert!(
            matches!(result, Err(VaultError::AtomicWriteFailed(_))),
            "got {:?}",
            result
        );
        assert_eq!(kms.handle_count().expect("count"), 0);

        std::fs::remove_dir(&blocker).expect("remove blocker");
        kms.encrypt_for_ledger(&SecretIdentity::from_bytes([7; 20]), &owner, &scope())
            .expect("encrypt once writable");
        assert_eq!(kms.handle_count().expect("count"), 1);
    }

    #[test]
    fn test_in_memory_allow_failure_leaves_acl_unchanged() {
        let kms = kms();
        let owner = LocalCredential::from_seed(&[1u8; 32]).principal();
        let handle = kms
            .encrypt_for_ledger(&SecretIdentity::from_bytes([1; 20]), &owner, &scope())
            .expect("encrypt");
        let stranger = LocalCredential::from_seed(&[2u8; 32]).principal();
        assert!(kms.allow(&EncryptedSecretHandle::from_bytes([3; 32]), &stranger).is_err());
        assert!(!kms.is_allowed(&handle, &stranger).expect("lookup"));
        assert_eq!(kms.handle_count().expect("count"), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_state_file_is_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("kms.json");
        LocalKms::open(&path, domain()).expect("create");
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "KMS state holds the network key and must be 0600");
    }

    #[test]
    fn test_allow_unknown_handle_fails() {
        let kms = kms();
        let principal = LocalCredential::from_seed(&[1u8; 32]).principal();
        let result = kms.allow(&EncryptedSecretHandle::from_bytes([3; 32]), &principal);
        assert!(matches!(result, Err(VaultError::HandleNotFound(_))));
    }
}
