//! Vault orchestration: the store and retrieve flows over the ledger and the threshold layer.
//!
//! Store: generate secret → obfuscate locator → encrypt secret for the ledger →
//! assemble envelope → append. Retrieve: fetch envelopes → authorize their handles →
//! release → reveal each locator.

use std::time::Duration;

use crate::auth::{Credential, HandleRef};
use crate::error::VaultError;
use crate::kms::ThresholdEncryptor;
use crate::ledger::Ledger;
use crate::locator::{self, LocatorCiphertext};
use crate::record::{self, RecordEnvelope};
use crate::relayer::{DecryptionClient, DecryptionService, RetryPolicy};
use crate::secret::{self, SecretIdentity};
use crate::types::{ContractScope, EncryptedSecretHandle, Principal};

/// Appends re-read the owner's count after a `LedgerConflict` at most this many times.
const MAX_APPEND_ATTEMPTS: usize = 8;

/// Outcome of a successful store.
#[derive(Debug)]
pub struct StoreReceipt {
    pub index: u64,
    pub ciphertext: LocatorCiphertext,
    pub handle: EncryptedSecretHandle,
    /// The single-use secret. Only surfaced so a caller can display it on request.
    pub secret: SecretIdentity,
}

/// One record's outcome in a batch retrieval.
#[derive(Debug)]
pub struct Retrieved {
    pub index: u64,
    pub name: String,
    pub locator: Result<String, VaultError>,
}

pub struct Vault<'a> {
    ledger: &'a dyn Ledger,
    encryptor: &'a dyn ThresholdEncryptor,
    client: DecryptionClient<&'a dyn DecryptionService>,
    scope: ContractScope,
    validity: Duration,
}

impl<'a> Vault<'a> {
    pub fn new(
        ledger: &'a dyn Ledger,
        encryptor: &'a dyn ThresholdEncryptor,
        service: &'a dyn DecryptionService,
        scope: ContractScope,
        validity: Duration,
    ) -> Self {
        Self {
            ledger,
            encryptor,
            client: DecryptionClient::new(service),
            scope,
            validity,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.client = self.client.with_retry(retry);
        self
    }

    pub fn scope(&self) -> ContractScope {
        self.scope
    }

    /// Store `locator` under a freshly generated secret.
    pub fn store(
        &self,
        owner: &Principal,
        name: &str,
        locator: &str,
        now: u64,
    ) -> Result<StoreReceipt, VaultError> {
        let secret = secret::generate()?;
        self.store_with_secret(owner, name, locator, secret, now)
    }

    /// Store `locator` under a caller-supplied secret. The secret must not have
    /// been used for any other record.
    pub fn store_with_secret(
        &self,
        owner: &Principal,
        name: &str,
        locator: &str,
        secret: SecretIdentity,
        now: u64,
    ) -> Result<StoreReceipt, VaultError> {
        if name.trim().is_empty() {
            return Err(VaultError::InvalidEnvelope("name must not be empty".into()));
        }
        if locator.is_empty() {
            return Err(VaultError::InvalidEnvelope("locator must not be empty".into()));
        }
        let ciphertext = locator::obfuscate_with(locator, &secret)?;
        let handle = self.encryptor.encrypt_for_ledger(&secret, owner, &self.scope)?;

        let mut attempt = 1;
        let index = loop {
            let index = self.ledger.count(owner)?;
            let envelope = record::assemble(name, ciphertext.clone(), handle, now, index)?;
            match self.ledger.append(owner, envelope) {
                Ok(index) => break index,
                Err(VaultError::LedgerConflict { expected, got }) if attempt < MAX_APPEND_ATTEMPTS => {
                    tracing::debug!(expected, got, attempt, "ledger index moved, retrying append");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        Ok(StoreReceipt {
            index,
            ciphertext,
            handle,
            secret,
        })
    }

    pub fn list(&self, owner: &Principal) -> Result<Vec<RecordEnvelope>, VaultError> {
        self.ledger.list(owner)
    }

    pub fn count(&self, owner: &Principal) -> Result<u64, VaultError> {
        self.ledger.count(owner)
    }

    /// Recover the locator of record `index`.
    pub fn retrieve(
        &self,
        owner: &Principal,
        credential: &dyn Credential,
        index: u64,
        now: u64,
    ) -> Result<String, VaultError> {
        let mut results = self.retrieve_many(owner, credential, &[index], now)?;
        match results.pop() {
            Some(retrieved) => retrieved.locator,
            None => Err(VaultError::RecordNotFound),
        }
    }

    /// Recover several records under a single authorization.
    pub fn retrieve_many(
        &self,
        owner: &Principal,
        credential: &dyn Credential,
        indices: &[u64],
        now: u64,
    ) -> Result<Vec<Retrieved>, VaultError> {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let envelopes = sorted
            .iter()
            .map(|index| self.ledger.get(owner, *index))
            .collect::<Result<Vec<_>, _>>()?;
        self.reveal_envelopes(credential, envelopes, now)
    }

    /// Recover every record of `owner`, ordered by index.
    pub fn retrieve_all(
        &self,
        owner: &Principal,
        credential: &dyn Credential,
        now: u64,
    ) -> Result<Vec<Retrieved>, VaultError> {
        let envelopes = self.ledger.list(owner)?;
        self.reveal_envelopes(credential, envelopes, now)
    }

    fn reveal_envelopes(
        &self,
        credential: &dyn Credential,
        envelopes: Vec<RecordEnvelope>,
        now: u64,
    ) -> Result<Vec<Retrieved>, VaultError> {
        if envelopes.is_empty() {
            return Ok(Vec::new());
        }
        let refs: Vec<HandleRef> = envelopes.iter().map(|e| e.handle_ref(self.scope)).collect();
        let authorization = self
            .client
            .authorize(credential, &refs, &[self.scope], now, self.validity)?;
        let mut released = self.client.request_release(&authorization, now)?;

        Ok(envelopes
            .into_iter()
            .map(|envelope| {
                let locator = released
                    .take(&envelope.encrypted_secret_handle)
                    .and_then(|secret| locator::reveal(&envelope.locator_ciphertext, &secret));
                if let Err(e) = &locator {
                    tracing::warn!(index = envelope.owner_index, error = %e, "record could not be revealed");
                }
                Retrieved {
                    index: envelope.owner_index,
                    name: envelope.name,
                    locator,
                }
            })
            .collect())
    }
}
