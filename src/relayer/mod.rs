//! Relayer module: the authorized-decryption handshake with an external service.
//!
//! The client generates a one-time keypair, builds and signs an authorization
//! request, sends it to a `DecryptionService`, and opens the sealed secrets the
//! service releases. Transient outages are retried with exponential backoff;
//! everything else surfaces immediately as a typed error.
//!
//! `HttpRelayer` is the blocking HTTP implementation of `DecryptionService` (and
//! of `ThresholdEncryptor`, since the same relayer registers encrypted inputs).

use std::collections::BTreeMap;
use std::time::Duration;

use backon::{BlockingRetryable, ExponentialBuilder};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::auth::{sign_request, AuthorizationRequest, Credential, Eip712Domain, HandleRef};
use crate::crypto::{age_encrypt, OneTimeKeypair};
use crate::error::VaultError;
use crate::kms::ThresholdEncryptor;
use crate::secret::SecretIdentity;
use crate::types::{ContractScope, EncryptedSecretHandle, Principal};
use crate::util::{decode_hex_vec, to_prefixed_hex};

/// One released secret, sealed (age) to the request's one-time public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    pub handle: EncryptedSecretHandle,
    pub sealed: Vec<u8>,
}

/// The two capabilities the core needs from a decryption service: the domain
/// authorization artifacts are signed under, and release of secrets given a
/// valid artifact.
///
/// A handle the service cannot decrypt is omitted from the response rather than
/// failing the whole request. A service may instead answer `HandleNotFound`,
/// which releases nothing.
pub trait DecryptionService: Send + Sync {
    fn domain(&self) -> Eip712Domain;

    fn release(
        &self,
        request: &AuthorizationRequest,
        signature: &[u8],
        requester: &Principal,
    ) -> Result<Vec<SealedSecret>, VaultError>;
}

impl<T: DecryptionService + ?Sized> DecryptionService for &T {
    fn domain(&self) -> Eip712Domain {
        (**self).domain()
    }

    fn release(
        &self,
        request: &AuthorizationRequest,
        signature: &[u8],
        requester: &Principal,
    ) -> Result<Vec<SealedSecret>, VaultError> {
        (**self).release(request, signature, requester)
    }
}

/// Bounded exponential backoff for `ServiceUnavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }
}

/// A signed request plus the private half of its one-time keypair.
///
/// Single use: once its window closes the client refuses to send it.
pub struct Authorization {
    pub request: AuthorizationRequest,
    pub signature: Vec<u8>,
    pub requester: Principal,
    keypair: OneTimeKeypair,
}

/// Per-handle outcome of a release, covering every handle that was requested.
#[derive(Debug)]
pub struct ReleasedSecrets {
    entries: BTreeMap<EncryptedSecretHandle, Result<SecretIdentity, VaultError>>,
}

impl ReleasedSecrets {
    pub fn get(&self, handle: &EncryptedSecretHandle) -> Option<&Result<SecretIdentity, VaultError>> {
        self.entries.get(handle)
    }

    /// Remove and return the outcome for `handle`; unknown handles are `HandleNotFound`.
    pub fn take(&mut self, handle: &EncryptedSecretHandle) -> Result<SecretIdentity, VaultError> {
        self.entries
            .remove(handle)
            .unwrap_or(Err(VaultError::HandleNotFound(*handle)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn released_count(&self) -> usize {
        self.entries.values().filter(|r| r.is_ok()).count()
    }
}

/// Drives the authorization handshake against a `DecryptionService`.
pub struct DecryptionClient<S> {
    service: S,
    retry: RetryPolicy,
}

impl<S: DecryptionService> DecryptionClient<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Generate a one-time keypair, build the request, and sign it.
    pub fn authorize(
        &self,
        credential: &dyn Credential,
        handle_refs: &[HandleRef],
        scopes: &[ContractScope],
        now: u64,
        validity: Duration,
    ) -> Result<Authorization, VaultError> {
        let keypair = OneTimeKeypair::generate();
        let request =
            AuthorizationRequest::build(&keypair.public_key_bytes(), handle_refs, scopes, now, validity)?;
        let domain = self.service.domain();
        let signature = sign_request(&request, &domain, credential)?;
        tracing::debug!(
            handles = request.handle_refs.len(),
            expires_at = request.expires_at(),
            "authorization signed"
        );
        Ok(Authorization {
            request,
            signature,
            requester: credential.principal(),
            keypair,
        })
    }

    /// Exchange a signed authorization for the secrets it names.
    ///
    /// Fails as a whole only for request-level problems (rejected, unavailable after
    /// retries). Per-handle problems are reported per handle: a service that answers
    /// `HandleNotFound` releases nothing, so every requested handle is reported as
    /// not found instead of failing the batch.
    pub fn request_release(
        &self,
        authorization: &Authorization,
        now: u64,
    ) -> Result<ReleasedSecrets, VaultError> {
        authorization.request.check_window(now, 0)?;

        let sealed = (|| {
            self.service.release(
                &authorization.request,
                &authorization.signature,
                &authorization.requester,
            )
        })
        .retry(self.retry.backoff())
        .sleep(std::thread::sleep)
        .when(|e: &VaultError| e.is_retryable())
        .notify(|e: &VaultError, delay: Duration| {
            tracing::warn!(error = %e, ?delay, "decryption service unavailable, retrying");
        })
        .call();
        let sealed = match sealed {
            Ok(sealed) => sealed,
            Err(VaultError::HandleNotFound(missing)) => {
                tracing::warn!(handle = %missing, "decryption service has no record of a requested handle");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut released: BTreeMap<EncryptedSecretHandle, Vec<u8>> = BTreeMap::new();
        for item in sealed {
            released.insert(item.handle, item.sealed);
        }

        let mut entries = BTreeMap::new();
        for handle in authorization.request.handles() {
            let outcome = match released.remove(handle) {
                Some(sealed) => open_released(&authorization.keypair, handle, &sealed),
                None => {
                    tracing::warn!(%handle, "handle missing from release response");
                    Err(VaultError::HandleNotFound(*handle))
                }
            };
            entries.insert(*handle, outcome);
        }
        if !released.is_empty() {
            tracing::warn!(
                extra = released.len(),
                "ignoring released values for handles that were not requested"
            );
        }

        let result = ReleasedSecrets { entries };
        tracing::info!(
            requested = result.len(),
            released = result.released_count(),
            "release completed"
        );
        Ok(result)
    }
}

fn open_released(
    keypair: &OneTimeKeypair,
    handle: &EncryptedSecretHandle,
    sealed: &[u8],
) -> Result<SecretIdentity, VaultError> {
    let opened = keypair
        .open(sealed)
        .map_err(|_| VaultError::MalformedRelease(*handle))?;
    let text = std::str::from_utf8(&opened).map_err(|_| VaultError::MalformedRelease(*handle))?;
    text.parse().map_err(|_| VaultError::MalformedRelease(*handle))
}

// ── HttpRelayer ─────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UserDecryptBody {
    contract_addresses: Vec<ContractScope>,
    duration_days: String,
    handle_contract_pairs: Vec<HandleRef>,
    public_key: String,
    signature: String,
    start_timestamp: String,
    user_address: Principal,
}

#[derive(Deserialize, Debug)]
struct ReleaseBody {
    released: Vec<ReleasedEntry>,
}

#[derive(Deserialize, Debug)]
struct ReleasedEntry {
    handle: EncryptedSecretHandle,
    sealed: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct NetworkKeyBody {
    public_key: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InputProofBody {
    ciphertext: String,
    contract_address: ContractScope,
    user_address: Principal,
}

#[derive(Deserialize, Debug)]
struct InputProofResponse {
    handle: EncryptedSecretHandle,
}

/// Blocking HTTP client for a remote relayer.
pub struct HttpRelayer {
    client: reqwest::blocking::Client,
    /// Base URL without a trailing slash, e.g. "https://relayer.example.org".
    base_url: String,
    domain: Eip712Domain,
}

impl HttpRelayer {
    pub fn new(base_url: &str, domain: Eip712Domain, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            domain,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the network's public encryption key (an age recipient).
    fn network_recipient(&self) -> Result<age::x25519::Recipient, VaultError> {
        let url = format!("{}/v1/network-key", self.base_url);
        let response = self.client.get(&url).send().map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status.as_u16(), body.trim()));
        }
        let body: NetworkKeyBody = response
            .json()
            .map_err(|e| VaultError::ServiceUnavailable(format!("invalid key response: {}", e)))?;
        body.public_key
            .parse()
            .map_err(|e| VaultError::ServiceUnavailable(format!("invalid network key: {}", e)))
    }
}

impl DecryptionService for HttpRelayer {
    fn domain(&self) -> Eip712Domain {
        self.domain.clone()
    }

    fn release(
        &self,
        request: &AuthorizationRequest,
        signature: &[u8],
        requester: &Principal,
    ) -> Result<Vec<SealedSecret>, VaultError> {
        let body = UserDecryptBody {
            contract_addresses: request.scopes.clone(),
            duration_days: request.duration_days.to_string(),
            handle_contract_pairs: request.handle_refs.clone(),
            public_key: to_prefixed_hex(&request.public_key),
            signature: hex::encode(signature),
            start_timestamp: request.issued_at.to_string(),
            user_address: *requester,
        };
        let url = format!("{}/v1/user-decrypt", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            let text = text.trim();
            if status == reqwest::StatusCode::NOT_FOUND && text.parse::<EncryptedSecretHandle>().is_err() {
                // none of the requested handles is known to the service
                return Ok(Vec::new());
            }
            return Err(classify_status(status.as_u16(), text));
        }
        let parsed: ReleaseBody = response
            .json()
            .map_err(|e| VaultError::ServiceUnavailable(format!("invalid release response: {}", e)))?;
        decode_release(parsed)
    }
}

impl ThresholdEncryptor for HttpRelayer {
    /// Seal the secret to the network key locally, then register it as an input.
    fn encrypt_for_ledger(
        &self,
        secret: &SecretIdentity,
        writer: &Principal,
        scope: &ContractScope,
    ) -> Result<EncryptedSecretHandle, VaultError> {
        let recipient = self.network_recipient()?;
        let sealed = age_encrypt(secret.to_canonical_string().as_bytes(), &recipient)?;
        let body = InputProofBody {
            ciphertext: base64::engine::general_purpose::STANDARD.encode(&sealed),
            contract_address: *scope,
            user_address: *writer,
        };
        let url = format!("{}/v1/input-proof", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(classify_status(status.as_u16(), text.trim()));
        }
        let parsed: InputProofResponse = response
            .json()
            .map_err(|e| VaultError::ServiceUnavailable(format!("invalid input-proof response: {}", e)))?;
        Ok(parsed.handle)
    }
}

fn decode_release(body: ReleaseBody) -> Result<Vec<SealedSecret>, VaultError> {
    body.released
        .into_iter()
        .map(|entry| {
            let sealed = base64::engine::general_purpose::STANDARD
                .decode(entry.sealed.as_bytes())
                .or_else(|_| decode_hex_vec(&entry.sealed))
                .map_err(|_| VaultError::MalformedRelease(entry.handle))?;
            Ok(SealedSecret {
                handle: entry.handle,
                sealed,
            })
        })
        .collect()
}

fn transport_error(e: reqwest::Error) -> VaultError {
    if e.is_timeout() {
        VaultError::ServiceUnavailable(format!("request timed out: {}", e))
    } else if e.is_connect() {
        VaultError::ServiceUnavailable(format!("connection failed: {}", e))
    } else {
        VaultError::ServiceUnavailable(e.to_string())
    }
}

/// Map a non-success relayer status to the error taxonomy.
///
/// Only server errors, 408 and 429 are retryable. A 404 body naming a handle
/// becomes `HandleNotFound`; any other client error is a permanent `InvalidRequest`.
fn classify_status(status: u16, body: &str) -> VaultError {
    match status {
        401 | 403 => VaultError::AuthorizationRejected(format!("status {}: {}", status, body)),
        404 => match body.parse::<EncryptedSecretHandle>() {
            Ok(handle) => VaultError::HandleNotFound(handle),
            Err(_) => VaultError::InvalidRequest(format!("status 404: {}", body)),
        },
        408 | 429 => VaultError::ServiceUnavailable(format!("status {}: {}", status, body)),
        400..=499 => VaultError::InvalidRequest(format!("status {}: {}", status, body)),
        _ => VaultError::ServiceUnavailable(format!("status {}: {}", status, body)),
    }
}
