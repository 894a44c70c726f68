use thiserror::Error;

use crate::types::EncryptedSecretHandle;

/// Every failure the vault protocol can surface to a caller.
///
/// Recovery-path variants are split so callers can tell "not yet authorized"
/// (rebuild and re-sign the request) from "wrong secret or corrupted data"
/// (retrying will not help).
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Secure random source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Recovered locator is not valid UTF-8 (wrong secret or corrupted ciphertext)")]
    MalformedLocator,

    #[error("Decryption service rejected the authorization: {0}")]
    AuthorizationRejected(String),

    #[error("Decryption service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Handle {0} cannot be decrypted by the service")]
    HandleNotFound(EncryptedSecretHandle),

    #[error("Released value for handle {0} could not be opened")]
    MalformedRelease(EncryptedSecretHandle),

    #[error("Invalid authorization request: {0}")]
    InvalidRequest(String),

    #[error("Invalid record envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Invalid {kind}: {reason}")]
    InvalidHex { kind: &'static str, reason: String },

    #[error("Keystream key must not be empty")]
    EmptyKeystream,

    #[error("Record not found")]
    RecordNotFound,

    #[error("Ledger append rejected: expected index {expected}, got {got}")]
    LedgerConflict { expected: u64, got: u64 },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("No keypair found. Run `cidvault init` first.")]
    NoKeypairFound,

    #[error("Failed to write file atomically")]
    AtomicWriteFailed(#[source] std::io::Error),

    #[error("Cannot determine home directory")]
    HomeDirNotFound,

    #[error("Signature verification failed: {0}")]
    SignatureVerificationFailed(String),
}

impl VaultError {
    /// Only a transient service outage is worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::ServiceUnavailable(_))
    }

    /// True when the fix is a fresh, re-signed authorization request.
    pub fn is_authorization_failure(&self) -> bool {
        matches!(
            self,
            VaultError::AuthorizationRejected(_) | VaultError::SignatureVerificationFailed(_)
        )
    }

    /// True when the recovered data itself is wrong; re-running the handshake won't fix it.
    pub fn is_data_failure(&self) -> bool {
        matches!(
            self,
            VaultError::MalformedLocator | VaultError::MalformedRelease(_)
        )
    }
}
