//! Crypto module: the locator keystream and the one-time release keypair.
//!
//! The keystream is Keccak-256 over the secret identity's canonical lowercase
//! text, XORed cyclically against the data. The 32-byte key repeats for longer
//! inputs and the same secret always yields the same keystream, so this is
//! obfuscation, not a general-purpose cipher: confidentiality rests entirely on
//! the secret being single-use and released only through the threshold layer.
//! The construction is part of the stored ciphertext format and must not change.
//!
//! Released secrets travel back from the decryption service sealed with `age`
//! to a per-retrieval X25519 keypair generated here.

use std::io::Write;

use bech32::{ToBase32, Variant};
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use crate::error::VaultError;
use crate::secret::SecretIdentity;

/// Keccak-256 digest length, and so the keystream period.
pub const KEYSTREAM_LEN: usize = 32;

/// Keccak-256 (the pre-standard variant, not SHA3-256).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Keystream bytes derived from a secret identity. Zeroized on drop.
#[derive(Clone)]
pub struct KeyBytes(Zeroizing<[u8; KEYSTREAM_LEN]>);

impl KeyBytes {
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl std::fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyBytes(<redacted>)")
    }
}

/// Derive the keystream for `secret`: keccak256(utf8(lowercase "0x…" form)).
pub fn derive_keystream(secret: &SecretIdentity) -> KeyBytes {
    let text = secret.to_canonical_string();
    KeyBytes(Zeroizing::new(keccak256(text.as_bytes())))
}

/// XOR `data` with `key` repeated to length: `out[i] = data[i] ^ key[i % key.len()]`.
///
/// Its own inverse for any non-empty key.
pub fn apply_keystream(data: &[u8], key: &[u8]) -> Result<Vec<u8>, VaultError> {
    if key.is_empty() {
        return Err(VaultError::EmptyKeystream);
    }
    Ok(data
        .iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect())
}

// ── One-time release keypair ────────────────────────────────────────────────

/// Per-retrieval X25519 keypair. The decryption service seals released secrets
/// to the public half; only this process can open them.
pub struct OneTimeKeypair {
    identity: age::x25519::Identity,
    recipient: age::x25519::Recipient,
}

impl OneTimeKeypair {
    pub fn generate() -> Self {
        let identity = age::x25519::Identity::generate();
        let recipient = identity.to_public();
        Self {
            identity,
            recipient,
        }
    }

    /// Public key bytes as carried in the authorization request (the `age1…` string).
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.recipient.to_string().into_bytes()
    }

    pub fn recipient(&self) -> &age::x25519::Recipient {
        &self.recipient
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        age_decrypt(sealed, &self.identity)
    }
}

/// Build an age X25519 identity from a raw 32-byte scalar.
///
/// Bech32-encodes the scalar with the "age-secret-key-" HRP, the format age
/// parses identities from.
pub fn age_identity_from_seed(seed: &[u8; 32]) -> Result<age::x25519::Identity, VaultError> {
    let encoded = Zeroizing::new(
        bech32::encode("age-secret-key-", seed.to_base32(), Variant::Bech32)
            .map_err(|e| VaultError::Storage(format!("bech32 encode error: {}", e)))?,
    );
    // age parses identities case-insensitively; uppercase is the canonical form
    encoded
        .to_ascii_uppercase()
        .parse::<age::x25519::Identity>()
        .map_err(|e| VaultError::Storage(format!("invalid age identity: {}", e)))
}

/// Parse the public key bytes of an authorization request back into a recipient.
pub fn recipient_from_public_key(public_key: &[u8]) -> Result<age::x25519::Recipient, VaultError> {
    let text = std::str::from_utf8(public_key)
        .map_err(|_| VaultError::InvalidRequest("public key is not UTF-8".into()))?;
    text.parse()
        .map_err(|e| VaultError::InvalidRequest(format!("invalid public key: {}", e)))
}

/// Encrypt plaintext to an age X25519 recipient.
///
/// Returns the full age ciphertext including its header; pass it intact to `age_decrypt`.
pub fn age_encrypt(
    plaintext: &[u8],
    recipient: &age::x25519::Recipient,
) -> Result<Vec<u8>, VaultError> {
    let encryptor =
        age::Encryptor::with_recipients(std::iter::once(recipient as &dyn age::Recipient))
            .map_err(|e| VaultError::Storage(format!("age encryptor error: {}", e)))?;
    let mut ciphertext = vec![];
    let mut writer = encryptor
        .wrap_output(&mut ciphertext)
        .map_err(|e| VaultError::Storage(format!("age encrypt error: {}", e)))?;
    writer
        .write_all(plaintext)
        .map_err(|e| VaultError::Storage(format!("age encrypt error: {}", e)))?;
    writer
        .finish()
        .map_err(|e| VaultError::Storage(format!("age encrypt error: {}", e)))?;
    Ok(ciphertext)
}

/// Decrypt age ciphertext with an X25519 identity.
///
/// A wrong identity or malformed ciphertext is an error, never garbage output.
pub fn age_decrypt(
    ciphertext: &[u8],
    identity: &age::x25519::Identity,
) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let decryptor = age::Decryptor::new(ciphertext)
        .map_err(|e| VaultError::Storage(format!("age decryptor error: {}", e)))?;
    let mut reader = decryptor
        .decrypt(std::iter::once(identity as &dyn age::Identity))
        .map_err(|e| VaultError::Storage(format!("age decrypt error: {}", e)))?;
    let mut plaintext = Zeroizing::new(vec![]);
    std::io::Read::read_to_end(&mut reader, &mut plaintext)
        .map_err(|e| VaultError::Storage(format!("age read error: {}", e)))?;
    Ok(plaintext)
}
