use anyhow::Context;
use std::path::Path;

use crate::auth::LocalCredential;
use crate::config::VaultHome;
use crate::error::VaultError;
use crate::util::{decode_hex_array, write_atomic};

/// Write a credential seed to disk atomically (write to temp then rename) with 0600 permissions.
///
/// The file holds the 32-byte Ed25519 seed as lowercase hex followed by a newline.
/// Permissions are set on the temp file before the rename, so the seed is never
/// readable by other users even briefly.
pub fn write_credential_atomic(credential: &LocalCredential, dest: &Path) -> anyhow::Result<()> {
    let mut encoded = zeroize::Zeroizing::new(hex::encode(credential.seed().as_slice()));
    encoded.push('\n');
    write_atomic(dest, encoded.as_bytes(), true)?;
    Ok(())
}

/// Load the principal's credential from the vault directory.
///
/// Performs a permission check before reading the key file: if the file has permissions
/// other than 0600 the load is rejected with a clear error message that includes the
/// remediation command.
pub fn load_credential(home: &VaultHome) -> anyhow::Result<LocalCredential> {
    let path = home.secret_key_path();
    if !path.exists() {
        return Err(VaultError::NoKeypairFound.into());
    }
    check_key_permissions(&path)?;
    let content = zeroize::Zeroizing::new(
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read key file {}", path.display()))?,
    );
    let seed = zeroize::Zeroizing::new(
        decode_hex_array::<32>(content.trim())
            .map_err(|e| anyhow::anyhow!("Failed to load key from {}: {}", path.display(), e))?,
    );
    Ok(LocalCredential::from_seed(&seed))
}

pub fn credential_exists(home: &VaultHome) -> bool {
    home.secret_key_path().exists()
}

/// Check that the key file has exactly 0600 permissions (Unix only).
///
/// Returns an error if the file permissions allow group or other access.
/// The error message includes the remediation command (`chmod 600 <path>`).
#[cfg(unix)]
pub fn check_key_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;
    if mode != 0o600 {
        anyhow::bail!(
            "Key file {} has insecure permissions {:04o} (expected 0600). Fix with: chmod 600 {}",
            path.display(),
            mode,
            path.display()
        );
    }
    Ok(())
}

/// No-op permission check on non-Unix platforms.
#[cfg(not(unix))]
pub fn check_key_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
