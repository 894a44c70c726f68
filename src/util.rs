//! Shared utility functions.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fs2::FileExt;

use crate::error::VaultError;

/// Current Unix time in seconds. A clock before the epoch reads as 0.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Convert a duration in seconds to a human-readable string.
///
/// >= 86400s -> "Xd", >= 3600s -> "Xh", >= 60s -> "Xm", otherwise -> "Xs".
pub fn human_duration(secs: u64) -> String {
    if secs >= 86400 {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Elide the middle of a long value for table display: `0x1234...abcd`.
pub fn shorten(value: &str, head: usize, tail: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= head + tail {
        return value.to_string();
    }
    let start: String = chars[..head].iter().collect();
    let end: String = chars[chars.len() - tail..].iter().collect();
    format!("{}...{}", start, end)
}

/// Render bytes as `0x`-prefixed lowercase hex.
pub fn to_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Strip an optional `0x`/`0X` prefix.
pub fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Decode optionally-prefixed hex of any case into exactly `N` bytes.
pub fn decode_hex_array<const N: usize>(value: &str) -> Result<[u8; N], String> {
    let digits = strip_hex_prefix(value.trim());
    if digits.len() != N * 2 {
        return Err(format!(
            "expected {} hex digits, got {}",
            N * 2,
            digits.len()
        ));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out).map_err(|e| e.to_string())?;
    Ok(out)
}

/// Decode optionally-prefixed hex of any length.
pub fn decode_hex_vec(value: &str) -> Result<Vec<u8>, String> {
    hex::decode(strip_hex_prefix(value.trim())).map_err(|e| e.to_string())
}

/// Replace `dest` atomically: write a temp file in the same directory, then rename.
///
/// With `private`, the temp file is restricted to 0600 before the rename so the
/// contents are never visible with looser permissions.
pub fn write_atomic(dest: &Path, bytes: &[u8], private: bool) -> Result<(), VaultError> {
    let parent = dest.parent().ok_or_else(|| {
        VaultError::AtomicWriteFailed(std::io::Error::other("destination has no parent directory"))
    })?;
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.tmp", file_name));

    std::fs::write(&tmp, bytes).map_err(VaultError::AtomicWriteFailed)?;

    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(VaultError::AtomicWriteFailed(e));
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    if let Err(e) = std::fs::rename(&tmp, dest) {
        let _ = std::fs::remove_file(&tmp);
        return Err(VaultError::AtomicWriteFailed(e));
    }
    Ok(())
}

/// Advisory lock on a state file, held until dropped.
///
/// The lock lives on a `.{name}.lock` sidecar rather than the state file itself,
/// because `write_atomic` replaces the state file's inode on every write.
/// Separate processes (and separate handles within one process) exclude each other.
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Block until no other holder has the lock for `state`.
    pub fn exclusive(state: &Path) -> Result<Self, VaultError> {
        let lock = Self::open(state)?;
        lock.file.lock_exclusive().map_err(|e| lock.failed(e))?;
        Ok(lock)
    }

    /// Block until no exclusive holder has the lock for `state`.
    pub fn shared(state: &Path) -> Result<Self, VaultError> {
        let lock = Self::open(state)?;
        FileExt::lock_shared(&lock.file).map_err(|e| lock.failed(e))?;
        Ok(lock)
    }

    fn open(state: &Path) -> Result<Self, VaultError> {
        let path = lock_path(state);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| VaultError::Storage(format!("failed to open {}: {}", path.display(), e)))?;
        Ok(Self { file, path })
    }

    fn failed(&self, e: std::io::Error) -> VaultError {
        VaultError::Storage(format!("failed to lock {}: {}", self.path.display(), e))
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path(state: &Path) -> PathBuf {
    let name = state
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    state.with_file_name(format!(".{}.lock", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("state.json");
        write_atomic(&path, b"first", false).expect("first write");
        write_atomic(&path, b"second", false).expect("second write");
        assert_eq!(std::fs::read(&path).expect("read back"), b"second");
        assert!(
            !dir.path().join(".state.json.tmp").exists(),
            "temp file must not survive a successful write"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_private_sets_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("secret");
        write_atomic(&path, b"key", true).expect("write");
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "private files must be 0600, got {:04o}", mode);
    }

    #[test]
    fn test_state_lock_excludes_other_holders() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let state = dir.path().join("ledger.json");
        let held = StateLock::exclusive(&state).expect("first lock");
        assert!(dir.path().join(".ledger.json.lock").exists(), "lock sidecar must be created");

        let acquired = Arc::new(AtomicBool::new(false));
        let waiter = {
            let state = state.clone();
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                let _lock = StateLock::exclusive(&state).expect("second lock");
                acquired.store(true, Ordering::SeqCst);
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(
            !acquired.load(Ordering::SeqCst),
            "a second handle must wait while the lock is held"
        );
        drop(held);
        waiter.join().expect("waiter thread");
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_shared_locks_coexist() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let state = dir.path().join("kms.json");
        let _a = StateLock::shared(&state).expect("first shared lock");
        let _b = StateLock::shared(&state).expect("second shared lock");
    }

    #[test]
    fn test_human_duration_seconds() {
        assert_eq!(human_duration(0), "0s");
        assert_eq!(human_duration(59), "59s");
    }

    #[test]
    fn test_human_duration_minutes_hours_days() {
        assert_eq!(human_duration(60), "1m");
        assert_eq!(human_duration(3599), "59m");
        assert_eq!(human_duration(3600), "1h");
        assert_eq!(human_duration(86399), "23h");
        assert_eq!(human_duration(864_000), "10d");
    }

    #[test]
    fn test_shorten_keeps_short_values() {
        assert_eq!(shorten("", 6, 4), "");
        assert_eq!(shorten("0x1234", 6, 4), "0x1234");
    }

    #[test]
    fn test_shorten_elides_middle() {
        assert_eq!(
            shorten("0x1888Fb8F76b2be017BfE63256dF35eB3F038d7ce", 6, 4),
            "0x1888...d7ce"
        );
    }

    #[test]
    fn test_decode_hex_array_accepts_prefix_and_case() {
        let lower: [u8; 2] = decode_hex_array("0xabcd").expect("lowercase should decode");
        let upper: [u8; 2] = decode_hex_array("ABCD").expect("bare uppercase should decode");
        assert_eq!(lower, [0xab, 0xcd]);
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_decode_hex_array_rejects_wrong_length() {
        let result: Result<[u8; 2], String> = decode_hex_array("0xabcdef");
        assert!(result.is_err(), "three bytes must not fit a two-byte array");
    }

    #[test]
    fn test_to_prefixed_hex() {
        assert_eq!(to_prefixed_hex(&[0x00, 0xff]), "0x00ff");
        assert_eq!(to_prefixed_hex(&[]), "0x");
    }
}
