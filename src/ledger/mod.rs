//! Append-only record storage keyed by owning principal.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::record::RecordEnvelope;
use crate::types::Principal;
use crate::util::{write_atomic, StateLock};

/// The public ledger. Records are immutable once appended and indexed per owner
/// from zero without gaps.
pub trait Ledger: Send + Sync {
    /// Append `envelope` to `owner`'s list. Its `owner_index` must equal the
    /// current count, otherwise `LedgerConflict`.
    fn append(&self, owner: &Principal, envelope: RecordEnvelope) -> Result<u64, VaultError>;

    fn get(&self, owner: &Principal, index: u64) -> Result<RecordEnvelope, VaultError>;

    fn list(&self, owner: &Principal) -> Result<Vec<RecordEnvelope>, VaultError>;

    fn count(&self, owner: &Principal) -> Result<u64, VaultError>;
}

type Records = BTreeMap<Principal, Vec<RecordEnvelope>>;

fn append_checked(records: &mut Records, owner: &Principal, envelope: RecordEnvelope) -> Result<u64, VaultError> {
    envelope.validate()?;
    let list = records.entry(*owner).or_default();
    let expected = list.len() as u64;
    if envelope.owner_index != expected {
        return Err(VaultError::LedgerConflict {
            expected,
            got: envelope.owner_index,
        });
    }
    tracing::info!(
        owner = %owner,
        index = expected,
        name = %envelope.name,
        created_at = envelope.created_at,
        "record stored"
    );
    list.push(envelope);
    Ok(expected)
}

fn get_from(records: &Records, owner: &Principal, index: u64) -> Result<RecordEnvelope, VaultError> {
    let index = usize::try_from(index).map_err(|_| VaultError::RecordNotFound)?;
    records
        .get(owner)
        .and_then(|list| list.get(index))
        .cloned()
        .ok_or(VaultError::RecordNotFound)
}

/// In-process ledger.
#[derive(Default)]
pub struct MemoryLedger {
    records: RwLock<Records>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> VaultError {
    VaultError::Storage("ledger lock poisoned".into())
}

impl Ledger for MemoryLedger {
    fn append(&self, owner: &Principal, envelope: RecordEnvelope) -> Result<u64, VaultError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        append_checked(&mut records, owner, envelope)
    }

    fn get(&self, owner: &Principal, index: u64) -> Result<RecordEnvelope, VaultError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        get_from(&records, owner, index)
    }

    fn list(&self, owner: &Principal) -> Result<Vec<RecordEnvelope>, VaultError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(owner).cloned().unwrap_or_default())
    }

    fn count(&self, owner: &Principal) -> Result<u64, VaultError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(owner).map(|l| l.len() as u64).unwrap_or(0))
    }
}

#[derive(Serialize, Deserialize, Default)]
struct LedgerFile {
    records: Records,
}

/// Ledger persisted as a JSON document. Every write replaces the file atomically.
///
/// The file is re-read on each operation, so separate processes sharing a vault
/// directory see each other's appends. Appends hold the file's `StateLock` from
/// the index check to the rename.
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<LedgerFile, VaultError> {
        if !self.path.exists() {
            return Ok(LedgerFile::default());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            VaultError::Storage(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            VaultError::Storage(format!("corrupt ledger {}: {}", self.path.display(), e))
        })
    }
}

impl Ledger for FileLedger {
    fn append(&self, owner: &Principal, envelope: RecordEnvelope) -> Result<u64, VaultError> {
        let _lock = StateLock::exclusive(&self.path)?;
        let mut file = self.load()?;
        let index = append_checked(&mut file.records, owner, envelope)?;
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| VaultError::Storage(format!("failed to encode ledger: {}", e)))?;
        write_atomic(&self.path, json.as_bytes(), false)?;
        Ok(index)
    }

    fn get(&self, owner: &Principal, index: u64) -> Result<RecordEnvelope, VaultError> {
        get_from(&self.load()?.records, owner, index)
    }

    fn list(&self, owner: &Principal) -> Result<Vec<RecordEnvelope>, VaultError> {
        Ok(self.load()?.records.remove(owner).unwrap_or_default())
    }

    fn count(&self, owner: &Principal) -> Result<u64, VaultError> {
        Ok(self
            .load()?
            .records
            .get(owner)
            .map(|l| l.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::LocatorCiphertext;
    use crate::record::assemble;
    use crate::types::EncryptedSecretHandle;

    fn owner(n: u8) -> Principal {
        Principal::from_bytes([n; 32])
    }

    fn envelope(name: &str, index: u64) -> RecordEnvelope {
        assemble(
            name,
            LocatorCiphertext::from_bytes(vec![1, 2, 3]),
            EncryptedSecretHandle::from_bytes([index as u8 + 1; 32]),
            1_700_000_000 + index,
            index,
        )
        .expect("assemble")
    }

    fn exercise(ledger: &dyn Ledger) {
        let alice = owner(1);
        let bob = owner(2);
        assert_eq!(ledger.count(&alice).expect("count"), 0);
        assert!(ledger.list(&alice).expect("list").is_empty());

        assert_eq!(ledger.append(&alice, envelope("a0", 0)).expect("append"), 0);
        assert_eq!(ledger.append(&alice, envelope("a1", 1)).expect("append"), 1);
        assert_eq!(ledger.append(&bob, envelope("b0", 0)).expect("append"), 0);

        assert_eq!(ledger.count(&alice).expect("count"), 2);
        assert_eq!(ledger.count(&bob).expect("count"), 1);
        assert_eq!(ledger.get(&alice, 1).expect("get").name, "a1");
        let names: Vec<String> = ledger
            .list(&alice)
            .expect("list")
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a0", "a1"], "records must be ordered by index");

        assert!(matches!(ledger.get(&alice, 2), Err(VaultError::RecordNotFound)));
        assert!(matches!(ledger.get(&owner(3), 0), Err(VaultError::RecordNotFound)));
    }

    #[test]
    fn test_memory_ledger_append_get_list_count() {
        exercise(&MemoryLedger::new());
    }

    #[test]
    fn test_file_ledger_append_get_list_count() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        exercise(&FileLedger::open(&dir.path().join("ledger.json")));
    }

    #[test]
    fn test_append_rejects_out_of_order_index() {
        let ledger = MemoryLedger::new();
        let result = ledger.append(&owner(1), envelope("skip", 1));
        assert!(
            matches!(result, Err(VaultError::LedgerConflict { expected: 0, got: 1 })),
            "gaps must be rejected, got {:?}",
            result
        );
        ledger.append(&owner(1), envelope("first", 0)).expect("append");
        let result = ledger.append(&owner(1), envelope("again", 0));
        assert!(matches!(result, Err(VaultError::LedgerConflict { expected: 1, got: 0 })));
    }

    #[test]
    fn test_append_rejects_invalid_envelope() {
        let ledger = MemoryLedger::new();
        let mut bad = envelope("x", 0);
        bad.name = " ".into();
        assert!(matches!(
            ledger.append(&owner(1), bad),
            Err(VaultError::InvalidEnvelope(_))
        ));
        assert_eq!(ledger.count(&owner(1)).expect("count"), 0);
    }

    #[test]
    fn test_file_ledger_survives_reopen() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("ledger.json");
        FileLedger::open(&path)
            .append(&owner(1), envelope("kept", 0))
            .expect("append");

        let reopened = FileLedger::open(&path);
        let stored = reopened.get(&owner(1), 0).expect("get after reopen");
        assert_eq!(stored, envelope("kept", 0));
    }

    #[test]
    fn test_file_ledgers_on_one_path_never_lose_appends() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("ledger.json");
        let alice = owner(1);

        let workers: Vec<_> = (0..4u8)
            .map(|worker| {
                let path = path.clone();
                std::thread::spawn(move || {
                    // Each worker opens its own handle, as separate processes would.
                    let ledger = FileLedger::open(&path);
                    let mut stored = 0;
                    while stored < 25 {
                        let index = ledger.count(&alice).expect("count");
                        let name = format!("w{}-{}", worker, stored);
                        match ledger.append(&alice, envelope(&name, index)) {
                            Ok(got) => {
                                assert_eq!(got, index);
                                stored += 1;
                            }
                            Err(VaultError::LedgerConflict { .. }) => continue,
                            Err(e) => panic!("unexpected append failure: {}", e),
                        }
                    }
                    stored
                })
            })
            .collect();
        let acknowledged: u64 = workers
            .into_iter()
            .map(|w| w.join().expect("worker thread"))
            .sum();

        let records = FileLedger::open(&path).list(&alice).expect("list");
        assert_eq!(
            records.len() as u64,
            acknowledged,
            "every acknowledged append must be on disk"
        );
        let indices: Vec<u64> = records.iter().map(|r| r.owner_index).collect();
        assert_eq!(indices, (0..100).collect::<Vec<u64>>(), "indices must be dense");
    }

    #[test]
    fn test_file_ledger_reports_corrupt_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "not json").expect("write");
        let result = FileLedger::open(&path).count(&owner(1));
        assert!(matches!(result, Err(VaultError::Storage(_))));
    }
}
