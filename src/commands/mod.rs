pub mod address;
pub mod init;
pub mod list;
pub mod reveal;
pub mod store;
pub mod whoami;

use std::path::PathBuf;

use cidvault::auth::LocalCredential;
use cidvault::config::{VaultConfig, VaultHome};
use cidvault::error::VaultError;
use cidvault::kms::{LocalKms, ThresholdEncryptor};
use cidvault::ledger::FileLedger;
use cidvault::relayer::{DecryptionService, HttpRelayer};
use cidvault::vault::Vault;

/// Where threshold encryption and decryption happen for this vault.
pub enum Backend {
    Local(LocalKms),
    Remote(HttpRelayer),
}

impl Backend {
    pub fn open(home: &VaultHome, config: &VaultConfig) -> anyhow::Result<Self> {
        match &config.relayer_url {
            Some(url) => Ok(Backend::Remote(HttpRelayer::new(
                url,
                config.domain(),
                config.request_timeout(),
            )?)),
            None => Ok(Backend::Local(LocalKms::open(&home.kms_path(), config.domain())?)),
        }
    }

    pub fn encryptor(&self) -> &dyn ThresholdEncryptor {
        match self {
            Backend::Local(kms) => kms,
            Backend::Remote(relayer) => relayer,
        }
    }

    pub fn service(&self) -> &dyn DecryptionService {
        match self {
            Backend::Local(kms) => kms,
            Backend::Remote(relayer) => relayer,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Backend::Local(_) => "local KMS".to_string(),
            Backend::Remote(relayer) => format!("relayer {}", relayer.base_url()),
        }
    }
}

/// Everything a command needs from an initialized vault directory.
pub struct VaultContext {
    pub home: VaultHome,
    pub config: VaultConfig,
    pub credential: LocalCredential,
    pub ledger: FileLedger,
    pub backend: Backend,
}

impl VaultContext {
    pub fn load(custom_home: Option<PathBuf>) -> anyhow::Result<Self> {
        let home = VaultHome::resolve(custom_home)?;
        let credential = cidvault::keys::store::load_credential(&home)?;
        let config = home.load_config()?;
        let ledger = FileLedger::open(&home.ledger_path());
        let backend = Backend::open(&home, &config)?;
        tracing::debug!(dir = %home.dir().display(), backend = %backend.describe(), "vault loaded");
        Ok(Self {
            home,
            config,
            credential,
            ledger,
            backend,
        })
    }

    pub fn vault(&self) -> Vault<'_> {
        Vault::new(
            &self.ledger,
            self.backend.encryptor(),
            self.backend.service(),
            self.config.contract,
            self.config.validity(),
        )
        .with_retry(self.config.retry_policy())
    }
}

/// A one-line next step for failures the user can act on.
pub fn failure_hint(error: &anyhow::Error) -> Option<&'static str> {
    let vault_error = error.downcast_ref::<VaultError>()?;
    if vault_error.is_authorization_failure() {
        Some("Authorization failed: retry the handshake with `cidvault reveal`.")
    } else if vault_error.is_data_failure() {
        Some("Data is corrupted or the secret does not match this record; retrying will not help.")
    } else if vault_error.is_retryable() {
        Some("The decryption service is unavailable; try again later.")
    } else {
        None
    }
}

/// Short label for a per-record failure in `reveal` output.
pub fn record_failure_hint(error: &VaultError) -> &'static str {
    if error.is_authorization_failure() {
        "retry the handshake"
    } else if error.is_data_failure() {
        "data corrupted or wrong secret"
    } else {
        "not released by the decryption service"
    }
}
