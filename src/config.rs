//! Vault directory layout and `config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::auth::{Eip712Domain, SECONDS_PER_DAY};
use crate::error::VaultError;
use crate::relayer::RetryPolicy;
use crate::types::ContractScope;
use crate::util::write_atomic;

pub const HOME_ENV: &str = "CIDVAULT_HOME";
pub const DEFAULT_DIR_NAME: &str = ".cidvault";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const SECRET_KEY_FILE_NAME: &str = "secret_key";
pub const LEDGER_FILE_NAME: &str = "ledger.json";
pub const KMS_FILE_NAME: &str = "kms.json";

/// Sepolia deployment of the vault contract.
pub const DEFAULT_CONTRACT: ContractScope = ContractScope::from_bytes([
    0x18, 0x88, 0xfb, 0x8f, 0x76, 0xb2, 0xbe, 0x01, 0x7b, 0xfe, 0x63, 0x25, 0x6d, 0xf3, 0x5e, 0xb3,
    0xf0, 0x38, 0xd7, 0xce,
]);
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;
/// Verifying contract of the decryption service's signing domain.
pub const DEFAULT_VERIFIER: ContractScope = ContractScope::from_bytes([
    0xb6, 0xe1, 0x60, 0xb1, 0xff, 0x80, 0xd6, 0x7b, 0xfe, 0x90, 0xa8, 0x5e, 0xe0, 0x6c, 0xe0, 0xa2,
    0x61, 0x36, 0x07, 0xd1,
]);

fn default_validity_days() -> u32 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Backoff settings for a busy decryption service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// Configuration stored in config.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Ledger contract records are written to
    pub contract: ContractScope,
    pub chain_id: u64,
    /// Verifying contract of the decryption signing domain
    pub verifier: ContractScope,
    /// Remote relayer base URL; the local KMS (kms.json) is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relayer_url: Option<String>,
    /// Whole days a signed authorization stays valid
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            contract: DEFAULT_CONTRACT,
            chain_id: DEFAULT_CHAIN_ID,
            verifier: DEFAULT_VERIFIER,
            relayer_url: None,
            validity_days: default_validity_days(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetrySettings::default(),
        }
    }
}

impl VaultConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.validity_days == 0 {
            anyhow::bail!("validity_days must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if let Some(url) = &self.relayer_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                anyhow::bail!("relayer_url must be an http(s) URL, got {}", url);
            }
        }
        Ok(())
    }

    pub fn domain(&self) -> Eip712Domain {
        Eip712Domain::new(self.chain_id, self.verifier)
    }

    pub fn validity(&self) -> Duration {
        Duration::from_secs(u64::from(self.validity_days) * SECONDS_PER_DAY)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }
}

/// A vault directory (~/.cidvault or custom).
#[derive(Debug, Clone)]
pub struct VaultHome {
    dir: PathBuf,
}

impl VaultHome {
    /// Resolve the vault directory: `custom`, then `$CIDVAULT_HOME`, then `~/.cidvault`.
    pub fn resolve(custom: Option<PathBuf>) -> anyhow::Result<Self> {
        let env = std::env::var_os(HOME_ENV).map(PathBuf::from);
        Self::resolve_from(custom, env, dirs::home_dir())
    }

    fn resolve_from(
        custom: Option<PathBuf>,
        env: Option<PathBuf>,
        home: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        if let Some(dir) = custom {
            return Ok(Self { dir });
        }
        if let Some(dir) = env.filter(|p| !p.as_os_str().is_empty()) {
            return Ok(Self { dir });
        }
        let home = home.ok_or(VaultError::HomeDirNotFound)?;
        Ok(Self {
            dir: home.join(DEFAULT_DIR_NAME),
        })
    }

    pub fn at(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn secret_key_path(&self) -> PathBuf {
        self.dir.join(SECRET_KEY_FILE_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE_NAME)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE_NAME)
    }

    pub fn kms_path(&self) -> PathBuf {
        self.dir.join(KMS_FILE_NAME)
    }

    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {} directory", self.dir.display()))
    }

    /// Load config.toml, falling back to defaults when the vault has none yet.
    pub fn load_config(&self) -> anyhow::Result<VaultConfig> {
        let path = self.config_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(VaultConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: VaultConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    pub fn save_config(&self, config: &VaultConfig) -> anyhow::Result<()> {
        config.validate()?;
        let content = toml::to_string_pretty(config).context("Failed to encode config")?;
        let path = self.config_path();
        write_atomic(&path, content.as_bytes(), false)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}
