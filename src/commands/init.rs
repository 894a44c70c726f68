use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use anyhow::Context;
use owo_colors::{OwoColorize, Stream::Stdout};

use cidvault::auth::{Credential, LocalCredential};
use cidvault::config::{VaultConfig, VaultHome};
use cidvault::keys::{fingerprint, store};

use crate::cli::InitArgs;

pub fn run_init(custom_home: Option<PathBuf>, args: InitArgs) -> anyhow::Result<()> {
    // ── 1. Resolve and create the vault directory ────────────────────────
    let home = VaultHome::resolve(custom_home)?;
    home.ensure_dir()?;
    let secret_key_path = home.secret_key_path();

    // ── 2. Overwrite guard ───────────────────────────────────────────────
    if store::credential_exists(&home) && !args.yes {
        let should_overwrite = prompt_overwrite(&home, &secret_key_path)?;
        if !should_overwrite {
            println!("Aborted.");
            return Ok(());
        }
    }

    // ── 3. Config: keep existing values, apply flags ─────────────────────
    let mut config = if home.config_path().exists() {
        home.load_config()?
    } else {
        VaultConfig::default()
    };
    if let Some(contract) = args.contract {
        config.contract = contract;
    }
    if let Some(chain_id) = args.chain_id {
        config.chain_id = chain_id;
    }
    if let Some(relayer) = args.relayer {
        config.relayer_url = Some(relayer.trim_end_matches('/').to_string());
    }
    config.validate().context("Invalid init options")?;

    // ── 4. Generate and write the principal key ──────────────────────────
    let credential = LocalCredential::generate()?;
    store::write_credential_atomic(&credential, &secret_key_path)
        .context("Failed to write principal key")?;
    home.save_config(&config)?;

    // ── 5. Success output ────────────────────────────────────────────────
    let principal = credential.principal();
    println!(
        "{}",
        "Principal key generated successfully.".if_supports_color(Stdout, |t| t.green())
    );
    println!();
    println!("Principal:   {}", principal);
    println!("Fingerprint: {}", fingerprint::short_fingerprint(&principal));
    println!("Key file:    {}", secret_key_path.display());
    println!("Contract:    {}", config.contract);
    match &config.relayer_url {
        Some(url) => println!("Relayer:     {}", url),
        None => println!("Relayer:     local KMS ({})", home.kms_path().display()),
    }
    println!();
    println!(
        "Next: run {} to store your first locator.",
        "cidvault store --name <NAME> --locator <CID>".if_supports_color(Stdout, |t| t.bold())
    );

    Ok(())
}

fn prompt_overwrite(home: &VaultHome, existing_key_path: &Path) -> anyhow::Result<bool> {
    // No terminal, no prompt
    if !io::stdin().is_terminal() {
        eprintln!("Use --yes to confirm overwrite in non-interactive mode");
        return Ok(false);
    }

    let identifier = match store::load_credential(home) {
        Ok(credential) => fingerprint::short_fingerprint(&credential.principal()),
        Err(_) => "(unreadable)".to_string(),
    };

    dialoguer::Confirm::new()
        .with_prompt(format!(
            "Key {} already exists at {}. Records stored under it become unrecoverable. Overwrite?",
            identifier,
            existing_key_path.display()
        ))
        .default(false)
        .interact()
        .map_err(|e| anyhow::anyhow!("prompt failed: {}", e))
}
