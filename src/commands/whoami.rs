use std::path::PathBuf;

use cidvault::auth::Credential;
use cidvault::keys;

use super::VaultContext;

fn try_copy_to_clipboard(text: &str) -> bool {
    match arboard::Clipboard::new() {
        Ok(mut clipboard) => clipboard.set_text(text).is_ok(),
        Err(_) => false,
    }
}

pub fn run_whoami(custom_home: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = VaultContext::load(custom_home)?;
    let principal = ctx.credential.principal();
    let principal_text = principal.to_string();
    let fingerprint = keys::fingerprint::short_fingerprint(&principal);

    println!("Principal:   {}", principal_text);
    println!("Fingerprint: {}", fingerprint);
    println!("Contract:    {}", ctx.config.contract);
    println!("Backend:     {}", ctx.backend.describe());
    println!("Key file:    {}", ctx.home.secret_key_path().display());
    println!();

    if try_copy_to_clipboard(&principal_text) {
        println!("Principal copied to clipboard.");
    } else {
        println!("(Clipboard unavailable; copy the principal manually)");
    }

    Ok(())
}
