use std::path::PathBuf;

use owo_colors::{OwoColorize, Stream::Stdout};

use cidvault::auth::Credential;
use cidvault::util::{shorten, unix_now};

use super::VaultContext;
use crate::cli::StoreArgs;

pub fn run_store(custom_home: Option<PathBuf>, args: StoreArgs) -> anyhow::Result<()> {
    let ctx = VaultContext::load(custom_home)?;
    let vault = ctx.vault();
    let owner = ctx.credential.principal();

    let receipt = match args.secret {
        Some(secret) => vault.store_with_secret(&owner, &args.name, &args.locator, secret, unix_now())?,
        None => vault.store(&owner, &args.name, &args.locator, unix_now())?,
    };

    println!("{}", "Stored!".if_supports_color(Stdout, |t| t.green()));
    println!();
    println!("Index:      {}", receipt.index);
    println!("Name:       {}", args.name);
    println!("Ciphertext: {}", shorten(&receipt.ciphertext.to_hex(), 10, 6));
    println!("Handle:     {}", shorten(&receipt.handle.to_string(), 10, 6));
    if args.show_secret {
        println!(
            "Secret:     {}",
            receipt
                .secret
                .to_canonical_string()
                .as_str()
                .if_supports_color(Stdout, |t| t.yellow())
        );
    }
    println!();
    println!(
        "Recover it with {}",
        format!("cidvault reveal {}", receipt.index).if_supports_color(Stdout, |t| t.bold())
    );

    Ok(())
}
