use std::path::PathBuf;

use owo_colors::{OwoColorize, Stream::Stderr, Stream::Stdout};

use cidvault::auth::Credential;
use cidvault::util::{human_duration, unix_now};

use super::{record_failure_hint, VaultContext};
use crate::cli::RevealArgs;

/// Run the authorized-decryption handshake and print recovered locators.
///
/// One authorization covers every requested record. A record that cannot be
/// revealed is reported on its own line; the command fails if none succeed.
pub fn run_reveal(custom_home: Option<PathBuf>, args: RevealArgs) -> anyhow::Result<()> {
    let ctx = VaultContext::load(custom_home)?;
    let vault = ctx.vault();
    let owner = args.owner.unwrap_or_else(|| ctx.credential.principal());
    let now = unix_now();

    let results = match (args.all, args.index) {
        (true, _) => vault.retrieve_all(&owner, &ctx.credential, now)?,
        (false, Some(index)) => vault.retrieve_many(&owner, &ctx.credential, &[index], now)?,
        (false, None) => anyhow::bail!("Pass a record INDEX or --all"),
    };

    if results.is_empty() {
        println!(
            "{}",
            "No records. Store one with cidvault store."
                .if_supports_color(Stdout, |t| t.yellow())
        );
        return Ok(());
    }

    println!(
        "Authorization valid for {} via {}",
        human_duration(ctx.config.validity().as_secs()),
        ctx.backend.describe()
    );
    println!();

    let mut revealed = 0usize;
    let mut first_error = None;
    for retrieved in results {
        match retrieved.locator {
            Ok(locator) => {
                revealed += 1;
                println!(
                    "[{}] {}: {}",
                    retrieved.index,
                    retrieved.name,
                    locator.if_supports_color(Stdout, |t| t.cyan())
                );
                if args.qr {
                    qr2term::print_qr(&locator)
                        .map_err(|e| anyhow::anyhow!("QR code render failed: {}", e))?;
                }
            }
            Err(e) => {
                eprintln!(
                    "{}",
                    format!(
                        "[{}] {}: {} ({})",
                        retrieved.index,
                        retrieved.name,
                        e,
                        record_failure_hint(&e)
                    )
                    .if_supports_color(Stderr, |t| t.red())
                );
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if revealed == 0 => Err(e.into()),
        _ => Ok(()),
    }
}
