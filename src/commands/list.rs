/// List command: displays the owner's records from the ledger.
use std::path::PathBuf;

use owo_colors::{OwoColorize, Stream::Stdout};

use cidvault::auth::Credential;
use cidvault::util::{human_duration, shorten, unix_now};

use super::VaultContext;
use crate::cli::ListArgs;

/// Show the records stored by `--owner` (default: own principal).
///
/// Only public metadata is shown; locators stay encrypted until `reveal`.
pub fn run_list(custom_home: Option<PathBuf>, args: ListArgs) -> anyhow::Result<()> {
    use comfy_table::{Cell, Color, Table};

    let ctx = VaultContext::load(custom_home)?;
    let owner = args.owner.unwrap_or_else(|| ctx.credential.principal());
    let records = ctx.vault().list(&owner)?;

    if records.is_empty() {
        println!(
            "{}",
            "No records. Store one with cidvault store."
                .if_supports_color(Stdout, |t| t.yellow())
        );
        return Ok(());
    }

    let now = unix_now();
    let mut table = Table::new();
    table.set_header(vec!["Index", "Name", "Age", "Ciphertext", "Handle"]);
    for record in &records {
        table.add_row(vec![
            Cell::new(record.owner_index).fg(Color::Cyan),
            Cell::new(&record.name),
            Cell::new(human_duration(now.saturating_sub(record.created_at))),
            Cell::new(shorten(&record.locator_ciphertext.to_hex(), 10, 6)),
            Cell::new(shorten(&record.encrypted_secret_handle.to_string(), 10, 6)),
        ]);
    }

    println!("{table}");
    println!("{} record(s) for {}", records.len(), shorten(&owner.to_string(), 10, 6));

    Ok(())
}
