use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cidvault::secret::SecretIdentity;
use cidvault::types::{ContractScope, Principal};

#[derive(Parser)]
#[command(
    name = "cidvault",
    version,
    about = "Store content locators on a public ledger behind threshold-encrypted single-use secrets"
)]
pub struct Cli {
    /// Vault directory (defaults to $CIDVAULT_HOME, then ~/.cidvault)
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the vault directory, principal key and config
    Init(InitArgs),
    /// Show identity (principal, fingerprint)
    Whoami,
    /// Print the configured ledger contract address
    Address,
    /// Obfuscate a locator and store it on the ledger
    Store(StoreArgs),
    /// List stored records
    List(ListArgs),
    /// Recover stored locators through the decryption service
    Reveal(RevealArgs),
}

#[derive(Parser)]
pub struct InitArgs {
    /// Skip overwrite confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Base URL of a remote relayer (the local KMS is used when omitted)
    #[arg(long, value_name = "URL")]
    pub relayer: Option<String>,

    /// Ledger contract address
    #[arg(long, value_name = "ADDRESS")]
    pub contract: Option<ContractScope>,

    /// Chain id of the decryption signing domain
    #[arg(long, value_name = "ID")]
    pub chain_id: Option<u64>,
}

#[derive(Parser)]
pub struct StoreArgs {
    /// Display name of the record (public)
    #[arg(long)]
    pub name: String,

    /// Content locator to protect, e.g. an IPFS CID
    #[arg(long, value_name = "CID")]
    pub locator: String,

    /// Use this secret address instead of generating one (must never be reused)
    #[arg(long, value_name = "ADDRESS")]
    pub secret: Option<SecretIdentity>,

    /// Print the secret address after storing
    #[arg(long)]
    pub show_secret: bool,
}

#[derive(Parser)]
pub struct ListArgs {
    /// Principal whose records to list (defaults to own)
    #[arg(long, value_name = "PRINCIPAL")]
    pub owner: Option<Principal>,
}

#[derive(Parser)]
pub struct RevealArgs {
    /// Index of the record to reveal
    #[arg(value_name = "INDEX", required_unless_present = "all")]
    pub index: Option<u64>,

    /// Reveal every record
    #[arg(long, conflicts_with = "index")]
    pub all: bool,

    /// Principal who owns the records (defaults to own)
    #[arg(long, value_name = "PRINCIPAL")]
    pub owner: Option<Principal>,

    /// Render a QR code of each recovered locator
    #[arg(long)]
    pub qr: bool,
}
