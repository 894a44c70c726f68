use std::path::PathBuf;

use cidvault::config::VaultHome;

/// Print the ledger contract address. Works before `init`, showing the default.
pub fn run_address(custom_home: Option<PathBuf>) -> anyhow::Result<()> {
    let home = VaultHome::resolve(custom_home)?;
    let config = home.load_config()?;
    println!("{}", config.contract);
    Ok(())
}
