//! cidvault library crate: the locator protocol, its collaborators, and vault orchestration.
//!
//! All modules are public so the `cidvault` binary and `tests/` integration tests
//! use the same API, e.g. `use cidvault::vault::Vault`.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod kms;
pub mod ledger;
pub mod locator;
pub mod record;
pub mod relayer;
pub mod secret;
pub mod types;
pub mod util;
pub mod vault;
