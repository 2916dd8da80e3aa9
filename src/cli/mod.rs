pub mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vault-guard")]
#[command(about = "Locked secret store with owner-gated unlock and an audit trail", long_about = None)]
pub struct Cli {
    /// Config file (created with defaults if missing)
    #[arg(long, global = true, default_value = "vault.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the commitment for a password without creating anything
    Commit {
        #[arg(long)]
        password: String,
    },
    /// Create a new locked store
    Create {
        #[arg(long)]
        owner: String,
        /// Password to lock with (max 31 bytes)
        #[arg(long, conflicts_with = "commitment", required_unless_present = "commitment")]
        password: Option<String>,
        /// Precomputed commitment, hex
        #[arg(long)]
        commitment: Option<String>,
    },
    /// Attempt to unlock a store
    Unlock {
        #[arg(long)]
        store: u64,
        #[arg(long)]
        caller: String,
        #[arg(long)]
        password: String,
    },
    /// Show whether a store is locked
    Status {
        #[arg(long)]
        store: u64,
    },
    /// List a store's audit entries (owner only)
    Audit {
        #[arg(long)]
        store: u64,
        #[arg(long)]
        caller: String,
        /// Only entries made by this principal
        #[arg(long)]
        principal: Option<String>,
        #[arg(long)]
        transitions_only: bool,
        #[arg(long)]
        json: bool,
    },
    /// Dump the raw persisted slot of a store
    Inspect {
        #[arg(long)]
        store: u64,
    },
}
