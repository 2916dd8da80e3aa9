use clap::Parser;
use tracing_subscriber::EnvFilter;

use vault_guard::cli::{store, Cli, Commands};
use vault_guard::config::VaultConfig;
use vault_guard::{Result, Vault};

fn init_logging(level: &str) {
    // RUST_LOG wins over the config file.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<bool> {
    let config = VaultConfig::load_or_default(&cli.config)?;
    init_logging(&config.log.level);

    // `commit` needs no database.
    let open = || Vault::open(&config);
    match cli.command {
        Commands::Commit { password } => {
            store::handle_commit(&password)?;
            Ok(true)
        }
        Commands::Create { owner, password, commitment } => {
            let vault = open()?;
            store::handle_create(&vault, &owner, password.as_deref(), commitment.as_deref())?;
            vault.flush()?;
            Ok(true)
        }
        Commands::Unlock { store: id, caller, password } => {
            let vault = open()?;
            let unlocked = store::handle_unlock(&vault, id, &caller, &password)?;
            // A flush that failed after the commit is reported here.
            vault.flush()?;
            Ok(unlocked)
        }
        Commands::Status { store: id } => {
            store::handle_status(&open()?, id)?;
            Ok(true)
        }
        Commands::Audit { store: id, caller, principal, transitions_only, json } => {
            store::handle_audit(&open()?, id, &caller, principal.as_deref(), transitions_only, json)
        }
        Commands::Inspect { store: id } => {
            store::handle_inspect(&open()?, id)?;
            Ok(true)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}
