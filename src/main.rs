//! Account Ledger CLI
//!
//! Replays a CSV of account commands and outputs the final account states.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv --config ledger.toml --audit audit.jsonl > accounts.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Overrides the configured `log_level`

use account_ledger::{AccountLedger, LedgerConfig, Replayer, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "account-ledger", version, about)]
struct Cli {
    /// CSV file of account commands
    input: PathBuf,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Append audit events as JSON lines to this file
    #[arg(long)]
    audit: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = LedgerConfig::load(cli.config.as_deref())?;
    if cli.audit.is_some() {
        config.audit_path = cli.audit;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    let file = File::open(&cli.input)?;
    let reader = BufReader::new(file);

    let replayer = Replayer::new(AccountLedger::from_config(&config)?);
    replayer.process_csv(reader)?;

    let stdout = io::stdout();
    let handle = stdout.lock();
    replayer.write_output(handle)?;

    Ok(())
}
