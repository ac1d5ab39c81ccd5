//! Statement Sorter CLI
//!
//! Processes every account listed in a config file, one after another.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- config.json
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity (default `info`)

use statement_sorter::{config, process_account, Result, SorterError};
use std::env;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(SorterError::MissingArgument);
    }

    let accounts = config::load(&args[1])?;
    for account in &accounts {
        process_account(account)?;
    }

    Ok(())
}
