#![forbid(unsafe_code)]

use clap::Parser;
use nf_io::{DropNaCommand, IoError, run_dropna};

fn run() -> Result<(), IoError> {
    let command = DropNaCommand::parse();
    let output = run_dropna(&command)?;
    print!("{}", output.csv);
    if let Some(ledger) = output.ledger_json {
        eprintln!("{ledger}");
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
