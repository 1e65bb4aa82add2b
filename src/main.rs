use anyhow::Result;
use cli::UsageError;
use config::Config;
use log::debug;
use std::{env, io, process};

mod cli;
mod config;

const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = 2;

/// Allocates IP addresses and ports from records under the configured data directory.
///
/// The data directory defaults to `./data` and can be set with `IPAM_DATA_DIR` or a
/// `data_dir` entry in `ipam.toml`.
///
/// To enable logging, set the RUST_LOG environment variable:
/// - Bash/Shell: `RUST_LOG=debug ipam list-ports my-host`
///
/// Available log levels: error, warn, info, debug, trace
fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        let code = exit_code(&e);
        if matches!(
            e.downcast_ref::<UsageError>(),
            Some(UsageError::MissingCommand | UsageError::UnknownCommand(_))
        ) {
            eprintln!("{}", cli::usage());
        }
        eprintln!("Error: {:#}", e);
        process::exit(code);
    }
}

fn run(args: &[String]) -> Result<()> {
    let command = cli::parse(args)?;
    let config = Config::load()?;
    debug!(
        "Running {:?} with data directory {}",
        command,
        config.data_dir.display()
    );

    let stdout = io::stdout();
    cli::execute(command, &config.data_dir, &mut stdout.lock())
}

fn exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<UsageError>().is_some() {
        EXIT_USAGE
    } else {
        EXIT_FAILURE
    }
}
