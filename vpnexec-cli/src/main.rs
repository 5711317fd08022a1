//! vpn-exec
//!
//! Runs a command inside a pre-built mount and network namespace pair,
//! then drops back to the invoking user before handing over.

use std::process;

use clap::Parser;
use tracing::Level;

mod cli;
mod run;

use cli::Cli;

fn main() {
    // Every failure exits 1, including argument errors (clap would use 2)
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = i32::from(e.use_stderr());
            // Nowhere left to report a failed write of the diagnostic
            e.print().ok();
            process::exit(code);
        }
    };

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    // stdout belongs to the target command
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let Err(e) = run::execute(&cli);
    eprintln!("vpn-exec: {e}");
    process::exit(1);
}
