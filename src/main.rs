//! ndvichip CLI entrypoint.
//!
//! Provides a thin wrapper over the `cli` module: parse args, build the chip
//! dataset, and exit with appropriate status.
//! For programmatic use, prefer the library API (`ndvichip::api`).

use clap::Parser;

mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::CliArgs::parse();
    cli::run(args)
}
