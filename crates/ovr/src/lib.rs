pub mod cli;
pub mod edit;
pub mod generate;
pub mod logging;
pub mod session;
pub mod validate;

use std::io::Write;

use anyhow::Result;

use crate::cli::{Cli, Commands};

/// Run one command under the CLI lock and return its exit code.
pub fn run(cli: &Cli, out: &mut dyn Write) -> Result<i32> {
    session::with_cli_lock(|| match &cli.command {
        Commands::Generate(args) => generate::run_generate(args, out),
        Commands::Validate(args) => validate::run_validate(args, out),
        Commands::Refresh(args) => edit::run_refresh(args, out),
        Commands::Add(args) => edit::run_add(args, out),
        Commands::Remove(args) => edit::run_remove(args, out),
    })
}
