//! Whorl command-line interface.
//!
//! ```bash
//! whorl create magic_lamp --description "A lamp that grants one wish."
//! whorl package magic_lamp
//! whorl get MagicLamp.whorl
//! whorl use magic_lamp --wish gold
//! whorl list --format json
//! ```

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use whorl_cli::Cli;
use whorl_cli::runner::{execute_command, exit_code_for, init_logging};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let exit_code = match execute_command(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "ERROR:".red().bold());
            exit_code_for(&err)
        }
    };

    std::process::exit(exit_code.as_i32());
}
