//! `rdm completions <shell>` – print a shell completion script.

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::cli::Cli;

pub fn run_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "rdm", &mut std::io::stdout());
    Ok(())
}
