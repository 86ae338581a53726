//! Completions command

use clap::CommandFactory;
use clap_complete::Shell;

use crate::Cli;

/// Print a completion script for `shell` to stdout.
pub fn completions(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "dot", &mut std::io::stdout());
}
