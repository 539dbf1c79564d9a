//! Shell completion generation for orchctl.
//!
//! `orchctl completion bash > /etc/bash_completion.d/orchctl`, or
//! `source <(orchctl completion zsh)`.

use anyhow::Result;
use clap::{CommandFactory, ValueEnum};
use clap_complete::{generate, Shell as ClapShell};
use std::io;

use crate::cli::Cli;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

impl From<Shell> for ClapShell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => ClapShell::Bash,
            Shell::Zsh => ClapShell::Zsh,
            Shell::Fish => ClapShell::Fish,
        }
    }
}

pub fn execute(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(ClapShell::from(shell), &mut cmd, name, &mut io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_conversion() {
        let bash: ClapShell = Shell::Bash.into();
        assert!(matches!(bash, ClapShell::Bash));

        let zsh: ClapShell = Shell::Zsh.into();
        assert!(matches!(zsh, ClapShell::Zsh));
    }
}
