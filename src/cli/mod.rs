//! CLI module - Command-line interface for Memberhub
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

/// Memberhub - membership site with role-based page access
#[derive(Parser)]
#[command(name = "memberhub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the web server (default)
    #[command(alias = "daemon")]
    Serve,

    /// Ask the running instance on this machine to shut down
    Stop,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// Seed roles and access rules, then exit
    Seed,

    /// Unlock an account and print a new temporary password
    ResetPassword {
        /// User name
        username: String,
    },
}

pub use commands::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["memberhub"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_reset_password_takes_username() {
        let cli = Cli::try_parse_from(["memberhub", "reset-password", "alice"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::ResetPassword { username }) if username == "alice"
        ));
        assert!(Cli::try_parse_from(["memberhub", "reset-password"]).is_err());
    }
}
