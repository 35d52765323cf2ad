//! Command-line interface for Warden.

pub mod commands;

use clap::{Parser, Subcommand};

/// Warden - admin backend with RBAC, two-factor auth and audit logging
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server with the background scheduler (default)
    #[command(alias = "daemon", alias = "-d")]
    Serve,

    /// Apply pending database migrations and exit
    Migrate,

    /// Run one cleanup pass and exit
    Cleanup,

    /// Write a default config.toml if none exists
    Init,

    /// Print the argon2 hash of a password
    #[command(alias = "hash")]
    HashPassword {
        /// Password to hash; read from stdin when omitted
        password: Option<String>,
    },
}
