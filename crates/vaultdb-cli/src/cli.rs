use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use vaultdb_core::VERSION;

/// vaultdb - Encrypt, unlock and rekey SQLCipher databases
#[derive(Parser)]
#[command(name = "vaultdb")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the database file
    #[arg(short, long, global = true, env = "VAULTDB_PATH")]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Arguments shared by commands that write a transformed copy
#[derive(Args)]
pub struct TransformArgs {
    /// Replace the original file with the result
    #[arg(long)]
    pub in_place: bool,

    /// With --in-place, keep the previous file as <database>.bak
    #[arg(long, requires = "in_place")]
    pub keep_backup: bool,

    /// Read the password(s) from stdin, one per line
    #[arg(long)]
    pub password_stdin: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show whether the database is plaintext or encrypted
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the database can be unlocked, using a remembered key first
    Unlock {
        /// Remember the password on this device after a successful unlock
        #[arg(long)]
        remember: bool,

        /// Never fall back to a password; fail if no remembered key works
        #[arg(long)]
        no_input: bool,

        /// Read the password from stdin
        #[arg(long)]
        password_stdin: bool,
    },

    /// Write an encrypted copy of a plaintext database
    Encrypt(TransformArgs),

    /// Write a plaintext copy of an encrypted database
    Decrypt(TransformArgs),

    /// Re-encrypt the database under a new password
    Rotate(TransformArgs),

    /// Delete the key remembered on this device
    Forget,

    /// Print the effective configuration as TOML
    Config {
        /// Write it to the config file instead of printing it
        #[arg(long)]
        write: bool,
    },

    /// Generate a random salt (base64)
    Salt,

    /// Check a password against the strength policy
    CheckPassword {
        /// Read the password from stdin
        #[arg(long)]
        password_stdin: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_name = "SHELL")]
        shell: Shell,
    },
}
