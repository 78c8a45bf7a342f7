//! vaultdb CLI - encrypt, unlock and rekey SQLCipher databases
//!
//! A thin command-line front end over `vaultdb-core`, covering the two
//! consumers of the library: the startup check ("is the database locked,
//! can it unlock itself") and the admin flows (encrypt, decrypt, rotate,
//! forget).

mod app;
mod cli;
mod commands;
mod config;
mod constants;
mod errors;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::AppContext;
use crate::cli::{Cli, Commands};
use crate::commands::{keychain, status, tools, transform, unlock};
use crate::constants::LOG_ENV;
use crate::errors::CliError;

fn main() {
    let cli = Cli::parse();
    init_logging();
    let ctx = AppContext::new(&cli);

    if let Err(e) = run(&ctx, &cli) {
        if let Some(cli_err) = e.downcast_ref::<CliError>() {
            cli_err.exit();
        }
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Log to stderr, filtered by VAULTDB_LOG (default: warnings only).
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run(ctx: &AppContext, cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Status { json } => status::handle_status(ctx, *json),
        Commands::Unlock {
            remember,
            no_input,
            password_stdin,
        } => unlock::handle_unlock(ctx, *remember, *no_input, *password_stdin),
        Commands::Encrypt(args) => transform::handle_encrypt(ctx, args),
        Commands::Decrypt(args) => transform::handle_decrypt(ctx, args),
        Commands::Rotate(args) => transform::handle_rotate(ctx, args),
        Commands::Forget => keychain::handle_forget(ctx),
        Commands::Config { write } => tools::handle_config(ctx, *write),
        Commands::Salt => tools::handle_salt(),
        Commands::CheckPassword { password_stdin } => {
            tools::handle_check_password(ctx, *password_stdin)
        }
        Commands::Completions { shell } => tools::handle_completions(*shell),
    }
}
