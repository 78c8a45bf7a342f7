//! Small utilities: salts, password policy, config, completions.

use clap::CommandFactory;
use clap_complete::generate;
use vaultdb_core::crypto::{generate_salt, salt_to_string, validate_password_strength};

use crate::app::{AppContext, PasswordReader};
use crate::cli::Cli;
use crate::config::write_config;
use crate::constants::PASSWORD_ENV;
use crate::errors::{classify, CliError};

pub fn handle_salt() -> anyhow::Result<()> {
    let salt = generate_salt().map_err(classify)?;
    println!("{}", salt_to_string(&salt));
    Ok(())
}

pub fn handle_check_password(ctx: &AppContext, password_stdin: bool) -> anyhow::Result<()> {
    let password = PasswordReader::new(password_stdin).next(PASSWORD_ENV, "password")?;
    let check = validate_password_strength(&password);
    if !check.valid {
        return Err(CliError::invalid_input(check.reason).into());
    }
    if !ctx.quiet() {
        println!("Password meets the strength policy.");
    }
    Ok(())
}

pub fn handle_config(ctx: &AppContext, write: bool) -> anyhow::Result<()> {
    let config = ctx.config()?;
    if write {
        let path = ctx.config_path()?;
        write_config(path, config)?;
        if !ctx.quiet() {
            println!("Wrote {}", path.display());
        }
        return Ok(());
    }
    let contents =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {}", e))?;
    print!("{}", contents);
    Ok(())
}

pub fn handle_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "vaultdb", &mut std::io::stdout());
    Ok(())
}
