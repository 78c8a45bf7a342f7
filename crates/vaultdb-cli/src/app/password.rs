//! Password input.
//!
//! There is no interactive prompt: a password comes either from stdin (one
//! per line, with `--password-stdin`) or from an environment variable.

use std::io::BufRead;

use zeroize::Zeroizing;

use crate::errors::CliError;

pub struct PasswordReader {
    use_stdin: bool,
}

impl PasswordReader {
    pub fn new(use_stdin: bool) -> Self {
        Self { use_stdin }
    }

    /// Read the next password. `env_var` is consulted when stdin is not in
    /// use; `purpose` names the password in error messages.
    pub fn next(&mut self, env_var: &str, purpose: &str) -> anyhow::Result<Zeroizing<String>> {
        if self.use_stdin {
            return read_stdin_line(purpose);
        }
        env_password(env_var).ok_or_else(|| {
            CliError::invalid_input(format!(
                "No {} provided. Set {} or pass --password-stdin.",
                purpose, env_var
            ))
            .into()
        })
    }
}

fn env_password(name: &str) -> Option<Zeroizing<String>> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(Zeroizing::new)
}

fn read_stdin_line(purpose: &str) -> anyhow::Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    let read = std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| anyhow::anyhow!("Failed to read {} from stdin: {}", purpose, e))?;
    if read == 0 {
        return Err(CliError::invalid_input(format!("No {} on stdin.", purpose)).into());
    }
    let trimmed = line.trim_end_matches(|c: char| c == '\r' || c == '\n').len();
    line.truncate(trimmed);
    Ok(line)
}
