//! Secret Service backend driven through the `secret-tool` CLI.
//!
//! ```text
//! secret-tool store --label=<label> application <instance>   (secret on stdin)
//! secret-tool lookup application <instance>                  (secret on stdout)
//! secret-tool clear application <instance>
//! ```
//!
//! Every call waits a bounded time for the helper, including for its
//! output pipes to close; a helper that hangs is killed and the call is
//! reported as failed.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, sleep};
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use zeroize::Zeroizing;

use super::{SecretStore, SecretToolTimeouts};

/// Attribute name the entry is stored under.
const ATTRIBUTE: &str = "application";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct SecretToolStore {
    program: PathBuf,
    instance: String,
    timeouts: SecretToolTimeouts,
    available: OnceCell<bool>,
}

struct ToolOutput {
    status: ExitStatus,
    stdout: Zeroizing<String>,
    stderr: String,
}

#[derive(Debug)]
enum ToolFailure {
    Spawn(std::io::Error),
    Io(std::io::Error),
    TimedOut,
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolFailure::Spawn(err) => write!(f, "could not start helper: {}", err),
            ToolFailure::Io(err) => write!(f, "helper I/O failed: {}", err),
            ToolFailure::TimedOut => write!(f, "helper did not answer in time"),
        }
    }
}

impl SecretToolStore {
    pub fn new(program: impl Into<PathBuf>, instance: &str, timeouts: SecretToolTimeouts) -> Self {
        Self {
            program: program.into(),
            instance: instance.to_string(),
            timeouts,
            available: OnceCell::new(),
        }
    }

    fn run(&self, args: &[&str], stdin: Option<&str>, timeout: Duration) -> Result<ToolOutput, ToolFailure> {
        let deadline = Instant::now() + timeout;
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ToolFailure::Spawn)?;

        // Pipes are drained on their own threads: a daemon autolaunched by
        // the helper can inherit them and keep them open after the helper
        // itself has exited.
        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // Dropping the pipe closes stdin so the helper sees EOF.
            if let Err(err) = pipe.write_all(input.as_bytes()) {
                kill_quietly(&mut child);
                return Err(ToolFailure::Io(err));
            }
        }

        let status = wait_bounded(&mut child, deadline)?;
        let stdout = collect(&stdout_rx, deadline)?;
        let stderr = collect(&stderr_rx, deadline)?;

        Ok(ToolOutput {
            status,
            stdout: Zeroizing::new(String::from_utf8_lossy(&stdout).into_owned()),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    fn probe(&self) -> bool {
        // A lookup answers 0 (found) or 1 with no diagnostics (not found)
        // when the daemon is reachable.
        match self.run(&["lookup", ATTRIBUTE, self.instance.as_str()], None, self.timeouts.probe) {
            Ok(output) => {
                let reachable = output.status.success()
                    || (output.status.code() == Some(1) && output.stderr.trim().is_empty());
                if !reachable {
                    tracing::debug!(stderr = %output.stderr.trim(), "secret-tool probe failed");
                }
                reachable
            }
            Err(err) => {
                tracing::debug!(error = %err, "secret-tool unavailable");
                false
            }
        }
    }
}

fn wait_bounded(child: &mut Child, deadline: Instant) -> Result<ExitStatus, ToolFailure> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                kill_quietly(child);
                return Err(ToolFailure::TimedOut);
            }
            Ok(None) => sleep(POLL_INTERVAL),
            Err(err) => {
                kill_quietly(child);
                return Err(ToolFailure::Io(err));
            }
        }
    }
}

type Drained = Receiver<std::io::Result<Zeroizing<Vec<u8>>>>;

/// Read `pipe` to EOF on a background thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Drained {
    let (tx, rx) = mpsc::channel();
    match pipe {
        Some(mut pipe) => {
            thread::spawn(move || {
                let mut buf = Zeroizing::new(Vec::new());
                let result = pipe.read_to_end(&mut buf).map(|_| buf);
                // The receiver is gone if the call already timed out.
                let _ = tx.send(result);
            });
        }
        None => {
            let _ = tx.send(Ok(Zeroizing::new(Vec::new())));
        }
    }
    rx
}

fn collect(rx: &Drained, deadline: Instant) -> Result<Zeroizing<Vec<u8>>, ToolFailure> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining) {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(err)) => Err(ToolFailure::Io(err)),
        Err(RecvTimeoutError::Timeout) => Err(ToolFailure::TimedOut),
        Err(RecvTimeoutError::Disconnected) => Err(ToolFailure::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe reader stopped",
        ))),
    }
}

fn kill_quietly(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl SecretStore for SecretToolStore {
    fn store_key(&self, secret: &str, label: &str) -> bool {
        let label_arg = format!("--label={}", label);
        match self.run(
            &["store", label_arg.as_str(), ATTRIBUTE, self.instance.as_str()],
            Some(secret),
            self.timeouts.store,
        ) {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                tracing::warn!(
                    code = ?output.status.code(),
                    stderr = %output.stderr.trim(),
                    "secret-tool store failed"
                );
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "secret-tool store failed");
                false
            }
        }
    }

    fn retrieve_key(&self) -> Option<String> {
        match self.run(&["lookup", ATTRIBUTE, self.instance.as_str()], None, self.timeouts.lookup) {
            Ok(output) if output.status.success() => {
                let secret = output
                    .stdout
                    .strip_suffix('\n')
                    .unwrap_or(output.stdout.as_str());
                if secret.is_empty() {
                    None
                } else {
                    Some(secret.to_string())
                }
            }
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, "secret-tool lookup failed");
                None
            }
        }
    }

    fn remove_key(&self) -> bool {
        match self.run(&["clear", ATTRIBUTE, self.instance.as_str()], None, self.timeouts.store) {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                tracing::warn!(
                    code = ?output.status.code(),
                    stderr = %output.stderr.trim(),
                    "secret-tool clear failed"
                );
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "secret-tool clear failed");
                false
            }
        }
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| self.probe())
    }

    fn name(&self) -> &'static str {
        "secret-tool"
    }
}

impl std::fmt::Debug for SecretToolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretToolStore")
            .field("program", &self.program)
            .field("instance", &self.instance)
            .finish()
    }
}
