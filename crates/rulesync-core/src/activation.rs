//! Restarting the consuming service and waiting for it to come back

use backoff::ExponentialBackoffBuilder;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: String,
        stderr: String,
    },

    #[error("{command} did not finish within {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("Service {service} not active after {waited:?}")]
    NotActive { service: String, waited: Duration },
}

/// Control over the process that consumes the live configuration.
pub trait ProcessControl {
    /// Name of the controlled service, for logs and errors.
    fn service(&self) -> &str;

    /// Restart the service, bounded by the implementation's timeout.
    fn restart(&self) -> Result<(), ActivationError>;

    /// Single liveness check.
    fn is_active(&self) -> Result<bool, ActivationError>;
}

/// `systemctl`-driven control of a unit.
#[derive(Debug, Clone)]
pub struct SystemdControl {
    unit: String,
    timeout: Duration,
    program: PathBuf,
}

impl SystemdControl {
    pub fn new(unit: impl Into<String>, timeout: Duration) -> Self {
        Self {
            unit: unit.into(),
            timeout,
            program: PathBuf::from("systemctl"),
        }
    }

    /// Use another executable with `systemctl`'s calling convention.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.program.display(), args.join(" "))
    }

    /// Run the program with a deadline, returning its status and stderr.
    ///
    /// Stderr is drained on its own thread so a chatty command cannot
    /// block on a full pipe while we wait for it.
    fn run(&self, args: &[&str]) -> Result<(ExitStatus, String), ActivationError> {
        let command = self.describe(args);
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ActivationError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut bytes = Vec::new();
                pipe.read_to_end(&mut bytes).map(|_| bytes)
            })
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    if let Err(e) = child.kill() {
                        tracing::debug!(command = %command, error = %e, "Failed to kill timed out command");
                    }
                    if let Err(e) = child.wait() {
                        tracing::debug!(command = %command, error = %e, "Failed to reap timed out command");
                    }
                    return Err(ActivationError::Timeout {
                        command,
                        after: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => return Err(ActivationError::Spawn { command, source }),
            }
        };

        Ok((status, collect_stderr(&command, stderr_reader)))
    }
}

fn collect_stderr(command: &str, reader: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    match reader.join() {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Ok(Err(e)) => {
            tracing::debug!(command = %command, error = %e, "Failed to read command stderr");
            String::new()
        }
        Err(_) => {
            tracing::debug!(command = %command, "Stderr reader thread panicked");
            String::new()
        }
    }
}

impl ProcessControl for SystemdControl {
    fn service(&self) -> &str {
        &self.unit
    }

    fn restart(&self) -> Result<(), ActivationError> {
        let args = ["restart", self.unit.as_str()];
        let (status, stderr) = self.run(&args)?;
        if !status.success() {
            return Err(ActivationError::CommandFailed {
                command: self.describe(&args),
                code: status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".into()),
                stderr,
            });
        }
        tracing::info!(service = %self.unit, "Restarted service");
        Ok(())
    }

    fn is_active(&self) -> Result<bool, ActivationError> {
        let (status, _) = self.run(&["is-active", "--quiet", self.unit.as_str()])?;
        Ok(status.success())
    }
}

/// Poll `control` every `interval` until it reports active or `timeout`
/// elapses. At least one check is always made.
pub fn wait_until_active(
    control: &dyn ProcessControl,
    timeout: Duration,
    interval: Duration,
) -> Result<(), ActivationError> {
    let started = Instant::now();
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(interval)
        .with_max_interval(interval)
        .with_multiplier(1.0)
        .with_randomization_factor(0.0)
        .with_max_elapsed_time(Some(timeout))
        .build();

    let check = || match control.is_active() {
        Ok(true) => Ok(()),
        Ok(false) => Err(backoff::Error::transient(ActivationError::NotActive {
            service: control.service().to_string(),
            waited: started.elapsed(),
        })),
        Err(e) => {
            tracing::debug!(service = %control.service(), error = %e, "Liveness check failed");
            Err(backoff::Error::transient(e))
        }
    };

    backoff::retry(policy, check).map_err(|e| match e {
        backoff::Error::Permanent(err) | backoff::Error::Transient { err, .. } => match err {
            ActivationError::NotActive { service, .. } => ActivationError::NotActive {
                service,
                waited: started.elapsed(),
            },
            other => other,
        },
    })?;

    tracing::info!(service = %control.service(), waited = ?started.elapsed(), "Service is active");
    Ok(())
}
