use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::log::LogTail;
use crate::config;

/// Time given to the output readers to catch the last lines after an exit
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How a relay process is started and watched, shared by every worker
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub program: String,
    pub args: Vec<String>,
    pub grace_window: Duration,
    pub stop_timeout: Duration,
    pub log_lines: usize,
    pub log_line_max: usize,
}

impl From<&config::Relay> for RelayOptions {
    fn from(cfg: &config::Relay) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            grace_window: cfg.grace_window(),
            stop_timeout: cfg.stop_timeout(),
            log_lines: cfg.log_lines,
            log_line_max: cfg.log_line_max,
        }
    }
}

impl RelayOptions {
    pub fn render_args(&self, input: &str, output: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace("{input}", input).replace("{output}", output))
            .collect()
    }
}

/// Result of one launch, decided at the end of the grace window
pub enum Verdict {
    Established(RunningRelay),
    Failed {
        code: Option<i32>,
        diagnostic: String,
    },
    Cancelled,
}

/// How an established relay ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// Terminated on request
    Stopped,
    /// Exited cleanly, usually the source went away
    Finished,
    Crashed {
        code: Option<i32>,
        diagnostic: String,
    },
}

/// One outbound copy from the ingest pull url to one destination
#[derive(Debug, Clone)]
pub struct RelayWorker {
    pub session: String,
    pub destination: String,
    input: String,
    output: String,
    options: RelayOptions,
}

impl RelayWorker {
    pub fn new(
        session: String,
        destination: String,
        input: String,
        output: String,
        options: RelayOptions,
    ) -> Self {
        Self {
            session,
            destination,
            input,
            output,
            options,
        }
    }

    pub async fn launch(&self, cancel: &CancellationToken) -> Verdict {
        let args = self.options.render_args(&self.input, &self.output);
        let mut child = match Command::new(&self.options.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return Verdict::Failed {
                    code: None,
                    diagnostic: format!("failed to start {}: {}", self.options.program, e),
                }
            }
        };

        let pid = child.id();
        debug!(
            session = self.session,
            destination = self.destination,
            ?pid,
            "relay process started"
        );

        let tail = LogTail::new(self.options.log_lines, self.options.log_line_max);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tail.follow(stdout, self.destination.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tail.follow(stderr, self.destination.clone()));
        }

        enum Early {
            Exited(io::Result<ExitStatus>),
            Grace,
            Cancel,
        }

        let early = tokio::select! {
            status = child.wait() => Early::Exited(status),
            _ = tokio::time::sleep(self.options.grace_window) => Early::Grace,
            _ = cancel.cancelled() => Early::Cancel,
        };

        match early {
            Early::Grace => Verdict::Established(RunningRelay {
                child,
                pid,
                tail,
                readers,
                destination: self.destination.clone(),
                stop_timeout: self.options.stop_timeout,
            }),
            Early::Cancel => {
                stop(&mut child, self.options.stop_timeout).await;
                abort(readers);
                Verdict::Cancelled
            }
            Early::Exited(Ok(status)) => {
                let diagnostic = drain(&tail, readers, &status).await;
                Verdict::Failed {
                    code: status.code(),
                    diagnostic,
                }
            }
            Early::Exited(Err(e)) => {
                stop(&mut child, self.options.stop_timeout).await;
                abort(readers);
                Verdict::Failed {
                    code: None,
                    diagnostic: format!("failed to wait for relay: {}", e),
                }
            }
        }
    }
}

/// An established relay, owns the child until it is reaped
pub struct RunningRelay {
    child: Child,
    pid: Option<u32>,
    tail: LogTail,
    readers: Vec<JoinHandle<()>>,
    destination: String,
    stop_timeout: Duration,
}

impl RunningRelay {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the process to end on its own or for `cancel`
    pub async fn supervise(mut self, cancel: &CancellationToken) -> Exit {
        let exited = tokio::select! {
            status = self.child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        match exited {
            None => {
                stop(&mut self.child, self.stop_timeout).await;
                abort(self.readers);
                info!(destination = self.destination, pid = ?self.pid, "relay stopped");
                Exit::Stopped
            }
            Some(Ok(status)) if status.success() => {
                drain(&self.tail, self.readers, &status).await;
                Exit::Finished
            }
            Some(Ok(status)) => Exit::Crashed {
                code: status.code(),
                diagnostic: drain(&self.tail, self.readers, &status).await,
            },
            Some(Err(e)) => {
                stop(&mut self.child, self.stop_timeout).await;
                abort(self.readers);
                Exit::Crashed {
                    code: None,
                    diagnostic: format!("failed to wait for relay: {}", e),
                }
            }
        }
    }
}

/// SIGTERM, then SIGKILL when the process outlives `timeout`. Always reaps.
pub async fn stop(child: &mut Child, timeout: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    if let Some(pid) = child.id() {
        match signal::terminate(pid) {
            Ok(_) => match tokio::time::timeout(timeout, child.wait()).await {
                Ok(Ok(_)) => return,
                Ok(Err(e)) => warn!(pid, "error waiting for relay: {}", e),
                Err(_) => warn!(pid, "relay ignored SIGTERM, killing"),
            },
            Err(e) => debug!(pid, "SIGTERM failed: {}", e),
        }
    }

    if let Err(e) = child.kill().await {
        warn!("failed to kill relay: {}", e);
    }
}

async fn drain(tail: &LogTail, readers: Vec<JoinHandle<()>>, status: &ExitStatus) -> String {
    for mut reader in readers {
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut reader).await.is_err() {
            reader.abort();
        }
    }
    let text = tail.text();
    if text.is_empty() {
        format!("relay exited with {}", status)
    } else {
        text
    }
}

fn abort(readers: Vec<JoinHandle<()>>) {
    for reader in readers {
        reader.abort();
    }
}
