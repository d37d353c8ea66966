//! Capturing proxy supervision
//!
//! The proxy is an external program (mitmdump by default) that records every
//! exchange routed through it into a dump file. It is started in its own
//! process group so that helper processes it forks are signalled together,
//! and it is always stopped with a bounded grace period.

use crate::config::ProxyConfig;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors raised while supervising the proxy
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited before accepting connections ({status}): {stderr}")]
    ExitedEarly {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{program} did not accept connections on port {port} within {}ms", timeout.as_millis())]
    NotReady {
        program: String,
        port: u16,
        timeout: Duration,
    },

    #[error("Failed to manage proxy process: {0}")]
    Io(#[from] io::Error),
}

/// A running capturing proxy listening on 127.0.0.1
pub struct CapturingProxy {
    child: Child,
    program: String,
    port: u16,
    grace: Duration,
    stderr: Option<JoinHandle<String>>,
}

impl CapturingProxy {
    /// Starts the proxy and waits until it accepts connections
    ///
    /// # Arguments
    ///
    /// * `config` - Program, port and timeouts
    /// * `dump_path` - Where the proxy writes captured flows
    ///
    /// # Returns
    ///
    /// * `Ok(CapturingProxy)` - The proxy is listening
    /// * `Err(ProxyError)` - It could not be launched, exited, or never became ready
    pub async fn start(config: &ProxyConfig, dump_path: &Path) -> Result<Self, ProxyError> {
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .arg("-w")
            .arg(dump_path)
            .arg("-p")
            .arg(config.port.to_string());

        tracing::info!(
            "Starting capturing proxy {} on port {} (dump: {})",
            config.program,
            config.port,
            dump_path.display()
        );

        Self::spawn(
            command,
            &config.program,
            config.port,
            Duration::from_millis(config.startup_timeout_ms),
            Duration::from_millis(config.shutdown_grace_ms),
        )
        .await
    }

    async fn spawn(
        mut command: Command,
        program: &str,
        port: u16,
        startup_timeout: Duration,
        grace: Duration,
    ) -> Result<Self, ProxyError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ProxyError::Spawn {
            program: program.to_string(),
            source,
        })?;

        // Drained in the background so a chatty proxy never blocks on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).trim().to_string()
            })
        });

        let mut proxy = Self {
            child,
            program: program.to_string(),
            port,
            grace,
            stderr,
        };

        if let Err(e) = proxy.wait_ready(startup_timeout).await {
            if let Err(stop_err) = proxy.stop().await {
                tracing::warn!("Failed to stop proxy after failed start: {}", stop_err);
            }
            return Err(e);
        }

        tracing::info!("Capturing proxy ready at {}", proxy.url());
        Ok(proxy)
    }

    async fn wait_ready(&mut self, timeout: Duration) -> Result<(), ProxyError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(status) = self.child.try_wait()? {
                let stderr = match self.stderr.take() {
                    Some(handle) => handle.await.unwrap_or_default(),
                    None => String::new(),
                };
                tracing::error!("{} exited early ({}): {}", self.program, status, stderr);
                return Err(ProxyError::ExitedEarly {
                    program: self.program.clone(),
                    status,
                    stderr,
                });
            }

            if TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(ProxyError::NotReady {
                    program: self.program.clone(),
                    port: self.port,
                    timeout,
                });
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Proxy URL for HTTP clients
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Terminates the proxy process group
    ///
    /// Sends SIGTERM to the group, waits for the grace period, then kills
    /// the group forcefully.
    pub async fn stop(mut self) -> Result<(), ProxyError> {
        if let Some(status) = self.child.try_wait()? {
            tracing::debug!("Proxy already exited ({})", status);
            return Ok(());
        }

        self.signal_group(Signal::Terminate);

        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(status) => {
                tracing::info!("Capturing proxy stopped ({})", status?);
            }
            Err(_) => {
                tracing::warn!(
                    "Proxy did not exit within {}ms; killing it",
                    self.grace.as_millis()
                );
                self.signal_group(Signal::Kill);
                self.child.kill().await?;
            }
        }
        Ok(())
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: Signal) {
        let Some(pid) = self.child.id() else {
            return;
        };
        let signal = match signal {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        // SAFETY: killpg only delivers a signal; the group was created for this child
        let rc = unsafe { libc::killpg(pid as libc::pid_t, signal) };
        if rc != 0 {
            tracing::debug!(
                "killpg({}) failed: {}",
                pid,
                io::Error::last_os_error()
            );
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, _signal: Signal) {
        let _ = self.child.start_kill();
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Terminate,
    Kill,
}
