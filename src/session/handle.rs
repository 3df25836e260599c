//! Supervision of one exporter process

use crate::error::{InspectError, InspectResult};
use crate::session::{LaunchSpec, NbdEndpoint};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempPath;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay between readiness probes
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Upper bound on a single connect attempt
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// A running exporter process and the files it depends on.
///
/// Closing is idempotent. A handle dropped without [`close`](Self::close)
/// still kills its process and removes its files, but without the grace
/// period.
pub struct SessionHandle {
    program: String,
    endpoint: NbdEndpoint,
    child: Option<Child>,
    artifacts: Vec<TempPath>,
    grace_period: Duration,
}

impl SessionHandle {
    /// Start the process described by `spec`.
    ///
    /// The endpoint is not assumed reachable yet; call
    /// [`wait_ready`](Self::wait_ready) before using it. On failure the
    /// spec's artifacts are removed.
    pub fn open(
        spec: LaunchSpec,
        grace_period: Duration,
        cancel: &CancellationToken,
    ) -> InspectResult<Self> {
        if cancel.is_cancelled() {
            return Err(InspectError::Cancelled);
        }

        let program = spec.program.display().to_string();
        debug!("Starting {} for {}", program, spec.endpoint);

        // Output is discarded: exporters may echo connection details.
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InspectError::session_start(&program, e))?;

        info!(
            endpoint = %spec.endpoint,
            pid = child.id(),
            "Started {}",
            program
        );

        Ok(Self {
            program,
            endpoint: spec.endpoint,
            child: Some(child),
            artifacts: spec.artifacts,
            grace_period,
        })
    }

    pub fn endpoint(&self) -> &NbdEndpoint {
        &self.endpoint
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Process id while the process is running
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    pub fn is_closed(&self) -> bool {
        self.child.is_none() && self.artifacts.is_empty()
    }

    /// Poll the endpoint until it accepts a TCP connection.
    ///
    /// Fails early if the process exits first, with a timeout error once
    /// `timeout` elapses, or with `Cancelled` when `cancel` fires.
    pub async fn wait_ready(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> InspectResult<()> {
        let deadline = Instant::now() + timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(InspectError::Cancelled);
            }

            let child = self.child.as_mut().ok_or_else(|| {
                InspectError::Internal(format!("session for {} already closed", self.endpoint))
            })?;
            if let Some(status) = child
                .try_wait()
                .map_err(|e| InspectError::io(format!("polling {}", self.program), e))?
            {
                return Err(InspectError::SessionExited {
                    program: self.program.clone(),
                    endpoint: self.endpoint.to_string(),
                    status: status.to_string(),
                });
            }

            let addr = (self.endpoint.host.as_str(), self.endpoint.port);
            if let Ok(Ok(_)) = tokio::time::timeout(CONNECT_ATTEMPT_TIMEOUT, TcpStream::connect(addr)).await {
                debug!("NBD endpoint {} is ready", self.endpoint);
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(InspectError::SessionNotReady {
                    endpoint: self.endpoint.to_string(),
                    timeout,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(InspectError::Cancelled),
                _ = tokio::time::sleep(READY_POLL_INTERVAL) => {}
            }
        }
    }

    /// Stop the process and remove its files. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            match terminate(&mut child, self.grace_period).await {
                Ok(()) => debug!("Stopped {} for {}", self.program, self.endpoint),
                Err(e) => warn!(endpoint = %self.endpoint, error = %e, "Failed to stop {}", self.program),
            }
        }

        for artifact in self.artifacts.drain(..) {
            let path = artifact.to_path_buf();
            if let Err(e) = artifact.close() {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            warn!("Session for {} dropped without close, killing {}", self.endpoint, self.program);
            let _ = child.start_kill();
        }
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL and reap
async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: the pid belongs to our child, which has not been reaped.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
                status?;
                return Ok(());
            }
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    child.kill().await
}
