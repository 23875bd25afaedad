//! The backend service runs as a child process for the lifetime of the app.

use crate::config::BackendCommand;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct BackendProcess {
    kill_tx: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<Option<ExitStatus>>,
}

impl BackendProcess {
    /// Spawn the child with its output forwarded into the log.
    /// Must be called from inside a tokio runtime.
    pub fn spawn(command: &BackendCommand) -> std::io::Result<Self> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        info!(program = %command.program, ?pid, "backend started");

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, true));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor(child, kill_rx));

        Ok(Self {
            kill_tx: Some(kill_tx),
            monitor,
        })
    }

    #[cfg(test)]
    fn has_exited(&self) -> bool {
        self.monitor.is_finished()
    }

    /// Kill the child (if still running) and reap it.
    pub async fn stop(mut self) -> Option<ExitStatus> {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
        match (&mut self.monitor).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "backend monitor task failed");
                None
            }
        }
    }
}

async fn monitor(mut child: Child, kill_rx: oneshot::Receiver<()>) -> Option<ExitStatus> {
    tokio::select! {
        status = child.wait() => {
            match &status {
                Ok(s) if s.success() => info!(status = %s, "backend exited"),
                Ok(s) => error!(status = %s, "backend exited unexpectedly"),
                Err(e) => error!(error = %e, "failed to wait on backend"),
            }
            status.ok()
        }
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill backend");
            }
            let status = child.wait().await.ok();
            info!(?status, "backend stopped");
            status
        }
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(stream: R, is_stderr: bool) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            warn!(target: "backend", "{line}");
        } else {
            info!(target: "backend", "{line}");
        }
    }
}
