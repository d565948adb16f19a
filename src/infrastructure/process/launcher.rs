//! Worker processes backed by `tokio::process`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::domain::models::{SourceConfig, SupervisorConfig};
use crate::domain::ports::{Termination, WorkerExit, WorkerLauncher, WorkerProcess};

/// Launches workers as `<command> <args...> <target> --output <artifact>`
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    env_remove: Vec<String>,
}

impl CommandLauncher {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec![],
            env: BTreeMap::new(),
            env_remove: vec![],
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            command: config.worker_command.clone(),
            args: config.worker_args.clone(),
            env: config.worker_env.clone(),
            env_remove: config.worker_env_remove.clone(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    fn build_command(&self, source: &SourceConfig, artifact: &Path) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg(&source.target)
            .arg("--output")
            .arg(artifact);

        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        cmd.envs(&self.env);

        // Workers only talk to us through the artifact.
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        cmd
    }
}

impl WorkerLauncher for CommandLauncher {
    fn launch(&self, source: &SourceConfig, artifact: &Path) -> std::io::Result<Box<dyn WorkerProcess>> {
        let child = self.build_command(source, artifact).spawn()?;
        info!(
            source = %source.id(),
            pid = ?child.id(),
            command = %self.command,
            artifact = %artifact.display(),
            "Worker process spawned"
        );
        Ok(Box::new(ChildWorker { child }))
    }
}

/// A spawned worker child process
#[derive(Debug)]
pub struct ChildWorker {
    child: Child,
}

impl ChildWorker {
    /// Send the polite stop signal: SIGTERM on unix, a hard kill elsewhere.
    fn signal_stop(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                let pid = i32::try_from(pid).map_err(|e| std::io::Error::other(e.to_string()))?;
                return kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(std::io::Error::from);
            }
            Ok(())
        }

        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }
}

fn to_exit(status: std::process::ExitStatus) -> WorkerExit {
    WorkerExit {
        code: status.code(),
    }
}

#[async_trait]
impl WorkerProcess for ChildWorker {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_exit(&mut self) -> std::io::Result<Option<WorkerExit>> {
        Ok(self.child.try_wait()?.map(to_exit))
    }

    async fn terminate(&mut self, grace: Duration) -> std::io::Result<Termination> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(Termination::AlreadyExited(to_exit(status)));
        }

        if let Err(e) = self.signal_stop() {
            warn!(pid = ?self.child.id(), error = %e, "Failed to signal worker, killing it");
            self.child.kill().await?;
            return Ok(Termination::Forced);
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(?status, "Worker exited after stop signal");
                Ok(Termination::Graceful(to_exit(status)))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    pid = ?self.child.id(),
                    grace_secs = grace.as_secs(),
                    "Worker did not exit within grace period, forcing kill"
                );
                self.child.kill().await?;
                Ok(Termination::Forced)
            }
        }
    }
}
