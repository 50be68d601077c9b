use std::{
    io,
    process::{ExitStatus, Stdio},
};

#[cfg(unix)]
use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use thiserror::Error;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, trace};

use crate::config::ProcessCommand;

/// How a supervised process is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGKILL. For processes that ignore lighter signals.
    Kill,
    /// SIGINT. Lets the process flush and exit on its own.
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Signalled,
    Exited,
}

#[derive(Error, Debug)]
pub enum ProcessError {
    /// The binary is missing, not executable, or the OS refused a new process.
    #[error("Failed to spawn '{command}'. Error: {source}")]
    Spawn {
        command: ProcessCommand,
        source: io::Error,
    },

    /// Usually means the process is already gone.
    #[error("Failed to signal {name}. Error: {source}")]
    Signal { name: &'static str, source: io::Error },
}

/// One externally spawned process. Never restarted.
#[derive(Debug)]
pub struct SupervisedProcess {
    name: &'static str,
    child: Child,
    state: ProcessState,
}

impl SupervisedProcess {
    /// Spawn `command`. With `capture_stdout` the standard output is piped and
    /// can be taken with [`SupervisedProcess::take_stdout`].
    pub fn spawn(
        name: &'static str,
        command: &ProcessCommand,
        capture_stdout: bool,
    ) -> Result<Self, ProcessError> {
        let mut builder = Command::new(&command.program);
        builder
            .args(&command.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        // Own process group, so a terminal Ctrl+C reaches only us and the
        // children are stopped through `terminate`.
        #[cfg(unix)]
        builder.process_group(0);
        if capture_stdout {
            builder.stdout(Stdio::piped());
        }

        let child = builder.spawn().map_err(|source| ProcessError::Spawn {
            command: command.clone(),
            source,
        })?;
        debug!("Spawned {} ({}) with pid {:?}.", name, command, child.id());

        Ok(Self {
            name,
            child,
            state: ProcessState::Running,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Check without blocking whether the process has exited.
    pub fn has_exited(&mut self) -> bool {
        if self.state == ProcessState::Exited {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("{} exited with {}.", self.name, status);
                self.state = ProcessState::Exited;
                true
            }
            Ok(None) => false,
            Err(e) => {
                trace!("Failed to poll {}. Error: {}", self.name, e);
                false
            }
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Deliver `how` once. Later calls, and calls after the process exited,
    /// do nothing.
    pub fn terminate(&mut self, how: Termination) -> Result<(), ProcessError> {
        if self.state != ProcessState::Running || self.has_exited() {
            trace!("{} is not running, nothing to signal.", self.name);
            return Ok(());
        }
        self.state = ProcessState::Signalled;

        let result = match how {
            Termination::Kill => self.child.start_kill(),
            Termination::Interrupt => self.interrupt(),
        };
        result.map_err(|source| ProcessError::Signal {
            name: self.name,
            source,
        })
    }

    #[cfg(unix)]
    fn interrupt(&mut self) -> io::Result<()> {
        let pid = match self.child.id() {
            Some(pid) => pid,
            None => return Ok(()),
        };
        let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        kill(Pid::from_raw(pid), Signal::SIGINT)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn interrupt(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    /// Wait for the process to exit and reap it.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.state = ProcessState::Exited;
        Ok(status)
    }

    /// Forcefully kill regardless of earlier signals.
    pub fn force_kill(&mut self) -> io::Result<()> {
        if self.has_exited() {
            return Ok(());
        }
        self.child.start_kill()
    }
}
