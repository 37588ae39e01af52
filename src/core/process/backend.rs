// src/core/process/backend.rs

//! OS process spawning and signalling behind a small trait seam.

use super::launch::LaunchSpec;
use crate::core::errors::LaunchSiteError;
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::warn;

/// A handle to one spawned process.
pub trait ManagedProcess: Send + Sync {
    fn id(&self) -> u32;

    /// Non-blocking liveness check. Reaps the process once it has exited.
    fn is_running(&mut self) -> bool;

    /// Whether `interrupt` can deliver a graceful signal on this platform.
    fn supports_interrupt(&self) -> bool;

    /// Sends an interrupt to the process group.
    fn interrupt(&mut self) -> Result<(), LaunchSiteError>;

    /// Forcibly terminates the process and waits for it to be reaped.
    fn terminate(&mut self) -> Result<(), LaunchSiteError>;

    /// The exit code once the process has been reaped, if it exited normally.
    fn exit_code(&self) -> Option<i32>;
}

/// Creates `ManagedProcess` handles.
pub trait ProcessBackend: Send + Sync {
    fn spawn(&self, spec: &LaunchSpec) -> Result<Box<dyn ManagedProcess>, LaunchSiteError>;
}

/// The real backend, built on `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProcessBackend;

impl ProcessBackend for OsProcessBackend {
    fn spawn(&self, spec: &LaunchSpec) -> Result<Box<dyn ManagedProcess>, LaunchSiteError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Keep operator Ctrl+C from reaching the server directly.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let child = command.spawn().map_err(|e| {
            LaunchSiteError::Process(format!(
                "failed to spawn {}: {}",
                spec.program.display(),
                e
            ))
        })?;

        Ok(Box::new(OsProcess {
            child,
            status: None,
        }))
    }
}

pub struct OsProcess {
    child: Child,
    status: Option<ExitStatus>,
}

impl ManagedProcess for OsProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn is_running(&mut self) -> bool {
        if self.status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.status = Some(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!("Failed to query process {} status: {}", self.child.id(), e);
                false
            }
        }
    }

    fn supports_interrupt(&self) -> bool {
        cfg!(unix)
    }

    #[cfg(unix)]
    fn interrupt(&mut self) -> Result<(), LaunchSiteError> {
        // The child leads its own group, so its pid is the group id.
        let pgid = self.child.id() as libc::pid_t;
        let rc = unsafe { libc::killpg(pgid, libc::SIGINT) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn interrupt(&mut self) -> Result<(), LaunchSiteError> {
        Err(LaunchSiteError::Process(
            "interrupt signals are not supported on this platform".to_string(),
        ))
    }

    fn terminate(&mut self) -> Result<(), LaunchSiteError> {
        if self.status.is_some() {
            return Ok(());
        }
        #[cfg(unix)]
        {
            let pgid = self.child.id() as libc::pid_t;
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
        if let Err(e) = self.child.kill() {
            // InvalidInput means it already exited.
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(e.into());
            }
        }
        self.status = Some(self.child.wait()?);
        Ok(())
    }

    fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|status| status.code())
    }
}

impl Drop for OsProcess {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.terminate() {
                warn!("Failed to terminate process {} on drop: {}", self.child.id(), e);
            }
        }
    }
}
